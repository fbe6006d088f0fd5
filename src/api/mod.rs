//! HTTP boundary.
//!
//! Identity is established upstream; [`extract::RequirePrincipal`] reads the
//! forwarded principal from request headers. Every error leaves as
//! `{ "message": ... }` with the status chosen in [`error`].

pub mod cart;
pub mod error;
pub mod extract;
pub mod orders;
pub mod products;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post, put},
    Json, Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::domain::aggregates::CartSessions;
use crate::domain::pricing::PricingPolicy;
use crate::events::EventPublisher;
use crate::payments::{PaymentConfirmationFlow, PaymentProcessor};
use crate::repository::{OrderRepository, ProductRepository};
use crate::services::{CartService, OrderService, ProductService};

pub use error::ApiError;

/// Everything the handlers need, wired once at startup.
pub struct Dependencies {
    pub products: Arc<dyn ProductRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub processor: Arc<dyn PaymentProcessor>,
    pub events: EventPublisher,
    pub pricing: PricingPolicy,
    pub currency: String,
    pub payment_timeout: Duration,
}

/// Shared handler state; cloning is a reference-count bump.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    products: ProductService,
    carts: CartService,
    orders: OrderService,
}

impl AppState {
    pub fn new(deps: Dependencies) -> Self {
        let carts = Arc::new(CartSessions::new(deps.pricing));
        let flow = PaymentConfirmationFlow::new(deps.processor, deps.orders.clone(), deps.currency, deps.payment_timeout);
        Self {
            inner: Arc::new(AppStateInner {
                products: ProductService::new(deps.products.clone(), deps.events.clone()),
                carts: CartService::new(carts.clone(), deps.products.clone()),
                orders: OrderService::new(deps.orders, deps.products, carts, Arc::new(flow), deps.events),
            }),
        }
    }

    pub fn products(&self) -> &ProductService { &self.inner.products }
    pub fn carts(&self) -> &CartService { &self.inner.carts }
    pub fn orders(&self) -> &OrderService { &self.inner.orders }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "vinyl-store"})) }))
        .route("/api/v1/products", get(products::list).post(products::create))
        .route("/api/v1/products/:id", get(products::get).put(products::update).delete(products::remove))
        .route("/api/v1/products/:id/reviews", post(products::review))
        .route("/api/v1/cart", get(cart::view).delete(cart::clear))
        .route("/api/v1/cart/items", post(cart::add_item))
        .route("/api/v1/cart/items/:product_id", put(cart::set_quantity).delete(cart::remove_item))
        .route("/api/v1/orders", get(orders::list_all).post(orders::place))
        .route("/api/v1/orders/mine", get(orders::list_mine))
        .route("/api/v1/orders/:id", get(orders::get))
        .route("/api/v1/orders/:id/payment-intent", post(orders::create_payment_intent))
        .route("/api/v1/orders/:id/pay", put(orders::pay))
        .route("/api/v1/orders/:id/ship", put(orders::ship))
        .route("/api/v1/orders/:id/deliver", put(orders::deliver))
        .route("/api/v1/orders/:id/cancel", put(orders::cancel))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
