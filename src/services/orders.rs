//! Checkout and order lifecycle.
//!
//! Orders are placed from the principal's server-side cart, re-checked
//! against the live catalog, and then move through the lifecycle via
//! conditional repository writes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::instrument;

use super::{require_admin, ServiceError, ServiceResult};
use crate::domain::aggregates::{Cart, CartError, CartLine, CartSessions, CartSnapshot, Order, OrderError, StatusChange};
use crate::domain::events::OrderEvent;
use crate::domain::pricing::price_lines;
use crate::domain::value_objects::{OrderId, PaymentSelection, Principal, ShippingAddress};
use crate::events::EventPublisher;
use crate::payments::{PaymentConfirmationFlow, PaymentIntent};
use crate::repository::{OrderRepository, ProductRepository};

/// Attempts at a lifecycle transition before reporting a conflict.
const TRANSITION_ATTEMPTS: usize = 3;

#[derive(Clone)]
pub struct OrderService {
    orders: Arc<dyn OrderRepository>,
    products: Arc<dyn ProductRepository>,
    carts: Arc<CartSessions>,
    payments: Arc<PaymentConfirmationFlow>,
    events: EventPublisher,
}

impl OrderService {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        products: Arc<dyn ProductRepository>,
        carts: Arc<CartSessions>,
        payments: Arc<PaymentConfirmationFlow>,
        events: EventPublisher,
    ) -> Self {
        Self { orders, products, carts, payments, events }
    }

    /// Places an order for everything in the actor's cart and empties the cart.
    ///
    /// The cart is taken out of the session store up front, so a concurrent
    /// checkout sees an empty cart. If the order cannot be placed the lines
    /// go back.
    #[instrument(skip_all, fields(principal_id = %actor.id))]
    pub async fn place_order(&self, actor: &Principal, address: ShippingAddress, payment: PaymentSelection) -> ServiceResult<Order> {
        let cart = self.carts.take(actor.id).await;
        let order = match self.create_order(actor, &cart, &address, payment).await {
            Ok(order) => order,
            Err(err) => {
                self.carts.restore(cart).await;
                return Err(err);
            }
        };

        tracing::info!(order_id = %order.id(), grand_total = %order.totals().grand_total, "order placed");
        self.events
            .publish(OrderEvent::Placed { order_id: order.id(), owner_id: order.owner_id(), grand_total: order.totals().grand_total })
            .await;
        self.events.publish(OrderEvent::AwaitingPayment { order_id: order.id() }).await;
        Ok(order)
    }

    async fn create_order(
        &self,
        actor: &Principal,
        cart: &Cart,
        address: &ShippingAddress,
        payment: PaymentSelection,
    ) -> ServiceResult<Order> {
        let snapshot = self.reprice(cart.lines()).await?;
        let order = Order::place(actor.id, snapshot, address, payment, Utc::now())?;
        self.orders.insert(&order).await?;
        Ok(order)
    }

    /// Refreshes each line from the catalog and prices the result.
    async fn reprice(&self, lines: &[CartLine]) -> ServiceResult<CartSnapshot> {
        let mut fresh = Vec::with_capacity(lines.len());
        for line in lines {
            let Some(product) = self.products.find_by_id(line.product_id).await? else {
                return Err(CartError::OutOfStock(line.product_id).into());
            };
            let entry = product.catalog_entry();
            if entry.available_stock == 0 {
                return Err(CartError::OutOfStock(entry.id).into());
            }
            if line.quantity > entry.available_stock {
                return Err(CartError::InvalidQuantity { requested: line.quantity, available: entry.available_stock }.into());
            }
            fresh.push(CartLine {
                product_id: entry.id,
                unit_price: entry.unit_price,
                quantity: line.quantity,
                display_name: entry.display_name,
                image_ref: entry.image_ref,
                available_stock: entry.available_stock,
            });
        }
        let totals = price_lines(&fresh, self.carts.policy());
        Ok(CartSnapshot { lines: fresh, totals })
    }

    pub async fn get(&self, actor: &Principal, id: OrderId) -> ServiceResult<Order> {
        let order = self.load(id).await?;
        if !order.is_visible_to(actor) {
            return Err(ServiceError::Forbidden);
        }
        Ok(order)
    }

    pub async fn list_mine(&self, actor: &Principal) -> ServiceResult<Vec<Order>> {
        Ok(self.orders.find_by_owner(actor.id).await?)
    }

    pub async fn list_all(&self, actor: &Principal) -> ServiceResult<Vec<Order>> {
        require_admin(actor)?;
        Ok(self.orders.find_all().await?)
    }

    #[instrument(skip_all, fields(principal_id = %actor.id, order_id = %id))]
    pub async fn create_payment_intent(&self, actor: &Principal, id: OrderId) -> ServiceResult<PaymentIntent> {
        let order = self.owned(actor, id).await?;
        Ok(self.payments.create_intent(&order).await?)
    }

    /// Confirms the payment and returns the paid order. Repeating a
    /// successful confirmation returns the same paid order.
    #[instrument(skip_all, fields(principal_id = %actor.id, order_id = %id))]
    pub async fn confirm_payment(
        &self,
        actor: &Principal,
        id: OrderId,
        intent_id: &str,
        payment_method: Option<&str>,
    ) -> ServiceResult<Order> {
        let order = self.owned(actor, id).await?;
        let receipt = self.payments.confirm(&order, intent_id, payment_method).await?;
        if receipt.newly_paid {
            let amount = receipt.order.payment_result().map(|p| p.amount).unwrap_or_default();
            self.events.publish(OrderEvent::Paid { order_id: id, amount }).await;
        }
        Ok(receipt.order)
    }

    #[instrument(skip_all, fields(principal_id = %actor.id, order_id = %id))]
    pub async fn ship(&self, actor: &Principal, id: OrderId) -> ServiceResult<Order> {
        self.transition(id, |order, at| order.shipped_transition(actor, at)).await
    }

    #[instrument(skip_all, fields(principal_id = %actor.id, order_id = %id))]
    pub async fn deliver(&self, actor: &Principal, id: OrderId) -> ServiceResult<Order> {
        self.transition(id, |order, at| order.delivered_transition(actor, at)).await
    }

    #[instrument(skip_all, fields(principal_id = %actor.id, order_id = %id))]
    pub async fn cancel(&self, actor: &Principal, id: OrderId) -> ServiceResult<Order> {
        self.transition(id, |order, at| order.cancel_transition(actor, at)).await
    }

    /// Plans a change against the stored order and writes it conditionally,
    /// re-planning against the fresh state when another writer got there first.
    async fn transition<F>(&self, id: OrderId, plan: F) -> ServiceResult<Order>
    where
        F: Fn(&Order, DateTime<Utc>) -> Result<Option<StatusChange>, OrderError>,
    {
        for _ in 0..TRANSITION_ATTEMPTS {
            let mut order = self.load(id).await?;
            let Some(change) = plan(&order, Utc::now())? else { return Ok(order) };
            if self.orders.apply_transition(id, &change).await? {
                order.apply(&change);
                tracing::info!(from = %change.from, to = %change.to, "order status changed");
                self.events.publish(change.event(id)).await;
                return Ok(order);
            }
        }
        Err(ServiceError::Conflict(format!("order {id} is changing too quickly, retry")))
    }

    async fn load(&self, id: OrderId) -> ServiceResult<Order> {
        self.orders.find_by_id(id).await?.ok_or(ServiceError::NotFound("order"))
    }

    async fn owned(&self, actor: &Principal, id: OrderId) -> ServiceResult<Order> {
        let order = self.load(id).await?;
        if order.owner_id() != actor.id {
            return Err(ServiceError::Forbidden);
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rust_decimal::Decimal;

    use super::*;
    use crate::domain::aggregates::product::{Condition, Format, Genre};
    use crate::domain::aggregates::{NewProduct, OrderStatus, Product, ProductFilter, ProductPatch, Review};
    use crate::domain::pricing::PricingPolicy;
    use crate::domain::value_objects::{PrincipalId, ProductId};
    use crate::payments::ScriptedProcessor;
    use crate::repository::{InMemoryOrderRepository, InMemoryProductRepository, PageRequest, ProductPage, RepositoryError, ReviewInsert};

    /// Catalog that hands control back to the scheduler before every lookup.
    struct YieldingCatalog(Arc<InMemoryProductRepository>);

    #[async_trait::async_trait]
    impl ProductRepository for YieldingCatalog {
        async fn list(&self, filter: &ProductFilter, page: PageRequest) -> Result<ProductPage, RepositoryError> {
            self.0.list(filter, page).await
        }

        async fn find_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
            tokio::task::yield_now().await;
            self.0.find_by_id(id).await
        }

        async fn insert(&self, product: &Product) -> Result<(), RepositoryError> { self.0.insert(product).await }

        async fn update(&self, product: &Product, expected_version: i32) -> Result<bool, RepositoryError> {
            self.0.update(product, expected_version).await
        }

        async fn delete(&self, id: ProductId) -> Result<bool, RepositoryError> { self.0.delete(id).await }

        async fn add_review(&self, product: &Product, review: &Review) -> Result<ReviewInsert, RepositoryError> {
            self.0.add_review(product, review).await
        }
    }

    struct Fixture {
        svc: OrderService,
        products: Arc<InMemoryProductRepository>,
        carts: Arc<CartSessions>,
        product: Product,
    }

    async fn fixture() -> Fixture {
        let products = Arc::new(InMemoryProductRepository::new());
        let orders = Arc::new(InMemoryOrderRepository::new());
        let carts = Arc::new(CartSessions::new(PricingPolicy::default()));
        let flow = PaymentConfirmationFlow::new(Arc::new(ScriptedProcessor::approving()), orders.clone(), "usd", Duration::from_secs(1));
        let product = Product::create(
            NewProduct {
                title: "Rumours".into(),
                artist: "Fleetwood Mac".into(),
                description: "Original 1977 pressing".into(),
                price: Decimal::new(1999, 2),
                genre: Genre::Rock,
                condition: Condition::Good,
                format: Format::Vinyl,
                release_year: 1977,
                stock: 4,
                images: vec!["/img/rumours.jpg".into()],
            },
            Utc::now(),
        )
        .unwrap();
        products.insert(&product).await.unwrap();
        let svc = OrderService::new(orders, products.clone(), carts.clone(), Arc::new(flow), EventPublisher::disabled());
        Fixture { svc, products, carts, product }
    }

    fn address() -> ShippingAddress {
        ShippingAddress {
            address_line: "5 Penny Ln".into(),
            city: "Liverpool".into(),
            postal_code: "L18".into(),
            country: "UK".into(),
        }
    }

    fn card() -> PaymentSelection {
        PaymentSelection::Card { processor_token: "pm_card_visa".into() }
    }

    async fn fill_cart(fx: &Fixture, owner: PrincipalId, quantity: u32) {
        let entry = fx.product.catalog_entry();
        fx.carts.update(owner, |c| c.add_line(&entry, quantity)).await.unwrap();
    }

    #[tokio::test]
    async fn test_checkout_to_delivery() {
        let fx = fixture().await;
        let buyer = Principal::customer(PrincipalId::generate());
        let admin = Principal::admin(PrincipalId::generate());
        fill_cart(&fx, buyer.id, 2).await;

        let order = fx.svc.place_order(&buyer, address(), card()).await.unwrap();
        assert_eq!(order.status(), OrderStatus::AwaitingPayment);
        assert_eq!(order.totals().grand_total, Decimal::new(4818, 2));
        assert!(fx.carts.get(buyer.id).await.is_empty());

        let intent = fx.svc.create_payment_intent(&buyer, order.id()).await.unwrap();
        assert_eq!(intent.amount_minor, 4818);
        let paid = fx.svc.confirm_payment(&buyer, order.id(), &intent.intent_id, None).await.unwrap();
        assert!(paid.is_paid());

        assert!(matches!(fx.svc.ship(&buyer, order.id()).await, Err(ServiceError::Order(OrderError::Forbidden))));
        assert!(matches!(
            fx.svc.deliver(&admin, order.id()).await,
            Err(ServiceError::Order(OrderError::InvalidTransition { .. }))
        ));
        fx.svc.ship(&admin, order.id()).await.unwrap();
        let delivered = fx.svc.deliver(&admin, order.id()).await.unwrap();
        assert!(delivered.is_delivered());
        assert_eq!(delivered.history().len(), 5);

        // Repeating a reached transition changes nothing.
        let again = fx.svc.deliver(&admin, order.id()).await.unwrap();
        assert_eq!(again.delivered_at(), delivered.delivered_at());
        assert_eq!(again.version(), delivered.version());
    }

    #[tokio::test]
    async fn test_empty_cart_is_invalid_order() {
        let fx = fixture().await;
        let buyer = Principal::customer(PrincipalId::generate());
        let err = fx.svc.place_order(&buyer, address(), card()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Order(OrderError::InvalidOrder(_))));
    }

    #[tokio::test]
    async fn test_checkout_rechecks_stock_and_price() {
        let fx = fixture().await;
        let buyer = Principal::customer(PrincipalId::generate());
        fill_cart(&fx, buyer.id, 3).await;

        let mut product = fx.product.clone();
        let expected = product.version();
        product.apply_patch(ProductPatch { stock: Some(2), ..Default::default() }).unwrap();
        assert!(fx.products.update(&product, expected).await.unwrap());
        let err = fx.svc.place_order(&buyer, address(), card()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Cart(CartError::InvalidQuantity { requested: 3, available: 2 })));
        assert_eq!(fx.carts.get(buyer.id).await.lines().len(), 1);

        let expected = product.version();
        product.apply_patch(ProductPatch { stock: Some(5), price: Some(Decimal::new(1000, 2)), ..Default::default() }).unwrap();
        assert!(fx.products.update(&product, expected).await.unwrap());
        let order = fx.svc.place_order(&buyer, address(), card()).await.unwrap();
        assert_eq!(order.totals().items_total, Decimal::new(3000, 2));
    }

    #[tokio::test]
    async fn test_orders_are_private() {
        let fx = fixture().await;
        let buyer = Principal::customer(PrincipalId::generate());
        let stranger = Principal::customer(PrincipalId::generate());
        fill_cart(&fx, buyer.id, 1).await;
        let order = fx.svc.place_order(&buyer, address(), card()).await.unwrap();

        assert!(matches!(fx.svc.get(&stranger, order.id()).await, Err(ServiceError::Forbidden)));
        assert!(matches!(fx.svc.create_payment_intent(&stranger, order.id()).await, Err(ServiceError::Forbidden)));
        assert!(matches!(fx.svc.cancel(&stranger, order.id()).await, Err(ServiceError::Order(OrderError::Forbidden))));
        assert!(matches!(fx.svc.list_all(&stranger).await, Err(ServiceError::Forbidden)));
        assert!(fx.svc.list_mine(&stranger).await.unwrap().is_empty());
        assert_eq!(fx.svc.list_mine(&buyer).await.unwrap().len(), 1);
        assert!(matches!(fx.svc.get(&buyer, OrderId::generate()).await, Err(ServiceError::NotFound("order"))));
    }

    #[tokio::test]
    async fn test_cancel_before_payment() {
        let fx = fixture().await;
        let buyer = Principal::customer(PrincipalId::generate());
        fill_cart(&fx, buyer.id, 1).await;
        let order = fx.svc.place_order(&buyer, address(), card()).await.unwrap();

        let cancelled = fx.svc.cancel(&buyer, order.id()).await.unwrap();
        assert_eq!(cancelled.status(), OrderStatus::Cancelled);
        let err = fx.svc.create_payment_intent(&buyer, order.id()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Payment(_)));
    }

    #[tokio::test]
    async fn test_vanished_product_blocks_checkout() {
        let fx = fixture().await;
        let buyer = Principal::customer(PrincipalId::generate());
        fill_cart(&fx, buyer.id, 1).await;
        assert!(fx.products.delete(fx.product.id()).await.unwrap());
        let err = fx.svc.place_order(&buyer, address(), card()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Cart(CartError::OutOfStock(id)) if id == fx.product.id()));
    }

    #[tokio::test]
    async fn test_concurrent_checkouts_place_one_order() {
        let fx = fixture().await;
        let orders = Arc::new(InMemoryOrderRepository::new());
        let flow = PaymentConfirmationFlow::new(Arc::new(ScriptedProcessor::approving()), orders.clone(), "usd", Duration::from_secs(1));
        let svc = OrderService::new(
            orders.clone(),
            Arc::new(YieldingCatalog(fx.products.clone())),
            fx.carts.clone(),
            Arc::new(flow),
            EventPublisher::disabled(),
        );
        let buyer = Principal::customer(PrincipalId::generate());
        fill_cart(&fx, buyer.id, 2).await;

        let (first, second) = tokio::join!(
            svc.place_order(&buyer, address(), card()),
            svc.place_order(&buyer, address(), card())
        );
        assert_eq!([first.is_ok(), second.is_ok()].iter().filter(|ok| **ok).count(), 1);
        let err = first.err().or(second.err()).unwrap();
        assert!(matches!(err, ServiceError::Order(OrderError::InvalidOrder(_))));
        assert_eq!(orders.find_by_owner(buyer.id).await.unwrap().len(), 1);
        assert!(fx.carts.get(buyer.id).await.is_empty());
    }
}
