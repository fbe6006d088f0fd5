use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use validator::Validate;

use super::extract::{ApiJson, ApiPath, RequirePrincipal};
use super::{ApiError, AppState};
use crate::domain::aggregates::Order;
use crate::domain::value_objects::{OrderId, PaymentSelection, ShippingAddress};
use crate::payments::PaymentIntent;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlaceOrderRequest {
    pub shipping_address: ShippingAddress,
    pub payment: PaymentSelection,
}

/// Confirmation callback payload.
#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct PayRequest {
    #[validate(length(min = 1, message = "intent_id is required"))]
    pub intent_id: String,
    /// Overrides the payment method the order was placed with.
    pub payment_method: Option<String>,
}

pub async fn place(
    State(s): State<AppState>,
    RequirePrincipal(actor): RequirePrincipal,
    ApiJson(req): ApiJson<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let order = s.orders().place_order(&actor, req.shipping_address, req.payment).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn list_mine(State(s): State<AppState>, RequirePrincipal(actor): RequirePrincipal) -> Result<Json<Vec<Order>>, ApiError> {
    Ok(Json(s.orders().list_mine(&actor).await?))
}

pub async fn list_all(State(s): State<AppState>, RequirePrincipal(actor): RequirePrincipal) -> Result<Json<Vec<Order>>, ApiError> {
    Ok(Json(s.orders().list_all(&actor).await?))
}

pub async fn get(
    State(s): State<AppState>,
    RequirePrincipal(actor): RequirePrincipal,
    ApiPath(id): ApiPath<OrderId>,
) -> Result<Json<Order>, ApiError> {
    Ok(Json(s.orders().get(&actor, id).await?))
}

pub async fn create_payment_intent(
    State(s): State<AppState>,
    RequirePrincipal(actor): RequirePrincipal,
    ApiPath(id): ApiPath<OrderId>,
) -> Result<Json<PaymentIntent>, ApiError> {
    Ok(Json(s.orders().create_payment_intent(&actor, id).await?))
}

pub async fn pay(
    State(s): State<AppState>,
    RequirePrincipal(actor): RequirePrincipal,
    ApiPath(id): ApiPath<OrderId>,
    ApiJson(req): ApiJson<PayRequest>,
) -> Result<Json<Order>, ApiError> {
    req.validate()?;
    let order = s.orders().confirm_payment(&actor, id, req.intent_id.trim(), req.payment_method.as_deref()).await?;
    Ok(Json(order))
}

pub async fn ship(
    State(s): State<AppState>,
    RequirePrincipal(actor): RequirePrincipal,
    ApiPath(id): ApiPath<OrderId>,
) -> Result<Json<Order>, ApiError> {
    Ok(Json(s.orders().ship(&actor, id).await?))
}

pub async fn deliver(
    State(s): State<AppState>,
    RequirePrincipal(actor): RequirePrincipal,
    ApiPath(id): ApiPath<OrderId>,
) -> Result<Json<Order>, ApiError> {
    Ok(Json(s.orders().deliver(&actor, id).await?))
}

pub async fn cancel(
    State(s): State<AppState>,
    RequirePrincipal(actor): RequirePrincipal,
    ApiPath(id): ApiPath<OrderId>,
) -> Result<Json<Order>, ApiError> {
    Ok(Json(s.orders().cancel(&actor, id).await?))
}
