use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use validator::Validate;

use super::extract::{ApiJson, ApiPath, RequirePrincipal};
use super::{ApiError, AppState};
use crate::domain::aggregates::Cart;
use crate::domain::value_objects::ProductId;

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AddItemRequest {
    pub product_id: ProductId,
    #[validate(range(min = 1, message = "quantity must be at least 1"))]
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetQuantityRequest {
    pub quantity: u32,
}

pub async fn view(State(s): State<AppState>, RequirePrincipal(actor): RequirePrincipal) -> Json<Cart> {
    Json(s.carts().view(actor.id).await)
}

pub async fn add_item(
    State(s): State<AppState>,
    RequirePrincipal(actor): RequirePrincipal,
    ApiJson(req): ApiJson<AddItemRequest>,
) -> Result<Json<Cart>, ApiError> {
    req.validate()?;
    Ok(Json(s.carts().add_item(actor.id, req.product_id, req.quantity).await?))
}

pub async fn set_quantity(
    State(s): State<AppState>,
    RequirePrincipal(actor): RequirePrincipal,
    ApiPath(product_id): ApiPath<ProductId>,
    ApiJson(req): ApiJson<SetQuantityRequest>,
) -> Result<Json<Cart>, ApiError> {
    Ok(Json(s.carts().set_quantity(actor.id, product_id, req.quantity).await?))
}

pub async fn remove_item(
    State(s): State<AppState>,
    RequirePrincipal(actor): RequirePrincipal,
    ApiPath(product_id): ApiPath<ProductId>,
) -> Result<Json<Cart>, ApiError> {
    Ok(Json(s.carts().remove_item(actor.id, product_id).await?))
}

pub async fn clear(State(s): State<AppState>, RequirePrincipal(actor): RequirePrincipal) -> StatusCode {
    s.carts().clear(actor.id).await;
    StatusCode::NO_CONTENT
}
