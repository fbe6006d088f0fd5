use axum::{extract::State, http::StatusCode, Json};
use rust_decimal::Decimal;
use serde::Deserialize;
use validator::Validate;

use super::extract::{ApiJson, ApiPath, ApiQuery, RequirePrincipal};
use super::{ApiError, AppState};
use crate::domain::aggregates::product::{Condition, Format, Genre};
use crate::domain::aggregates::{NewProduct, Product, ProductFilter, ProductPatch};
use crate::domain::value_objects::ProductId;
use crate::repository::{PageRequest, ProductPage};
use crate::services::ReviewInput;

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub keyword: Option<String>,
    pub genre: Option<Genre>,
    pub condition: Option<Condition>,
    pub format: Option<Format>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub page: Option<u32>,
}

pub async fn list(State(s): State<AppState>, ApiQuery(p): ApiQuery<ListParams>) -> Result<Json<ProductPage>, ApiError> {
    let filter = ProductFilter {
        keyword: p.keyword,
        genre: p.genre,
        condition: p.condition,
        format: p.format,
        min_price: p.min_price,
        max_price: p.max_price,
    };
    Ok(Json(s.products().list(&filter, PageRequest::new(p.page)).await?))
}

pub async fn get(State(s): State<AppState>, ApiPath(id): ApiPath<ProductId>) -> Result<Json<Product>, ApiError> {
    Ok(Json(s.products().get(id).await?))
}

pub async fn create(
    State(s): State<AppState>,
    RequirePrincipal(actor): RequirePrincipal,
    ApiJson(input): ApiJson<NewProduct>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    input.validate()?;
    Ok((StatusCode::CREATED, Json(s.products().create(&actor, input).await?)))
}

pub async fn update(
    State(s): State<AppState>,
    RequirePrincipal(actor): RequirePrincipal,
    ApiPath(id): ApiPath<ProductId>,
    ApiJson(patch): ApiJson<ProductPatch>,
) -> Result<Json<Product>, ApiError> {
    patch.validate()?;
    Ok(Json(s.products().update(&actor, id, patch).await?))
}

pub async fn remove(
    State(s): State<AppState>,
    RequirePrincipal(actor): RequirePrincipal,
    ApiPath(id): ApiPath<ProductId>,
) -> Result<Json<serde_json::Value>, ApiError> {
    s.products().delete(&actor, id).await?;
    Ok(Json(serde_json::json!({ "message": "Product removed" })))
}

pub async fn review(
    State(s): State<AppState>,
    RequirePrincipal(actor): RequirePrincipal,
    ApiPath(id): ApiPath<ProductId>,
    ApiJson(input): ApiJson<ReviewInput>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    input.validate()?;
    Ok((StatusCode::CREATED, Json(s.products().add_review(&actor, id, input).await?)))
}
