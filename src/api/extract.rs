//! Request extractors that reject with [`ApiError`] instead of axum's
//! plain-text rejections.

use async_trait::async_trait;
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRequest, FromRequestParts, Path, Query, Request,
    },
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;

use super::ApiError;
use crate::domain::value_objects::{Principal, PrincipalId};

pub const PRINCIPAL_ID_HEADER: &str = "x-principal-id";
pub const PRINCIPAL_NAME_HEADER: &str = "x-principal-name";
pub const PRINCIPAL_ADMIN_HEADER: &str = "x-principal-admin";

/// The verified principal forwarded by the identity gateway.
///
/// Rejects with 401 when the id header is missing or not a UUID.
pub struct RequirePrincipal(pub Principal);

#[async_trait]
impl<S> FromRequestParts<S> for RequirePrincipal
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| parts.headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim);

        let id = header(PRINCIPAL_ID_HEADER)
            .and_then(|raw| uuid::Uuid::parse_str(raw).ok())
            .map(PrincipalId::from_uuid)
            .ok_or(ApiError::Unauthorized)?;
        let name = header(PRINCIPAL_NAME_HEADER).filter(|n| !n.is_empty()).map(str::to_string);
        let is_admin = header(PRINCIPAL_ADMIN_HEADER).is_some_and(|v| v.eq_ignore_ascii_case("true"));

        Ok(Self(Principal { id, name, is_admin }))
    }
}

/// JSON body; malformed bodies become 400 `{ "message": ... }`.
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e: JsonRejection| ApiError::BadRequest(e.body_text()))?;
        Ok(Self(value))
    }
}

pub struct ApiPath<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state)
            .await
            .map_err(|e: PathRejection| ApiError::BadRequest(e.body_text()))?;
        Ok(Self(value))
    }
}

pub struct ApiQuery<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|e: QueryRejection| ApiError::BadRequest(e.body_text()))?;
        Ok(Self(value))
    }
}
