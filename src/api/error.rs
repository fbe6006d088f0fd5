//! Maps every failure to a status code and a JSON `{ "message": ... }` body.
//!
//! Persistence failures are logged and answered with a generic message;
//! their details never reach the client.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use validator::ValidationErrors;

use crate::domain::aggregates::{CartError, OrderError, ProductError};
use crate::payments::PaymentError;
use crate::repository::RepositoryError;
use crate::services::ServiceError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("Not authenticated")]
    Unauthorized,
    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl From<ValidationErrors> for ApiError {
    fn from(e: ValidationErrors) -> Self { Self::BadRequest(e.to_string()) }
}

const INTERNAL: &str = "Internal server error";

fn order_status(e: &OrderError) -> StatusCode {
    match e {
        OrderError::InvalidOrder(_) => StatusCode::BAD_REQUEST,
        OrderError::InvalidTransition { .. } => StatusCode::CONFLICT,
        OrderError::Forbidden => StatusCode::FORBIDDEN,
    }
}

fn repository_status(e: &RepositoryError) -> StatusCode {
    match e {
        RepositoryError::Conflict(_) => StatusCode::CONFLICT,
        RepositoryError::Database(_) | RepositoryError::DataCorruption(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        let service = match self {
            Self::BadRequest(_) => return StatusCode::BAD_REQUEST,
            Self::Unauthorized => return StatusCode::UNAUTHORIZED,
            Self::Service(e) => e,
        };
        match service {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Forbidden => StatusCode::FORBIDDEN,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::Cart(e) => match e {
                CartError::OutOfStock(_) => StatusCode::CONFLICT,
                CartError::InvalidQuantity { .. } => StatusCode::BAD_REQUEST,
                CartError::LineNotFound(_) => StatusCode::NOT_FOUND,
            },
            ServiceError::Order(e) => order_status(e),
            ServiceError::Product(e) => match e {
                ProductError::Invalid(_) | ProductError::InvalidRating(_) => StatusCode::BAD_REQUEST,
                ProductError::AlreadyReviewed => StatusCode::CONFLICT,
            },
            ServiceError::Payment(e) => match e {
                PaymentError::Declined(_) => StatusCode::PAYMENT_REQUIRED,
                PaymentError::AmountMismatch { .. } | PaymentError::ForeignIntent(_) => StatusCode::CONFLICT,
                PaymentError::ProcessorUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                PaymentError::ProcessorRejected(_) => StatusCode::BAD_GATEWAY,
                PaymentError::CardRequired => StatusCode::BAD_REQUEST,
                PaymentError::Order(e) => order_status(e),
                PaymentError::Repository(e) => repository_status(e),
            },
            ServiceError::Repository(e) => repository_status(e),
        }
    }

    fn message(&self, status: StatusCode) -> String {
        match self {
            _ if status == StatusCode::INTERNAL_SERVER_ERROR => INTERNAL.to_string(),
            Self::Service(ServiceError::Payment(PaymentError::ProcessorRejected(_))) => {
                "Payment processor error".to_string()
            }
            Self::Service(ServiceError::Payment(PaymentError::AmountMismatch { .. })) => {
                "Confirmed payment does not match the order total".to_string()
            }
            Self::Service(ServiceError::Payment(PaymentError::ProcessorUnavailable(_))) => {
                "Payment processor unavailable, try again".to_string()
            }
            Self::Service(ServiceError::Repository(RepositoryError::Conflict(_))) => {
                "Resource was modified concurrently, retry".to_string()
            }
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, %status, "Request error");
        }
        let message = self.message(status);
        (status, Json(serde_json::json!({ "message": message }))).into_response()
    }
}
