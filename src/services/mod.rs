//! Application services: authorization, orchestration across aggregates and
//! repositories, and event publishing.

pub mod cart;
pub mod orders;
pub mod products;

use thiserror::Error;

use crate::domain::aggregates::{CartError, OrderError, ProductError};
use crate::domain::value_objects::Principal;
use crate::payments::PaymentError;
use crate::repository::RepositoryError;

pub use cart::CartService;
pub use orders::OrderService;
pub use products::{ProductService, ReviewInput};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("not allowed")]
    Forbidden,
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Cart(#[from] CartError),
    #[error(transparent)]
    Order(#[from] OrderError),
    #[error(transparent)]
    Product(#[from] ProductError),
    #[error(transparent)]
    Payment(#[from] PaymentError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

fn require_admin(actor: &Principal) -> ServiceResult<()> {
    if actor.is_admin { Ok(()) } else { Err(ServiceError::Forbidden) }
}
