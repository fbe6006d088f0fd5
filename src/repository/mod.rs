//! Persistence boundary for orders and products.
//!
//! Two implementations share these traits: [`postgres`] for deployments and
//! [`memory`] for tests and local runs. Both apply order transitions as a
//! single conditional write keyed on the order's current status, which is
//! what makes duplicate payment callbacks harmless.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::aggregates::{Order, Product, ProductFilter, Review, StatusChange};
use crate::domain::value_objects::{OrderId, PrincipalId, ProductId};

pub use memory::{InMemoryOrderRepository, InMemoryProductRepository};
pub use postgres::{PgOrderRepository, PgProductRepository};

/// Products per catalog page.
pub const PAGE_SIZE: u32 = 12;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt record: {0}")]
    DataCorruption(String),
    #[error("{0} was modified concurrently")]
    Conflict(String),
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn insert(&self, order: &Order) -> Result<OrderId, RepositoryError>;

    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    /// Newest first.
    async fn find_by_owner(&self, owner: PrincipalId) -> Result<Vec<Order>, RepositoryError>;

    /// Newest first.
    async fn find_all(&self) -> Result<Vec<Order>, RepositoryError>;

    /// Applies `change` only if the stored order is still in `change.from`.
    ///
    /// Returns `false` when the order had already moved on (a lost race or a
    /// duplicate callback) or does not exist; callers treat that as
    /// already-applied.
    async fn apply_transition(&self, id: OrderId, change: &StatusChange) -> Result<bool, RepositoryError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRequest {
    /// 1-based.
    pub number: u32,
    pub size: u32,
}

impl PageRequest {
    pub fn new(number: Option<u32>) -> Self {
        Self { number: number.unwrap_or(1).max(1), size: PAGE_SIZE }
    }

    pub fn offset(&self) -> u64 { u64::from(self.number - 1) * u64::from(self.size) }
}

#[derive(Clone, Debug, serde::Serialize)]
pub struct ProductPage {
    pub products: Vec<Product>,
    pub page: u32,
    pub pages: u64,
    pub total: u64,
}

impl ProductPage {
    pub fn new(products: Vec<Product>, page: PageRequest, total: u64) -> Self {
        Self { products, page: page.number, pages: total.div_ceil(u64::from(page.size)), total }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReviewInsert {
    Added,
    /// The author already has a review on this product.
    Duplicate,
}

#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// Matching products, newest first.
    async fn list(&self, filter: &ProductFilter, page: PageRequest) -> Result<ProductPage, RepositoryError>;

    async fn find_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError>;

    async fn insert(&self, product: &Product) -> Result<(), RepositoryError>;

    /// Replaces the stored product if its version is still `expected_version`.
    async fn update(&self, product: &Product, expected_version: i32) -> Result<bool, RepositoryError>;

    async fn delete(&self, id: ProductId) -> Result<bool, RepositoryError>;

    /// Stores `product` (which already contains `review`) while enforcing one
    /// review per author and product at the storage layer.
    async fn add_review(&self, product: &Product, review: &Review) -> Result<ReviewInsert, RepositoryError>;
}
