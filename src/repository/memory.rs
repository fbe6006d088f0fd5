//! In-process repositories. Each write takes the store's write lock, so the
//! status check and the update happen as one step.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{
    OrderRepository, PageRequest, ProductPage, ProductRepository, RepositoryError, ReviewInsert,
};
use crate::domain::aggregates::{Order, Product, ProductFilter, Review, StatusChange};
use crate::domain::value_objects::{OrderId, PrincipalId, ProductId};

#[derive(Debug, Default)]
pub struct InMemoryOrderRepository {
    orders: RwLock<HashMap<OrderId, Order>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self { Self::default() }
}

fn newest_first(mut orders: Vec<Order>) -> Vec<Order> {
    orders.sort_by(|a, b| b.created_at().cmp(&a.created_at()).then_with(|| b.id().cmp(&a.id())));
    orders
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn insert(&self, order: &Order) -> Result<OrderId, RepositoryError> {
        self.orders.write().await.insert(order.id(), order.clone());
        Ok(order.id())
    }

    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn find_by_owner(&self, owner: PrincipalId) -> Result<Vec<Order>, RepositoryError> {
        let orders = self.orders.read().await;
        Ok(newest_first(orders.values().filter(|o| o.owner_id() == owner).cloned().collect()))
    }

    async fn find_all(&self) -> Result<Vec<Order>, RepositoryError> {
        Ok(newest_first(self.orders.read().await.values().cloned().collect()))
    }

    async fn apply_transition(&self, id: OrderId, change: &StatusChange) -> Result<bool, RepositoryError> {
        let mut orders = self.orders.write().await;
        Ok(orders.get_mut(&id).is_some_and(|order| order.apply(change)))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryProductRepository {
    products: RwLock<HashMap<ProductId, Product>>,
}

impl InMemoryProductRepository {
    pub fn new() -> Self { Self::default() }
}

#[async_trait]
impl ProductRepository for InMemoryProductRepository {
    async fn list(&self, filter: &ProductFilter, page: PageRequest) -> Result<ProductPage, RepositoryError> {
        let products = self.products.read().await;
        let mut matching: Vec<Product> = products.values().filter(|p| filter.matches(p)).cloned().collect();
        matching.sort_by(|a, b| b.created_at().cmp(&a.created_at()).then_with(|| b.id().cmp(&a.id())));
        let total = matching.len() as u64;
        let skip = usize::try_from(page.offset()).unwrap_or(usize::MAX);
        let items = matching.into_iter().skip(skip).take(page.size as usize).collect();
        Ok(ProductPage::new(items, page, total))
    }

    async fn find_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        Ok(self.products.read().await.get(&id).cloned())
    }

    async fn insert(&self, product: &Product) -> Result<(), RepositoryError> {
        self.products.write().await.insert(product.id(), product.clone());
        Ok(())
    }

    async fn update(&self, product: &Product, expected_version: i32) -> Result<bool, RepositoryError> {
        let mut products = self.products.write().await;
        match products.get_mut(&product.id()) {
            Some(stored) if stored.version() == expected_version => {
                *stored = product.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, id: ProductId) -> Result<bool, RepositoryError> {
        Ok(self.products.write().await.remove(&id).is_some())
    }

    async fn add_review(&self, product: &Product, review: &Review) -> Result<ReviewInsert, RepositoryError> {
        let mut products = self.products.write().await;
        let Some(stored) = products.get_mut(&product.id()) else {
            return Err(RepositoryError::DataCorruption(format!("product {} vanished", product.id())));
        };
        if stored.has_review_from(review.author_id) {
            return Ok(ReviewInsert::Duplicate);
        }
        if stored.version() != product.version() - 1 {
            return Err(RepositoryError::Conflict(format!("product {}", product.id())));
        }
        *stored = product.clone();
        Ok(ReviewInsert::Added)
    }
}
