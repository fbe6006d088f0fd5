//! Cart operations resolved against the live catalog.

use std::sync::Arc;

use super::{ServiceError, ServiceResult};
use crate::domain::aggregates::{Cart, CartSessions};
use crate::domain::value_objects::{PrincipalId, ProductId};
use crate::repository::ProductRepository;

#[derive(Clone)]
pub struct CartService {
    carts: Arc<CartSessions>,
    products: Arc<dyn ProductRepository>,
}

impl CartService {
    pub fn new(carts: Arc<CartSessions>, products: Arc<dyn ProductRepository>) -> Self {
        Self { carts, products }
    }

    pub async fn view(&self, owner: PrincipalId) -> Cart {
        self.carts.get(owner).await
    }

    pub async fn add_item(&self, owner: PrincipalId, product_id: ProductId, quantity: u32) -> ServiceResult<Cart> {
        let product = self.products.find_by_id(product_id).await?.ok_or(ServiceError::NotFound("product"))?;
        let entry = product.catalog_entry();
        Ok(self.carts.update(owner, |cart| cart.add_line(&entry, quantity)).await?)
    }

    /// Sets a line's quantity, bounded by the product's stock right now.
    pub async fn set_quantity(&self, owner: PrincipalId, product_id: ProductId, quantity: u32) -> ServiceResult<Cart> {
        let product = self.products.find_by_id(product_id).await?.ok_or(ServiceError::NotFound("product"))?;
        let entry = product.catalog_entry();
        let cart = self
            .carts
            .update(owner, |cart| {
                cart.refresh_line(&entry);
                cart.set_quantity(product_id, quantity)
            })
            .await?;
        Ok(cart)
    }

    pub async fn remove_item(&self, owner: PrincipalId, product_id: ProductId) -> ServiceResult<Cart> {
        let cart = self
            .carts
            .update(owner, |cart| {
                cart.remove_line(product_id);
                Ok(())
            })
            .await?;
        Ok(cart)
    }

    pub async fn clear(&self, owner: PrincipalId) {
        self.carts.clear(owner).await;
    }
}
