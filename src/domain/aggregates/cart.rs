//! Cart Aggregate
//!
//! A principal's candidate purchase before an order exists. Totals are
//! re-priced on every mutation so they can never drift from the lines.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::domain::aggregates::product::CatalogProduct;
use crate::domain::pricing::{price_lines, CartTotals, PricingPolicy};
use crate::domain::value_objects::{PrincipalId, ProductId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub unit_price: Decimal,
    pub quantity: u32,
    pub display_name: String,
    pub image_ref: String,
    /// Catalog stock seen when the line was last refreshed; bounds `quantity`.
    pub available_stock: u32,
}

impl CartLine {
    pub fn line_total(&self) -> Decimal { self.unit_price * Decimal::from(self.quantity) }

    fn refresh(&mut self, product: &CatalogProduct) {
        self.unit_price = product.unit_price;
        self.display_name.clone_from(&product.display_name);
        self.image_ref.clone_from(&product.image_ref);
        self.available_stock = product.available_stock;
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Cart {
    owner: PrincipalId,
    lines: Vec<CartLine>,
    totals: CartTotals,
    #[serde(skip)]
    policy: PricingPolicy,
    updated_at: DateTime<Utc>,
}

/// Copied-by-value view of a cart at one instant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CartSnapshot {
    pub lines: Vec<CartLine>,
    pub totals: CartTotals,
}

impl Cart {
    pub fn new(owner: PrincipalId, policy: PricingPolicy) -> Self {
        Self { owner, lines: vec![], totals: CartTotals::zero(), policy, updated_at: Utc::now() }
    }

    pub fn owner(&self) -> PrincipalId { self.owner }
    pub fn lines(&self) -> &[CartLine] { &self.lines }
    pub fn totals(&self) -> &CartTotals { &self.totals }
    pub fn is_empty(&self) -> bool { self.lines.is_empty() }

    pub fn snapshot(&self) -> CartSnapshot {
        CartSnapshot { lines: self.lines.clone(), totals: self.totals }
    }

    /// Adds `requested` units of `product`, merging with an existing line and
    /// clamping the resulting quantity to the product's stock.
    pub fn add_line(&mut self, product: &CatalogProduct, requested: u32) -> Result<(), CartError> {
        if product.available_stock == 0 {
            return Err(CartError::OutOfStock(product.id));
        }
        if requested == 0 {
            return Err(CartError::InvalidQuantity { requested, available: product.available_stock });
        }

        if let Some(existing) = self.lines.iter_mut().find(|l| l.product_id == product.id) {
            existing.quantity = existing.quantity.saturating_add(requested).min(product.available_stock);
            existing.refresh(product);
        } else {
            self.lines.push(CartLine {
                product_id: product.id,
                unit_price: product.unit_price,
                quantity: requested.min(product.available_stock),
                display_name: product.display_name.clone(),
                image_ref: product.image_ref.clone(),
                available_stock: product.available_stock,
            });
        }
        self.recalculate();
        Ok(())
    }

    /// Copies the product's current price, name and stock onto its line, if
    /// the cart has one.
    pub fn refresh_line(&mut self, product: &CatalogProduct) {
        if let Some(line) = self.lines.iter_mut().find(|l| l.product_id == product.id) {
            line.refresh(product);
            self.recalculate();
        }
    }

    /// Sets a line's quantity; must lie within `1..=available_stock`.
    pub fn set_quantity(&mut self, product_id: ProductId, quantity: u32) -> Result<(), CartError> {
        let line = self
            .lines
            .iter_mut()
            .find(|l| l.product_id == product_id)
            .ok_or(CartError::LineNotFound(product_id))?;
        if quantity < 1 || quantity > line.available_stock {
            return Err(CartError::InvalidQuantity { requested: quantity, available: line.available_stock });
        }
        line.quantity = quantity;
        self.recalculate();
        Ok(())
    }

    /// Removes the product's line. Absent lines are ignored.
    pub fn remove_line(&mut self, product_id: ProductId) {
        let before = self.lines.len();
        self.lines.retain(|l| l.product_id != product_id);
        if self.lines.len() != before {
            self.recalculate();
        }
    }

    pub fn clear(&mut self) { self.lines.clear(); self.recalculate(); }

    /// Puts back lines from an earlier copy of this cart. Products that were
    /// added again in the meantime keep their newer line.
    fn absorb(&mut self, lines: Vec<CartLine>) {
        for line in lines {
            if !self.lines.iter().any(|l| l.product_id == line.product_id) {
                self.lines.push(line);
            }
        }
        self.recalculate();
    }

    fn recalculate(&mut self) {
        self.totals = price_lines(&self.lines, &self.policy);
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    #[error("product {0} is out of stock")]
    OutOfStock(ProductId),
    #[error("quantity {requested} is invalid; between 1 and {available} available")]
    InvalidQuantity { requested: u32, available: u32 },
    #[error("product {0} is not in the cart")]
    LineNotFound(ProductId),
}

/// Carts keyed explicitly by principal.
#[derive(Debug)]
pub struct CartSessions {
    policy: PricingPolicy,
    carts: Mutex<HashMap<PrincipalId, Cart>>,
}

impl CartSessions {
    pub fn new(policy: PricingPolicy) -> Self {
        Self { policy, carts: Mutex::new(HashMap::new()) }
    }

    pub fn policy(&self) -> &PricingPolicy { &self.policy }

    /// Current state of the principal's cart; an unknown principal has an empty cart.
    pub async fn get(&self, owner: PrincipalId) -> Cart {
        let carts = self.carts.lock().await;
        carts.get(&owner).cloned().unwrap_or_else(|| Cart::new(owner, self.policy))
    }

    /// Runs `f` against the principal's cart and returns the resulting cart.
    ///
    /// When `f` fails the stored cart is left exactly as it was.
    pub async fn update<F>(&self, owner: PrincipalId, f: F) -> Result<Cart, CartError>
    where
        F: FnOnce(&mut Cart) -> Result<(), CartError>,
    {
        let mut carts = self.carts.lock().await;
        let mut draft = carts.get(&owner).cloned().unwrap_or_else(|| Cart::new(owner, self.policy));
        f(&mut draft)?;
        carts.insert(owner, draft.clone());
        Ok(draft)
    }

    /// Empties the principal's cart.
    pub async fn clear(&self, owner: PrincipalId) {
        self.carts.lock().await.remove(&owner);
    }

    /// Removes the principal's cart and hands it to the caller, so that only
    /// one checkout can ever see its lines.
    pub async fn take(&self, owner: PrincipalId) -> Cart {
        self.carts
            .lock()
            .await
            .remove(&owner)
            .unwrap_or_else(|| Cart::new(owner, self.policy))
    }

    /// Returns a cart obtained from [`take`](Self::take) after a failed
    /// checkout, merging it with anything added since.
    pub async fn restore(&self, cart: Cart) {
        if cart.is_empty() {
            return;
        }
        let mut carts = self.carts.lock().await;
        match carts.entry(cart.owner) {
            Entry::Occupied(mut current) => current.get_mut().absorb(cart.lines),
            Entry::Vacant(slot) => {
                slot.insert(cart);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(stock: u32) -> CatalogProduct {
        CatalogProduct {
            id: ProductId::generate(),
            unit_price: Decimal::new(1999, 2),
            available_stock: stock,
            display_name: "Blue Train".into(),
            image_ref: "/img/blue-train.jpg".into(),
        }
    }

    fn cart() -> Cart { Cart::new(PrincipalId::generate(), PricingPolicy::default()) }

    #[test]
    fn test_cart_operations() {
        let mut cart = cart();
        let p = product(5);
        cart.add_line(&p, 2).unwrap();
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.totals().items_total, Decimal::new(3998, 2));
        assert_eq!(cart.totals().grand_total, Decimal::new(4818, 2));
        cart.add_line(&p, 1).unwrap();
        assert_eq!(cart.lines()[0].quantity, 3); // Merged
    }

    #[test]
    fn test_add_clamps_to_stock() {
        let mut cart = cart();
        let p = product(3);
        cart.add_line(&p, 10).unwrap();
        assert_eq!(cart.lines()[0].quantity, 3);
        cart.add_line(&p, 1).unwrap();
        assert_eq!(cart.lines()[0].quantity, 3);
    }

    #[test]
    fn test_out_of_stock_leaves_cart_unchanged() {
        let mut cart = cart();
        cart.add_line(&product(2), 1).unwrap();
        let before = cart.snapshot();
        let sold_out = product(0);
        assert_eq!(cart.add_line(&sold_out, 1), Err(CartError::OutOfStock(sold_out.id)));
        assert_eq!(cart.snapshot(), before);
    }

    #[test]
    fn test_set_quantity_bounds() {
        let mut cart = cart();
        let p = product(4);
        cart.add_line(&p, 2).unwrap();
        assert!(matches!(cart.set_quantity(p.id, 0), Err(CartError::InvalidQuantity { .. })));
        assert!(matches!(cart.set_quantity(p.id, 5), Err(CartError::InvalidQuantity { .. })));
        cart.set_quantity(p.id, 1).unwrap();
        assert_eq!(cart.totals().items_total, Decimal::new(1999, 2));
        cart.set_quantity(p.id, 4).unwrap();
        assert_eq!(cart.lines()[0].quantity, 4);
        assert!(cart.totals().is_consistent());
    }

    #[test]
    fn test_remove_and_clear() {
        let mut cart = cart();
        let p = product(4);
        cart.add_line(&p, 2).unwrap();
        cart.remove_line(ProductId::generate());
        assert_eq!(cart.lines().len(), 1);
        cart.remove_line(p.id);
        assert!(cart.is_empty());
        cart.add_line(&p, 1).unwrap();
        cart.clear();
        assert_eq!(*cart.totals(), CartTotals::zero());
    }

    #[tokio::test]
    async fn test_sessions_are_per_principal() {
        let sessions = CartSessions::new(PricingPolicy::default());
        let (alice, bob) = (PrincipalId::generate(), PrincipalId::generate());
        let p = product(3);
        sessions.update(alice, |c| c.add_line(&p, 1)).await.unwrap();
        assert_eq!(sessions.get(alice).await.lines().len(), 1);
        assert!(sessions.get(bob).await.is_empty());

        let err = sessions.update(alice, |c| c.set_quantity(p.id, 9)).await;
        assert!(err.is_err());
        assert_eq!(sessions.get(alice).await.lines()[0].quantity, 1);

        sessions.clear(alice).await;
        assert!(sessions.get(alice).await.is_empty());
    }

    #[tokio::test]
    async fn test_take_empties_and_restore_merges() {
        let sessions = CartSessions::new(PricingPolicy::default());
        let owner = PrincipalId::generate();
        let (first, second) = (product(3), product(3));
        sessions.update(owner, |c| c.add_line(&first, 2)).await.unwrap();

        let taken = sessions.take(owner).await;
        assert_eq!(taken.lines().len(), 1);
        assert!(sessions.take(owner).await.is_empty());

        // Added while the taken cart was out; both lines survive the restore.
        sessions.update(owner, |c| c.add_line(&second, 1)).await.unwrap();
        sessions.restore(taken).await;
        let cart = sessions.get(owner).await;
        assert_eq!(cart.lines().len(), 2);
        assert_eq!(cart.totals().items_total, Decimal::new(5997, 2));
    }

    #[test]
    fn test_refresh_line_moves_stock_bound() {
        let mut cart = cart();
        let mut p = product(2);
        cart.add_line(&p, 1).unwrap();
        p.available_stock = 5;
        p.unit_price = Decimal::new(1500, 2);
        cart.refresh_line(&p);
        cart.set_quantity(p.id, 4).unwrap();
        assert_eq!(cart.totals().items_total, Decimal::new(6000, 2));
    }
}
