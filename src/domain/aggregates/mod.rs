//! Aggregates module
pub mod product;
pub mod order;
pub mod cart;

pub use product::{CatalogProduct, NewProduct, Product, ProductError, ProductFilter, ProductPatch, Review};
pub use order::{Order, OrderError, OrderStatus, PaymentResult, StatusChange};
pub use cart::{Cart, CartError, CartLine, CartSessions, CartSnapshot};
