//! Vinyl Store
//!
//! Storefront core for records, CDs and cassettes.
//!
//! ## Features
//! - Catalog with filtering, paging and one-per-customer reviews
//! - Per-customer carts priced on every change
//! - Orders placed from the cart with an explicit status lifecycle
//! - Card payment capture that cannot double-charge or double-apply
//! - Domain events on NATS

pub mod api;
pub mod config;
pub mod domain;
pub mod events;
pub mod payments;
pub mod repository;
pub mod services;

pub use config::{Config, ConfigError};
