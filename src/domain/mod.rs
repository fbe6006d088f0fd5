//! Storefront domain: pricing, cart, orders and catalog.
pub mod aggregates;
pub mod events;
pub mod pricing;
pub mod value_objects;
