//! Domain events
use crate::domain::value_objects::{OrderId, PrincipalId, ProductId};
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DomainEvent {
    Product(ProductEvent),
    Order(OrderEvent),
}

impl DomainEvent {
    /// Message subject the event is published on.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Product(ProductEvent::Created { .. }) => "products.created",
            Self::Product(ProductEvent::Updated { .. }) => "products.updated",
            Self::Product(ProductEvent::Deleted { .. }) => "products.deleted",
            Self::Product(ProductEvent::Reviewed { .. }) => "products.reviewed",
            Self::Order(OrderEvent::Placed { .. }) => "orders.placed",
            Self::Order(OrderEvent::AwaitingPayment { .. }) => "orders.awaiting_payment",
            Self::Order(OrderEvent::Paid { .. }) => "orders.paid",
            Self::Order(OrderEvent::Shipped { .. }) => "orders.shipped",
            Self::Order(OrderEvent::Delivered { .. }) => "orders.delivered",
            Self::Order(OrderEvent::Cancelled { .. }) => "orders.cancelled",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProductEvent {
    Created { product_id: ProductId },
    Updated { product_id: ProductId, version: i32 },
    Deleted { product_id: ProductId },
    Reviewed { product_id: ProductId, rating: u8 },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: OrderId, owner_id: PrincipalId, grand_total: Decimal },
    AwaitingPayment { order_id: OrderId },
    Paid { order_id: OrderId, amount: Decimal },
    Shipped { order_id: OrderId },
    Delivered { order_id: OrderId },
    Cancelled { order_id: OrderId },
}

impl From<OrderEvent> for DomainEvent {
    fn from(e: OrderEvent) -> Self { Self::Order(e) }
}

impl From<ProductEvent> for DomainEvent {
    fn from(e: ProductEvent) -> Self { Self::Product(e) }
}
