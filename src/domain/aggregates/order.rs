//! Order Aggregate
//!
//! An order is built once from a cart snapshot and is immutable afterwards,
//! except for its lifecycle fields. Lifecycle methods never mutate the order
//! in place: they return the [`StatusChange`] to apply, or `None` when the
//! transition has already happened. The repository applies the change as a
//! conditional write on the expected pre-state, so duplicate payment
//! callbacks and concurrent admins cannot double-apply a transition.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::aggregates::cart::{CartLine, CartSnapshot};
use crate::domain::events::OrderEvent;
use crate::domain::pricing::CartTotals;
use crate::domain::value_objects::{OrderId, PaymentSelection, Principal, PrincipalId, ShippingAddress};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Created,
    AwaitingPayment,
    Paid,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::AwaitingPayment => "awaiting_payment",
            Self::Paid => "paid",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    /// Position along the happy path; `Cancelled` sits outside it.
    const fn rank(self) -> Option<u8> {
        match self {
            Self::Created => Some(0),
            Self::AwaitingPayment => Some(1),
            Self::Paid => Some(2),
            Self::Shipped => Some(3),
            Self::Delivered => Some(4),
            Self::Cancelled => None,
        }
    }

    /// True when `self` is `target` or lies past it on the happy path.
    fn has_reached(self, target: Self) -> bool {
        match (self.rank(), target.rank()) {
            (Some(a), Some(b)) => a >= b,
            _ => self == target,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub status: OrderStatus,
    pub at: DateTime<Utc>,
}

/// What the processor reported when it captured the payment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentResult {
    pub intent_id: String,
    pub amount: Decimal,
    pub processor_status: String,
}

/// A single lifecycle step, applied only if the order is still in `from`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub at: DateTime<Utc>,
    pub payment_result: Option<PaymentResult>,
}

impl StatusChange {
    fn new(from: OrderStatus, to: OrderStatus, at: DateTime<Utc>) -> Self {
        Self { from, to, at, payment_result: None }
    }

    pub fn event(&self, order_id: OrderId) -> OrderEvent {
        match self.to {
            OrderStatus::Paid => OrderEvent::Paid {
                order_id,
                amount: self.payment_result.as_ref().map(|p| p.amount).unwrap_or_default(),
            },
            OrderStatus::Shipped => OrderEvent::Shipped { order_id },
            OrderStatus::Delivered => OrderEvent::Delivered { order_id },
            OrderStatus::Cancelled => OrderEvent::Cancelled { order_id },
            OrderStatus::Created | OrderStatus::AwaitingPayment => OrderEvent::AwaitingPayment { order_id },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    owner_id: PrincipalId,
    lines: Vec<CartLine>,
    shipping_address: ShippingAddress,
    payment: PaymentSelection,
    totals: CartTotals,
    status: OrderStatus,
    is_paid: bool,
    paid_at: Option<DateTime<Utc>>,
    is_delivered: bool,
    delivered_at: Option<DateTime<Utc>>,
    payment_result: Option<PaymentResult>,
    history: Vec<StatusRecord>,
    version: i32,
    created_at: DateTime<Utc>,
}

impl Order {
    /// Builds an order from a cart snapshot and moves it straight to
    /// `AwaitingPayment`.
    pub fn place(
        owner_id: PrincipalId,
        cart: CartSnapshot,
        shipping_address: &ShippingAddress,
        payment: PaymentSelection,
        now: DateTime<Utc>,
    ) -> Result<Self, OrderError> {
        if cart.lines.is_empty() {
            return Err(OrderError::InvalidOrder("order has no lines".into()));
        }
        if let Some(line) = cart.lines.iter().find(|l| l.quantity == 0) {
            return Err(OrderError::InvalidOrder(format!("line for {} has zero quantity", line.product_id)));
        }
        let shipping_address = shipping_address
            .normalized()
            .map_err(|e| OrderError::InvalidOrder(e.to_string()))?;
        if payment.is_blank() {
            return Err(OrderError::InvalidOrder("payment method reference is empty".into()));
        }
        if !cart.totals.is_consistent() {
            return Err(OrderError::InvalidOrder("cart totals are inconsistent".into()));
        }

        Ok(Self {
            id: OrderId::generate(),
            owner_id,
            lines: cart.lines,
            shipping_address,
            payment,
            totals: cart.totals,
            status: OrderStatus::AwaitingPayment,
            is_paid: false,
            paid_at: None,
            is_delivered: false,
            delivered_at: None,
            payment_result: None,
            history: vec![
                StatusRecord { status: OrderStatus::Created, at: now },
                StatusRecord { status: OrderStatus::AwaitingPayment, at: now },
            ],
            version: 1,
            created_at: now,
        })
    }

    pub fn id(&self) -> OrderId { self.id }
    pub fn owner_id(&self) -> PrincipalId { self.owner_id }
    pub fn lines(&self) -> &[CartLine] { &self.lines }
    pub fn shipping_address(&self) -> &ShippingAddress { &self.shipping_address }
    pub fn payment(&self) -> &PaymentSelection { &self.payment }
    pub fn totals(&self) -> &CartTotals { &self.totals }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn is_paid(&self) -> bool { self.is_paid }
    pub fn paid_at(&self) -> Option<DateTime<Utc>> { self.paid_at }
    pub fn is_delivered(&self) -> bool { self.is_delivered }
    pub fn delivered_at(&self) -> Option<DateTime<Utc>> { self.delivered_at }
    pub fn payment_result(&self) -> Option<&PaymentResult> { self.payment_result.as_ref() }
    pub fn history(&self) -> &[StatusRecord] { &self.history }
    pub fn version(&self) -> i32 { self.version }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }

    /// Owners see their own orders; admins see every order.
    pub fn is_visible_to(&self, principal: &Principal) -> bool {
        principal.is_admin || principal.id == self.owner_id
    }

    /// `AwaitingPayment -> Paid`, driven by the payment confirmation flow.
    pub fn paid_transition(&self, result: PaymentResult, at: DateTime<Utc>) -> Result<Option<StatusChange>, OrderError> {
        let mut change = self.step(OrderStatus::AwaitingPayment, OrderStatus::Paid, at)?;
        if let Some(change) = change.as_mut() {
            change.payment_result = Some(result);
        }
        Ok(change)
    }

    pub fn shipped_transition(&self, actor: &Principal, at: DateTime<Utc>) -> Result<Option<StatusChange>, OrderError> {
        require_admin(actor)?;
        self.step(OrderStatus::Paid, OrderStatus::Shipped, at)
    }

    pub fn delivered_transition(&self, actor: &Principal, at: DateTime<Utc>) -> Result<Option<StatusChange>, OrderError> {
        require_admin(actor)?;
        self.step(OrderStatus::Shipped, OrderStatus::Delivered, at)
    }

    /// Abandons an unpaid order. Captured funds need a refund flow instead.
    pub fn cancel_transition(&self, actor: &Principal, at: DateTime<Utc>) -> Result<Option<StatusChange>, OrderError> {
        if !self.is_visible_to(actor) {
            return Err(OrderError::Forbidden);
        }
        match self.status {
            OrderStatus::Cancelled => Ok(None),
            from @ (OrderStatus::Created | OrderStatus::AwaitingPayment) => {
                Ok(Some(StatusChange::new(from, OrderStatus::Cancelled, at)))
            }
            from => Err(OrderError::InvalidTransition { from, to: OrderStatus::Cancelled }),
        }
    }

    fn step(&self, from: OrderStatus, to: OrderStatus, at: DateTime<Utc>) -> Result<Option<StatusChange>, OrderError> {
        if self.status == from {
            Ok(Some(StatusChange::new(from, to, at)))
        } else if self.status.has_reached(to) {
            Ok(None)
        } else {
            Err(OrderError::InvalidTransition { from: self.status, to })
        }
    }

    /// Applies a change planned by one of the transition methods.
    ///
    /// Returns `false`, leaving the order untouched, if the order is no longer
    /// in the change's pre-state.
    pub fn apply(&mut self, change: &StatusChange) -> bool {
        if self.status != change.from {
            return false;
        }
        self.status = change.to;
        match change.to {
            OrderStatus::Paid => {
                self.is_paid = true;
                self.paid_at = Some(change.at);
                self.payment_result.clone_from(&change.payment_result);
            }
            OrderStatus::Delivered => {
                self.is_delivered = true;
                self.delivered_at = Some(change.at);
            }
            _ => {}
        }
        self.history.push(StatusRecord { status: change.to, at: change.at });
        self.version += 1;
        true
    }
}

fn require_admin(actor: &Principal) -> Result<(), OrderError> {
    if actor.is_admin { Ok(()) } else { Err(OrderError::Forbidden) }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("invalid order: {0}")]
    InvalidOrder(String),
    #[error("cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    #[error("not allowed to change this order")]
    Forbidden,
}
