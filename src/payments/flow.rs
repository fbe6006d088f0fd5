//! Payment confirmation flow.
//!
//! `AwaitingPayment` order → processor intent → buyer confirms the card →
//! the processor's answer is checked against the order total → the paid
//! transition is written conditionally. Any repeat of the last step (a
//! duplicate callback, a retried request) finds the order already paid and
//! returns it unchanged.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::instrument;

use super::{Confirmation, PaymentIntent, PaymentProcessor, ProcessorError};
use crate::domain::aggregates::{Order, OrderError, OrderStatus, PaymentResult};
use crate::domain::value_objects::{from_minor_units, to_minor_units, PaymentSelection};
use crate::repository::{OrderRepository, RepositoryError};

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("payment declined: {0}")]
    Declined(String),
    #[error("confirmed amount {confirmed} does not match order total {expected}")]
    AmountMismatch { expected: i64, confirmed: i64 },
    #[error("payment processor unavailable: {0}")]
    ProcessorUnavailable(String),
    #[error("payment processor rejected the request: {0}")]
    ProcessorRejected(String),
    #[error("order was not placed for card payment")]
    CardRequired,
    #[error("payment intent {0} does not belong to this order")]
    ForeignIntent(String),
    #[error(transparent)]
    Order(#[from] OrderError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<ProcessorError> for PaymentError {
    fn from(e: ProcessorError) -> Self {
        match e {
            ProcessorError::Unavailable(msg) => Self::ProcessorUnavailable(msg),
            ProcessorError::Rejected(msg) => Self::ProcessorRejected(msg),
        }
    }
}

/// Result of a successful confirmation.
#[derive(Clone, Debug)]
pub struct PaymentReceipt {
    pub order: Order,
    /// False when the order was already paid before this confirmation.
    pub newly_paid: bool,
}

pub struct PaymentConfirmationFlow {
    processor: Arc<dyn PaymentProcessor>,
    orders: Arc<dyn OrderRepository>,
    currency: String,
    timeout: Duration,
}

impl PaymentConfirmationFlow {
    pub fn new(
        processor: Arc<dyn PaymentProcessor>,
        orders: Arc<dyn OrderRepository>,
        currency: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self { processor, orders, currency: currency.into().to_lowercase(), timeout }
    }

    pub fn currency(&self) -> &str { &self.currency }

    /// Asks the processor for an intent covering the order's grand total.
    #[instrument(skip(self, order), fields(order_id = %order.id()))]
    pub async fn create_intent(&self, order: &Order) -> Result<PaymentIntent, PaymentError> {
        if order.status() != OrderStatus::AwaitingPayment {
            return Err(OrderError::InvalidTransition { from: order.status(), to: OrderStatus::Paid }.into());
        }
        card_token(order)?;
        let amount_minor = expected_minor(order)?;

        let reference = order.id().to_string();
        let intent = tokio::time::timeout(self.timeout, self.processor.create_intent(amount_minor, &self.currency, &reference))
            .await
            .map_err(|_| PaymentError::ProcessorUnavailable("timed out creating payment intent".into()))??;
        tracing::info!(intent_id = %intent.intent_id, amount_minor, "payment intent created");
        Ok(intent)
    }

    /// Confirms `intent_id` with the processor and marks the order paid.
    ///
    /// `payment_method` overrides the token the order was placed with. An
    /// order that is already paid is returned as-is without contacting the
    /// processor.
    #[instrument(skip(self, order, payment_method), fields(order_id = %order.id()))]
    pub async fn confirm(&self, order: &Order, intent_id: &str, payment_method: Option<&str>) -> Result<PaymentReceipt, PaymentError> {
        if order.is_paid() {
            return Ok(PaymentReceipt { order: order.clone(), newly_paid: false });
        }
        if order.status() != OrderStatus::AwaitingPayment {
            return Err(OrderError::InvalidTransition { from: order.status(), to: OrderStatus::Paid }.into());
        }
        let token = card_token(order)?;
        let method = payment_method.filter(|m| !m.trim().is_empty()).unwrap_or(token);
        let expected = expected_minor(order)?;

        let confirmation = tokio::time::timeout(self.timeout, self.processor.confirm(intent_id, method))
            .await
            .map_err(|_| {
                tracing::warn!(intent_id, "payment confirmation timed out");
                PaymentError::ProcessorUnavailable("timed out confirming payment".into())
            })??;
        check_intent(order, intent_id, &confirmation)?;

        if !confirmation.approved {
            let reason = confirmation.decline_reason.unwrap_or_else(|| "card declined".to_string());
            tracing::info!(intent_id, %reason, "payment declined");
            return Err(PaymentError::Declined(reason));
        }
        self.check_amount(&confirmation, expected)?;

        let result = PaymentResult {
            intent_id: confirmation.intent_id,
            amount: from_minor_units(confirmation.amount_minor),
            processor_status: confirmation.status,
        };
        let Some(change) = order.paid_transition(result, Utc::now())? else {
            return Ok(PaymentReceipt { order: order.clone(), newly_paid: false });
        };

        if self.orders.apply_transition(order.id(), &change).await? {
            let mut paid = order.clone();
            paid.apply(&change);
            tracing::info!(amount = %order.totals().grand_total, "order paid");
            return Ok(PaymentReceipt { order: paid, newly_paid: true });
        }

        // Lost the race; whoever won decides what the order looks like now.
        let current = self
            .orders
            .find_by_id(order.id())
            .await?
            .ok_or_else(|| RepositoryError::DataCorruption(format!("order {} vanished", order.id())))?;
        if current.is_paid() {
            return Ok(PaymentReceipt { order: current, newly_paid: false });
        }
        tracing::warn!(
            target: "payments::anomaly",
            order_id = %order.id(),
            intent_id = %change.payment_result.as_ref().map_or("", |p| p.intent_id.as_str()),
            status = %current.status(),
            "payment captured for an order that is no longer payable"
        );
        Err(OrderError::InvalidTransition { from: current.status(), to: OrderStatus::Paid }.into())
    }

    fn check_amount(&self, confirmation: &Confirmation, expected: i64) -> Result<(), PaymentError> {
        let currency_matches = confirmation.currency.is_empty() || confirmation.currency.eq_ignore_ascii_case(&self.currency);
        if confirmation.amount_minor == expected && currency_matches {
            return Ok(());
        }
        tracing::warn!(
            target: "payments::anomaly",
            intent_id = %confirmation.intent_id,
            expected,
            confirmed = confirmation.amount_minor,
            currency = %confirmation.currency,
            "confirmed payment does not match order total"
        );
        Err(PaymentError::AmountMismatch { expected, confirmed: confirmation.amount_minor })
    }
}

/// The processor must answer for the intent that was asked about, and that
/// intent must have been created for this order.
fn check_intent(order: &Order, intent_id: &str, confirmation: &Confirmation) -> Result<(), PaymentError> {
    let reference = order.id().to_string();
    let same_order = confirmation.reference.as_deref().map_or(true, |r| r == reference);
    if confirmation.intent_id == intent_id && same_order {
        return Ok(());
    }
    tracing::warn!(
        target: "payments::anomaly",
        intent_id,
        confirmed_intent = %confirmation.intent_id,
        reference = ?confirmation.reference,
        "confirmed intent does not belong to this order"
    );
    Err(PaymentError::ForeignIntent(intent_id.to_string()))
}

fn card_token(order: &Order) -> Result<&str, PaymentError> {
    match order.payment() {
        PaymentSelection::Card { processor_token } => Ok(processor_token),
        PaymentSelection::Alternate { .. } => Err(PaymentError::CardRequired),
    }
}

fn expected_minor(order: &Order) -> Result<i64, PaymentError> {
    to_minor_units(order.totals().grand_total)
        .ok_or_else(|| OrderError::InvalidOrder("grand total out of range".into()).into())
}
