//! Card payments.
//!
//! [`PaymentProcessor`] is the capability the storefront needs from a card
//! processor; [`stripe::StripeProcessor`] implements it over HTTP.
//! [`flow::PaymentConfirmationFlow`] reconciles processor results into the
//! order lifecycle.

pub mod flow;
pub mod scripted;
pub mod stripe;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

pub use flow::{PaymentConfirmationFlow, PaymentError, PaymentReceipt};
pub use scripted::ScriptedProcessor;
pub use stripe::StripeProcessor;

/// Processor-side pre-authorization for a pending charge.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PaymentIntent {
    pub intent_id: String,
    /// Handed to the buyer's client to confirm the card with the processor.
    pub client_secret: String,
    pub amount_minor: i64,
    pub currency: String,
}

/// The processor's answer to a confirmation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Confirmation {
    pub intent_id: String,
    pub approved: bool,
    pub decline_reason: Option<String>,
    /// Amount the processor authorized, in minor units.
    pub amount_minor: i64,
    pub currency: String,
    pub status: String,
    /// Order reference the intent was created for, when the processor reports it.
    pub reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessorError {
    /// Transport failure, timeout or processor outage.
    #[error("payment processor unavailable: {0}")]
    Unavailable(String),
    /// The processor refused the request itself (not a card decline).
    #[error("payment processor rejected the request: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Creates an intent for `amount_minor`. `reference` identifies the order
    /// and makes repeated requests for the same order idempotent.
    async fn create_intent(&self, amount_minor: i64, currency: &str, reference: &str) -> Result<PaymentIntent, ProcessorError>;

    async fn confirm(&self, intent_id: &str, payment_method: &str) -> Result<Confirmation, ProcessorError>;
}
