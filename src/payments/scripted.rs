//! A deterministic in-process processor, for tests and local runs without a
//! processor account.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{Confirmation, PaymentIntent, PaymentProcessor, ProcessorError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Behavior {
    Approve,
    Decline(String),
    Unavailable,
    /// Never answers a confirmation.
    Hang,
    /// Approves, but reports a different authorized amount.
    ApproveAmount(i64),
}

#[derive(Debug)]
pub struct ScriptedProcessor {
    behavior: Mutex<Behavior>,
    /// Intent id to amount, currency and order reference.
    intents: Mutex<HashMap<String, (i64, String, String)>>,
    confirmations: AtomicUsize,
}

impl ScriptedProcessor {
    pub fn new(behavior: Behavior) -> Self {
        Self { behavior: Mutex::new(behavior), intents: Mutex::default(), confirmations: AtomicUsize::new(0) }
    }

    pub fn approving() -> Self { Self::new(Behavior::Approve) }

    pub async fn set_behavior(&self, behavior: Behavior) {
        *self.behavior.lock().await = behavior;
    }

    /// Number of confirmations that reached the processor.
    pub fn confirmations(&self) -> usize { self.confirmations.load(Ordering::SeqCst) }
}

#[async_trait]
impl PaymentProcessor for ScriptedProcessor {
    async fn create_intent(&self, amount_minor: i64, currency: &str, reference: &str) -> Result<PaymentIntent, ProcessorError> {
        if *self.behavior.lock().await == Behavior::Unavailable {
            return Err(ProcessorError::Unavailable("scripted outage".into()));
        }
        let intent_id = format!("pi_{reference}");
        self.intents.lock().await.insert(intent_id.clone(), (amount_minor, currency.to_string(), reference.to_string()));
        Ok(PaymentIntent {
            client_secret: format!("{intent_id}_secret"),
            intent_id,
            amount_minor,
            currency: currency.to_string(),
        })
    }

    async fn confirm(&self, intent_id: &str, _payment_method: &str) -> Result<Confirmation, ProcessorError> {
        self.confirmations.fetch_add(1, Ordering::SeqCst);
        let behavior = self.behavior.lock().await.clone();
        let Some((amount_minor, currency, reference)) = self.intents.lock().await.get(intent_id).cloned() else {
            return Err(ProcessorError::Rejected(format!("no such payment intent: {intent_id}")));
        };
        let approved = |amount_minor| Confirmation {
            intent_id: intent_id.to_string(),
            approved: true,
            decline_reason: None,
            amount_minor,
            currency: currency.clone(),
            status: "succeeded".into(),
            reference: Some(reference.clone()),
        };

        match behavior {
            Behavior::Approve => Ok(approved(amount_minor)),
            Behavior::ApproveAmount(other) => Ok(approved(other)),
            Behavior::Decline(reason) => Ok(Confirmation {
                intent_id: intent_id.to_string(),
                approved: false,
                decline_reason: Some(reason),
                amount_minor,
                currency: currency.clone(),
                status: "requires_payment_method".into(),
                reference: Some(reference.clone()),
            }),
            Behavior::Unavailable => Err(ProcessorError::Unavailable("scripted outage".into())),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(ProcessorError::Unavailable("scripted hang".into()))
            }
        }
    }
}
