//! Stripe `PaymentIntents` API client.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::{Confirmation, PaymentIntent, PaymentProcessor, ProcessorError};

pub const DEFAULT_API_BASE: &str = "https://api.stripe.com";

pub struct StripeProcessor {
    client: reqwest::Client,
    api_base: String,
    secret_key: SecretString,
}

impl std::fmt::Debug for StripeProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeProcessor")
            .field("api_base", &self.api_base)
            .field("secret_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct IntentBody {
    id: String,
    #[serde(default)]
    client_secret: Option<String>,
    amount: i64,
    currency: String,
    status: String,
    #[serde(default)]
    last_payment_error: Option<ErrorDetail>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

impl IntentBody {
    fn order_reference(&self) -> Option<String> {
        self.metadata.get("order_id").cloned()
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    decline_code: Option<String>,
    #[serde(default)]
    payment_intent: Option<Box<IntentBody>>,
}

impl ErrorDetail {
    fn reason(&self) -> String {
        self.message
            .clone()
            .or_else(|| self.decline_code.clone())
            .unwrap_or_else(|| "card declined".to_string())
    }
}

impl StripeProcessor {
    /// Builds a client whose every request gives up after `timeout`.
    pub fn new(api_base: impl Into<String>, secret_key: SecretString, timeout: Duration) -> Result<Self, ProcessorError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProcessorError::Unavailable(e.to_string()))?;
        Ok(Self { client, api_base: api_base.into().trim_end_matches('/').to_string(), secret_key })
    }

    async fn post(&self, path: &str, form: &[(&str, String)], idempotency_key: Option<&str>) -> Result<reqwest::Response, ProcessorError> {
        let mut request = self
            .client
            .post(format!("{}{path}", self.api_base))
            .bearer_auth(self.secret_key.expose_secret())
            .form(form);
        if let Some(key) = idempotency_key {
            request = request.header("Idempotency-Key", key);
        }
        request.send().await.map_err(|e| ProcessorError::Unavailable(e.to_string()))
    }
}

async fn error_detail(response: reqwest::Response) -> Result<ErrorDetail, ProcessorError> {
    response
        .json::<ErrorEnvelope>()
        .await
        .map(|e| e.error)
        .map_err(|e| ProcessorError::Unavailable(format!("unreadable processor error: {e}")))
}

#[async_trait]
impl PaymentProcessor for StripeProcessor {
    async fn create_intent(&self, amount_minor: i64, currency: &str, reference: &str) -> Result<PaymentIntent, ProcessorError> {
        let form = [
            ("amount", amount_minor.to_string()),
            ("currency", currency.to_lowercase()),
            ("payment_method_types[]", "card".to_string()),
            ("metadata[order_id]", reference.to_string()),
        ];
        let key = format!("intent-{reference}-{amount_minor}");
        let response = self.post("/v1/payment_intents", &form, Some(&key)).await?;

        let status = response.status();
        if status.is_server_error() {
            return Err(ProcessorError::Unavailable(format!("processor returned {status}")));
        }
        if !status.is_success() {
            return Err(ProcessorError::Rejected(error_detail(response).await?.reason()));
        }

        let body: IntentBody = response.json().await.map_err(|e| ProcessorError::Unavailable(e.to_string()))?;
        Ok(PaymentIntent {
            client_secret: body.client_secret.unwrap_or_default(),
            intent_id: body.id,
            amount_minor: body.amount,
            currency: body.currency,
        })
    }

    async fn confirm(&self, intent_id: &str, payment_method: &str) -> Result<Confirmation, ProcessorError> {
        let form = [("payment_method", payment_method.to_string())];
        let response = self.post(&format!("/v1/payment_intents/{intent_id}/confirm"), &form, None).await?;

        let status = response.status();
        if status.is_server_error() {
            return Err(ProcessorError::Unavailable(format!("processor returned {status}")));
        }
        if status == StatusCode::PAYMENT_REQUIRED {
            let detail = error_detail(response).await?;
            let (amount_minor, currency, reference) = detail
                .payment_intent
                .as_ref()
                .map_or((0, String::new(), None), |pi| (pi.amount, pi.currency.clone(), pi.order_reference()));
            return Ok(Confirmation {
                intent_id: intent_id.to_string(),
                approved: false,
                decline_reason: Some(detail.reason()),
                amount_minor,
                currency,
                status: detail.kind.unwrap_or_else(|| "card_error".to_string()),
                reference,
            });
        }
        if !status.is_success() {
            return Err(ProcessorError::Rejected(error_detail(response).await?.reason()));
        }

        let body: IntentBody = response.json().await.map_err(|e| ProcessorError::Unavailable(e.to_string()))?;
        let approved = matches!(body.status.as_str(), "succeeded" | "requires_capture");
        let reference = body.order_reference();
        Ok(Confirmation {
            decline_reason: if approved {
                None
            } else {
                Some(body.last_payment_error.map_or_else(|| format!("payment {}", body.status), |e| e.reason()))
            },
            intent_id: body.id,
            approved,
            amount_minor: body.amount,
            currency: body.currency,
            status: body.status,
            reference,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decline_body_parses() {
        let body = r#"{"error":{"type":"card_error","code":"card_declined","decline_code":"insufficient_funds",
            "message":"Your card has insufficient funds.",
            "payment_intent":{"id":"pi_1","amount":4818,"currency":"usd","status":"requires_payment_method",
            "metadata":{"order_id":"0190a1b2-0000-7000-8000-000000000001"}}}}"#;
        let envelope: ErrorEnvelope = serde_json::from_str(body).unwrap();
        assert_eq!(envelope.error.reason(), "Your card has insufficient funds.");
        let intent = envelope.error.payment_intent.unwrap();
        assert_eq!(intent.amount, 4818);
        assert_eq!(intent.order_reference().as_deref(), Some("0190a1b2-0000-7000-8000-000000000001"));
    }

    #[test]
    fn test_debug_redacts_key() {
        let stripe = StripeProcessor::new(DEFAULT_API_BASE, SecretString::from("sk_test_abc".to_string()), Duration::from_secs(5)).unwrap();
        let rendered = format!("{stripe:?}");
        assert!(!rendered.contains("sk_test_abc"));
    }
}
