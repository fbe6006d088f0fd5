//! Service configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `DATABASE_URL` - `PostgreSQL` connection string
//! - `STRIPE_SECRET_KEY` - payment processor secret key
//!
//! ## Optional
//! - `PORT` - listen port (default: 8083)
//! - `NATS_URL` - event bus; events are only logged when unset
//! - `STRIPE_API_BASE` - processor base URL (default: <https://api.stripe.com>)
//! - `PAYMENT_TIMEOUT_SECS` - processor call timeout (default: 10)
//! - `STORE_CURRENCY` - ISO currency code charged (default: usd)
//! - `SHIPPING_FLAT_RATE` - flat shipping charge (default: 5.00)
//! - `FREE_SHIPPING_THRESHOLD` - items total above which shipping is free
//! - `TAX_RATE` - tax rate on the items total (default: 0.08)

use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use secrecy::SecretString;
use thiserror::Error;

use crate::domain::pricing::{PricingPolicy, ShippingPolicy};
use crate::payments::stripe::DEFAULT_API_BASE;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

#[derive(Clone)]
pub struct PaymentConfig {
    pub secret_key: SecretString,
    pub api_base: String,
    pub timeout: Duration,
    pub currency: String,
}

impl std::fmt::Debug for PaymentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentConfig")
            .field("secret_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("timeout", &self.timeout)
            .field("currency", &self.currency)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: SecretString,
    pub port: u16,
    pub nats_url: Option<String>,
    pub payment: PaymentConfig,
    pub pricing: PricingPolicy,
}

impl Config {
    /// Loads configuration from the process environment, reading `.env`
    /// first when present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);

        let timeout_secs: u64 = env.parsed_or("PAYMENT_TIMEOUT_SECS", 10)?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidEnvVar("PAYMENT_TIMEOUT_SECS".into(), "must be positive".into()));
        }
        let payment = PaymentConfig {
            secret_key: SecretString::from(env.required("STRIPE_SECRET_KEY")?),
            api_base: env.optional("STRIPE_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            timeout: Duration::from_secs(timeout_secs),
            currency: env.optional("STORE_CURRENCY").unwrap_or_else(|| "usd".to_string()).to_lowercase(),
        };

        let rate = env.decimal_or("SHIPPING_FLAT_RATE", Decimal::new(500, 2))?;
        let shipping = match env.optional("FREE_SHIPPING_THRESHOLD") {
            None => ShippingPolicy::Flat { rate },
            Some(raw) => ShippingPolicy::FreeAbove { rate, threshold: parse_decimal("FREE_SHIPPING_THRESHOLD", &raw)? },
        };
        let tax_rate = env.decimal_or("TAX_RATE", Decimal::new(8, 2))?;
        if tax_rate > Decimal::ONE {
            return Err(ConfigError::InvalidEnvVar("TAX_RATE".into(), "must be a fraction, e.g. 0.08".into()));
        }

        Ok(Self {
            database_url: SecretString::from(env.required("DATABASE_URL")?),
            port: env.parsed_or("PORT", 8083)?,
            nats_url: env.optional("NATS_URL"),
            payment,
            pricing: PricingPolicy { shipping, tax_rate },
        })
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port))
    }
}

struct Env<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Env<'_> {
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    fn parsed_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(key) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
        }
    }

    fn decimal_or(&self, key: &str, default: Decimal) -> Result<Decimal, ConfigError> {
        self.optional(key).map_or(Ok(default), |raw| parse_decimal(key, &raw))
    }
}

/// Money amounts and rates must be non-negative decimals.
fn parse_decimal(key: &str, raw: &str) -> Result<Decimal, ConfigError> {
    let value = Decimal::from_str(raw).map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if value.is_sign_negative() && !value.is_zero() {
        return Err(ConfigError::InvalidEnvVar(key.to_string(), "must not be negative".into()));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    const REQUIRED: [(&str, &str); 2] =
        [("DATABASE_URL", "postgres://localhost/vinyl"), ("STRIPE_SECRET_KEY", "sk_test_123")];

    #[test]
    fn test_defaults() {
        let config = load(&REQUIRED).unwrap();
        assert_eq!(config.port, 8083);
        assert_eq!(config.nats_url, None);
        assert_eq!(config.payment.api_base, DEFAULT_API_BASE);
        assert_eq!(config.payment.timeout, Duration::from_secs(10));
        assert_eq!(config.payment.currency, "usd");
        assert_eq!(config.pricing, PricingPolicy::default());
        assert_eq!(config.database_url.expose_secret(), "postgres://localhost/vinyl");
        assert_eq!(config.socket_addr().port(), 8083);
    }

    #[test]
    fn test_missing_required() {
        let err = load(&REQUIRED[..1]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "STRIPE_SECRET_KEY"));
    }

    #[test]
    fn test_pricing_overrides() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([("SHIPPING_FLAT_RATE", "7.50"), ("FREE_SHIPPING_THRESHOLD", "100"), ("TAX_RATE", "0.2")]);
        let config = load(&vars).unwrap();
        assert_eq!(
            config.pricing.shipping,
            ShippingPolicy::FreeAbove { rate: Decimal::new(750, 2), threshold: Decimal::from(100) }
        );
        assert_eq!(config.pricing.tax_rate, Decimal::new(2, 1));
    }

    #[test]
    fn test_invalid_values() {
        for (key, value) in [("PORT", "eighty"), ("TAX_RATE", "-0.1"), ("TAX_RATE", "8"), ("PAYMENT_TIMEOUT_SECS", "0")] {
            let mut vars = REQUIRED.to_vec();
            vars.push((key, value));
            assert!(matches!(load(&vars), Err(ConfigError::InvalidEnvVar(ref k, _)) if k == key), "{key}={value}");
        }
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = load(&REQUIRED).unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk_test_123"));
        assert!(!rendered.contains("postgres://localhost"));
    }
}
