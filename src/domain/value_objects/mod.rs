//! Value Objects for the storefront

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Defines a uuid-backed identifier that cannot be mixed up with other ids.
macro_rules! define_id {
    ($name:ident) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Time-ordered id for a newly created record.
            pub fn generate() -> Self { Self(Uuid::now_v7()) }
            pub const fn from_uuid(id: Uuid) -> Self { Self(id) }
            pub const fn as_uuid(&self) -> Uuid { self.0 }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self { Self(id) }
        }
    };
}

define_id!(ProductId);
define_id!(OrderId);
define_id!(PrincipalId);

/// A verified identity making a request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub name: Option<String>,
    pub is_admin: bool,
}

impl Principal {
    pub fn customer(id: PrincipalId) -> Self { Self { id, name: None, is_admin: false } }
    pub fn admin(id: PrincipalId) -> Self { Self { id, name: None, is_admin: true } }
}

/// Decimal places kept for every displayed or persisted amount.
pub const CURRENCY_SCALE: u32 = 2;

/// Rounds an amount to cents, half away from zero.
pub fn round_currency(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(CURRENCY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Converts a currency amount to the processor's minor units (cents).
///
/// Returns `None` when the amount does not fit in an `i64`.
pub fn to_minor_units(amount: Decimal) -> Option<i64> {
    (round_currency(amount) * Decimal::ONE_HUNDRED).to_i64()
}

/// Converts processor minor units (cents) back to a currency amount.
pub fn from_minor_units(minor: i64) -> Decimal {
    Decimal::new(minor, CURRENCY_SCALE)
}

/// Where an order ships to. Every field is required.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShippingAddress {
    pub address_line: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

impl ShippingAddress {
    /// Trims every field and rejects the address if any field ends up empty.
    pub fn normalized(&self) -> Result<Self, AddressError> {
        let field = |name: &'static str, value: &str| {
            let trimmed = value.trim();
            if trimmed.is_empty() { Err(AddressError::Missing(name)) } else { Ok(trimmed.to_string()) }
        };
        Ok(Self {
            address_line: field("address_line", &self.address_line)?,
            city: field("city", &self.city)?,
            postal_code: field("postal_code", &self.postal_code)?,
            country: field("country", &self.country)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("shipping address field `{0}` is required")]
    Missing(&'static str),
}

/// How the buyer intends to pay. Exactly one variant per order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentSelection {
    /// Card collected by the payment processor; the token is its payment method id.
    Card { processor_token: String },
    Alternate { provider_ref: String },
}

impl PaymentSelection {
    pub fn is_card(&self) -> bool { matches!(self, Self::Card { .. }) }

    pub(crate) fn is_blank(&self) -> bool {
        match self {
            Self::Card { processor_token } => processor_token.trim().is_empty(),
            Self::Alternate { provider_ref } => provider_ref.trim().is_empty(),
        }
    }
}
