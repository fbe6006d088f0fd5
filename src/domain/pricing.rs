//! Pricing Engine
//!
//! Turns a set of cart lines into itemized totals. Pure: no I/O, no clock,
//! identical input always yields identical output.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::aggregates::cart::CartLine;
use crate::domain::value_objects::round_currency;

/// How shipping is charged for a non-empty cart.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ShippingPolicy {
    Flat { rate: Decimal },
    /// Flat rate unless the items total reaches `threshold`.
    FreeAbove { rate: Decimal, threshold: Decimal },
}

impl ShippingPolicy {
    fn charge(&self, items_total: Decimal) -> Decimal {
        match *self {
            Self::Flat { rate } => rate,
            Self::FreeAbove { rate, threshold } if items_total < threshold => rate,
            Self::FreeAbove { .. } => Decimal::ZERO,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingPolicy {
    pub shipping: ShippingPolicy,
    /// Fraction, e.g. `0.08` for 8%.
    pub tax_rate: Decimal,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            shipping: ShippingPolicy::Flat { rate: Decimal::new(500, 2) },
            tax_rate: Decimal::new(8, 2),
        }
    }
}

/// Derived totals for a set of lines. Always `grand = items + shipping + tax`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartTotals {
    pub items_total: Decimal,
    pub shipping_total: Decimal,
    pub tax_total: Decimal,
    pub grand_total: Decimal,
}

impl CartTotals {
    pub fn zero() -> Self { Self::default() }

    pub fn is_consistent(&self) -> bool {
        self.grand_total == self.items_total + self.shipping_total + self.tax_total
    }
}

/// Prices `lines` under `policy`.
///
/// Line amounts are summed at full precision; rounding to cents happens once
/// per component. An empty cart prices to all zeros.
pub fn price_lines(lines: &[CartLine], policy: &PricingPolicy) -> CartTotals {
    if lines.is_empty() {
        return CartTotals::zero();
    }

    let raw_items: Decimal = lines
        .iter()
        .map(CartLine::line_total)
        .sum();

    let items_total = round_currency(raw_items);
    let shipping_total = round_currency(policy.shipping.charge(items_total));
    let tax_total = round_currency(raw_items * policy.tax_rate);

    CartTotals {
        items_total,
        shipping_total,
        tax_total,
        grand_total: items_total + shipping_total + tax_total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::ProductId;

    fn line(cents: i64, quantity: u32) -> CartLine {
        CartLine {
            product_id: ProductId::generate(),
            unit_price: Decimal::new(cents, 2),
            quantity,
            display_name: "Kind of Blue".into(),
            image_ref: "/img/kob.jpg".into(),
            available_stock: 100,
        }
    }

    #[test]
    fn test_flat_shipping_scenario() {
        let totals = price_lines(&[line(1999, 2)], &PricingPolicy::default());
        assert_eq!(totals.items_total, Decimal::new(3998, 2));
        assert_eq!(totals.tax_total, Decimal::new(320, 2));
        assert_eq!(totals.shipping_total, Decimal::new(500, 2));
        assert_eq!(totals.grand_total, Decimal::new(4818, 2));
    }

    #[test]
    fn test_empty_cart_is_zero() {
        let totals = price_lines(&[], &PricingPolicy::default());
        assert_eq!(totals, CartTotals::zero());
        assert!(totals.is_consistent());
    }

    #[test]
    fn test_free_shipping_threshold() {
        let policy = PricingPolicy {
            shipping: ShippingPolicy::FreeAbove { rate: Decimal::new(1000, 2), threshold: Decimal::new(10000, 2) },
            tax_rate: Decimal::new(15, 2),
        };
        assert_eq!(price_lines(&[line(4999, 2)], &policy).shipping_total, Decimal::new(1000, 2));
        assert_eq!(price_lines(&[line(5000, 2)], &policy).shipping_total, Decimal::ZERO);
    }

    #[test]
    fn test_rounding_happens_once() {
        // 3 x 0.335 = 1.005 -> 1.01; rounding each line first would give 1.02
        let mut odd = line(0, 1);
        odd.unit_price = Decimal::new(335, 3);
        let lines = vec![odd; 3];
        let totals = price_lines(&lines, &PricingPolicy::default());
        assert_eq!(totals.items_total, Decimal::new(101, 2));
    }

    #[test]
    fn test_invariant_holds_across_inputs() {
        let policy = PricingPolicy::default();
        for cents in [0_i64, 1, 99, 1999, 12345, 99999] {
            for qty in [1_u32, 2, 3, 7, 50] {
                let totals = price_lines(&[line(cents, qty), line(cents + 7, 1)], &policy);
                assert!(totals.is_consistent(), "{cents} x {qty}");
                assert_eq!(totals, price_lines(&[line(cents, qty), line(cents + 7, 1)], &policy));
            }
        }
    }
}
