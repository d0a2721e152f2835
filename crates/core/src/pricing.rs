//! Order pricing.
//!
//! [`PricingPolicy`] is the only place tax and delivery fee are computed. Cart
//! summaries, promo validation and order placement all price through it, so a
//! customer never sees one total in the cart and is charged another.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::types::Money;

/// Tax rate and flat delivery fee applied at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingPolicy {
    /// Fraction of the subtotal charged as tax (`0.05` for 5%).
    pub tax_rate: Decimal,
    /// Flat fee added to any non-empty order.
    pub delivery_fee: Money,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            tax_rate: Decimal::new(5, 2),
            delivery_fee: Money::new(Decimal::from(50)),
        }
    }
}

/// Every component of an order's charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceBreakdown {
    pub subtotal: Money,
    /// Tax rounded to two decimals for display.
    pub tax: Money,
    pub delivery_fee: Money,
    pub discount: Money,
    /// What the customer pays.
    pub total: Money,
}

impl PricingPolicy {
    /// Tax on `subtotal`, unrounded.
    #[must_use]
    pub fn tax_on(&self, subtotal: Money) -> Money {
        subtotal.scale(self.tax_rate)
    }

    /// Delivery fee for an order with this subtotal. Empty orders ship free.
    #[must_use]
    pub fn delivery_fee_for(&self, subtotal: Money) -> Money {
        if subtotal.is_positive() {
            self.delivery_fee
        } else {
            Money::ZERO
        }
    }

    /// Price an order.
    ///
    /// The total is `round2(subtotal + tax + delivery_fee - discount)` using
    /// the unrounded tax, clamped at zero. `discount` is expected to be the
    /// already-truncated promo discount.
    #[must_use]
    pub fn quote(&self, subtotal: Money, discount: Money) -> PriceBreakdown {
        let tax = self.tax_on(subtotal);
        let delivery_fee = self.delivery_fee_for(subtotal);
        let total = (subtotal + tax + delivery_fee)
            .saturating_sub(discount)
            .round2();

        PriceBreakdown {
            subtotal,
            tax: tax.round2(),
            delivery_fee,
            discount,
            total,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn m(s: &str) -> Money {
        Money::new(Decimal::from_str(s).unwrap())
    }

    #[test]
    fn two_items_without_promo() {
        let quote = PricingPolicy::default().quote(m("100") * 2, Money::ZERO);
        assert_eq!(quote.subtotal, m("200"));
        assert_eq!(quote.tax, m("10"));
        assert_eq!(quote.delivery_fee, m("50"));
        assert_eq!(quote.total, m("260"));
    }

    #[test]
    fn flat_discount_comes_off_the_total() {
        let quote = PricingPolicy::default().quote(m("200"), m("50"));
        assert_eq!(quote.discount, m("50"));
        assert_eq!(quote.total, m("210"));
    }

    #[test]
    fn empty_order_has_no_delivery_fee() {
        let quote = PricingPolicy::default().quote(Money::ZERO, Money::ZERO);
        assert_eq!(quote.delivery_fee, Money::ZERO);
        assert_eq!(quote.total, Money::ZERO);
    }

    #[test]
    fn total_uses_unrounded_tax() {
        // 0.05 * 10.10 = 0.505
        let quote = PricingPolicy::default().quote(m("10.10"), Money::ZERO);
        assert_eq!(quote.tax, m("0.51"));
        assert_eq!(quote.total, m("60.61"));
    }

    #[test]
    fn total_never_goes_negative() {
        let quote = PricingPolicy::default().quote(m("10"), m("500"));
        assert_eq!(quote.total, Money::ZERO);
    }
}
