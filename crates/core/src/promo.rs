//! Promo code eligibility and discounts.
//!
//! [`evaluate`] is a pure function over a snapshot of the code's terms. The
//! store performs the matching atomic redemption (see [`RedemptionOutcome`]),
//! so a code that evaluates as eligible can still lose a race for its last
//! use; callers treat [`RedemptionOutcome::LimitReached`] as
//! [`PromoRejection::LimitExceeded`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;

use crate::types::{DiscountType, Money};

/// Longest accepted promo code.
pub const MAX_CODE_LENGTH: usize = 32;

/// The parts of a promo code that decide eligibility and discount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromoTerms {
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub min_order_amount: Money,
    pub max_discount: Option<Money>,
    pub usage_limit: Option<i32>,
    pub usage_count: i32,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub active: bool,
}

/// Why a promo code cannot be used for an order.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PromoRejection {
    #[error("invalid or inactive promo code")]
    NotFound,
    #[error("promo code is not yet valid")]
    NotYetValid,
    #[error("promo code has expired")]
    Expired,
    #[error("minimum order amount of {minimum} required")]
    BelowMinimum { minimum: Money },
    #[error("promo code usage limit exceeded")]
    LimitExceeded,
    #[error("you have already used this promo code")]
    AlreadyUsed,
    #[error("order amount cannot be negative")]
    NegativeAmount,
}

impl PromoRejection {
    /// Stable machine-readable reason.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "promo_not_found",
            Self::NotYetValid => "not_yet_valid",
            Self::Expired => "expired",
            Self::BelowMinimum { .. } => "below_minimum",
            Self::LimitExceeded => "limit_exceeded",
            Self::AlreadyUsed => "already_used",
            Self::NegativeAmount => "invalid_input",
        }
    }
}

/// An eligible code's effect on an amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountQuote {
    pub discount_amount: Money,
    pub final_amount: Money,
}

/// Result of an atomic redemption attempt in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedemptionOutcome {
    /// The user was added and the usage count incremented.
    Applied,
    /// The user had already redeemed this code. Nothing changed.
    AlreadyApplied,
    /// The usage limit was reached before this user got in.
    LimitReached,
}

/// Normalize user input to the stored form of a code.
///
/// Returns `None` for empty input.
#[must_use]
pub fn normalize_code(raw: &str) -> Option<String> {
    let code = raw.trim();
    if code.is_empty() {
        None
    } else {
        Some(code.to_uppercase())
    }
}

/// Check whether `terms` can be used by a user for `order_amount` at `now`.
///
/// `terms` is `None` when no code with that name exists. `already_redeemed`
/// says whether the user is in the code's redemption set.
///
/// Checks run in a fixed order and the first failure wins. The usage-limit
/// check only counts other users: someone who already redeemed the code is
/// told [`PromoRejection::AlreadyUsed`] even when the code is exhausted.
///
/// # Errors
///
/// Returns the first [`PromoRejection`] that applies.
pub fn evaluate(
    terms: Option<&PromoTerms>,
    already_redeemed: bool,
    order_amount: Decimal,
    now: DateTime<Utc>,
) -> Result<DiscountQuote, PromoRejection> {
    let amount = Money::non_negative(order_amount).map_err(|_| PromoRejection::NegativeAmount)?;

    let terms = terms
        .filter(|t| t.active)
        .ok_or(PromoRejection::NotFound)?;

    if terms.valid_from.is_some_and(|from| now < from) {
        return Err(PromoRejection::NotYetValid);
    }
    if terms.valid_until.is_some_and(|until| now > until) {
        return Err(PromoRejection::Expired);
    }
    if amount < terms.min_order_amount {
        return Err(PromoRejection::BelowMinimum {
            minimum: terms.min_order_amount,
        });
    }
    if !already_redeemed && terms.is_exhausted() {
        return Err(PromoRejection::LimitExceeded);
    }
    if already_redeemed {
        return Err(PromoRejection::AlreadyUsed);
    }

    let discount_amount = terms.discount_for(amount);
    Ok(DiscountQuote {
        discount_amount,
        final_amount: amount.saturating_sub(discount_amount),
    })
}

impl PromoTerms {
    /// Discount this code gives on `amount`, truncated to two decimals.
    ///
    /// Percentage discounts are capped by `max_discount`; no discount ever
    /// exceeds the amount itself.
    #[must_use]
    pub fn discount_for(&self, amount: Money) -> Money {
        let raw = match self.discount_type {
            DiscountType::Percentage => {
                let pct = amount.percent(self.discount_value);
                self.max_discount.map_or(pct, |cap| pct.min(cap))
            }
            DiscountType::Fixed => Money::new(self.discount_value),
        };
        raw.min(amount).floor2()
    }

    /// Whether the usage limit has been reached.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.usage_limit
            .is_some_and(|limit| self.usage_count >= limit)
    }

    /// Whether the code is active and inside its validity window at `now`.
    #[must_use]
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.active
            && self.valid_from.is_none_or(|from| from <= now)
            && self.valid_until.is_none_or(|until| now <= until)
    }

    /// Uses left before the limit, or `None` for unlimited codes.
    #[must_use]
    pub fn remaining_uses(&self) -> Option<i32> {
        self.usage_limit
            .map(|limit| (limit - self.usage_count).max(0))
    }

    /// Share of the limit used, as a whole percentage. Unlimited codes report 0.
    #[must_use]
    pub fn usage_percentage(&self) -> u32 {
        match self.usage_limit {
            Some(limit) if limit > 0 => {
                let pct = (Decimal::from(self.usage_count) * Decimal::ONE_HUNDRED
                    / Decimal::from(limit))
                .round();
                pct.to_u32().unwrap_or(0)
            }
            _ => 0,
        }
    }
}

/// Problems with a promo definition submitted by an admin.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PromoDefinitionError {
    #[error("promo code is required")]
    MissingCode,
    #[error("promo code must be at most 32 letters, digits, '-' or '_'")]
    InvalidCode,
    #[error("discount value must be greater than zero")]
    NonPositiveValue,
    #[error("percentage discount cannot exceed 100")]
    PercentageTooLarge,
    #[error("amounts cannot be negative")]
    NegativeAmount,
    #[error("usage limit must be at least 1")]
    InvalidUsageLimit,
    #[error("valid until date must be after valid from date")]
    InvalidWindow,
}

/// Validate a code's spelling and return its stored form.
///
/// # Errors
///
/// Returns [`PromoDefinitionError`] for empty, overlong or oddly spelled codes.
pub fn validate_code(raw: &str) -> Result<String, PromoDefinitionError> {
    let code = normalize_code(raw).ok_or(PromoDefinitionError::MissingCode)?;
    let well_formed = code.len() <= MAX_CODE_LENGTH
        && code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if well_formed {
        Ok(code)
    } else {
        Err(PromoDefinitionError::InvalidCode)
    }
}

/// Validate discount, limits and window of a new or edited code.
///
/// # Errors
///
/// Returns the first [`PromoDefinitionError`] found.
pub fn validate_terms(terms: &PromoTerms) -> Result<(), PromoDefinitionError> {
    if terms.discount_value <= Decimal::ZERO {
        return Err(PromoDefinitionError::NonPositiveValue);
    }
    if terms.discount_type == DiscountType::Percentage
        && terms.discount_value > Decimal::ONE_HUNDRED
    {
        return Err(PromoDefinitionError::PercentageTooLarge);
    }
    let negative = |m: Money| m.amount() < Decimal::ZERO;
    if negative(terms.min_order_amount) || terms.max_discount.is_some_and(negative) {
        return Err(PromoDefinitionError::NegativeAmount);
    }
    if terms.usage_limit.is_some_and(|limit| limit < 1) {
        return Err(PromoDefinitionError::InvalidUsageLimit);
    }
    if let (Some(from), Some(until)) = (terms.valid_from, terms.valid_until)
        && until <= from
    {
        return Err(PromoDefinitionError::InvalidWindow);
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn flat50() -> PromoTerms {
        PromoTerms {
            discount_type: DiscountType::Fixed,
            discount_value: d("50"),
            min_order_amount: Money::new(d("100")),
            max_discount: None,
            usage_limit: None,
            usage_count: 0,
            valid_from: None,
            valid_until: None,
            active: true,
        }
    }

    fn pct(value: &str, cap: Option<&str>) -> PromoTerms {
        PromoTerms {
            discount_type: DiscountType::Percentage,
            discount_value: d(value),
            min_order_amount: Money::ZERO,
            max_discount: cap.map(|c| Money::new(d(c))),
            ..flat50()
        }
    }

    #[test]
    fn flat_code_on_qualifying_order() {
        let quote = evaluate(Some(&flat50()), false, d("200"), Utc::now()).unwrap();
        assert_eq!(quote.discount_amount, Money::new(d("50")));
        assert_eq!(quote.final_amount, Money::new(d("150")));
    }

    #[test]
    fn missing_or_inactive_code_is_not_found() {
        assert_eq!(
            evaluate(None, false, d("10"), Utc::now()),
            Err(PromoRejection::NotFound)
        );
        let inactive = PromoTerms {
            active: false,
            ..flat50()
        };
        assert_eq!(
            evaluate(Some(&inactive), false, d("500"), Utc::now()),
            Err(PromoRejection::NotFound)
        );
    }

    #[test]
    fn validity_window_is_enforced() {
        let now = Utc::now();
        let future = PromoTerms {
            valid_from: Some(now + Duration::days(1)),
            ..flat50()
        };
        let past = PromoTerms {
            valid_until: Some(now - Duration::days(1)),
            ..flat50()
        };
        assert_eq!(
            evaluate(Some(&future), false, d("200"), now),
            Err(PromoRejection::NotYetValid)
        );
        assert_eq!(
            evaluate(Some(&past), false, d("200"), now),
            Err(PromoRejection::Expired)
        );
    }

    #[test]
    fn below_minimum_reports_the_minimum() {
        let err = evaluate(Some(&flat50()), false, d("99.99"), Utc::now()).unwrap_err();
        assert_eq!(
            err,
            PromoRejection::BelowMinimum {
                minimum: Money::new(d("100"))
            }
        );
        assert_eq!(err.code(), "below_minimum");
    }

    #[test]
    fn exhausted_code_rejects_new_users_but_names_repeat_users() {
        let exhausted = PromoTerms {
            usage_limit: Some(1),
            usage_count: 1,
            ..flat50()
        };
        assert_eq!(
            evaluate(Some(&exhausted), false, d("200"), Utc::now()),
            Err(PromoRejection::LimitExceeded)
        );
        assert_eq!(
            evaluate(Some(&exhausted), true, d("200"), Utc::now()),
            Err(PromoRejection::AlreadyUsed)
        );
    }

    #[test]
    fn window_is_checked_before_redemption() {
        let expired = PromoTerms {
            valid_until: Some(Utc::now() - Duration::hours(1)),
            ..flat50()
        };
        assert_eq!(
            evaluate(Some(&expired), true, d("200"), Utc::now()),
            Err(PromoRejection::Expired)
        );
    }

    #[test]
    fn percentage_is_capped_and_truncated() {
        let capped = pct("20", Some("30"));
        let quote = evaluate(Some(&capped), false, d("500"), Utc::now()).unwrap();
        assert_eq!(quote.discount_amount, Money::new(d("30")));

        // 33.33...% of 100 truncates rather than rounds
        let third = pct("33.333", None);
        let quote = evaluate(Some(&third), false, d("100"), Utc::now()).unwrap();
        assert_eq!(quote.discount_amount, Money::new(d("33.33")));

        let odd = pct("15", None);
        let quote = evaluate(Some(&odd), false, d("33.33"), Utc::now()).unwrap();
        assert_eq!(quote.discount_amount, Money::new(d("4.99")));
    }

    #[test]
    fn fixed_discount_never_exceeds_amount() {
        let big = PromoTerms {
            discount_value: d("500"),
            min_order_amount: Money::ZERO,
            ..flat50()
        };
        let quote = evaluate(Some(&big), false, d("120"), Utc::now()).unwrap();
        assert_eq!(quote.discount_amount, Money::new(d("120")));
        assert_eq!(quote.final_amount, Money::ZERO);
    }

    #[test]
    fn negative_amount_is_invalid_input() {
        let err = evaluate(Some(&flat50()), false, d("-1"), Utc::now()).unwrap_err();
        assert_eq!(err, PromoRejection::NegativeAmount);
        assert_eq!(err.code(), "invalid_input");
    }

    #[test]
    fn stats_helpers() {
        let terms = PromoTerms {
            usage_limit: Some(3),
            usage_count: 2,
            ..flat50()
        };
        assert_eq!(terms.remaining_uses(), Some(1));
        assert_eq!(terms.usage_percentage(), 67);
        assert_eq!(flat50().remaining_uses(), None);
        assert_eq!(flat50().usage_percentage(), 0);
    }

    #[test]
    fn codes_are_uppercased_and_checked() {
        assert_eq!(validate_code("  flat50 ").unwrap(), "FLAT50");
        assert_eq!(validate_code(""), Err(PromoDefinitionError::MissingCode));
        assert_eq!(
            validate_code("NO SPACES"),
            Err(PromoDefinitionError::InvalidCode)
        );
    }

    #[test]
    fn definitions_are_validated() {
        assert!(validate_terms(&flat50()).is_ok());
        assert_eq!(
            validate_terms(&pct("120", None)),
            Err(PromoDefinitionError::PercentageTooLarge)
        );
        let now = Utc::now();
        let backwards = PromoTerms {
            valid_from: Some(now),
            valid_until: Some(now - Duration::days(1)),
            ..flat50()
        };
        assert_eq!(
            validate_terms(&backwards),
            Err(PromoDefinitionError::InvalidWindow)
        );
        let zero_limit = PromoTerms {
            usage_limit: Some(0),
            ..flat50()
        };
        assert_eq!(
            validate_terms(&zero_limit),
            Err(PromoDefinitionError::InvalidUsageLimit)
        );
    }
}
