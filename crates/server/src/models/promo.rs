//! Promo code types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use cravecart_core::{DiscountType, Money, PromoCodeId, PromoTerms};

/// A stored promo code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PromoCode {
    pub id: PromoCodeId,
    /// Upper-case.
    pub code: String,
    pub description: String,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub min_order_amount: Money,
    pub max_discount: Option<Money>,
    pub usage_limit: Option<i32>,
    pub usage_count: i32,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PromoCode {
    /// Snapshot of the fields that decide eligibility.
    #[must_use]
    pub fn terms(&self) -> PromoTerms {
        PromoTerms {
            discount_type: self.discount_type,
            discount_value: self.discount_value,
            min_order_amount: self.min_order_amount,
            max_discount: self.max_discount,
            usage_limit: self.usage_limit,
            usage_count: self.usage_count,
            valid_from: self.valid_from,
            valid_until: self.valid_until,
            active: self.active,
        }
    }
}

/// Input for creating a code.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPromoCode {
    pub code: String,
    #[serde(default)]
    pub description: String,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    #[serde(default)]
    pub min_order_amount: Money,
    #[serde(default)]
    pub max_discount: Option<Money>,
    #[serde(default)]
    pub usage_limit: Option<i32>,
    #[serde(default)]
    pub valid_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,
}

impl NewPromoCode {
    /// Terms the code would start with.
    #[must_use]
    pub fn terms(&self) -> PromoTerms {
        PromoTerms {
            discount_type: self.discount_type,
            discount_value: self.discount_value,
            min_order_amount: self.min_order_amount,
            max_discount: self.max_discount,
            usage_limit: self.usage_limit,
            usage_count: 0,
            valid_from: self.valid_from,
            valid_until: self.valid_until,
            active: true,
        }
    }
}

/// Editable fields of a code. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromoUpdate {
    pub description: Option<String>,
    pub discount_value: Option<Decimal>,
    pub active: Option<bool>,
    pub valid_until: Option<DateTime<Utc>>,
    pub usage_limit: Option<i32>,
}

impl PromoUpdate {
    /// Apply the update to a copy of `promo`.
    #[must_use]
    pub fn applied_to(&self, promo: &PromoCode) -> PromoCode {
        let mut next = promo.clone();
        if let Some(description) = &self.description {
            next.description.clone_from(description);
        }
        if let Some(value) = self.discount_value {
            next.discount_value = value;
        }
        if let Some(active) = self.active {
            next.active = active;
        }
        if let Some(until) = self.valid_until {
            next.valid_until = Some(until);
        }
        if let Some(limit) = self.usage_limit {
            next.usage_limit = Some(limit);
        }
        next
    }
}

/// Usage report for one code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromoStats {
    pub code: String,
    pub usage_count: i32,
    pub usage_limit: Option<i32>,
    /// `None` for unlimited codes.
    pub remaining_usage: Option<i32>,
    pub usage_percentage: u32,
    /// Distinct users in the redemption set.
    pub user_count: u64,
    pub active: bool,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
}
