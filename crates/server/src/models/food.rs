//! Catalog types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use cravecart_core::{FoodId, Money};

/// A dish on the menu.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct FoodItem {
    pub id: FoodId,
    pub name: String,
    pub description: String,
    pub price: Money,
    pub category: String,
    pub available: bool,
    /// Running average of order ratings, 0-5.
    pub rating: Decimal,
    pub review_count: i32,
    /// Advertised discount, 0-100. Informational; checkout charges `price`.
    pub discount_percent: Decimal,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for adding a dish.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFoodItem {
    pub name: String,
    pub description: String,
    pub price: Money,
    pub category: String,
    #[serde(default = "default_available")]
    pub available: bool,
    #[serde(default)]
    pub discount_percent: Decimal,
    #[serde(default)]
    pub image_url: Option<String>,
}

const fn default_available() -> bool {
    true
}

fn check_discount(percent: Decimal) -> Result<(), &'static str> {
    if percent < Decimal::ZERO || percent > Decimal::ONE_HUNDRED {
        return Err("Discount must be between 0 and 100");
    }
    Ok(())
}

/// Prices are positive and at most two decimals; trailing zeros are fine.
fn check_price(price: Money) -> Result<(), &'static str> {
    if !price.is_positive() {
        return Err("Price must be greater than zero");
    }
    if price.amount().normalize().scale() > 2 {
        return Err("Price can have at most two decimals");
    }
    Ok(())
}

impl NewFoodItem {
    /// # Errors
    ///
    /// Returns a message naming the first invalid field.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.name.trim().is_empty() {
            return Err("Name is required");
        }
        if self.category.trim().is_empty() {
            return Err("Category is required");
        }
        check_price(self.price)?;
        check_discount(self.discount_percent)
    }
}

/// Partial update of a dish. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Money>,
    pub category: Option<String>,
    pub available: Option<bool>,
    pub discount_percent: Option<Decimal>,
    pub image_url: Option<String>,
}

impl FoodUpdate {
    /// # Errors
    ///
    /// Returns a message naming the first invalid field.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err("Name cannot be empty");
        }
        if self.category.as_deref().is_some_and(|c| c.trim().is_empty()) {
            return Err("Category cannot be empty");
        }
        if let Some(price) = self.price {
            check_price(price)?;
        }
        if let Some(percent) = self.discount_percent {
            check_discount(percent)?;
        }
        Ok(())
    }
}

/// Catalog listing filter.
#[derive(Debug, Clone, Default)]
pub struct FoodFilter {
    pub category: Option<String>,
    /// Case-insensitive substring of name or description.
    pub search: Option<String>,
    pub available: Option<bool>,
}

impl FoodFilter {
    /// Whether `food` passes this filter.
    #[must_use]
    pub fn matches(&self, food: &FoodItem) -> bool {
        let category_ok = self
            .category
            .as_deref()
            .is_none_or(|c| food.category.eq_ignore_ascii_case(c));
        let available_ok = self.available.is_none_or(|a| food.available == a);
        let search_ok = self.search.as_deref().is_none_or(|term| {
            let term = term.to_lowercase();
            food.name.to_lowercase().contains(&term)
                || food.description.to_lowercase().contains(&term)
        });
        category_ok && available_ok && search_ok
    }
}

impl FoodItem {
    /// Fold a new order rating into the running average.
    pub fn add_rating(&mut self, rating: i16) {
        let count = Decimal::from(self.review_count);
        let total = self.rating * count + Decimal::from(rating);
        self.review_count += 1;
        self.rating = (total / Decimal::from(self.review_count)).round_dp(2);
    }

    /// Swap one rating already in the average for another.
    pub fn replace_rating(&mut self, old: i16, new: i16) {
        if self.review_count == 0 {
            self.add_rating(new);
            return;
        }
        let count = Decimal::from(self.review_count);
        let total = self.rating * count - Decimal::from(old) + Decimal::from(new);
        self.rating = clamp_rating((total / count).round_dp(2));
    }

    /// Take one rating back out of the average.
    pub fn remove_rating(&mut self, rating: i16) {
        if self.review_count <= 1 {
            self.review_count = 0;
            self.rating = Decimal::ZERO;
            return;
        }
        let total = self.rating * Decimal::from(self.review_count) - Decimal::from(rating);
        self.review_count -= 1;
        self.rating = clamp_rating((total / Decimal::from(self.review_count)).round_dp(2));
    }
}

/// Rounding drift can push a recomputed average just outside 0-5.
fn clamp_rating(rating: Decimal) -> Decimal {
    rating.clamp(Decimal::ZERO, Decimal::from(5))
}

/// Highest rated first, ties broken by review count.
pub fn by_rating(a: &FoodItem, b: &FoodItem) -> std::cmp::Ordering {
    b.rating
        .cmp(&a.rating)
        .then_with(|| b.review_count.cmp(&a.review_count))
        .then_with(|| a.id.cmp(&b.id))
}

impl FoodItem {
    /// Whether the dish shows up among the top rated.
    #[must_use]
    pub fn is_rated(&self) -> bool {
        self.rating > Decimal::ZERO
    }
}
