//! Saved dishes.

use chrono::{DateTime, Utc};
use serde::Serialize;

use cravecart_core::FoodId;

use super::FoodItem;

/// A stored wishlist row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct WishlistEntry {
    pub food_id: FoodId,
    pub added_at: DateTime<Utc>,
}

/// A wishlist row joined with the current dish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WishlistItem {
    #[serde(flatten)]
    pub food: FoodItem,
    pub added_at: DateTime<Utc>,
}
