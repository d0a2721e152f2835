//! Cart types.

use serde::Serialize;

use cravecart_core::{FoodId, Money};

/// One stored cart row: a food id and a positive quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartEntry {
    pub food_id: FoodId,
    pub quantity: u32,
}

/// A cart row joined with current catalog data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub food_id: FoodId,
    pub name: String,
    pub category: String,
    pub price: Money,
    pub image_url: Option<String>,
    pub available: bool,
    pub quantity: u32,
    pub line_total: Money,
}

/// The enriched cart returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub items: Vec<CartLine>,
    pub subtotal: Money,
    /// Distinct dishes in the cart.
    pub item_count: usize,
}
