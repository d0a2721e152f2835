//! Order types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cravecart_core::{
    FoodId, Money, OrderId, OrderStatus, PaymentMethod, PriceBreakdown, StatusEvent, UserId,
};

/// A line item frozen at placement time.
///
/// Later catalog edits do not change what the customer ordered or paid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub food_id: FoodId,
    pub name: String,
    pub category: String,
    pub unit_price: Money,
    pub quantity: u32,
}

impl OrderLine {
    #[must_use]
    pub fn line_total(&self) -> Money {
        self.unit_price * self.quantity
    }
}

/// Where to deliver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryAddress {
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    pub street: String,
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default, alias = "zipcode")]
    pub zip_code: String,
    #[serde(default)]
    pub country: String,
    pub phone: String,
}

impl DeliveryAddress {
    /// Names of required fields that are blank.
    #[must_use]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("firstName", &self.first_name),
            ("street", &self.street),
            ("city", &self.city),
            ("phone", &self.phone),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }
}

/// A placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub items: Vec<OrderLine>,
    pub subtotal: Money,
    pub tax: Money,
    pub delivery_fee: Money,
    pub discount: Money,
    pub promo_code: Option<String>,
    /// Final charge.
    pub amount: Money,
    pub address: DeliveryAddress,
    pub payment_method: PaymentMethod,
    pub status: OrderStatus,
    pub payment_confirmed: bool,
    /// Hosted checkout session of the latest card hand-off.
    #[serde(skip)]
    pub payment_session_id: Option<String>,
    pub special_instructions: Option<String>,
    pub rating: Option<i16>,
    pub review: Option<String>,
    /// Oldest first.
    pub status_history: Vec<StatusEvent>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Whether the gateway hand-off can be (re)tried.
    #[must_use]
    pub fn awaits_card_payment(&self) -> bool {
        self.payment_method == PaymentMethod::Card
            && self.status == OrderStatus::Pending
            && !self.payment_confirmed
    }
}

/// Everything needed to persist a new order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: UserId,
    pub items: Vec<OrderLine>,
    pub pricing: PriceBreakdown,
    pub promo_code: Option<String>,
    pub address: DeliveryAddress,
    pub payment_method: PaymentMethod,
    pub special_instructions: Option<String>,
    /// First status-log entry; its status is the order's initial status.
    pub initial_event: StatusEvent,
}

/// Outcome of the atomic placement in the store.
#[derive(Debug, Clone)]
pub enum Placement {
    Placed(Box<Order>),
    /// The cart no longer matches what was priced.
    CartChanged,
    /// The promo code's last use went to someone else.
    PromoExhausted,
    /// The user redeemed the code in the meantime.
    PromoAlreadyUsed,
}

/// Order listing filter.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderFilter {
    pub user_id: Option<UserId>,
    pub status: Option<OrderStatus>,
}

impl OrderFilter {
    #[must_use]
    pub fn matches(&self, order: &Order) -> bool {
        self.user_id.is_none_or(|u| order.user_id == u)
            && self.status.is_none_or(|s| order.status == s)
    }
}
