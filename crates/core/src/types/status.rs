//! Status and category enums.
//!
//! All of these are stored as `TEXT` columns and travel as `snake_case`
//! strings on the wire. The `text_enum!` macro keeps `Display`, `FromStr` and
//! the database mapping in sync with the serde names.

use serde::{Deserialize, Serialize};

/// A string did not name any variant of the target enum.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {kind}: {value}")]
pub struct UnknownVariant {
    /// Which enum was being parsed.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

macro_rules! text_enum {
    ($name:ident, $kind:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// The stored and serialized name.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::core::str::FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(UnknownVariant {
                        kind: $kind,
                        value: s.to_owned(),
                    }),
                }
            }
        }

        #[cfg(feature = "postgres")]
        impl ::sqlx::Type<::sqlx::Postgres> for $name {
            fn type_info() -> ::sqlx::postgres::PgTypeInfo {
                <String as ::sqlx::Type<::sqlx::Postgres>>::type_info()
            }

            fn compatible(ty: &::sqlx::postgres::PgTypeInfo) -> bool {
                <String as ::sqlx::Type<::sqlx::Postgres>>::compatible(ty)
            }
        }

        #[cfg(feature = "postgres")]
        impl<'r> ::sqlx::Decode<'r, ::sqlx::Postgres> for $name {
            fn decode(
                value: ::sqlx::postgres::PgValueRef<'r>,
            ) -> Result<Self, ::sqlx::error::BoxDynError> {
                let s = <&str as ::sqlx::Decode<::sqlx::Postgres>>::decode(value)?;
                Ok(s.parse::<Self>()?)
            }
        }

        #[cfg(feature = "postgres")]
        impl ::sqlx::Encode<'_, ::sqlx::Postgres> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut ::sqlx::postgres::PgArgumentBuffer,
            ) -> Result<::sqlx::encode::IsNull, ::sqlx::error::BoxDynError> {
                <&str as ::sqlx::Encode<::sqlx::Postgres>>::encode_by_ref(&self.as_str(), buf)
            }
        }
    };
}

/// Where an order is in its lifecycle.
///
/// See [`crate::lifecycle`] for the allowed transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Placed, waiting for card payment.
    Pending,
    /// Paid (card) or accepted (cash on delivery).
    Confirmed,
    /// In the kitchen.
    Preparing,
    /// With a courier.
    OutForDelivery,
    /// Handed to the customer. Terminal.
    Delivered,
    /// Cancelled by the customer or an admin. Terminal.
    Cancelled,
}

text_enum!(OrderStatus, "order status" {
    Pending => "pending",
    Confirmed => "confirmed",
    Preparing => "preparing",
    OutForDelivery => "out_for_delivery",
    Delivered => "delivered",
    Cancelled => "cancelled",
});

impl OrderStatus {
    /// Human-readable label used in notifications and tracking.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Confirmed => "Confirmed",
            Self::Preparing => "Preparing",
            Self::OutForDelivery => "Out for Delivery",
            Self::Delivered => "Delivered",
            Self::Cancelled => "Cancelled",
        }
    }
}

/// How the customer pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Pay the courier at the door.
    #[serde(alias = "cod")]
    CashOnDelivery,
    /// Hosted card checkout through the payment gateway.
    #[serde(alias = "stripe")]
    Card,
}

text_enum!(PaymentMethod, "payment method" {
    CashOnDelivery => "cash_on_delivery",
    Card => "card",
});

/// How a promo code's `discount_value` is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    /// `discount_value` percent of the order amount.
    Percentage,
    /// `discount_value` off, in currency units.
    Fixed,
}

text_enum!(DiscountType, "discount type" {
    Percentage => "percentage",
    Fixed => "fixed",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    OrderUpdate,
    Promotion,
    Delivery,
    ReviewRequest,
    System,
}

text_enum!(NotificationType, "notification type" {
    OrderUpdate => "order_update",
    Promotion => "promotion",
    Delivery => "delivery",
    ReviewRequest => "review_request",
    System => "system",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    Low,
    #[default]
    Medium,
    High,
}

text_enum!(NotificationPriority, "notification priority" {
    Low => "low",
    Medium => "medium",
    High => "high",
});

/// Account role carried in access tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Customer,
    /// Catalog, promo and order administration.
    Admin,
}

text_enum!(Role, "role" {
    Customer => "customer",
    Admin => "admin",
});

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_serde_names() {
        for status in OrderStatus::ALL {
            let json = serde_json::to_string(status).unwrap();
            assert_eq!(json, format!("\"{status}\""));
        }
        for kind in NotificationType::ALL {
            let json = serde_json::to_string(kind).unwrap();
            assert_eq!(json, format!("\"{kind}\""));
        }
    }

    #[test]
    fn from_str_roundtrips_every_status() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), *status);
        }
    }

    #[test]
    fn unknown_values_name_the_enum() {
        let err = "shipped".parse::<OrderStatus>().unwrap_err();
        assert_eq!(err.to_string(), "invalid order status: shipped");
    }

    #[test]
    fn payment_method_accepts_legacy_names() {
        let cod: PaymentMethod = serde_json::from_str("\"cod\"").unwrap();
        let card: PaymentMethod = serde_json::from_str("\"stripe\"").unwrap();
        assert_eq!(cod, PaymentMethod::CashOnDelivery);
        assert_eq!(card, PaymentMethod::Card);
    }

    #[test]
    fn labels_are_human_readable() {
        assert_eq!(OrderStatus::OutForDelivery.label(), "Out for Delivery");
    }
}
