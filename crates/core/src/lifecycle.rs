//! Order status state machine.
//!
//! ```text
//! Pending ──► Confirmed ──► Preparing ──► OutForDelivery ──► Delivered
//!    │            │
//!    └────────────┴──► Cancelled
//! ```
//!
//! `Delivered` and `Cancelled` are terminal. Self-transitions are rejected, so
//! a status update is always a real change and always appends one
//! [`StatusEvent`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{OrderStatus, PaymentMethod};

/// Lowest accepted order rating.
pub const MIN_RATING: i16 = 1;
/// Highest accepted order rating.
pub const MAX_RATING: i16 = 5;

/// A status change that the machine does not allow.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("cannot move order from {} to {}", .from.label(), .to.label())]
pub struct TransitionError {
    pub from: OrderStatus,
    pub to: OrderStatus,
}

/// One entry of an order's append-only status log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub status: OrderStatus,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl StatusEvent {
    #[must_use]
    pub fn new(status: OrderStatus, message: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            status,
            timestamp,
            message: message.into(),
        }
    }
}

impl OrderStatus {
    /// Status a freshly placed order starts in.
    ///
    /// Card orders wait for the gateway callback; cash orders are accepted
    /// immediately.
    #[must_use]
    pub const fn initial_for(method: PaymentMethod) -> Self {
        match method {
            PaymentMethod::CashOnDelivery => Self::Confirmed,
            PaymentMethod::Card => Self::Pending,
        }
    }

    /// Whether `self -> next` is an allowed edge.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Confirmed | Self::Cancelled)
                | (Self::Confirmed, Self::Preparing | Self::Cancelled)
                | (Self::Preparing, Self::OutForDelivery)
                | (Self::OutForDelivery, Self::Delivered)
        )
    }

    /// Validate `self -> next`.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] for any edge not in the diagram above.
    pub const fn transition(self, next: Self) -> Result<Self, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError {
                from: self,
                to: next,
            })
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    /// Whether the customer (or an admin) may still cancel.
    #[must_use]
    pub const fn is_cancellable(self) -> bool {
        self.can_transition_to(Self::Cancelled)
    }

    /// Whether the order can be rated in this status.
    #[must_use]
    pub const fn accepts_rating(self) -> bool {
        matches!(self, Self::Delivered)
    }
}

/// Whether `rating` is on the 1-5 scale.
#[must_use]
pub const fn is_valid_rating(rating: i16) -> bool {
    rating >= MIN_RATING && rating <= MAX_RATING
}

/// Default log message for reaching `status`.
#[must_use]
pub const fn default_message(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Pending => "Order placed, awaiting payment",
        OrderStatus::Confirmed => "Order confirmed",
        OrderStatus::Preparing => "Your food is being prepared",
        OrderStatus::OutForDelivery => "Your order is out for delivery",
        OrderStatus::Delivered => "Order delivered",
        OrderStatus::Cancelled => "Order cancelled",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use OrderStatus::*;

    #[test]
    fn happy_path_is_allowed() {
        let mut status = Pending;
        for next in [Confirmed, Preparing, OutForDelivery, Delivered] {
            status = status.transition(next).unwrap();
        }
        assert_eq!(status, Delivered);
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for from in [Delivered, Cancelled] {
            assert!(from.is_terminal());
            for to in OrderStatus::ALL {
                assert!(from.transition(*to).is_err(), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn cancel_only_before_preparation() {
        assert!(Pending.is_cancellable());
        assert!(Confirmed.is_cancellable());
        for status in [Preparing, OutForDelivery, Delivered, Cancelled] {
            assert!(!status.is_cancellable(), "{status}");
        }
        let err = Delivered.transition(Cancelled).unwrap_err();
        assert_eq!(err.to_string(), "cannot move order from Delivered to Cancelled");
    }

    #[test]
    fn no_skipping_or_going_back() {
        assert!(!Pending.can_transition_to(Preparing));
        assert!(!Confirmed.can_transition_to(Delivered));
        assert!(!Preparing.can_transition_to(Confirmed));
        for status in OrderStatus::ALL {
            assert!(!status.can_transition_to(*status));
        }
    }

    #[test]
    fn machine_has_exactly_six_edges() {
        let edges: usize = OrderStatus::ALL
            .iter()
            .map(|from| {
                OrderStatus::ALL
                    .iter()
                    .filter(|to| from.can_transition_to(**to))
                    .count()
            })
            .sum();
        assert_eq!(edges, 6);
    }

    #[test]
    fn initial_status_depends_on_payment() {
        assert_eq!(OrderStatus::initial_for(PaymentMethod::Card), Pending);
        assert_eq!(
            OrderStatus::initial_for(PaymentMethod::CashOnDelivery),
            Confirmed
        );
    }

    #[test]
    fn ratings() {
        assert!(Delivered.accepts_rating());
        assert!(!OutForDelivery.accepts_rating());
        assert!(is_valid_rating(1) && is_valid_rating(5));
        assert!(!is_valid_rating(0) && !is_valid_rating(6));
    }
}
