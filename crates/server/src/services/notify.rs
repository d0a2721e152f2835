//! Order-lifecycle notifications.
//!
//! The order workflow reports events to a [`NotificationSink`]. Delivery is
//! best-effort: [`dispatch`] logs a failed notification and carries on, so a
//! notification problem never fails the order operation that caused it.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use cravecart_core::{NotificationPriority, NotificationType, OrderStatus};

use crate::db::{NotificationRepository, RepositoryError, Store};
use crate::models::{NewNotification, Order};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to store notification: {0}")]
    Store(#[from] RepositoryError),
}

/// Receives notifications produced by the order workflow.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: NewNotification) -> Result<(), NotifyError>;
}

/// Sink that writes notifications to the user's feed.
pub struct StoredNotifications {
    store: Arc<dyn Store>,
}

impl StoredNotifications {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl NotificationSink for StoredNotifications {
    async fn notify(&self, notification: NewNotification) -> Result<(), NotifyError> {
        self.store.insert_notification(&notification).await?;
        Ok(())
    }
}

/// Send `notification`, logging instead of failing.
pub async fn dispatch(sink: &dyn NotificationSink, notification: NewNotification) {
    let user_id = notification.user_id;
    let title = notification.title.clone();
    if let Err(e) = sink.notify(notification).await {
        tracing::warn!(
            error = %e,
            user_id = %user_id,
            title = %title,
            "Dropped notification"
        );
    }
}

fn order_update(
    order: &Order,
    title: impl Into<String>,
    message: impl Into<String>,
    priority: NotificationPriority,
) -> NewNotification {
    NewNotification {
        user_id: order.user_id,
        order_id: Some(order.id),
        kind: NotificationType::OrderUpdate,
        title: title.into(),
        message: message.into(),
        priority,
    }
}

#[must_use]
pub fn order_placed(order: &Order) -> NewNotification {
    order_update(
        order,
        "Order Placed",
        format!("Your order #{} has been placed successfully", order.id),
        NotificationPriority::High,
    )
}

#[must_use]
pub fn payment_confirmed(order: &Order) -> NewNotification {
    order_update(
        order,
        "Payment Confirmed",
        "Your payment has been confirmed. Order is being prepared.",
        NotificationPriority::High,
    )
}

#[must_use]
pub fn payment_failed(order: &Order) -> NewNotification {
    order_update(
        order,
        "Payment Failed",
        "Payment verification failed. Please try again.",
        NotificationPriority::High,
    )
}

#[must_use]
pub fn order_cancelled(order: &Order) -> NewNotification {
    order_update(
        order,
        "Order Cancelled",
        "Your order has been cancelled",
        NotificationPriority::Medium,
    )
}

/// Admin moved the order along. Deliveries are high priority.
#[must_use]
pub fn status_updated(order: &Order, message: Option<&str>) -> NewNotification {
    let status = order.status;
    let priority = if status == OrderStatus::Delivered {
        NotificationPriority::High
    } else {
        NotificationPriority::Medium
    };
    let kind = if status == OrderStatus::OutForDelivery || status == OrderStatus::Delivered {
        NotificationType::Delivery
    } else {
        NotificationType::OrderUpdate
    };
    NewNotification {
        kind,
        ..order_update(
            order,
            format!("Order {}", status.label()),
            message.map_or_else(
                || format!("Your order has been {}", status.label().to_lowercase()),
                str::to_owned,
            ),
            priority,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use chrono::Utc;
    use cravecart_core::{Money, OrderId, PaymentMethod, StatusEvent, UserId};

    use crate::models::DeliveryAddress;

    fn order(status: OrderStatus) -> Order {
        let now = Utc::now();
        Order {
            id: OrderId::new(31),
            user_id: UserId::new(4),
            items: Vec::new(),
            subtotal: Money::ZERO,
            tax: Money::ZERO,
            delivery_fee: Money::ZERO,
            discount: Money::ZERO,
            promo_code: None,
            amount: Money::ZERO,
            address: DeliveryAddress {
                first_name: "Ada".into(),
                last_name: String::new(),
                email: None,
                street: "1 Main St".into(),
                city: "Pune".into(),
                state: String::new(),
                zip_code: String::new(),
                country: String::new(),
                phone: "555-0100".into(),
            },
            payment_method: PaymentMethod::CashOnDelivery,
            status,
            payment_confirmed: false,
            payment_session_id: None,
            special_instructions: None,
            rating: None,
            review: None,
            status_history: vec![StatusEvent::new(status, "test", now)],
            created_at: now,
            updated_at: now,
        }
    }

    struct FailingSink;

    #[async_trait]
    impl NotificationSink for FailingSink {
        async fn notify(&self, _: NewNotification) -> Result<(), NotifyError> {
            Err(NotifyError::Store(RepositoryError::NotFound))
        }
    }

    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<NewNotification>>);

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn notify(&self, n: NewNotification) -> Result<(), NotifyError> {
            self.0.lock().map_or((), |mut v| v.push(n));
            Ok(())
        }
    }

    #[tokio::test]
    async fn dispatch_swallows_failures() {
        dispatch(&FailingSink, order_placed(&order(OrderStatus::Confirmed))).await;
    }

    #[tokio::test]
    async fn dispatch_forwards_to_the_sink() {
        let sink = RecordingSink::default();
        dispatch(&sink, order_cancelled(&order(OrderStatus::Cancelled))).await;
        let sent = sink.0.lock().map(|v| v.clone()).unwrap_or_default();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent.first().map(|n| n.title.as_str()), Some("Order Cancelled"));
    }

    #[test]
    fn delivery_updates_are_high_priority() {
        let delivered = status_updated(&order(OrderStatus::Delivered), None);
        assert_eq!(delivered.priority, NotificationPriority::High);
        assert_eq!(delivered.kind, NotificationType::Delivery);
        assert_eq!(delivered.title, "Order Delivered");

        let preparing = status_updated(&order(OrderStatus::Preparing), Some("Chef is on it"));
        assert_eq!(preparing.priority, NotificationPriority::Medium);
        assert_eq!(preparing.kind, NotificationType::OrderUpdate);
        assert_eq!(preparing.message, "Chef is on it");
    }

    #[test]
    fn placement_mentions_the_order() {
        let n = order_placed(&order(OrderStatus::Pending));
        assert_eq!(n.order_id, Some(OrderId::new(31)));
        assert!(n.message.contains("#31"));
    }
}
