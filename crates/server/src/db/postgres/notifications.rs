use async_trait::async_trait;

use cravecart_core::{NotificationId, Page, UserId};

use super::{PgStore, limit_offset, to_total};
use crate::db::{NotificationRepository, PageOf, RepositoryError};
use crate::models::{NewNotification, Notification};

const NOTIFICATION_COLUMNS: &str =
    "id, user_id, order_id, kind, title, message, priority, read, created_at, read_at";

#[async_trait]
impl NotificationRepository for PgStore {
    async fn insert_notification(
        &self,
        notification: &NewNotification,
    ) -> Result<Notification, RepositoryError> {
        let created = sqlx::query_as::<_, Notification>(&format!(
            "INSERT INTO notification (user_id, order_id, kind, title, message, priority) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {NOTIFICATION_COLUMNS}"
        ))
        .bind(notification.user_id)
        .bind(notification.order_id)
        .bind(notification.kind)
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(notification.priority)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn list_notifications(
        &self,
        user: UserId,
        read: Option<bool>,
        page: Page,
    ) -> Result<PageOf<Notification>, RepositoryError> {
        let (limit, offset) = limit_offset(page);
        let notifications = sqlx::query_as::<_, Notification>(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notification \
             WHERE user_id = $1 AND ($2::bool IS NULL OR read = $2) \
             ORDER BY created_at DESC, id DESC LIMIT $3 OFFSET $4"
        ))
        .bind(user)
        .bind(read)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notification \
             WHERE user_id = $1 AND ($2::bool IS NULL OR read = $2)",
        )
        .bind(user)
        .bind(read)
        .fetch_one(&self.pool)
        .await?;

        Ok((notifications, to_total(total)))
    }

    async fn unread_count(&self, user: UserId) -> Result<u64, RepositoryError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM notification WHERE user_id = $1 AND NOT read")
                .bind(user)
                .fetch_one(&self.pool)
                .await?;
        Ok(to_total(count))
    }

    async fn get_notification(
        &self,
        id: NotificationId,
    ) -> Result<Option<Notification>, RepositoryError> {
        let notification = sqlx::query_as::<_, Notification>(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notification WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(notification)
    }

    async fn mark_notification_read(
        &self,
        id: NotificationId,
    ) -> Result<Option<Notification>, RepositoryError> {
        // Keep the first read_at when marked twice.
        let notification = sqlx::query_as::<_, Notification>(&format!(
            "UPDATE notification SET read = TRUE, read_at = COALESCE(read_at, now()) \
             WHERE id = $1 \
             RETURNING {NOTIFICATION_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(notification)
    }

    async fn mark_all_read(&self, user: UserId) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "UPDATE notification SET read = TRUE, read_at = now() WHERE user_id = $1 AND NOT read",
        )
        .bind(user)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
