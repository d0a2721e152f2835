//! Notification feed handlers.

use axum::extract::State;
use serde::{Deserialize, Serialize};

use cravecart_core::{NotificationId, Page};

use super::{ApiPath, ApiQuery};
use crate::db::NotificationRepository;
use crate::error::AppError;
use crate::middleware::RequireAuth;
use crate::models::Notification;
use crate::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct NotificationQuery {
    pub read: Option<bool>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCount {
    pub unread_count: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkedRead {
    pub updated_count: u64,
}

pub async fn list(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiQuery(query): ApiQuery<NotificationQuery>,
) -> Result<ApiResponse<Vec<Notification>>, AppError> {
    let page = Page::new(query.page, query.limit)?;
    let (notifications, total) = state
        .store()
        .list_notifications(user.id, query.read, page)
        .await?;
    Ok(ApiResponse::paginated(
        "Notifications retrieved",
        notifications,
        page.describe(total),
    ))
}

pub async fn unread_count(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<ApiResponse<UnreadCount>, AppError> {
    let unread_count = state.store().unread_count(user.id).await?;
    Ok(ApiResponse::ok(
        "Unread count retrieved",
        UnreadCount { unread_count },
    ))
}

/// Mark one of the caller's notifications read.
pub async fn mark_read(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiPath(id): ApiPath<NotificationId>,
) -> Result<ApiResponse<Notification>, AppError> {
    let not_found = || AppError::NotFound("Notification not found".to_string());
    let store = state.store();

    let notification = store.get_notification(id).await?.ok_or_else(not_found)?;
    if notification.user_id != user.id {
        return Err(AppError::Forbidden(
            "Not authorized to access this notification".to_string(),
        ));
    }
    let updated = store
        .mark_notification_read(id)
        .await?
        .ok_or_else(not_found)?;
    Ok(ApiResponse::ok("Notification marked as read", updated))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<ApiResponse<MarkedRead>, AppError> {
    let updated_count = state.store().mark_all_read(user.id).await?;
    tracing::debug!(user_id = %user.id, updated_count, "Notifications marked read");
    Ok(ApiResponse::ok(
        "All notifications marked as read",
        MarkedRead { updated_count },
    ))
}
