//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers return `Result<T, AppError>`.
//!
//! Every error is rendered as the API error envelope:
//!
//! ```json
//! { "success": false, "message": "...", "code": "already_used", "timestamp": "..." }
//! ```

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use cravecart_core::promo::PromoDefinitionError;
use cravecart_core::{PageError, PromoRejection, TransitionError};

use crate::db::RepositoryError;
use crate::services::auth::AuthError;
use crate::services::payment::PaymentError;

/// Application-level error type for the API.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Payment gateway call failed.
    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),

    /// Promo code cannot be used.
    #[error("{0}")]
    Promo(#[from] PromoRejection),

    /// Order status change not allowed.
    #[error("{0}")]
    Transition(#[from] TransitionError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Dish exists but cannot be ordered right now.
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated, but not allowed to touch this resource.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Duplicate or concurrently modified resource.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Resource is in the wrong state for the operation.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The gateway reported that the customer's payment failed.
    #[error("Payment failed: {0}")]
    PaymentFailed(String),

    /// Rate limited.
    #[error("Rate limited")]
    RateLimited,

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<PageError> for AppError {
    fn from(err: PageError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

impl From<PromoDefinitionError> for AppError {
    fn from(err: PromoDefinitionError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(err: JsonRejection) -> Self {
        Self::BadRequest(err.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(err: QueryRejection) -> Self {
        Self::BadRequest(err.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(err: PathRejection) -> Self {
        Self::BadRequest(err.body_text())
    }
}

/// Body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
    pub code: &'static str,
    pub timestamp: DateTime<Utc>,
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Database(err) => match err {
                RepositoryError::NotFound => StatusCode::NOT_FOUND,
                RepositoryError::Conflict(_) => StatusCode::CONFLICT,
                RepositoryError::Database(_) | RepositoryError::DataCorruption(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::Auth(err) => match err {
                AuthError::InvalidCredentials
                | AuthError::MissingToken
                | AuthError::InvalidToken
                | AuthError::UserNotFound => StatusCode::UNAUTHORIZED,
                AuthError::UserAlreadyExists => StatusCode::CONFLICT,
                AuthError::WeakPassword(_) | AuthError::InvalidEmail(_) | AuthError::MissingName => {
                    StatusCode::BAD_REQUEST
                }
                AuthError::Repository(_) | AuthError::PasswordHash | AuthError::TokenIssue(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::Payment(_) => StatusCode::BAD_GATEWAY,
            Self::Promo(PromoRejection::NotFound) | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Promo(_) | Self::BadRequest(_) | Self::PaymentFailed(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Transition(_)
            | Self::Unavailable(_)
            | Self::Conflict(_)
            | Self::InvalidState(_) => StatusCode::CONFLICT,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable identifier sent as `code`.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Database(err) => match err {
                RepositoryError::NotFound => "not_found",
                RepositoryError::Conflict(_) => "conflict",
                RepositoryError::Database(_) | RepositoryError::DataCorruption(_) => {
                    "internal_error"
                }
            },
            Self::Auth(err) => match err {
                AuthError::InvalidCredentials => "invalid_credentials",
                AuthError::MissingToken | AuthError::InvalidToken | AuthError::UserNotFound => {
                    "unauthorized"
                }
                AuthError::UserAlreadyExists => "conflict",
                AuthError::WeakPassword(_) | AuthError::InvalidEmail(_) | AuthError::MissingName => {
                    "invalid_input"
                }
                AuthError::Repository(_) | AuthError::PasswordHash | AuthError::TokenIssue(_) => {
                    "internal_error"
                }
            },
            Self::Payment(_) => "upstream_failure",
            Self::Promo(rejection) => rejection.code(),
            Self::Transition(_) => "invalid_transition",
            Self::NotFound(_) => "not_found",
            Self::Unavailable(_) => "unavailable",
            Self::BadRequest(_) => "invalid_input",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::Conflict(_) => "conflict",
            Self::InvalidState(_) => "invalid_state",
            Self::PaymentFailed(_) => "payment_failed",
            Self::RateLimited => "rate_limited",
            Self::Internal(_) => "internal_error",
        }
    }

    fn is_server_error(&self) -> bool {
        self.status().is_server_error()
    }

    /// Message safe to show to clients.
    fn public_message(&self) -> String {
        match self {
            Self::Database(RepositoryError::NotFound) => "Not found".to_string(),
            Self::Database(RepositoryError::Conflict(msg)) => msg.clone(),
            Self::Database(_) | Self::Internal(_) => "Internal server error".to_string(),
            Self::Payment(_) => "Payment service unavailable".to_string(),
            Self::Auth(err) => match err {
                AuthError::InvalidCredentials | AuthError::UserNotFound => {
                    "Invalid credentials".to_string()
                }
                AuthError::MissingToken => "Authentication required".to_string(),
                AuthError::InvalidToken => "Invalid or expired token".to_string(),
                AuthError::UserAlreadyExists => {
                    "An account with this email already exists".to_string()
                }
                AuthError::WeakPassword(msg) => msg.clone(),
                AuthError::InvalidEmail(_) => "Invalid email address".to_string(),
                AuthError::MissingName => "Name is required".to_string(),
                AuthError::Repository(_) | AuthError::PasswordHash | AuthError::TokenIssue(_) => {
                    "Authentication error".to_string()
                }
            },
            Self::Promo(rejection) => rejection.to_string(),
            Self::Transition(err) => err.to_string(),
            Self::NotFound(msg)
            | Self::Unavailable(msg)
            | Self::BadRequest(msg)
            | Self::Unauthorized(msg)
            | Self::Forbidden(msg)
            | Self::Conflict(msg)
            | Self::InvalidState(msg)
            | Self::PaymentFailed(msg) => msg.clone(),
            Self::RateLimited => "Too many requests".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if self.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let body = ErrorBody {
            success: false,
            message: self.public_message(),
            code: self.code(),
            timestamp: Utc::now(),
        };

        (self.status(), Json(body)).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Called by the auth extractor so errors are associated with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("order", "Order placed", Some(&[("order_id", "42")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use cravecart_core::OrderStatus;

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("food 12".to_string());
        assert_eq!(err.to_string(), "Not found: food 12");

        let err = AppError::BadRequest("invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: invalid input");
    }

    #[test]
    fn test_app_error_status_codes() {
        fn get_status(err: AppError) -> StatusCode {
            err.into_response().status()
        }

        assert_eq!(
            get_status(AppError::NotFound("test".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(AppError::Unavailable("test".to_string())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(AppError::Forbidden("test".to_string())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            get_status(AppError::InvalidState("test".to_string())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(AppError::RateLimited),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            get_status(AppError::Internal("test".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            get_status(AppError::Database(RepositoryError::NotFound)),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn promo_rejections_keep_their_reason_codes() {
        let missing = AppError::from(PromoRejection::NotFound);
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        assert_eq!(missing.code(), "promo_not_found");

        let used = AppError::from(PromoRejection::AlreadyUsed);
        assert_eq!(used.status(), StatusCode::BAD_REQUEST);
        assert_eq!(used.code(), "already_used");
    }

    #[test]
    fn transitions_are_conflicts() {
        let err = AppError::from(TransitionError {
            from: OrderStatus::Delivered,
            to: OrderStatus::Cancelled,
        });
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.code(), "invalid_transition");
        assert_eq!(
            err.public_message(),
            "cannot move order from Delivered to Cancelled"
        );
    }

    #[test]
    fn internal_details_are_hidden() {
        let err = AppError::Database(RepositoryError::DataCorruption("bad row 7".into()));
        assert_eq!(err.public_message(), "Internal server error");
        assert_eq!(err.code(), "internal_error");
    }

    #[tokio::test]
    async fn error_body_is_the_failure_envelope() {
        let response = AppError::Conflict("already rated".into()).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["code"], "conflict");
        assert_eq!(json["message"], "already rated");
        assert!(json["timestamp"].is_string());
    }
}
