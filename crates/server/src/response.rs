//! Success envelope for JSON responses.
//!
//! Every successful response has the shape
//! `{success: true, message, data?, pagination?, timestamp}`; failures use
//! [`ErrorBody`](crate::error::ErrorBody).

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use cravecart_core::Paginated;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Paginated>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip)]
    status: StatusCode,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            pagination: None,
            timestamp: Utc::now(),
            status: StatusCode::OK,
        }
    }

    pub fn created(message: impl Into<String>, data: T) -> Self {
        Self {
            status: StatusCode::CREATED,
            ..Self::ok(message, data)
        }
    }

    pub fn paginated(message: impl Into<String>, data: T, pagination: Paginated) -> Self {
        Self {
            pagination: Some(pagination),
            ..Self::ok(message, data)
        }
    }
}

impl ApiResponse<()> {
    /// A response with a message and no data.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
            pagination: None,
            timestamp: Utc::now(),
            status: StatusCode::OK,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use cravecart_core::Page;

    #[test]
    fn optional_fields_are_omitted() {
        let body = serde_json::to_value(ApiResponse::message("Cart cleared")).unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "Cart cleared");
        assert!(body.get("data").is_none());
        assert!(body.get("pagination").is_none());
        assert!(body.get("status").is_none());
    }

    #[test]
    fn pagination_is_included() {
        let page = Page::new(Some(2), Some(5)).unwrap();
        let body =
            serde_json::to_value(ApiResponse::paginated("Orders", vec![1, 2], page.describe(12)))
                .unwrap();
        assert_eq!(body["pagination"]["page"], 2);
        assert_eq!(body["pagination"]["pages"], 3);
        assert_eq!(body["data"], serde_json::json!([1, 2]));
    }

    #[test]
    fn created_uses_201() {
        let response = ApiResponse::created("Created", 7).into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
    }
}
