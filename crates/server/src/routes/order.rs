//! Order route handlers.

use axum::body::Bytes;
use axum::extract::State;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::instrument;

use cravecart_core::{OrderId, OrderStatus, Page, UserId};

use super::{ApiJson, ApiPath, ApiQuery};
use crate::error::AppError;
use crate::middleware::{RequireAdmin, RequireAuth};
use crate::models::{Order, OrderFilter};
use crate::response::ApiResponse;
use crate::services::orders::{PaymentLink, PlaceOrder, PlacedOrder, Tracking};
use crate::state::AppState;

/// `true`/`false` as a JSON boolean or as the string the redirect URL carried.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Flag {
    Bool(bool),
    Text(String),
}

impl Flag {
    #[must_use]
    pub fn is_set(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Text(s) => s.trim().eq_ignore_ascii_case("true"),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPayment {
    pub order_id: OrderId,
    pub success: Flag,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelForm {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RateForm {
    pub rating: i16,
    #[serde(default)]
    pub review: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusForm {
    pub status: OrderStatus,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderQuery {
    pub status: Option<OrderStatus>,
    pub user_id: Option<UserId>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// Parse an optional JSON body; an empty body yields the default.
pub(super) fn optional_json<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| AppError::BadRequest(format!("Invalid JSON body: {e}")))
}

#[instrument(skip(state, user, form), fields(user_id = %user.id))]
pub async fn place(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiJson(form): ApiJson<PlaceOrder>,
) -> Result<ApiResponse<PlacedOrder>, AppError> {
    let placed = state.orders().place(user.id, form).await?;
    Ok(ApiResponse::created("Order placed successfully", placed))
}

#[instrument(skip(state, user, form), fields(user_id = %user.id, order_id = %form.order_id))]
pub async fn verify_payment(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiJson(form): ApiJson<VerifyPayment>,
) -> Result<ApiResponse<Order>, AppError> {
    let order = state
        .orders()
        .verify_payment(&user, form.order_id, form.success.is_set())
        .await?;
    Ok(ApiResponse::ok("Payment verified successfully", order))
}

pub async fn list_own(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiQuery(query): ApiQuery<OrderQuery>,
) -> Result<ApiResponse<Vec<Order>>, AppError> {
    let page = Page::new(query.page, query.limit)?;
    let (orders, total) = state
        .orders()
        .list_for(user.id, query.status, page)
        .await?;
    Ok(ApiResponse::paginated(
        "Orders retrieved",
        orders,
        page.describe(total),
    ))
}

pub async fn list_all(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    ApiQuery(query): ApiQuery<OrderQuery>,
) -> Result<ApiResponse<Vec<Order>>, AppError> {
    let page = Page::new(query.page, query.limit)?;
    let filter = OrderFilter {
        user_id: query.user_id,
        status: query.status,
    };
    let (orders, total) = state.orders().list_all(&filter, page).await?;
    Ok(ApiResponse::paginated(
        "Orders retrieved",
        orders,
        page.describe(total),
    ))
}

pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiPath(id): ApiPath<OrderId>,
) -> Result<ApiResponse<Order>, AppError> {
    let order = state.orders().get(&user, id).await?;
    Ok(ApiResponse::ok("Order retrieved", order))
}

pub async fn track(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiPath(id): ApiPath<OrderId>,
) -> Result<ApiResponse<Tracking>, AppError> {
    let tracking = state.orders().track(&user, id).await?;
    Ok(ApiResponse::ok("Order tracking retrieved", tracking))
}

#[instrument(skip(state, user, body), fields(user_id = %user.id))]
pub async fn cancel(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiPath(id): ApiPath<OrderId>,
    body: Bytes,
) -> Result<ApiResponse<Order>, AppError> {
    let form: CancelForm = optional_json(&body)?;
    let order = state
        .orders()
        .cancel(&user, id, form.reason.as_deref())
        .await?;
    Ok(ApiResponse::ok("Order cancelled successfully", order))
}

#[instrument(skip(state, user, form), fields(user_id = %user.id))]
pub async fn rate(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiPath(id): ApiPath<OrderId>,
    ApiJson(form): ApiJson<RateForm>,
) -> Result<ApiResponse<Order>, AppError> {
    let order = state
        .orders()
        .rate(&user, id, form.rating, form.review.as_deref())
        .await?;
    Ok(ApiResponse::ok("Thank you for your rating", order))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn retry_payment(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiPath(id): ApiPath<OrderId>,
) -> Result<ApiResponse<PaymentLink>, AppError> {
    let link = state.orders().retry_payment(&user, id).await?;
    Ok(ApiResponse::ok("Payment session created", link))
}

#[instrument(skip(state, admin, form), fields(admin_id = %admin.id, status = %form.status))]
pub async fn update_status(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<OrderId>,
    ApiJson(form): ApiJson<StatusForm>,
) -> Result<ApiResponse<Order>, AppError> {
    let order = state
        .orders()
        .update_status(id, form.status, form.message.as_deref())
        .await?;
    Ok(ApiResponse::ok("Order status updated", order))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn success_flag_accepts_strings() {
        let parse = |json: &str| serde_json::from_str::<VerifyPayment>(json).unwrap();
        assert!(parse(r#"{"orderId": 3, "success": true}"#).success.is_set());
        assert!(parse(r#"{"orderId": 3, "success": "true"}"#).success.is_set());
        assert!(!parse(r#"{"orderId": 3, "success": "false"}"#).success.is_set());
    }

    #[test]
    fn cancel_body_is_optional() {
        let empty: CancelForm = optional_json(&Bytes::new()).unwrap();
        assert!(empty.reason.is_none());
        let given: CancelForm = optional_json(&Bytes::from_static(br#"{"reason":"late"}"#)).unwrap();
        assert_eq!(given.reason.as_deref(), Some("late"));
        assert!(optional_json::<CancelForm>(&Bytes::from_static(b"{oops")).is_err());
    }
}
