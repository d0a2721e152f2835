//! Promo code route handlers.

use axum::extract::State;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::instrument;

use cravecart_core::{Page, PromoCodeId};

use super::{ApiJson, ApiPath, ApiQuery};
use crate::error::AppError;
use crate::middleware::{RequireAdmin, RequireAuth};
use crate::models::{NewPromoCode, PromoCode, PromoStats, PromoUpdate};
use crate::response::ApiResponse;
use crate::services::promo::ValidatedPromo;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateForm {
    pub code: String,
    pub order_amount: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct ApplyForm {
    pub code: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct PromoQuery {
    pub active: Option<bool>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// Codes customers can use right now.
pub async fn active(
    State(state): State<AppState>,
) -> Result<ApiResponse<Vec<PromoCode>>, AppError> {
    let promos = state.promos().list_live().await?;
    Ok(ApiResponse::ok("Active promo codes retrieved", promos))
}

pub async fn validate(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiJson(form): ApiJson<ValidateForm>,
) -> Result<ApiResponse<ValidatedPromo>, AppError> {
    let validated = state
        .promos()
        .validate(user.id, &form.code, form.order_amount)
        .await?;
    Ok(ApiResponse::ok("Promo code is valid", validated))
}

#[instrument(skip(state, user, form), fields(user_id = %user.id))]
pub async fn apply(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiJson(form): ApiJson<ApplyForm>,
) -> Result<ApiResponse<PromoCode>, AppError> {
    let promo = state.promos().apply(user.id, &form.code).await?;
    Ok(ApiResponse::ok("Promo code applied", promo))
}

pub async fn create(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    ApiJson(form): ApiJson<NewPromoCode>,
) -> Result<ApiResponse<PromoCode>, AppError> {
    let promo = state.promos().create(&form).await?;
    Ok(ApiResponse::created("Promo code created", promo))
}

pub async fn list(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    ApiQuery(query): ApiQuery<PromoQuery>,
) -> Result<ApiResponse<Vec<PromoCode>>, AppError> {
    let page = Page::new(query.page, query.limit)?;
    let (promos, total) = state.promos().list(query.active, page).await?;
    Ok(ApiResponse::paginated(
        "Promo codes retrieved",
        promos,
        page.describe(total),
    ))
}

pub async fn update(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    ApiPath(id): ApiPath<PromoCodeId>,
    ApiJson(form): ApiJson<PromoUpdate>,
) -> Result<ApiResponse<PromoCode>, AppError> {
    let promo = state.promos().update(id, &form).await?;
    Ok(ApiResponse::ok("Promo code updated", promo))
}

pub async fn remove(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    ApiPath(id): ApiPath<PromoCodeId>,
) -> Result<ApiResponse<()>, AppError> {
    state.promos().delete(id).await?;
    Ok(ApiResponse::message("Promo code deleted"))
}

pub async fn stats(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    ApiPath(id): ApiPath<PromoCodeId>,
) -> Result<ApiResponse<PromoStats>, AppError> {
    let stats = state.promos().stats(id).await?;
    Ok(ApiResponse::ok("Promo code statistics retrieved", stats))
}
