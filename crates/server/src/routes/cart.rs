//! Cart route handlers.
//!
//! Every cart endpoint requires a signed-in user; the cart is keyed by the
//! token's user id.

use axum::extract::State;
use serde::Deserialize;

use cravecart_core::{FoodId, PriceBreakdown};

use super::{ApiJson, ApiPath};
use crate::error::AppError;
use crate::middleware::RequireAuth;
use crate::models::CartView;
use crate::response::ApiResponse;
use crate::services::cart::CartUpdate;
use crate::state::AppState;

const fn one() -> i64 {
    1
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddToCart {
    pub food_id: FoodId,
    #[serde(default = "one")]
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveFromCart {
    pub food_id: FoodId,
}

#[derive(Debug, Deserialize)]
pub struct SetQuantity {
    pub quantity: i64,
}

pub async fn add(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiJson(form): ApiJson<AddToCart>,
) -> Result<ApiResponse<CartUpdate>, AppError> {
    let update = state
        .carts()
        .add_item(user.id, form.food_id, form.quantity)
        .await?;
    Ok(ApiResponse::ok("Item added to cart", update))
}

pub async fn remove(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiJson(form): ApiJson<RemoveFromCart>,
) -> Result<ApiResponse<CartView>, AppError> {
    let cart = state.carts().remove_item(user.id, form.food_id).await?;
    Ok(ApiResponse::ok("Item removed from cart", cart))
}

pub async fn set_quantity(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiPath(food_id): ApiPath<FoodId>,
    ApiJson(form): ApiJson<SetQuantity>,
) -> Result<ApiResponse<CartView>, AppError> {
    let cart = state
        .carts()
        .set_quantity(user.id, food_id, form.quantity)
        .await?;
    Ok(ApiResponse::ok("Cart updated", cart))
}

pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<ApiResponse<CartView>, AppError> {
    let cart = state.carts().get_cart(user.id).await?;
    Ok(ApiResponse::ok("Cart retrieved", cart))
}

pub async fn summary(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<ApiResponse<PriceBreakdown>, AppError> {
    let summary = state.carts().summary(user.id).await?;
    Ok(ApiResponse::ok("Cart summary retrieved", summary))
}

pub async fn clear(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<ApiResponse<()>, AppError> {
    state.carts().clear(user.id).await?;
    Ok(ApiResponse::message("Cart cleared"))
}
