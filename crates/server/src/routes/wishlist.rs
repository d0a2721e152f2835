//! Wishlist route handlers. All of them need a signed-in user.

use axum::extract::State;

use cravecart_core::FoodId;

use super::ApiPath;
use crate::error::AppError;
use crate::middleware::RequireAuth;
use crate::models::WishlistItem;
use crate::response::ApiResponse;
use crate::state::AppState;

pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<ApiResponse<Vec<WishlistItem>>, AppError> {
    let items = state.wishlist().items(user.id).await?;
    Ok(ApiResponse::ok("Wishlist retrieved", items))
}

pub async fn add(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiPath(food_id): ApiPath<FoodId>,
) -> Result<ApiResponse<Vec<WishlistItem>>, AppError> {
    let (added, items) = state.wishlist().add(user.id, food_id).await?;
    let message = if added {
        "Added to wishlist"
    } else {
        "Already in wishlist"
    };
    Ok(ApiResponse::ok(message, items))
}

pub async fn remove(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiPath(food_id): ApiPath<FoodId>,
) -> Result<ApiResponse<Vec<WishlistItem>>, AppError> {
    let items = state.wishlist().remove(user.id, food_id).await?;
    Ok(ApiResponse::ok("Removed from wishlist", items))
}

pub async fn clear(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<ApiResponse<()>, AppError> {
    state.wishlist().clear(user.id).await?;
    Ok(ApiResponse::message("Wishlist cleared"))
}
