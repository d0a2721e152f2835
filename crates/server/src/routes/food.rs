//! Catalog route handlers.

use axum::extract::State;
use serde::Deserialize;
use tracing::instrument;

use cravecart_core::{FoodId, Page};

use super::{ApiJson, ApiPath, ApiQuery};
use crate::db::FoodRepository;
use crate::error::AppError;
use crate::middleware::RequireAdmin;
use crate::models::{FoodFilter, FoodItem, FoodUpdate, NewFoodItem};
use crate::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct FoodQuery {
    pub category: Option<String>,
    pub search: Option<String>,
    pub available: Option<bool>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl FoodQuery {
    fn filter(self) -> FoodFilter {
        let non_blank = |s: Option<String>| s.map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());
        FoodFilter {
            // The web client sends "All" for no category filter.
            category: non_blank(self.category).filter(|c| !c.eq_ignore_ascii_case("all")),
            search: non_blank(self.search),
            available: self.available,
        }
    }
}

/// Filtered, paginated dishes, newest first.
pub async fn list(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<FoodQuery>,
) -> Result<ApiResponse<Vec<FoodItem>>, AppError> {
    let page = Page::new(query.page, query.limit)?;
    let (foods, total) = state.store().list_foods(&query.filter(), page).await?;
    Ok(ApiResponse::paginated(
        "Food items retrieved",
        foods,
        page.describe(total),
    ))
}

pub async fn categories(
    State(state): State<AppState>,
) -> Result<ApiResponse<Vec<String>>, AppError> {
    let categories = state.store().food_categories().await?;
    Ok(ApiResponse::ok("Categories retrieved", categories))
}

pub async fn show(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<FoodId>,
) -> Result<ApiResponse<FoodItem>, AppError> {
    let food = state
        .store()
        .get_food(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Food item {id} not found")))?;
    Ok(ApiResponse::ok("Food item retrieved", food))
}

#[instrument(skip(state, admin, food), fields(admin_id = %admin.id))]
pub async fn create(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiJson(food): ApiJson<NewFoodItem>,
) -> Result<ApiResponse<FoodItem>, AppError> {
    food.validate()
        .map_err(|msg| AppError::BadRequest(msg.to_string()))?;
    let created = state.store().create_food(&food).await?;
    tracing::info!(food_id = %created.id, name = %created.name, "Food item created");
    Ok(ApiResponse::created("Food item added", created))
}

#[instrument(skip(state, admin, update), fields(admin_id = %admin.id))]
pub async fn update(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<FoodId>,
    ApiJson(update): ApiJson<FoodUpdate>,
) -> Result<ApiResponse<FoodItem>, AppError> {
    update
        .validate()
        .map_err(|msg| AppError::BadRequest(msg.to_string()))?;
    let updated = state.store().update_food(id, &update).await?;
    tracing::info!(food_id = %id, "Food item updated");
    Ok(ApiResponse::ok("Food item updated", updated))
}

#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn remove(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<FoodId>,
) -> Result<ApiResponse<()>, AppError> {
    state.store().delete_food(id).await?;
    tracing::info!(food_id = %id, "Food item removed");
    Ok(ApiResponse::message("Food item removed"))
}
