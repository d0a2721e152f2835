//! Review route handlers.
//!
//! Listing a dish's reviews and the top-rated dishes are public; everything
//! else needs a signed-in user.

use axum::body::Bytes;
use axum::extract::State;
use serde::Deserialize;

use cravecart_core::{FoodId, Page, ReviewId};

use super::order::optional_json;
use super::{ApiJson, ApiPath, ApiQuery};
use crate::error::AppError;
use crate::middleware::RequireAuth;
use crate::models::{FoodItem, NewReview, Review, ReviewUpdate, ReviewVotes};
use crate::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TopRatedQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct VoteForm {
    #[serde(default = "yes")]
    pub helpful: bool,
}

const fn yes() -> bool {
    true
}

impl Default for VoteForm {
    fn default() -> Self {
        Self { helpful: true }
    }
}

pub async fn create(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiJson(review): ApiJson<NewReview>,
) -> Result<ApiResponse<Review>, AppError> {
    let created = state.reviews().create(&user, review).await?;
    Ok(ApiResponse::created("Review created successfully", created))
}

pub async fn for_food(
    State(state): State<AppState>,
    ApiPath(food_id): ApiPath<FoodId>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> Result<ApiResponse<Vec<Review>>, AppError> {
    let page = Page::new(query.page, query.limit)?;
    let (reviews, total) = state.reviews().for_food(food_id, page).await?;
    Ok(ApiResponse::paginated(
        "Food reviews retrieved",
        reviews,
        page.describe(total),
    ))
}

pub async fn list_own(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> Result<ApiResponse<Vec<Review>>, AppError> {
    let page = Page::new(query.page, query.limit)?;
    let (reviews, total) = state.reviews().for_user(user.id, page).await?;
    Ok(ApiResponse::paginated(
        "User reviews retrieved",
        reviews,
        page.describe(total),
    ))
}

pub async fn show(
    State(state): State<AppState>,
    RequireAuth(_user): RequireAuth,
    ApiPath(id): ApiPath<ReviewId>,
) -> Result<ApiResponse<Review>, AppError> {
    let review = state.reviews().get(id).await?;
    Ok(ApiResponse::ok("Review retrieved", review))
}

pub async fn update(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiPath(id): ApiPath<ReviewId>,
    ApiJson(update): ApiJson<ReviewUpdate>,
) -> Result<ApiResponse<Review>, AppError> {
    let review = state.reviews().update(&user, id, update).await?;
    Ok(ApiResponse::ok("Review updated successfully", review))
}

pub async fn remove(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiPath(id): ApiPath<ReviewId>,
) -> Result<ApiResponse<()>, AppError> {
    state.reviews().delete(&user, id).await?;
    Ok(ApiResponse::message("Review deleted successfully"))
}

/// Body is optional; an empty one counts as a helpful vote.
pub async fn vote(
    State(state): State<AppState>,
    RequireAuth(_user): RequireAuth,
    ApiPath(id): ApiPath<ReviewId>,
    body: Bytes,
) -> Result<ApiResponse<ReviewVotes>, AppError> {
    let form: VoteForm = optional_json(&body)?;
    let votes = state.reviews().vote(id, form.helpful).await?;
    Ok(ApiResponse::ok("Review marked", votes))
}

pub async fn top_rated(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<TopRatedQuery>,
) -> Result<ApiResponse<Vec<FoodItem>>, AppError> {
    let foods = state.reviews().top_rated(query.limit).await?;
    Ok(ApiResponse::ok("Top rated foods retrieved", foods))
}
