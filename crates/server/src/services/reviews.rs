//! Dish reviews.
//!
//! Anyone may read reviews; writing one needs an account. A review that names
//! an order must name the author's own delivered order containing the dish,
//! and is then marked verified. Every rating also lands in the dish's running
//! average, the same one delivered-order ratings feed.

use tracing::instrument;

use cravecart_core::pagination::{DEFAULT_LIMIT, MAX_LIMIT};
use cravecart_core::{FoodId, Page, ReviewId, UserId};

use super::cart::food_not_found;
use crate::db::{
    FoodRepository, OrderRepository, PageOf, RepositoryError, ReviewRepository, Store,
};
use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::models::{FoodItem, NewReview, Review, ReviewUpdate, ReviewVotes};

/// Review operations for one request.
pub struct ReviewService<'a> {
    store: &'a dyn Store,
}

impl<'a> ReviewService<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// # Errors
    ///
    /// - `BadRequest` for a blank title, a rating outside 1-5 or a dish the
    ///   named order does not contain
    /// - `NotFound` for an unknown dish or order
    /// - `Forbidden` for someone else's order
    /// - `InvalidState` for an order that is not delivered
    /// - `Conflict` when the user already reviewed the dish
    #[instrument(skip(self, actor, review), fields(user_id = %actor.id, food_id = %review.food_id))]
    pub async fn create(&self, actor: &AuthUser, review: NewReview) -> Result<Review, AppError> {
        let review = review.normalized().map_err(AppError::BadRequest)?;
        self.load_food(review.food_id).await?;

        if let Some(order_id) = review.order_id {
            let order = self
                .store
                .get_order(order_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Order {order_id} not found")))?;
            if order.user_id != actor.id {
                return Err(AppError::Forbidden(
                    "Not authorized to access this order".to_string(),
                ));
            }
            if !order.status.accepts_rating() {
                return Err(AppError::InvalidState(
                    "Only delivered orders can be reviewed".to_string(),
                ));
            }
            if !order.items.iter().any(|line| line.food_id == review.food_id) {
                return Err(AppError::BadRequest(
                    "This dish is not part of the order".to_string(),
                ));
            }
        }

        let created = self
            .store
            .create_review(actor.id, &review)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => {
                    AppError::Conflict("You have already reviewed this dish".to_string())
                }
                other => other.into(),
            })?;
        tracing::info!(review_id = %created.id, rating = created.rating, "Review created");
        Ok(created)
    }

    /// # Errors
    ///
    /// `NotFound` for an unknown dish.
    pub async fn for_food(&self, food: FoodId, page: Page) -> Result<PageOf<Review>, AppError> {
        self.load_food(food).await?;
        Ok(self.store.list_food_reviews(food, page).await?)
    }

    pub async fn for_user(&self, user: UserId, page: Page) -> Result<PageOf<Review>, AppError> {
        Ok(self.store.list_user_reviews(user, page).await?)
    }

    /// # Errors
    ///
    /// `NotFound` for an unknown review.
    pub async fn get(&self, id: ReviewId) -> Result<Review, AppError> {
        self.store
            .get_review(id)
            .await?
            .ok_or_else(|| review_not_found(id))
    }

    /// Edit one's own review.
    ///
    /// # Errors
    ///
    /// `NotFound`, `Forbidden` for someone else's review, `BadRequest` for
    /// invalid fields.
    #[instrument(skip(self, actor, update), fields(user_id = %actor.id))]
    pub async fn update(
        &self,
        actor: &AuthUser,
        id: ReviewId,
        update: ReviewUpdate,
    ) -> Result<Review, AppError> {
        let review = self.get(id).await?;
        if review.user_id != actor.id {
            return Err(not_your_review());
        }
        let update = update.normalized().map_err(AppError::BadRequest)?;
        let updated = self.store.update_review(id, &update).await?;
        tracing::info!(review_id = %id, "Review updated");
        Ok(updated)
    }

    /// Delete a review. Admins may delete any review.
    ///
    /// # Errors
    ///
    /// `NotFound`, `Forbidden` for someone else's review.
    #[instrument(skip(self, actor), fields(user_id = %actor.id))]
    pub async fn delete(&self, actor: &AuthUser, id: ReviewId) -> Result<(), AppError> {
        let review = self.get(id).await?;
        if !actor.can_access(review.user_id) {
            return Err(not_your_review());
        }
        self.store.delete_review(id).await?;
        tracing::info!(review_id = %id, "Review deleted");
        Ok(())
    }

    /// # Errors
    ///
    /// `NotFound` for an unknown review.
    pub async fn vote(&self, id: ReviewId, helpful: bool) -> Result<ReviewVotes, AppError> {
        self.store
            .vote_review(id, helpful)
            .await?
            .ok_or_else(|| review_not_found(id))
    }

    /// Best rated dishes; `limit` defaults to 10 and is capped at 100.
    pub async fn top_rated(&self, limit: Option<u32>) -> Result<Vec<FoodItem>, AppError> {
        let limit = limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        Ok(self.store.top_rated_foods(limit).await?)
    }

    async fn load_food(&self, id: FoodId) -> Result<FoodItem, AppError> {
        self.store
            .get_food(id)
            .await?
            .ok_or_else(|| food_not_found(id))
    }
}

fn review_not_found(id: ReviewId) -> AppError {
    AppError::NotFound(format!("Review {id} not found"))
}

fn not_your_review() -> AppError {
    AppError::Forbidden("Not authorized to change this review".to_string())
}
