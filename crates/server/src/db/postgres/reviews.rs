use async_trait::async_trait;
use sqlx::PgConnection;

use cravecart_core::{FoodId, Page, ReviewId, UserId};

use super::{PgStore, limit_offset, to_total};
use crate::db::{PageOf, RepositoryError, ReviewRepository, conflict_on_unique};
use crate::models::{NewReview, Review, ReviewUpdate, ReviewVotes};

const REVIEW_COLUMNS: &str = "id, user_id, food_id, order_id, rating, title, comment, \
     helpful, unhelpful, verified, created_at, updated_at";

/// Fold one more rating into the dish average.
async fn add_rating(
    conn: &mut PgConnection,
    food: FoodId,
    rating: i16,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE food SET \
             rating = ROUND((rating * review_count + $2) / (review_count + 1), 2), \
             review_count = review_count + 1, \
             updated_at = now() \
         WHERE id = $1",
    )
    .bind(food)
    .bind(rating)
    .execute(conn)
    .await?;
    Ok(())
}

#[async_trait]
impl ReviewRepository for PgStore {
    async fn create_review(
        &self,
        user: UserId,
        review: &NewReview,
    ) -> Result<Review, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let created = sqlx::query_as::<_, Review>(&format!(
            "INSERT INTO review (user_id, food_id, order_id, rating, title, comment, verified) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {REVIEW_COLUMNS}"
        ))
        .bind(user)
        .bind(review.food_id)
        .bind(review.order_id)
        .bind(review.rating)
        .bind(&review.title)
        .bind(review.comment.as_deref().unwrap_or_default())
        .bind(review.order_id.is_some())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, "review"))?;

        add_rating(&mut tx, review.food_id, review.rating).await?;
        tx.commit().await?;
        Ok(created)
    }

    async fn get_review(&self, id: ReviewId) -> Result<Option<Review>, RepositoryError> {
        let review = sqlx::query_as::<_, Review>(&format!(
            "SELECT {REVIEW_COLUMNS} FROM review WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(review)
    }

    async fn list_food_reviews(
        &self,
        food: FoodId,
        page: Page,
    ) -> Result<PageOf<Review>, RepositoryError> {
        let (limit, offset) = limit_offset(page);
        let reviews = sqlx::query_as::<_, Review>(&format!(
            "SELECT {REVIEW_COLUMNS} FROM review WHERE food_id = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"
        ))
        .bind(food)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM review WHERE food_id = $1")
            .bind(food)
            .fetch_one(&self.pool)
            .await?;
        Ok((reviews, to_total(total)))
    }

    async fn list_user_reviews(
        &self,
        user: UserId,
        page: Page,
    ) -> Result<PageOf<Review>, RepositoryError> {
        let (limit, offset) = limit_offset(page);
        let reviews = sqlx::query_as::<_, Review>(&format!(
            "SELECT {REVIEW_COLUMNS} FROM review WHERE user_id = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"
        ))
        .bind(user)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM review WHERE user_id = $1")
            .bind(user)
            .fetch_one(&self.pool)
            .await?;
        Ok((reviews, to_total(total)))
    }

    async fn update_review(
        &self,
        id: ReviewId,
        update: &ReviewUpdate,
    ) -> Result<Review, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let old_rating: i16 =
            sqlx::query_scalar("SELECT rating FROM review WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(RepositoryError::NotFound)?;

        let updated = sqlx::query_as::<_, Review>(&format!(
            "UPDATE review SET \
                 title = COALESCE($2, title), \
                 comment = COALESCE($3, comment), \
                 rating = COALESCE($4, rating), \
                 updated_at = now() \
             WHERE id = $1 \
             RETURNING {REVIEW_COLUMNS}"
        ))
        .bind(id)
        .bind(update.title.as_deref())
        .bind(update.comment.as_deref())
        .bind(update.rating)
        .fetch_one(&mut *tx)
        .await?;

        if updated.rating != old_rating {
            sqlx::query(
                "UPDATE food SET \
                     rating = GREATEST(0, LEAST(5, \
                         ROUND((rating * review_count - $2 + $3) / review_count, 2))), \
                     updated_at = now() \
                 WHERE id = $1 AND review_count > 0",
            )
            .bind(updated.food_id)
            .bind(old_rating)
            .bind(updated.rating)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(updated)
    }

    async fn delete_review(&self, id: ReviewId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let (food, rating): (FoodId, i16) =
            sqlx::query_as("DELETE FROM review WHERE id = $1 RETURNING food_id, rating")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(RepositoryError::NotFound)?;

        sqlx::query(
            "UPDATE food SET \
                 rating = CASE WHEN review_count <= 1 THEN 0 ELSE GREATEST(0, LEAST(5, \
                     ROUND((rating * review_count - $2) / (review_count - 1), 2))) END, \
                 review_count = GREATEST(review_count - 1, 0), \
                 updated_at = now() \
             WHERE id = $1",
        )
        .bind(food)
        .bind(rating)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn vote_review(
        &self,
        id: ReviewId,
        helpful: bool,
    ) -> Result<Option<ReviewVotes>, RepositoryError> {
        let votes = sqlx::query_as::<_, ReviewVotes>(
            "UPDATE review SET \
                 helpful = helpful + CASE WHEN $2 THEN 1 ELSE 0 END, \
                 unhelpful = unhelpful + CASE WHEN $2 THEN 0 ELSE 1 END \
             WHERE id = $1 \
             RETURNING helpful, unhelpful",
        )
        .bind(id)
        .bind(helpful)
        .fetch_optional(&self.pool)
        .await?;
        Ok(votes)
    }
}
