use async_trait::async_trait;

use cravecart_core::{FoodId, UserId};

use super::PgStore;
use crate::db::{RepositoryError, WishlistRepository};
use crate::models::WishlistEntry;

#[async_trait]
impl WishlistRepository for PgStore {
    async fn wishlist(&self, user: UserId) -> Result<Vec<WishlistEntry>, RepositoryError> {
        let entries = sqlx::query_as::<_, WishlistEntry>(
            "SELECT food_id, added_at FROM wishlist_entry WHERE user_id = $1 \
             ORDER BY added_at DESC, food_id",
        )
        .bind(user)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    async fn add_to_wishlist(&self, user: UserId, food: FoodId) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO wishlist_entry (user_id, food_id) VALUES ($1, $2) \
             ON CONFLICT (user_id, food_id) DO NOTHING",
        )
        .bind(user)
        .bind(food)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove_from_wishlist(
        &self,
        user: UserId,
        food: FoodId,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM wishlist_entry WHERE user_id = $1 AND food_id = $2")
            .bind(user)
            .bind(food)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn clear_wishlist(&self, user: UserId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM wishlist_entry WHERE user_id = $1")
            .bind(user)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
