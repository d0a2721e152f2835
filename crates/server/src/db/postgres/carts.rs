use async_trait::async_trait;

use cravecart_core::{FoodId, UserId};

use super::{PgStore, from_db_quantity, to_db_quantity};
use crate::db::{CartRepository, RepositoryError, quantity_too_large};
use crate::models::CartEntry;

#[derive(sqlx::FromRow)]
pub(super) struct CartRow {
    pub food_id: FoodId,
    pub quantity: i32,
}

impl TryFrom<CartRow> for CartEntry {
    type Error = RepositoryError;

    fn try_from(row: CartRow) -> Result<Self, Self::Error> {
        Ok(Self {
            food_id: row.food_id,
            quantity: from_db_quantity(row.quantity)?,
        })
    }
}

#[async_trait]
impl CartRepository for PgStore {
    async fn cart_entries(&self, user: UserId) -> Result<Vec<CartEntry>, RepositoryError> {
        sqlx::query_as::<_, CartRow>(
            "SELECT food_id, quantity FROM cart_entry WHERE user_id = $1 ORDER BY food_id",
        )
        .bind(user)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(CartEntry::try_from)
        .collect()
    }

    async fn increment_cart_item(
        &self,
        user: UserId,
        food: FoodId,
        by: u32,
    ) -> Result<u32, RepositoryError> {
        let quantity: i32 = sqlx::query_scalar(
            "INSERT INTO cart_entry (user_id, food_id, quantity) VALUES ($1, $2, $3) \
             ON CONFLICT (user_id, food_id) \
             DO UPDATE SET quantity = cart_entry.quantity + EXCLUDED.quantity, updated_at = now() \
             RETURNING quantity",
        )
        .bind(user)
        .bind(food)
        .bind(to_db_quantity(by)?)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| overflow_as_conflict(e, by))?;
        from_db_quantity(quantity)
    }

    async fn set_cart_quantity(
        &self,
        user: UserId,
        food: FoodId,
        quantity: u32,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE cart_entry SET quantity = $3, updated_at = now() \
             WHERE user_id = $1 AND food_id = $2",
        )
        .bind(user)
        .bind(food)
        .bind(to_db_quantity(quantity)?)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove_cart_item(&self, user: UserId, food: FoodId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM cart_entry WHERE user_id = $1 AND food_id = $2")
            .bind(user)
            .bind(food)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn clear_cart(&self, user: UserId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM cart_entry WHERE user_id = $1")
            .bind(user)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// `numeric_value_out_of_range`: the summed quantity no longer fits the column.
fn overflow_as_conflict(e: sqlx::Error, by: u32) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.code().as_deref() == Some("22003")
    {
        return quantity_too_large(format!("current + {by}"));
    }
    RepositoryError::Database(e)
}
