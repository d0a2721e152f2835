use async_trait::async_trait;

use cravecart_core::{FoodId, Page};

use super::{PgStore, limit_offset, to_total};
use crate::db::{FoodRepository, PageOf, RepositoryError};
use crate::models::{FoodFilter, FoodItem, FoodUpdate, NewFoodItem};

const FOOD_COLUMNS: &str = "id, name, description, price, category, available, rating, \
     review_count, discount_percent, image_url, created_at, updated_at";

const FOOD_FILTER: &str = "($1::text IS NULL OR lower(category) = lower($1)) \
     AND ($2::text IS NULL OR name ILIKE '%' || $2 || '%' OR description ILIKE '%' || $2 || '%') \
     AND ($3::bool IS NULL OR available = $3)";

#[async_trait]
impl FoodRepository for PgStore {
    async fn list_foods(
        &self,
        filter: &FoodFilter,
        page: Page,
    ) -> Result<PageOf<FoodItem>, RepositoryError> {
        let (limit, offset) = limit_offset(page);
        let foods = sqlx::query_as::<_, FoodItem>(&format!(
            "SELECT {FOOD_COLUMNS} FROM food WHERE {FOOD_FILTER} \
             ORDER BY created_at DESC, id DESC LIMIT $4 OFFSET $5"
        ))
        .bind(filter.category.as_deref())
        .bind(filter.search.as_deref())
        .bind(filter.available)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM food WHERE {FOOD_FILTER}"))
                .bind(filter.category.as_deref())
                .bind(filter.search.as_deref())
                .bind(filter.available)
                .fetch_one(&self.pool)
                .await?;

        Ok((foods, to_total(total)))
    }

    async fn food_categories(&self) -> Result<Vec<String>, RepositoryError> {
        let categories = sqlx::query_scalar("SELECT DISTINCT category FROM food ORDER BY category")
            .fetch_all(&self.pool)
            .await?;
        Ok(categories)
    }

    async fn get_food(&self, id: FoodId) -> Result<Option<FoodItem>, RepositoryError> {
        let food = sqlx::query_as::<_, FoodItem>(&format!(
            "SELECT {FOOD_COLUMNS} FROM food WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(food)
    }

    async fn get_foods(&self, ids: &[FoodId]) -> Result<Vec<FoodItem>, RepositoryError> {
        let raw: Vec<i32> = ids.iter().map(FoodId::as_i32).collect();
        let foods = sqlx::query_as::<_, FoodItem>(&format!(
            "SELECT {FOOD_COLUMNS} FROM food WHERE id = ANY($1)"
        ))
        .bind(raw)
        .fetch_all(&self.pool)
        .await?;
        Ok(foods)
    }

    async fn create_food(&self, food: &NewFoodItem) -> Result<FoodItem, RepositoryError> {
        let created = sqlx::query_as::<_, FoodItem>(&format!(
            "INSERT INTO food (name, description, price, category, available, discount_percent, image_url) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {FOOD_COLUMNS}"
        ))
        .bind(&food.name)
        .bind(&food.description)
        .bind(food.price)
        .bind(&food.category)
        .bind(food.available)
        .bind(food.discount_percent)
        .bind(food.image_url.as_deref())
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn update_food(
        &self,
        id: FoodId,
        update: &FoodUpdate,
    ) -> Result<FoodItem, RepositoryError> {
        sqlx::query_as::<_, FoodItem>(&format!(
            "UPDATE food SET \
                 name = COALESCE($2, name), \
                 description = COALESCE($3, description), \
                 price = COALESCE($4, price), \
                 category = COALESCE($5, category), \
                 available = COALESCE($6, available), \
                 discount_percent = COALESCE($7, discount_percent), \
                 image_url = COALESCE($8, image_url), \
                 updated_at = now() \
             WHERE id = $1 \
             RETURNING {FOOD_COLUMNS}"
        ))
        .bind(id)
        .bind(update.name.as_deref())
        .bind(update.description.as_deref())
        .bind(update.price)
        .bind(update.category.as_deref())
        .bind(update.available)
        .bind(update.discount_percent)
        .bind(update.image_url.as_deref())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    async fn delete_food(&self, id: FoodId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM food WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn top_rated_foods(&self, limit: u32) -> Result<Vec<FoodItem>, RepositoryError> {
        let foods = sqlx::query_as::<_, FoodItem>(&format!(
            "SELECT {FOOD_COLUMNS} FROM food WHERE rating > 0 \
             ORDER BY rating DESC, review_count DESC, id LIMIT $1"
        ))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(foods)
    }
}
