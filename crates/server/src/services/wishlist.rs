//! Wishlists: dishes a user saved for later.

use std::collections::HashMap;

use tracing::instrument;

use cravecart_core::{FoodId, UserId};

use super::cart::food_not_found;
use crate::db::{FoodRepository, Store, WishlistRepository};
use crate::error::AppError;
use crate::models::{FoodItem, WishlistItem};

/// Wishlist operations for one request.
pub struct WishlistService<'a> {
    store: &'a dyn Store,
}

impl<'a> WishlistService<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// Saved dishes, most recent first. Dishes removed from the menu are
    /// left out.
    pub async fn items(&self, user: UserId) -> Result<Vec<WishlistItem>, AppError> {
        let entries = self.store.wishlist(user).await?;
        let ids: Vec<FoodId> = entries.iter().map(|e| e.food_id).collect();
        let mut foods: HashMap<FoodId, FoodItem> = self
            .store
            .get_foods(&ids)
            .await?
            .into_iter()
            .map(|f| (f.id, f))
            .collect();
        Ok(entries
            .into_iter()
            .filter_map(|entry| {
                foods.remove(&entry.food_id).map(|food| WishlistItem {
                    food,
                    added_at: entry.added_at,
                })
            })
            .collect())
    }

    /// Save a dish. Returns whether it was newly added, plus the wishlist.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown dish.
    #[instrument(skip(self))]
    pub async fn add(
        &self,
        user: UserId,
        food: FoodId,
    ) -> Result<(bool, Vec<WishlistItem>), AppError> {
        if self.store.get_food(food).await?.is_none() {
            return Err(food_not_found(food));
        }
        let added = self.store.add_to_wishlist(user, food).await?;
        if added {
            tracing::info!("Added to wishlist");
        }
        Ok((added, self.items(user).await?))
    }

    /// Removing a dish that is not saved is not an error.
    #[instrument(skip(self))]
    pub async fn remove(&self, user: UserId, food: FoodId) -> Result<Vec<WishlistItem>, AppError> {
        self.store.remove_from_wishlist(user, food).await?;
        self.items(user).await
    }

    pub async fn clear(&self, user: UserId) -> Result<(), AppError> {
        Ok(self.store.clear_wishlist(user).await?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use cravecart_core::Money;
    use rust_decimal::Decimal;

    use crate::db::MemoryStore;
    use crate::models::NewFoodItem;

    async fn dish(store: &MemoryStore, name: &str) -> FoodId {
        store
            .create_food(&NewFoodItem {
                name: name.to_string(),
                description: String::new(),
                price: Money::new(Decimal::from(80)),
                category: "Snacks".to_string(),
                available: true,
                discount_percent: Decimal::ZERO,
                image_url: None,
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn removed_dishes_drop_out_of_the_list() {
        let store = MemoryStore::new();
        let wishlist = WishlistService::new(&store);
        let user = UserId::new(700);
        let samosa = dish(&store, "Samosa").await;
        let vada = dish(&store, "Vada").await;

        assert!(matches!(
            wishlist.add(user, FoodId::new(999)).await,
            Err(AppError::NotFound(_))
        ));
        assert!(wishlist.add(user, samosa).await.unwrap().0);
        let (added, items) = wishlist.add(user, vada).await.unwrap();
        assert!(added);
        let names: Vec<&str> = items.iter().map(|i| i.food.name.as_str()).collect();
        assert_eq!(names, ["Vada", "Samosa"]);
        assert!(!wishlist.add(user, vada).await.unwrap().0);

        store.delete_food(vada).await.unwrap();
        let items = wishlist.items(user).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].food.id, samosa);

        assert!(wishlist.remove(user, samosa).await.unwrap().is_empty());
    }
}
