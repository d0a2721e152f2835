//! Cart service.
//!
//! Cart rows live in the store; this service validates against the catalog,
//! joins current dish data for display and prices summaries. Mutations for a
//! user run under that user's [`CartLocks`] entry, which order placement also
//! takes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::instrument;

use cravecart_core::{FoodId, Money, PriceBreakdown, PricingPolicy, UserId};

use crate::db::{CartRepository, FoodRepository, Store};
use crate::error::AppError;
use crate::models::{CartLine, CartView, FoodItem};

/// Idle time after which a user's lock is dropped.
const LOCK_IDLE: Duration = Duration::from_secs(10 * 60);

/// In-process keyed lock serializing cart work per user.
#[derive(Clone)]
pub struct CartLocks {
    locks: Cache<UserId, Arc<Mutex<()>>>,
}

impl Default for CartLocks {
    fn default() -> Self {
        Self::new()
    }
}

impl CartLocks {
    #[must_use]
    pub fn new() -> Self {
        Self {
            locks: Cache::builder()
                .max_capacity(100_000)
                .time_to_idle(LOCK_IDLE)
                .build(),
        }
    }

    /// Wait for and hold `user`'s lock.
    pub async fn lock(&self, user: UserId) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .get_with(user, async { Arc::new(Mutex::new(())) })
            .await;
        lock.lock_owned().await
    }
}

/// Result of adding a dish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartUpdate {
    pub food_id: FoodId,
    /// Quantity of this dish now in the cart.
    pub quantity: u32,
    pub cart_total: Money,
    pub item_count: usize,
}

/// Cart operations for one request.
pub struct CartService<'a> {
    store: &'a dyn Store,
    locks: &'a CartLocks,
    pricing: &'a PricingPolicy,
}

impl<'a> CartService<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn Store, locks: &'a CartLocks, pricing: &'a PricingPolicy) -> Self {
        Self {
            store,
            locks,
            pricing,
        }
    }

    /// Add `quantity` of a dish, on top of what is already in the cart.
    ///
    /// # Errors
    ///
    /// `BadRequest` for a non-positive quantity, `NotFound` for an unknown
    /// dish, `Unavailable` for a dish that cannot be ordered right now.
    #[instrument(skip(self), fields(user_id = %user))]
    pub async fn add_item(
        &self,
        user: UserId,
        food_id: FoodId,
        quantity: i64,
    ) -> Result<CartUpdate, AppError> {
        let by = positive_quantity(quantity)?;
        let food = self
            .store
            .get_food(food_id)
            .await?
            .ok_or_else(|| food_not_found(food_id))?;
        if !food.available {
            return Err(AppError::Unavailable(format!(
                "{} is currently unavailable",
                food.name
            )));
        }

        let _guard = self.locks.lock(user).await;
        let quantity = self.store.increment_cart_item(user, food_id, by).await?;
        let cart = self.view(user).await?;

        tracing::info!(food_id = %food_id, quantity, "Added to cart");
        Ok(CartUpdate {
            food_id,
            quantity,
            cart_total: cart.subtotal,
            item_count: cart.item_count,
        })
    }

    /// # Errors
    ///
    /// `NotFound` when the dish is not in the cart.
    #[instrument(skip(self), fields(user_id = %user))]
    pub async fn remove_item(&self, user: UserId, food_id: FoodId) -> Result<CartView, AppError> {
        let _guard = self.locks.lock(user).await;
        if !self.store.remove_cart_item(user, food_id).await? {
            return Err(not_in_cart(food_id));
        }
        self.view(user).await
    }

    /// Overwrite a quantity. Zero removes the dish.
    ///
    /// # Errors
    ///
    /// `BadRequest` for a negative quantity, `NotFound` when the dish is not
    /// in the cart.
    #[instrument(skip(self), fields(user_id = %user))]
    pub async fn set_quantity(
        &self,
        user: UserId,
        food_id: FoodId,
        quantity: i64,
    ) -> Result<CartView, AppError> {
        if quantity < 0 {
            return Err(AppError::BadRequest(
                "Quantity cannot be negative".to_string(),
            ));
        }

        let _guard = self.locks.lock(user).await;
        let found = if quantity == 0 {
            self.store.remove_cart_item(user, food_id).await?
        } else {
            let quantity = positive_quantity(quantity)?;
            self.store
                .set_cart_quantity(user, food_id, quantity)
                .await?
        };
        if !found {
            return Err(not_in_cart(food_id));
        }
        self.view(user).await
    }

    /// The cart joined with current catalog data.
    ///
    /// # Errors
    ///
    /// Store failures only.
    pub async fn get_cart(&self, user: UserId) -> Result<CartView, AppError> {
        self.view(user).await
    }

    /// # Errors
    ///
    /// Store failures only.
    #[instrument(skip(self), fields(user_id = %user))]
    pub async fn clear(&self, user: UserId) -> Result<(), AppError> {
        let _guard = self.locks.lock(user).await;
        self.store.clear_cart(user).await?;
        Ok(())
    }

    /// Price the cart as it stands, without a promo code.
    ///
    /// # Errors
    ///
    /// Store failures only.
    pub async fn summary(&self, user: UserId) -> Result<PriceBreakdown, AppError> {
        let cart = self.view(user).await?;
        Ok(self.pricing.quote(cart.subtotal, Money::ZERO))
    }

    async fn view(&self, user: UserId) -> Result<CartView, AppError> {
        let entries = self.store.cart_entries(user).await?;
        if entries.is_empty() {
            return Ok(CartView {
                items: Vec::new(),
                subtotal: Money::ZERO,
                item_count: 0,
            });
        }

        let ids: Vec<FoodId> = entries.iter().map(|e| e.food_id).collect();
        let foods: HashMap<FoodId, FoodItem> = self
            .store
            .get_foods(&ids)
            .await?
            .into_iter()
            .map(|f| (f.id, f))
            .collect();

        let items: Vec<CartLine> = entries
            .iter()
            .filter_map(|entry| {
                let food = foods.get(&entry.food_id)?;
                Some(CartLine {
                    food_id: food.id,
                    name: food.name.clone(),
                    category: food.category.clone(),
                    price: food.price,
                    image_url: food.image_url.clone(),
                    available: food.available,
                    quantity: entry.quantity,
                    line_total: food.price * entry.quantity,
                })
            })
            .collect();

        let subtotal = items.iter().map(|line| line.line_total).sum();
        let item_count = items.len();
        Ok(CartView {
            items,
            subtotal,
            item_count,
        })
    }
}

fn positive_quantity(quantity: i64) -> Result<u32, AppError> {
    if quantity <= 0 {
        return Err(AppError::BadRequest(
            "Quantity must be greater than zero".to_string(),
        ));
    }
    u32::try_from(quantity)
        .map_err(|_| AppError::BadRequest("Quantity is too large".to_string()))
}

pub(crate) fn food_not_found(id: FoodId) -> AppError {
    AppError::NotFound(format!("Food item {id} not found"))
}

fn not_in_cart(id: FoodId) -> AppError {
    AppError::NotFound(format!("Food item {id} is not in the cart"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    use crate::db::{FoodRepository, MemoryStore};
    use crate::models::NewFoodItem;

    async fn dish(store: &MemoryStore, name: &str, price: i64, available: bool) -> FoodId {
        store
            .create_food(&NewFoodItem {
                name: name.to_string(),
                description: String::new(),
                price: Money::new(Decimal::from(price)),
                category: "Mains".to_string(),
                available,
                discount_percent: Decimal::ZERO,
                image_url: None,
            })
            .await
            .unwrap()
            .id
    }

    fn user() -> UserId {
        UserId::new(1)
    }

    #[tokio::test]
    async fn repeated_adds_increment() {
        let store = MemoryStore::default();
        let (locks, pricing) = (CartLocks::new(), PricingPolicy::default());
        let cart = CartService::new(&store, &locks, &pricing);
        let food = dish(&store, "Dal", 100, true).await;

        cart.add_item(user(), food, 1).await.unwrap();
        let update = cart.add_item(user(), food, 2).await.unwrap();

        assert_eq!(update.quantity, 3);
        assert_eq!(update.item_count, 1);
        assert_eq!(update.cart_total, Money::new(Decimal::from(300)));
    }

    #[tokio::test]
    async fn add_rejects_bad_input() {
        let store = MemoryStore::default();
        let (locks, pricing) = (CartLocks::new(), PricingPolicy::default());
        let cart = CartService::new(&store, &locks, &pricing);
        let off_menu = dish(&store, "Biryani", 250, false).await;

        assert!(matches!(
            cart.add_item(user(), off_menu, 0).await,
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            cart.add_item(user(), off_menu, 1).await,
            Err(AppError::Unavailable(_))
        ));
        assert!(matches!(
            cart.add_item(user(), FoodId::new(999), 1).await,
            Err(AppError::NotFound(_))
        ));
        assert!(cart.get_cart(user()).await.unwrap().items.is_empty());
    }

    #[tokio::test]
    async fn zero_quantity_removes() {
        let store = MemoryStore::default();
        let (locks, pricing) = (CartLocks::new(), PricingPolicy::default());
        let cart = CartService::new(&store, &locks, &pricing);
        let food = dish(&store, "Naan", 30, true).await;

        cart.add_item(user(), food, 2).await.unwrap();
        let view = cart.set_quantity(user(), food, 0).await.unwrap();
        assert!(view.items.is_empty());

        assert!(matches!(
            cart.set_quantity(user(), food, 4).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            cart.remove_item(user(), food).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            cart.set_quantity(user(), food, -1).await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn deleted_dishes_drop_out_of_the_view() {
        let store = MemoryStore::default();
        let (locks, pricing) = (CartLocks::new(), PricingPolicy::default());
        let cart = CartService::new(&store, &locks, &pricing);
        let kept = dish(&store, "Idli", 60, true).await;
        let gone = dish(&store, "Vada", 40, true).await;

        cart.add_item(user(), kept, 2).await.unwrap();
        cart.add_item(user(), gone, 1).await.unwrap();
        store.delete_food(gone).await.unwrap();

        let view = cart.get_cart(user()).await.unwrap();
        assert_eq!(view.items.len(), 1);
        assert_eq!(view.subtotal, Money::new(Decimal::from(120)));
    }

    #[tokio::test]
    async fn summary_prices_without_discount() {
        let store = MemoryStore::default();
        let (locks, pricing) = (CartLocks::new(), PricingPolicy::default());
        let cart = CartService::new(&store, &locks, &pricing);
        let food = dish(&store, "Thali", 100, true).await;

        let empty = cart.summary(user()).await.unwrap();
        assert_eq!(empty.total, Money::ZERO);

        cart.add_item(user(), food, 2).await.unwrap();
        let summary = cart.summary(user()).await.unwrap();
        assert_eq!(summary.tax, Money::new(Decimal::from(10)));
        assert_eq!(summary.delivery_fee, Money::new(Decimal::from(50)));
        assert_eq!(summary.total, Money::new(Decimal::from(260)));
    }

    #[tokio::test]
    async fn locks_are_per_user() {
        let locks = CartLocks::new();
        let _held = locks.lock(UserId::new(1)).await;
        let other = tokio::time::timeout(Duration::from_millis(100), locks.lock(UserId::new(2))).await;
        assert!(other.is_ok());
        let same = tokio::time::timeout(Duration::from_millis(50), locks.lock(UserId::new(1))).await;
        assert!(same.is_err());
    }
}
