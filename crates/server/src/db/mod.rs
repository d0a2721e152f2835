//! Persistence for CraveCart.
//!
//! Handlers and services only see the repository traits below, bundled as
//! [`Store`]. Two adapters implement them:
//!
//! - [`postgres::PgStore`] - production store (sqlx, `PostgreSQL`)
//! - [`memory::MemoryStore`] - process-local store for tests and local runs
//!
//! ## Tables (`PostgreSQL`)
//!
//! - `app_user` - Accounts with argon2 password hashes
//! - `food` - Catalog
//! - `cart_entry` - `(user_id, food_id) -> quantity`, no foreign key to `food`
//! - `promo_code`, `promo_redemption` - Codes and who redeemed them
//! - `customer_order`, `order_status_event` - Orders and their status log
//! - `notification` - Per-user feed
//! - `review` - Dish reviews, one per user and dish
//! - `wishlist_entry` - Saved dishes, no foreign key to `food`
//!
//! # Migrations
//!
//! Migrations are stored in `crates/server/migrations/` and run via:
//! ```bash
//! cargo run -p cravecart-cli -- migrate
//! ```

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use cravecart_core::{
    Email, FoodId, NotificationId, OrderId, OrderStatus, Page, PromoCodeId, RedemptionOutcome,
    ReviewId, StatusEvent, UserId,
};

use crate::models::{
    CartEntry, FoodFilter, FoodItem, FoodUpdate, NewFoodItem, NewNotification, NewOrder,
    NewPromoCode, NewReview, NewUser, Notification, Order, OrderFilter, Placement, PromoCode,
    PromoUpdate, Review, ReviewUpdate, ReviewVotes, User, WishlistEntry,
};

pub use memory::MemoryStore;
pub use postgres::{PgStore, create_pool};

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database query failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in database is invalid or corrupted.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Entity not found.
    #[error("not found")]
    NotFound,

    /// Conflict (e.g., duplicate key).
    #[error("conflict: {0}")]
    Conflict(String),
}

/// A page of results plus the total matching row count.
pub type PageOf<T> = (Vec<T>, u64);

/// Catalog access.
#[async_trait]
pub trait FoodRepository: Send + Sync {
    async fn list_foods(
        &self,
        filter: &FoodFilter,
        page: Page,
    ) -> Result<PageOf<FoodItem>, RepositoryError>;

    /// Distinct categories, sorted.
    async fn food_categories(&self) -> Result<Vec<String>, RepositoryError>;

    async fn get_food(&self, id: FoodId) -> Result<Option<FoodItem>, RepositoryError>;

    /// Fetch several dishes at once. Missing ids are simply absent.
    async fn get_foods(&self, ids: &[FoodId]) -> Result<Vec<FoodItem>, RepositoryError>;

    async fn create_food(&self, food: &NewFoodItem) -> Result<FoodItem, RepositoryError>;

    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` for an unknown id.
    async fn update_food(
        &self,
        id: FoodId,
        update: &FoodUpdate,
    ) -> Result<FoodItem, RepositoryError>;

    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` for an unknown id.
    async fn delete_food(&self, id: FoodId) -> Result<(), RepositoryError>;

    /// Up to `limit` rated dishes, highest rating first, then most reviewed.
    async fn top_rated_foods(&self, limit: u32) -> Result<Vec<FoodItem>, RepositoryError>;
}

/// Per-user carts.
///
/// Quantities are always positive; setting a quantity to zero is a removal
/// and handled by the caller.
#[async_trait]
pub trait CartRepository: Send + Sync {
    /// Entries ordered by food id.
    async fn cart_entries(&self, user: UserId) -> Result<Vec<CartEntry>, RepositoryError>;

    /// Atomically add `by` to the entry, creating it if needed.
    ///
    /// Returns the new quantity.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict`, leaving the entry unchanged, when
    /// the sum would exceed [`MAX_CART_QUANTITY`].
    async fn increment_cart_item(
        &self,
        user: UserId,
        food: FoodId,
        by: u32,
    ) -> Result<u32, RepositoryError>;

    /// Overwrite the quantity of an existing entry.
    ///
    /// Returns `false` when there was no entry to update.
    async fn set_cart_quantity(
        &self,
        user: UserId,
        food: FoodId,
        quantity: u32,
    ) -> Result<bool, RepositoryError>;

    /// Returns `false` when there was no entry to remove.
    async fn remove_cart_item(&self, user: UserId, food: FoodId) -> Result<bool, RepositoryError>;

    async fn clear_cart(&self, user: UserId) -> Result<(), RepositoryError>;
}

/// Promo codes and their redemption sets.
#[async_trait]
pub trait PromoRepository: Send + Sync {
    /// Look up by the normalized (upper-case) code.
    async fn find_promo_by_code(&self, code: &str) -> Result<Option<PromoCode>, RepositoryError>;

    async fn get_promo(&self, id: PromoCodeId) -> Result<Option<PromoCode>, RepositoryError>;

    async fn has_redeemed(&self, promo: PromoCodeId, user: UserId)
    -> Result<bool, RepositoryError>;

    /// Add `user` to the redemption set and bump the usage count, in one
    /// compare-and-increment against the usage limit.
    async fn redeem_promo(
        &self,
        promo: PromoCodeId,
        user: UserId,
    ) -> Result<RedemptionOutcome, RepositoryError>;

    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` when the code already exists.
    async fn create_promo(
        &self,
        code: &str,
        promo: &NewPromoCode,
    ) -> Result<PromoCode, RepositoryError>;

    /// Newest first.
    async fn list_promos(
        &self,
        active: Option<bool>,
        page: Page,
    ) -> Result<PageOf<PromoCode>, RepositoryError>;

    /// Active codes whose validity window contains `now`.
    async fn list_live_promos(&self, now: DateTime<Utc>)
    -> Result<Vec<PromoCode>, RepositoryError>;

    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` for an unknown id.
    async fn update_promo(
        &self,
        id: PromoCodeId,
        update: &PromoUpdate,
    ) -> Result<PromoCode, RepositoryError>;

    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` for an unknown id.
    async fn delete_promo(&self, id: PromoCodeId) -> Result<(), RepositoryError>;

    /// Size of the redemption set.
    async fn promo_redeemer_count(&self, id: PromoCodeId) -> Result<u64, RepositoryError>;
}

/// Orders and their status log.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Persist an order, clear the cart and optionally redeem a promo code,
    /// all or nothing.
    ///
    /// The write only happens if the user's cart still equals
    /// `expected_cart` (sorted by food id); otherwise nothing changes and
    /// [`Placement::CartChanged`] is returned.
    async fn place_order(
        &self,
        order: &NewOrder,
        expected_cart: &[CartEntry],
        redeem: Option<PromoCodeId>,
    ) -> Result<Placement, RepositoryError>;

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    /// Newest first.
    async fn list_orders(
        &self,
        filter: &OrderFilter,
        page: Page,
    ) -> Result<PageOf<Order>, RepositoryError>;

    /// Move an order to `event.status` if it is still in `expected`.
    ///
    /// Appends `event` to the status log and, when given, sets the
    /// payment-confirmed flag. Returns `None` if the order is missing or its
    /// status changed underneath the caller.
    async fn transition_order(
        &self,
        id: OrderId,
        expected: OrderStatus,
        event: &StatusEvent,
        payment_confirmed: Option<bool>,
    ) -> Result<Option<Order>, RepositoryError>;

    /// Remember the checkout session of the latest card hand-off.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` for an unknown id.
    async fn attach_payment_session(
        &self,
        id: OrderId,
        session_id: &str,
    ) -> Result<(), RepositoryError>;

    /// Record a rating on a delivered, unrated order and fold it into the
    /// running rating of every dish in it.
    ///
    /// Returns `None` if the order is not delivered or already rated.
    async fn rate_order(
        &self,
        id: OrderId,
        rating: i16,
        review: Option<&str>,
    ) -> Result<Option<Order>, RepositoryError>;
}

/// Per-user notification feed.
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn insert_notification(
        &self,
        notification: &NewNotification,
    ) -> Result<Notification, RepositoryError>;

    /// Newest first.
    async fn list_notifications(
        &self,
        user: UserId,
        read: Option<bool>,
        page: Page,
    ) -> Result<PageOf<Notification>, RepositoryError>;

    async fn unread_count(&self, user: UserId) -> Result<u64, RepositoryError>;

    async fn get_notification(
        &self,
        id: NotificationId,
    ) -> Result<Option<Notification>, RepositoryError>;

    /// Returns `None` for an unknown id.
    async fn mark_notification_read(
        &self,
        id: NotificationId,
    ) -> Result<Option<Notification>, RepositoryError>;

    /// Returns how many notifications changed.
    async fn mark_all_read(&self, user: UserId) -> Result<u64, RepositoryError>;
}

/// Dish reviews.
///
/// Every write keeps the reviewed dish's running rating in step, in the same
/// atomic operation.
#[async_trait]
pub trait ReviewRepository: Send + Sync {
    /// Store a review by `user` and fold its rating into the dish.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` when `user` already reviewed the
    /// dish.
    async fn create_review(
        &self,
        user: UserId,
        review: &NewReview,
    ) -> Result<Review, RepositoryError>;

    async fn get_review(&self, id: ReviewId) -> Result<Option<Review>, RepositoryError>;

    /// Newest first.
    async fn list_food_reviews(
        &self,
        food: FoodId,
        page: Page,
    ) -> Result<PageOf<Review>, RepositoryError>;

    /// Newest first.
    async fn list_user_reviews(
        &self,
        user: UserId,
        page: Page,
    ) -> Result<PageOf<Review>, RepositoryError>;

    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` for an unknown id.
    async fn update_review(
        &self,
        id: ReviewId,
        update: &ReviewUpdate,
    ) -> Result<Review, RepositoryError>;

    /// Remove a review and take its rating back out of the dish.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` for an unknown id.
    async fn delete_review(&self, id: ReviewId) -> Result<(), RepositoryError>;

    /// Count one helpful (or unhelpful) vote. Returns `None` for an unknown id.
    async fn vote_review(
        &self,
        id: ReviewId,
        helpful: bool,
    ) -> Result<Option<ReviewVotes>, RepositoryError>;
}

/// Per-user wishlists.
#[async_trait]
pub trait WishlistRepository: Send + Sync {
    /// Most recently added first.
    async fn wishlist(&self, user: UserId) -> Result<Vec<WishlistEntry>, RepositoryError>;

    /// Returns `false` when the dish was already saved.
    async fn add_to_wishlist(&self, user: UserId, food: FoodId) -> Result<bool, RepositoryError>;

    /// Returns `false` when the dish was not saved.
    async fn remove_from_wishlist(
        &self,
        user: UserId,
        food: FoodId,
    ) -> Result<bool, RepositoryError>;

    async fn clear_wishlist(&self, user: UserId) -> Result<(), RepositoryError>;
}

/// Accounts.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` when the email is taken.
    async fn create_user(&self, user: &NewUser) -> Result<User, RepositoryError>;

    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepositoryError>;

    /// The user and their password hash.
    async fn find_user_credentials(
        &self,
        email: &Email,
    ) -> Result<Option<(User, String)>, RepositoryError>;
}

/// Everything the server needs from persistence.
#[async_trait]
pub trait Store:
    FoodRepository
    + CartRepository
    + PromoRepository
    + OrderRepository
    + NotificationRepository
    + ReviewRepository
    + WishlistRepository
    + UserRepository
{
    /// Cheap connectivity check behind `/health/ready`.
    async fn ping(&self) -> Result<(), RepositoryError>;
}

/// Largest quantity a cart entry can hold, matching the `INTEGER` column.
pub const MAX_CART_QUANTITY: u32 = 2_147_483_647;

/// Both adapters refuse quantities above [`MAX_CART_QUANTITY`] with this.
pub(crate) fn quantity_too_large(quantity: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Conflict(format!("quantity {quantity} is too large"))
}

/// Map a unique-constraint violation to `RepositoryError::Conflict`.
pub(crate) fn conflict_on_unique(e: sqlx::Error, what: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict(format!("{what} already exists"));
    }
    RepositoryError::Database(e)
}
