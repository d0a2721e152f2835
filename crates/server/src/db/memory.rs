//! In-memory store.
//!
//! All tables live behind one `tokio::sync::Mutex`, so every trait method is
//! atomic with respect to every other. Used by the integration tests and by
//! `CRAVECART_STORAGE=memory` for local runs without a database.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use cravecart_core::{
    Email, FoodId, NotificationId, OrderId, OrderStatus, Page, PromoCodeId, RedemptionOutcome,
    ReviewId, StatusEvent, UserId,
};

use super::{
    CartRepository, FoodRepository, MAX_CART_QUANTITY, NotificationRepository, OrderRepository,
    PageOf, PromoRepository, RepositoryError, ReviewRepository, Store, UserRepository,
    WishlistRepository, quantity_too_large,
};
use crate::models::{
    CartEntry, FoodFilter, FoodItem, FoodUpdate, NewFoodItem, NewNotification, NewOrder,
    NewPromoCode, NewReview, NewUser, Notification, Order, OrderFilter, Placement, PromoCode,
    PromoUpdate, Review, ReviewUpdate, ReviewVotes, User, WishlistEntry,
};
use crate::models::food::by_rating;

/// Process-local implementation of [`Store`].
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    sequence: i32,
    users: BTreeMap<UserId, (User, String)>,
    foods: BTreeMap<FoodId, FoodItem>,
    carts: HashMap<UserId, BTreeMap<FoodId, u32>>,
    promos: BTreeMap<PromoCodeId, PromoCode>,
    redemptions: BTreeSet<(PromoCodeId, UserId)>,
    orders: BTreeMap<OrderId, Order>,
    notifications: BTreeMap<NotificationId, Notification>,
    reviews: BTreeMap<ReviewId, Review>,
    /// Newest first.
    wishlists: HashMap<UserId, Vec<WishlistEntry>>,
}

impl State {
    /// One counter for every table keeps ids unique across types, which
    /// makes mixed-up ids show up as `NotFound` in tests.
    fn next_id(&mut self) -> i32 {
        self.sequence += 1;
        self.sequence
    }

    fn cart(&self, user: UserId) -> Vec<CartEntry> {
        self.carts
            .get(&user)
            .map(|lines| {
                lines
                    .iter()
                    .map(|(&food_id, &quantity)| CartEntry { food_id, quantity })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn redeem(&mut self, promo: PromoCodeId, user: UserId) -> Result<RedemptionOutcome, RepositoryError> {
        let code = self.promos.get_mut(&promo).ok_or(RepositoryError::NotFound)?;
        if self.redemptions.contains(&(promo, user)) {
            return Ok(RedemptionOutcome::AlreadyApplied);
        }
        if code.terms().is_exhausted() {
            return Ok(RedemptionOutcome::LimitReached);
        }
        code.usage_count += 1;
        code.updated_at = Utc::now();
        self.redemptions.insert((promo, user));
        Ok(RedemptionOutcome::Applied)
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Newest-first page of `items`, which are given oldest first.
fn newest_first<T: Clone>(items: Vec<T>, page: Page) -> PageOf<T> {
    let total = items.len() as u64;
    let mut items = items;
    items.reverse();
    (page.slice(&items), total)
}

#[async_trait]
impl FoodRepository for MemoryStore {
    async fn list_foods(
        &self,
        filter: &FoodFilter,
        page: Page,
    ) -> Result<PageOf<FoodItem>, RepositoryError> {
        let state = self.state.lock().await;
        let matching = state
            .foods
            .values()
            .filter(|f| filter.matches(f))
            .cloned()
            .collect();
        Ok(newest_first(matching, page))
    }

    async fn food_categories(&self) -> Result<Vec<String>, RepositoryError> {
        let state = self.state.lock().await;
        let categories: BTreeSet<String> =
            state.foods.values().map(|f| f.category.clone()).collect();
        Ok(categories.into_iter().collect())
    }

    async fn get_food(&self, id: FoodId) -> Result<Option<FoodItem>, RepositoryError> {
        Ok(self.state.lock().await.foods.get(&id).cloned())
    }

    async fn get_foods(&self, ids: &[FoodId]) -> Result<Vec<FoodItem>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(ids.iter().filter_map(|id| state.foods.get(id).cloned()).collect())
    }

    async fn create_food(&self, food: &NewFoodItem) -> Result<FoodItem, RepositoryError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let item = FoodItem {
            id: FoodId::new(state.next_id()),
            name: food.name.clone(),
            description: food.description.clone(),
            price: food.price,
            category: food.category.clone(),
            available: food.available,
            rating: Decimal::ZERO,
            review_count: 0,
            discount_percent: food.discount_percent,
            image_url: food.image_url.clone(),
            created_at: now,
            updated_at: now,
        };
        state.foods.insert(item.id, item.clone());
        Ok(item)
    }

    async fn update_food(
        &self,
        id: FoodId,
        update: &FoodUpdate,
    ) -> Result<FoodItem, RepositoryError> {
        let mut state = self.state.lock().await;
        let food = state.foods.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        if let Some(name) = &update.name {
            food.name.clone_from(name);
        }
        if let Some(description) = &update.description {
            food.description.clone_from(description);
        }
        if let Some(price) = update.price {
            food.price = price;
        }
        if let Some(category) = &update.category {
            food.category.clone_from(category);
        }
        if let Some(available) = update.available {
            food.available = available;
        }
        if let Some(discount) = update.discount_percent {
            food.discount_percent = discount;
        }
        if let Some(url) = &update.image_url {
            food.image_url = Some(url.clone());
        }
        food.updated_at = Utc::now();
        Ok(food.clone())
    }

    async fn delete_food(&self, id: FoodId) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        state
            .foods
            .remove(&id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    async fn top_rated_foods(&self, limit: u32) -> Result<Vec<FoodItem>, RepositoryError> {
        let state = self.state.lock().await;
        let mut rated: Vec<FoodItem> = state
            .foods
            .values()
            .filter(|f| f.is_rated())
            .cloned()
            .collect();
        rated.sort_by(by_rating);
        rated.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(rated)
    }
}

#[async_trait]
impl CartRepository for MemoryStore {
    async fn cart_entries(&self, user: UserId) -> Result<Vec<CartEntry>, RepositoryError> {
        Ok(self.state.lock().await.cart(user))
    }

    async fn increment_cart_item(
        &self,
        user: UserId,
        food: FoodId,
        by: u32,
    ) -> Result<u32, RepositoryError> {
        let mut state = self.state.lock().await;
        let current = state.carts.get(&user).and_then(|c| c.get(&food)).copied();
        let quantity = u64::from(current.unwrap_or(0)) + u64::from(by);
        let quantity = u32::try_from(quantity)
            .ok()
            .filter(|q| *q <= MAX_CART_QUANTITY)
            .ok_or_else(|| quantity_too_large(quantity))?;
        state.carts.entry(user).or_default().insert(food, quantity);
        Ok(quantity)
    }

    async fn set_cart_quantity(
        &self,
        user: UserId,
        food: FoodId,
        quantity: u32,
    ) -> Result<bool, RepositoryError> {
        if quantity > MAX_CART_QUANTITY {
            return Err(quantity_too_large(quantity));
        }
        let mut state = self.state.lock().await;
        match state.carts.get_mut(&user).and_then(|c| c.get_mut(&food)) {
            Some(current) => {
                *current = quantity;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn remove_cart_item(&self, user: UserId, food: FoodId) -> Result<bool, RepositoryError> {
        let mut state = self.state.lock().await;
        Ok(state
            .carts
            .get_mut(&user)
            .and_then(|c| c.remove(&food))
            .is_some())
    }

    async fn clear_cart(&self, user: UserId) -> Result<(), RepositoryError> {
        self.state.lock().await.carts.remove(&user);
        Ok(())
    }
}

#[async_trait]
impl PromoRepository for MemoryStore {
    async fn find_promo_by_code(&self, code: &str) -> Result<Option<PromoCode>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state.promos.values().find(|p| p.code == code).cloned())
    }

    async fn get_promo(&self, id: PromoCodeId) -> Result<Option<PromoCode>, RepositoryError> {
        Ok(self.state.lock().await.promos.get(&id).cloned())
    }

    async fn has_redeemed(
        &self,
        promo: PromoCodeId,
        user: UserId,
    ) -> Result<bool, RepositoryError> {
        Ok(self.state.lock().await.redemptions.contains(&(promo, user)))
    }

    async fn redeem_promo(
        &self,
        promo: PromoCodeId,
        user: UserId,
    ) -> Result<RedemptionOutcome, RepositoryError> {
        self.state.lock().await.redeem(promo, user)
    }

    async fn create_promo(
        &self,
        code: &str,
        promo: &NewPromoCode,
    ) -> Result<PromoCode, RepositoryError> {
        let mut state = self.state.lock().await;
        if state.promos.values().any(|p| p.code == code) {
            return Err(RepositoryError::Conflict("promo code already exists".to_owned()));
        }
        let now = Utc::now();
        let created = PromoCode {
            id: PromoCodeId::new(state.next_id()),
            code: code.to_owned(),
            description: promo.description.clone(),
            discount_type: promo.discount_type,
            discount_value: promo.discount_value,
            min_order_amount: promo.min_order_amount,
            max_discount: promo.max_discount,
            usage_limit: promo.usage_limit,
            usage_count: 0,
            valid_from: promo.valid_from,
            valid_until: promo.valid_until,
            active: true,
            created_at: now,
            updated_at: now,
        };
        state.promos.insert(created.id, created.clone());
        Ok(created)
    }

    async fn list_promos(
        &self,
        active: Option<bool>,
        page: Page,
    ) -> Result<PageOf<PromoCode>, RepositoryError> {
        let state = self.state.lock().await;
        let matching = state
            .promos
            .values()
            .filter(|p| active.is_none_or(|a| p.active == a))
            .cloned()
            .collect();
        Ok(newest_first(matching, page))
    }

    async fn list_live_promos(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<PromoCode>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .promos
            .values()
            .filter(|p| p.terms().is_live_at(now))
            .cloned()
            .collect())
    }

    async fn update_promo(
        &self,
        id: PromoCodeId,
        update: &PromoUpdate,
    ) -> Result<PromoCode, RepositoryError> {
        let mut state = self.state.lock().await;
        let promo = state.promos.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        *promo = update.applied_to(promo);
        promo.updated_at = Utc::now();
        Ok(promo.clone())
    }

    async fn delete_promo(&self, id: PromoCodeId) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        state.promos.remove(&id).ok_or(RepositoryError::NotFound)?;
        state.redemptions.retain(|(promo, _)| *promo != id);
        Ok(())
    }

    async fn promo_redeemer_count(&self, id: PromoCodeId) -> Result<u64, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .redemptions
            .iter()
            .filter(|(promo, _)| *promo == id)
            .count() as u64)
    }
}

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn place_order(
        &self,
        order: &NewOrder,
        expected_cart: &[CartEntry],
        redeem: Option<PromoCodeId>,
    ) -> Result<Placement, RepositoryError> {
        let mut state = self.state.lock().await;

        if state.cart(order.user_id) != expected_cart {
            return Ok(Placement::CartChanged);
        }
        if let Some(promo) = redeem {
            match state.redeem(promo, order.user_id)? {
                RedemptionOutcome::Applied => {}
                RedemptionOutcome::AlreadyApplied => return Ok(Placement::PromoAlreadyUsed),
                RedemptionOutcome::LimitReached => return Ok(Placement::PromoExhausted),
            }
        }

        let created = Order {
            id: OrderId::new(state.next_id()),
            user_id: order.user_id,
            items: order.items.clone(),
            subtotal: order.pricing.subtotal,
            tax: order.pricing.tax,
            delivery_fee: order.pricing.delivery_fee,
            discount: order.pricing.discount,
            promo_code: order.promo_code.clone(),
            amount: order.pricing.total,
            address: order.address.clone(),
            payment_method: order.payment_method,
            status: order.initial_event.status,
            payment_confirmed: false,
            payment_session_id: None,
            special_instructions: order.special_instructions.clone(),
            rating: None,
            review: None,
            status_history: vec![order.initial_event.clone()],
            created_at: order.initial_event.timestamp,
            updated_at: order.initial_event.timestamp,
        };
        state.orders.insert(created.id, created.clone());
        state.carts.remove(&order.user_id);
        Ok(Placement::Placed(Box::new(created)))
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(self.state.lock().await.orders.get(&id).cloned())
    }

    async fn list_orders(
        &self,
        filter: &OrderFilter,
        page: Page,
    ) -> Result<PageOf<Order>, RepositoryError> {
        let state = self.state.lock().await;
        let matching = state
            .orders
            .values()
            .filter(|o| filter.matches(o))
            .cloned()
            .collect();
        Ok(newest_first(matching, page))
    }

    async fn transition_order(
        &self,
        id: OrderId,
        expected: OrderStatus,
        event: &StatusEvent,
        payment_confirmed: Option<bool>,
    ) -> Result<Option<Order>, RepositoryError> {
        let mut state = self.state.lock().await;
        let Some(order) = state.orders.get_mut(&id) else {
            return Ok(None);
        };
        if order.status != expected {
            return Ok(None);
        }
        order.status = event.status;
        order.status_history.push(event.clone());
        if let Some(paid) = payment_confirmed {
            order.payment_confirmed = paid;
        }
        order.updated_at = event.timestamp;
        Ok(Some(order.clone()))
    }

    async fn attach_payment_session(
        &self,
        id: OrderId,
        session_id: &str,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        let order = state.orders.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        order.payment_session_id = Some(session_id.to_owned());
        order.updated_at = Utc::now();
        Ok(())
    }

    async fn rate_order(
        &self,
        id: OrderId,
        rating: i16,
        review: Option<&str>,
    ) -> Result<Option<Order>, RepositoryError> {
        let mut state = self.state.lock().await;
        let state = &mut *state;
        let Some(order) = state.orders.get_mut(&id) else {
            return Ok(None);
        };
        if !order.status.accepts_rating() || order.rating.is_some() {
            return Ok(None);
        }
        order.rating = Some(rating);
        order.review = review.map(str::to_owned);
        order.updated_at = Utc::now();

        let rated: BTreeSet<FoodId> = order.items.iter().map(|line| line.food_id).collect();
        for food_id in rated {
            if let Some(food) = state.foods.get_mut(&food_id) {
                food.add_rating(rating);
            }
        }
        Ok(Some(order.clone()))
    }
}

#[async_trait]
impl NotificationRepository for MemoryStore {
    async fn insert_notification(
        &self,
        notification: &NewNotification,
    ) -> Result<Notification, RepositoryError> {
        let mut state = self.state.lock().await;
        let stored = Notification {
            id: NotificationId::new(state.next_id()),
            user_id: notification.user_id,
            order_id: notification.order_id,
            kind: notification.kind,
            title: notification.title.clone(),
            message: notification.message.clone(),
            priority: notification.priority,
            read: false,
            created_at: Utc::now(),
            read_at: None,
        };
        state.notifications.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn list_notifications(
        &self,
        user: UserId,
        read: Option<bool>,
        page: Page,
    ) -> Result<PageOf<Notification>, RepositoryError> {
        let state = self.state.lock().await;
        let matching = state
            .notifications
            .values()
            .filter(|n| n.user_id == user && read.is_none_or(|r| n.read == r))
            .cloned()
            .collect();
        Ok(newest_first(matching, page))
    }

    async fn unread_count(&self, user: UserId) -> Result<u64, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .notifications
            .values()
            .filter(|n| n.user_id == user && !n.read)
            .count() as u64)
    }

    async fn get_notification(
        &self,
        id: NotificationId,
    ) -> Result<Option<Notification>, RepositoryError> {
        Ok(self.state.lock().await.notifications.get(&id).cloned())
    }

    async fn mark_notification_read(
        &self,
        id: NotificationId,
    ) -> Result<Option<Notification>, RepositoryError> {
        let mut state = self.state.lock().await;
        Ok(state.notifications.get_mut(&id).map(|n| {
            if !n.read {
                n.read = true;
                n.read_at = Some(Utc::now());
            }
            n.clone()
        }))
    }

    async fn mark_all_read(&self, user: UserId) -> Result<u64, RepositoryError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let mut changed = 0;
        for n in state
            .notifications
            .values_mut()
            .filter(|n| n.user_id == user && !n.read)
        {
            n.read = true;
            n.read_at = Some(now);
            changed += 1;
        }
        Ok(changed)
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn create_user(&self, user: &NewUser) -> Result<User, RepositoryError> {
        let mut state = self.state.lock().await;
        if state.users.values().any(|(u, _)| u.email == user.email) {
            return Err(RepositoryError::Conflict("email already exists".to_owned()));
        }
        let now = Utc::now();
        let created = User {
            id: UserId::new(state.next_id()),
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role,
            created_at: now,
            updated_at: now,
        };
        state
            .users
            .insert(created.id, (created.clone(), user.password_hash.clone()));
        Ok(created)
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.state.lock().await.users.get(&id).map(|(u, _)| u.clone()))
    }

    async fn find_user_credentials(
        &self,
        email: &Email,
    ) -> Result<Option<(User, String)>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state.users.values().find(|(u, _)| &u.email == email).cloned())
    }
}

#[async_trait]
impl ReviewRepository for MemoryStore {
    async fn create_review(
        &self,
        user: UserId,
        review: &NewReview,
    ) -> Result<Review, RepositoryError> {
        let mut state = self.state.lock().await;
        if state
            .reviews
            .values()
            .any(|r| r.user_id == user && r.food_id == review.food_id)
        {
            return Err(RepositoryError::Conflict("review already exists".to_string()));
        }
        let now = Utc::now();
        let stored = Review {
            id: ReviewId::new(state.next_id()),
            user_id: user,
            food_id: review.food_id,
            order_id: review.order_id,
            rating: review.rating,
            title: review.title.clone(),
            comment: review.comment.clone().unwrap_or_default(),
            helpful: 0,
            unhelpful: 0,
            verified: review.order_id.is_some(),
            created_at: now,
            updated_at: now,
        };
        if let Some(food) = state.foods.get_mut(&review.food_id) {
            food.add_rating(review.rating);
        }
        state.reviews.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get_review(&self, id: ReviewId) -> Result<Option<Review>, RepositoryError> {
        Ok(self.state.lock().await.reviews.get(&id).cloned())
    }

    async fn list_food_reviews(
        &self,
        food: FoodId,
        page: Page,
    ) -> Result<PageOf<Review>, RepositoryError> {
        let state = self.state.lock().await;
        let matching = state
            .reviews
            .values()
            .filter(|r| r.food_id == food)
            .cloned()
            .collect();
        Ok(newest_first(matching, page))
    }

    async fn list_user_reviews(
        &self,
        user: UserId,
        page: Page,
    ) -> Result<PageOf<Review>, RepositoryError> {
        let state = self.state.lock().await;
        let matching = state
            .reviews
            .values()
            .filter(|r| r.user_id == user)
            .cloned()
            .collect();
        Ok(newest_first(matching, page))
    }

    async fn update_review(
        &self,
        id: ReviewId,
        update: &ReviewUpdate,
    ) -> Result<Review, RepositoryError> {
        let mut state = self.state.lock().await;
        let state = &mut *state;
        let review = state.reviews.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        let old_rating = review.rating;
        update.apply(review);
        review.updated_at = Utc::now();
        if review.rating != old_rating
            && let Some(food) = state.foods.get_mut(&review.food_id)
        {
            food.replace_rating(old_rating, review.rating);
        }
        Ok(review.clone())
    }

    async fn delete_review(&self, id: ReviewId) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        let review = state.reviews.remove(&id).ok_or(RepositoryError::NotFound)?;
        if let Some(food) = state.foods.get_mut(&review.food_id) {
            food.remove_rating(review.rating);
        }
        Ok(())
    }

    async fn vote_review(
        &self,
        id: ReviewId,
        helpful: bool,
    ) -> Result<Option<ReviewVotes>, RepositoryError> {
        let mut state = self.state.lock().await;
        Ok(state.reviews.get_mut(&id).map(|review| {
            if helpful {
                review.helpful = review.helpful.saturating_add(1);
            } else {
                review.unhelpful = review.unhelpful.saturating_add(1);
            }
            ReviewVotes {
                helpful: review.helpful,
                unhelpful: review.unhelpful,
            }
        }))
    }
}

#[async_trait]
impl WishlistRepository for MemoryStore {
    async fn wishlist(&self, user: UserId) -> Result<Vec<WishlistEntry>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state.wishlists.get(&user).cloned().unwrap_or_default())
    }

    async fn add_to_wishlist(&self, user: UserId, food: FoodId) -> Result<bool, RepositoryError> {
        let mut state = self.state.lock().await;
        let entries = state.wishlists.entry(user).or_default();
        if entries.iter().any(|e| e.food_id == food) {
            return Ok(false);
        }
        entries.insert(
            0,
            WishlistEntry {
                food_id: food,
                added_at: Utc::now(),
            },
        );
        Ok(true)
    }

    async fn remove_from_wishlist(
        &self,
        user: UserId,
        food: FoodId,
    ) -> Result<bool, RepositoryError> {
        let mut state = self.state.lock().await;
        let Some(entries) = state.wishlists.get_mut(&user) else {
            return Ok(false);
        };
        let before = entries.len();
        entries.retain(|e| e.food_id != food);
        Ok(entries.len() < before)
    }

    async fn clear_wishlist(&self, user: UserId) -> Result<(), RepositoryError> {
        self.state.lock().await.wishlists.remove(&user);
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}
