//! Order workflow.
//!
//! Placement prices the user's stored cart against the current catalog and
//! writes the order, the cart clear and (for cash orders) the promo
//! redemption in one store operation. After that every change goes through
//! the status machine in [`cravecart_core::lifecycle`] and a compare-and-set
//! on the stored status, so two concurrent changes cannot both win.
//!
//! Card orders are handed to the [`PaymentGateway`] after the order is
//! stored. A failed hand-off leaves the order `pending` and can be retried.
//! The order is only confirmed once the gateway reports its checkout session
//! as paid.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use url::Url;

use cravecart_core::lifecycle::{self, StatusEvent};
use cravecart_core::promo::PromoRejection;
use cravecart_core::{
    FoodId, Money, OrderId, OrderStatus, Page, PaymentMethod, PricingPolicy, RedemptionOutcome,
    UserId,
};

use super::cart::{CartLocks, food_not_found};
use super::notify::{self, NotificationSink, dispatch};
use super::payment::{CheckoutRequest, CheckoutSession, PaymentError, PaymentGateway};
use super::promo::PromoService;
use crate::db::{
    CartRepository, FoodRepository, OrderRepository, PageOf, PromoRepository, Store,
};
use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::models::{
    CartEntry, DeliveryAddress, FoodItem, NewOrder, Order, OrderFilter, OrderLine, Placement,
};

/// A cart line as the client saw it when checking out.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestedItem {
    pub food_id: FoodId,
    pub quantity: u32,
}

/// Body of `POST /api/order/place`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrder {
    /// When present, must match the stored cart.
    #[serde(default)]
    pub items: Option<Vec<RequestedItem>>,
    pub address: DeliveryAddress,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub promo_code: Option<String>,
    #[serde(default)]
    pub special_instructions: Option<String>,
}

/// Result of a placement.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacedOrder {
    pub order_id: OrderId,
    pub amount: Money,
    pub status: OrderStatus,
    /// Hosted checkout page for card orders, absent if the hand-off failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_url: Option<String>,
    pub order: Order,
}

/// Result of retrying the gateway hand-off.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentLink {
    pub order_id: OrderId,
    pub payment_url: String,
}

/// Current status and log, newest first.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tracking {
    pub order_id: OrderId,
    pub current_status: OrderStatus,
    pub current_status_label: &'static str,
    pub tracking_updates: Vec<StatusEvent>,
}

/// How card orders reach the payment gateway.
#[derive(Clone, Copy)]
pub struct Checkout<'a> {
    pub gateway: &'a dyn PaymentGateway,
    /// Base of the redirect URLs.
    pub client_url: &'a Url,
    /// Upper bound for one hand-off.
    pub timeout: Duration,
}

/// Order operations for one request.
pub struct OrderService<'a> {
    store: &'a dyn Store,
    locks: &'a CartLocks,
    pricing: &'a PricingPolicy,
    notifier: &'a dyn NotificationSink,
    checkout: Option<Checkout<'a>>,
}

impl<'a> OrderService<'a> {
    #[must_use]
    pub const fn new(
        store: &'a dyn Store,
        locks: &'a CartLocks,
        pricing: &'a PricingPolicy,
        notifier: &'a dyn NotificationSink,
        checkout: Option<Checkout<'a>>,
    ) -> Self {
        Self {
            store,
            locks,
            pricing,
            notifier,
            checkout,
        }
    }

    /// Turn the user's cart into an order.
    ///
    /// # Errors
    ///
    /// - `BadRequest` for an empty cart, an incomplete address, or a card
    ///   order when card payments are not configured
    /// - `NotFound`/`Unavailable` when a dish can no longer be ordered
    /// - a [`PromoRejection`] when the promo code does not apply
    /// - `Conflict` when the cart changed while the order was being priced
    #[instrument(skip(self, request), fields(user_id = %user, payment_method = %request.payment_method))]
    pub async fn place(&self, user: UserId, request: PlaceOrder) -> Result<PlacedOrder, AppError> {
        let missing = request.address.missing_fields();
        if !missing.is_empty() {
            return Err(AppError::BadRequest(format!(
                "Missing delivery address fields: {}",
                missing.join(", ")
            )));
        }
        let card = request.payment_method == PaymentMethod::Card;
        if card && self.checkout.is_none() {
            return Err(card_payments_disabled());
        }

        let guard = self.locks.lock(user).await;

        let cart = self.store.cart_entries(user).await?;
        if cart.is_empty() {
            return Err(AppError::BadRequest("Cart is empty".to_string()));
        }
        if let Some(items) = &request.items
            && !matches_cart(items, &cart)
        {
            return Err(AppError::Conflict(
                "Cart has changed, please review your order".to_string(),
            ));
        }

        let lines = self.price_lines(&cart).await?;
        let subtotal: Money = lines.iter().map(OrderLine::line_total).sum();

        let now = Utc::now();
        let promo_code = request
            .promo_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty());
        let promo = match promo_code {
            Some(code) => Some(
                PromoService::new(self.store)
                    .check(user, code, subtotal.amount(), now)
                    .await?,
            ),
            None => None,
        };
        let discount = promo.as_ref().map_or(Money::ZERO, |p| p.quote.discount_amount);
        let pricing = self.pricing.quote(subtotal, discount);

        let status = OrderStatus::initial_for(request.payment_method);
        let new_order = NewOrder {
            user_id: user,
            items: lines,
            pricing,
            promo_code: promo.as_ref().map(|p| p.promo.code.clone()),
            address: request.address,
            payment_method: request.payment_method,
            special_instructions: request
                .special_instructions
                .filter(|s| !s.trim().is_empty()),
            initial_event: StatusEvent::new(status, lifecycle::default_message(status), now),
        };
        // Card orders redeem once the payment is confirmed.
        let redeem = promo.as_ref().filter(|_| !card).map(|p| p.promo.id);

        let order = match self.store.place_order(&new_order, &cart, redeem).await? {
            Placement::Placed(order) => *order,
            Placement::CartChanged => {
                return Err(AppError::Conflict(
                    "Cart changed while placing the order".to_string(),
                ));
            }
            Placement::PromoExhausted => return Err(PromoRejection::LimitExceeded.into()),
            Placement::PromoAlreadyUsed => return Err(PromoRejection::AlreadyUsed.into()),
        };
        drop(guard);

        tracing::info!(
            order_id = %order.id,
            amount = %order.amount,
            status = %order.status,
            "Order placed"
        );
        dispatch(self.notifier, notify::order_placed(&order)).await;

        let payment_url = if card {
            match self.hand_off(&order).await {
                Ok(session) => Some(session.url),
                Err(e) => {
                    tracing::warn!(
                        order_id = %order.id,
                        error = %e,
                        "Payment hand-off failed; order stays pending"
                    );
                    None
                }
            }
        } else {
            None
        };

        Ok(PlacedOrder {
            order_id: order.id,
            amount: order.amount,
            status: order.status,
            payment_url,
            order,
        })
    }

    /// Current catalog data for every cart entry.
    async fn price_lines(&self, cart: &[CartEntry]) -> Result<Vec<OrderLine>, AppError> {
        let ids: Vec<FoodId> = cart.iter().map(|e| e.food_id).collect();
        let foods: HashMap<FoodId, FoodItem> = self
            .store
            .get_foods(&ids)
            .await?
            .into_iter()
            .map(|f| (f.id, f))
            .collect();

        cart.iter()
            .map(|entry| {
                let food = foods
                    .get(&entry.food_id)
                    .ok_or_else(|| food_not_found(entry.food_id))?;
                if !food.available {
                    return Err(AppError::Unavailable(format!(
                        "{} is currently unavailable",
                        food.name
                    )));
                }
                Ok(OrderLine {
                    food_id: food.id,
                    name: food.name.clone(),
                    category: food.category.clone(),
                    unit_price: food.price,
                    quantity: entry.quantity,
                })
            })
            .collect()
    }

    async fn hand_off(&self, order: &Order) -> Result<CheckoutSession, AppError> {
        let checkout = self.checkout.ok_or_else(card_payments_disabled)?;
        let request = CheckoutRequest::for_order(order, checkout.client_url);
        let session = tokio::time::timeout(
            checkout.timeout,
            checkout.gateway.create_checkout(&request),
        )
        .await
        .map_err(|_| PaymentError::Timeout)??;
        self.store
            .attach_payment_session(order.id, &session.id)
            .await?;
        tracing::info!(order_id = %order.id, session_id = %session.id, "Payment hand-off complete");
        Ok(session)
    }

    /// Ask the gateway whether the order's checkout session was paid.
    async fn gateway_confirms(&self, order: &Order) -> Result<bool, AppError> {
        let Some(session_id) = order.payment_session_id.as_deref() else {
            return Ok(false);
        };
        let checkout = self.checkout.ok_or_else(card_payments_disabled)?;
        let paid = tokio::time::timeout(
            checkout.timeout,
            checkout.gateway.session_paid(session_id),
        )
        .await
        .map_err(|_| PaymentError::Timeout)??;
        Ok(paid)
    }

    /// Record the outcome the client reports after the checkout redirect.
    ///
    /// A reported success only confirms the order when the gateway agrees
    /// that the checkout session was paid. A repeated success for a
    /// confirmed, paid order changes nothing.
    ///
    /// # Errors
    ///
    /// - `InvalidState` when the order is not a card order awaiting payment
    /// - `PaymentFailed` when the payment failed or the gateway has no record
    ///   of it; the order stays pending
    /// - `Payment` when the gateway cannot be asked
    #[instrument(skip(self, actor), fields(user_id = %actor.id))]
    pub async fn verify_payment(
        &self,
        actor: &AuthUser,
        id: OrderId,
        success: bool,
    ) -> Result<Order, AppError> {
        let order = self.load_for(actor, id).await?;

        if success && order.status == OrderStatus::Confirmed && order.payment_confirmed {
            return Ok(order);
        }
        if !order.awaits_card_payment() {
            return Err(AppError::InvalidState(
                "Order is not awaiting card payment".to_string(),
            ));
        }
        if !success {
            tracing::info!(order_id = %id, "Payment reported as failed");
            dispatch(self.notifier, notify::payment_failed(&order)).await;
            return Err(AppError::PaymentFailed(
                "Payment verification failed".to_string(),
            ));
        }
        if !self.gateway_confirms(&order).await? {
            tracing::warn!(order_id = %id, "Reported payment not confirmed by gateway");
            return Err(AppError::PaymentFailed(
                "Payment has not been completed".to_string(),
            ));
        }

        order.status.transition(OrderStatus::Confirmed)?;
        let event = StatusEvent::new(OrderStatus::Confirmed, "Payment confirmed", Utc::now());
        let confirmed = self
            .store
            .transition_order(id, order.status, &event, Some(true))
            .await?
            .ok_or_else(changed_concurrently)?;

        if let Some(code) = &confirmed.promo_code {
            self.redeem_after_payment(code, confirmed.user_id).await;
        }

        tracing::info!(order_id = %id, "Payment confirmed");
        dispatch(self.notifier, notify::payment_confirmed(&confirmed)).await;
        Ok(confirmed)
    }

    /// The customer has paid, so a lost race for the code's last use is
    /// logged rather than charged back.
    async fn redeem_after_payment(&self, code: &str, user: UserId) {
        let promo = match self.store.find_promo_by_code(code).await {
            Ok(Some(promo)) => promo,
            Ok(None) => {
                tracing::warn!(code, "Promo code on paid order no longer exists");
                return;
            }
            Err(e) => {
                tracing::warn!(code, error = %e, "Promo lookup failed after payment");
                return;
            }
        };
        match self.store.redeem_promo(promo.id, user).await {
            Ok(RedemptionOutcome::Applied) => {
                tracing::info!(code, "Promo code redeemed after payment");
            }
            Ok(outcome) => {
                tracing::warn!(code, ?outcome, "Promo code not redeemed after payment");
            }
            Err(e) => {
                tracing::warn!(code, error = %e, "Promo redemption failed after payment");
            }
        }
    }

    /// Cancel a pending or confirmed order.
    ///
    /// # Errors
    ///
    /// `Forbidden` for someone else's order, `InvalidTransition` once the
    /// kitchen has started.
    #[instrument(skip(self, actor, reason), fields(user_id = %actor.id))]
    pub async fn cancel(
        &self,
        actor: &AuthUser,
        id: OrderId,
        reason: Option<&str>,
    ) -> Result<Order, AppError> {
        let order = self.load_for(actor, id).await?;
        let message = reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| lifecycle::default_message(OrderStatus::Cancelled));

        let cancelled = self
            .move_to(&order, OrderStatus::Cancelled, message)
            .await?;
        dispatch(self.notifier, notify::order_cancelled(&cancelled)).await;
        Ok(cancelled)
    }

    /// Admin status change along the status machine.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown order, `InvalidTransition` for a move the
    /// machine does not allow.
    #[instrument(skip(self, message))]
    pub async fn update_status(
        &self,
        id: OrderId,
        status: OrderStatus,
        message: Option<&str>,
    ) -> Result<Order, AppError> {
        let order = self.load(id).await?;
        let message = message.map(str::trim).filter(|m| !m.is_empty());

        let updated = self
            .move_to(
                &order,
                status,
                message.unwrap_or_else(|| lifecycle::default_message(status)),
            )
            .await?;
        dispatch(self.notifier, notify::status_updated(&updated, message)).await;
        Ok(updated)
    }

    async fn move_to(
        &self,
        order: &Order,
        next: OrderStatus,
        message: &str,
    ) -> Result<Order, AppError> {
        order.status.transition(next)?;
        let event = StatusEvent::new(next, message, Utc::now());
        let updated = self
            .store
            .transition_order(order.id, order.status, &event, None)
            .await?
            .ok_or_else(changed_concurrently)?;

        tracing::info!(
            order_id = %order.id,
            from = %order.status,
            to = %next,
            "Order status changed"
        );
        Ok(updated)
    }

    /// Rate a delivered order.
    ///
    /// # Errors
    ///
    /// `InvalidState` before delivery, `BadRequest` for a rating outside
    /// 1-5, `Conflict` for a second rating.
    #[instrument(skip(self, actor, review), fields(user_id = %actor.id))]
    pub async fn rate(
        &self,
        actor: &AuthUser,
        id: OrderId,
        rating: i16,
        review: Option<&str>,
    ) -> Result<Order, AppError> {
        let order = self.load(id).await?;
        if order.user_id != actor.id {
            return Err(not_your_order());
        }
        if !order.status.accepts_rating() {
            return Err(AppError::InvalidState(
                "Only delivered orders can be rated".to_string(),
            ));
        }
        if !lifecycle::is_valid_rating(rating) {
            return Err(AppError::BadRequest(format!(
                "Rating must be between {} and {}",
                lifecycle::MIN_RATING,
                lifecycle::MAX_RATING
            )));
        }
        if order.rating.is_some() {
            return Err(already_rated());
        }

        let review = review.map(str::trim).filter(|r| !r.is_empty());
        let rated = self
            .store
            .rate_order(id, rating, review)
            .await?
            .ok_or_else(already_rated)?;
        tracing::info!(order_id = %id, rating, "Order rated");
        Ok(rated)
    }

    /// # Errors
    ///
    /// `NotFound` for an unknown order, `Forbidden` for someone else's.
    pub async fn get(&self, actor: &AuthUser, id: OrderId) -> Result<Order, AppError> {
        self.load_for(actor, id).await
    }

    /// The user's own orders, newest first.
    ///
    /// # Errors
    ///
    /// Store failures only.
    pub async fn list_for(
        &self,
        user: UserId,
        status: Option<OrderStatus>,
        page: Page,
    ) -> Result<PageOf<Order>, AppError> {
        let filter = OrderFilter {
            user_id: Some(user),
            status,
        };
        Ok(self.store.list_orders(&filter, page).await?)
    }

    /// Every order, newest first.
    ///
    /// # Errors
    ///
    /// Store failures only.
    pub async fn list_all(
        &self,
        filter: &OrderFilter,
        page: Page,
    ) -> Result<PageOf<Order>, AppError> {
        Ok(self.store.list_orders(filter, page).await?)
    }

    /// # Errors
    ///
    /// `NotFound` for an unknown order, `Forbidden` for someone else's.
    pub async fn track(&self, actor: &AuthUser, id: OrderId) -> Result<Tracking, AppError> {
        let order = self.load_for(actor, id).await?;
        let mut updates = order.status_history;
        updates.reverse();
        Ok(Tracking {
            order_id: order.id,
            current_status: order.status,
            current_status_label: order.status.label(),
            tracking_updates: updates,
        })
    }

    /// Retry the gateway hand-off for a card order still awaiting payment.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless the order is an unpaid pending card order;
    /// `UpstreamFailure` when the gateway fails again.
    #[instrument(skip(self, actor), fields(user_id = %actor.id))]
    pub async fn retry_payment(
        &self,
        actor: &AuthUser,
        id: OrderId,
    ) -> Result<PaymentLink, AppError> {
        let order = self.load(id).await?;
        if order.user_id != actor.id {
            return Err(not_your_order());
        }
        if !order.awaits_card_payment() {
            return Err(AppError::InvalidState(
                "Order is not awaiting card payment".to_string(),
            ));
        }
        let session = self.hand_off(&order).await?;
        Ok(PaymentLink {
            order_id: order.id,
            payment_url: session.url,
        })
    }

    async fn load(&self, id: OrderId) -> Result<Order, AppError> {
        self.store
            .get_order(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Order {id} not found")))
    }

    async fn load_for(&self, actor: &AuthUser, id: OrderId) -> Result<Order, AppError> {
        let order = self.load(id).await?;
        if !actor.can_access(order.user_id) {
            return Err(not_your_order());
        }
        Ok(order)
    }
}

fn matches_cart(items: &[RequestedItem], cart: &[CartEntry]) -> bool {
    let mut requested: Vec<CartEntry> = items
        .iter()
        .map(|i| CartEntry {
            food_id: i.food_id,
            quantity: i.quantity,
        })
        .collect();
    requested.sort_unstable();
    requested == cart
}

fn card_payments_disabled() -> AppError {
    AppError::BadRequest("Card payments are not available".to_string())
}

fn changed_concurrently() -> AppError {
    AppError::Conflict("Order was updated by someone else, please retry".to_string())
}

fn not_your_order() -> AppError {
    AppError::Forbidden("Not authorized to access this order".to_string())
}

fn already_rated() -> AppError {
    AppError::Conflict("Order has already been rated".to_string())
}
