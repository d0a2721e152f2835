//! Application state shared across handlers.

use std::sync::Arc;

use cravecart_core::PricingPolicy;

use crate::config::ServerConfig;
use crate::db::Store;
use crate::services::auth::{AuthService, TokenManager};
use crate::services::cart::{CartLocks, CartService};
use crate::services::notify::{NotificationSink, StoredNotifications};
use crate::services::orders::{Checkout, OrderService};
use crate::services::payment::PaymentGateway;
use crate::services::promo::PromoService;
use crate::services::reviews::ReviewService;
use crate::services::wishlist::WishlistService;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like the store, the payment gateway and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ServerConfig,
    store: Arc<dyn Store>,
    payments: Option<Arc<dyn PaymentGateway>>,
    notifier: Arc<dyn NotificationSink>,
    tokens: TokenManager,
    cart_locks: CartLocks,
    pricing: PricingPolicy,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `config` - Server configuration
    /// * `store` - Persistence adapter
    /// * `payments` - Payment gateway; card orders are refused without one
    #[must_use]
    pub fn new(
        config: ServerConfig,
        store: Arc<dyn Store>,
        payments: Option<Arc<dyn PaymentGateway>>,
    ) -> Self {
        let notifier: Arc<dyn NotificationSink> = Arc::new(StoredNotifications::new(store.clone()));
        Self::with_notifier(config, store, payments, notifier)
    }

    /// Create state with a custom notification sink.
    #[must_use]
    pub fn with_notifier(
        config: ServerConfig,
        store: Arc<dyn Store>,
        payments: Option<Arc<dyn PaymentGateway>>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        let tokens = TokenManager::new(&config.jwt_secret, config.jwt_ttl);
        Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                payments,
                notifier,
                tokens,
                cart_locks: CartLocks::new(),
                pricing: PricingPolicy::default(),
            }),
        }
    }

    /// Get a reference to the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Get a reference to the store.
    #[must_use]
    pub fn store(&self) -> &dyn Store {
        self.inner.store.as_ref()
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenManager {
        &self.inner.tokens
    }

    #[must_use]
    pub fn pricing(&self) -> &PricingPolicy {
        &self.inner.pricing
    }

    #[must_use]
    pub fn auth(&self) -> AuthService<'_> {
        AuthService::new(self.store(), self.tokens())
    }

    #[must_use]
    pub fn carts(&self) -> CartService<'_> {
        CartService::new(self.store(), &self.inner.cart_locks, &self.inner.pricing)
    }

    #[must_use]
    pub fn promos(&self) -> PromoService<'_> {
        PromoService::new(self.store())
    }

    #[must_use]
    pub fn reviews(&self) -> ReviewService<'_> {
        ReviewService::new(self.store())
    }

    #[must_use]
    pub fn wishlist(&self) -> WishlistService<'_> {
        WishlistService::new(self.store())
    }

    #[must_use]
    pub fn orders(&self) -> OrderService<'_> {
        let inner = &*self.inner;
        let checkout = inner.payments.as_deref().map(|gateway| Checkout {
            gateway,
            client_url: &inner.config.client_url,
            timeout: inner
                .config
                .payment
                .as_ref()
                .map_or(DEFAULT_PAYMENT_TIMEOUT, |p| p.timeout),
        });
        OrderService::new(
            inner.store.as_ref(),
            &inner.cart_locks,
            &inner.pricing,
            inner.notifier.as_ref(),
            checkout,
        )
    }
}

/// Hand-off bound when the gateway was supplied without payment config.
const DEFAULT_PAYMENT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);
