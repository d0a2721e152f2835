//! HTTP route handlers for the CraveCart API.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                         - Liveness
//! GET  /health/ready                   - Readiness (store ping)
//!
//! # Accounts
//! POST /api/user/register              - Register a customer
//! POST /api/user/login                 - Login, returns {token, user}
//! GET  /api/user/profile               - Current user (auth)
//!
//! # Catalog
//! GET  /api/food/list                  - Filtered, paginated dishes
//! GET  /api/food/categories            - Distinct categories
//! GET  /api/food/{id}                  - One dish
//! POST /api/food                       - Add a dish (admin)
//! PUT  /api/food/{id}                  - Edit a dish (admin)
//! DELETE /api/food/{id}                - Remove a dish (admin)
//!
//! # Cart (auth)
//! GET  /api/cart                       - Enriched cart
//! GET  /api/cart/summary               - Priced cart
//! POST /api/cart/add                   - Add a dish
//! POST /api/cart/remove                - Remove a dish
//! PUT  /api/cart/{foodId}              - Set quantity (0 removes)
//! DELETE /api/cart                     - Empty the cart
//!
//! # Orders (auth)
//! POST /api/order/place                - Place from the cart
//! POST /api/order/verify-payment       - Gateway outcome
//! GET  /api/order/user                 - Own orders
//! GET  /api/order/{id}                 - One order (owner or admin)
//! GET  /api/order/{id}/track           - Status and log
//! POST /api/order/{id}/cancel          - Cancel
//! POST /api/order/{id}/rate            - Rate a delivered order
//! POST /api/order/{id}/pay             - Retry the gateway hand-off
//! GET  /api/order                      - All orders (admin)
//! PUT  /api/order/{id}/status          - Move along the status machine (admin)
//!
//! # Promo codes
//! GET  /api/promo/active               - Codes usable now
//! POST /api/promo/validate             - Quote a code (auth)
//! POST /api/promo/apply                - Redeem a code (auth)
//! POST /api/promo                      - Create (admin)
//! GET  /api/promo                      - List (admin)
//! PUT  /api/promo/{id}                 - Edit (admin)
//! DELETE /api/promo/{id}               - Delete (admin)
//! GET  /api/promo/{id}/stats           - Usage report (admin)
//!
//! # Reviews
//! GET  /api/review/food/{foodId}       - A dish's reviews
//! GET  /api/review/top-rated           - Best rated dishes
//! POST /api/review                     - Review a dish (auth)
//! GET  /api/review/user                - Own reviews (auth)
//! GET  /api/review/{id}                - One review (auth)
//! PUT  /api/review/{id}                - Edit own review (auth)
//! DELETE /api/review/{id}              - Delete (owner or admin)
//! POST /api/review/{id}/helpful        - Vote (auth)
//!
//! # Wishlist (auth)
//! GET  /api/wishlist                   - Saved dishes
//! POST /api/wishlist/{foodId}          - Save a dish
//! DELETE /api/wishlist/{foodId}        - Unsave a dish
//! DELETE /api/wishlist                 - Clear
//!
//! # Notifications (auth)
//! GET  /api/notifications              - Feed
//! GET  /api/notifications/unread-count - Unread badge
//! PUT  /api/notifications/{id}/read    - Mark one read
//! PUT  /api/notifications/read-all     - Mark all read
//! ```

pub mod cart;
pub mod food;
pub mod health;
pub mod notifications;
pub mod order;
pub mod promo;
pub mod review;
pub mod user;
pub mod wishlist;

use axum::{
    Router,
    extract::{FromRequest, FromRequestParts},
    routing::{get, post, put},
};

use crate::error::AppError;
use crate::middleware::{api_rate_limiter, auth_rate_limiter};
use crate::state::AppState;

/// JSON body whose parse failures use the API error envelope.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Query string whose parse failures use the API error envelope.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);

/// Path parameters whose parse failures use the API error envelope.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct ApiPath<T>(pub T);

/// Create the account routes router.
pub fn user_routes(rate_limit: bool) -> Router<AppState> {
    let credentials = Router::new()
        .route("/register", post(user::register))
        .route("/login", post(user::login));
    let credentials = match auth_rate_limiter().filter(|_| rate_limit) {
        Some(limiter) => credentials.layer(limiter),
        None => credentials,
    };

    Router::new()
        .merge(credentials)
        .route("/profile", get(user::profile))
}

/// Create the catalog routes router.
pub fn food_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(food::create))
        .route("/list", get(food::list))
        .route("/categories", get(food::categories))
        .route(
            "/{id}",
            get(food::show).put(food::update).delete(food::remove),
        )
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show).delete(cart::clear))
        .route("/summary", get(cart::summary))
        .route("/add", post(cart::add))
        .route("/remove", post(cart::remove))
        .route("/{food_id}", put(cart::set_quantity))
}

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(order::list_all))
        .route("/place", post(order::place))
        .route("/verify-payment", post(order::verify_payment))
        .route("/user", get(order::list_own))
        .route("/{id}", get(order::show))
        .route("/{id}/track", get(order::track))
        .route("/{id}/cancel", post(order::cancel))
        .route("/{id}/rate", post(order::rate))
        .route("/{id}/pay", post(order::retry_payment))
        .route("/{id}/status", put(order::update_status))
}

/// Create the promo code routes router.
pub fn promo_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(promo::list).post(promo::create))
        .route("/active", get(promo::active))
        .route("/validate", post(promo::validate))
        .route("/apply", post(promo::apply))
        .route("/{id}", put(promo::update).delete(promo::remove))
        .route("/{id}/stats", get(promo::stats))
}

/// Create the review routes router.
pub fn review_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(review::create))
        .route("/food/{food_id}", get(review::for_food))
        .route("/top-rated", get(review::top_rated))
        .route("/user", get(review::list_own))
        .route(
            "/{id}",
            get(review::show).put(review::update).delete(review::remove),
        )
        .route("/{id}/helpful", post(review::vote))
}

/// Create the wishlist routes router.
pub fn wishlist_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(wishlist::show).delete(wishlist::clear))
        .route("/{food_id}", post(wishlist::add).delete(wishlist::remove))
}

/// Create the notification routes router.
pub fn notification_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(notifications::list))
        .route("/unread-count", get(notifications::unread_count))
        .route("/read-all", put(notifications::mark_all_read))
        .route("/{id}/read", put(notifications::mark_read))
}

/// Create all `/api` routes.
pub fn api_routes(rate_limit: bool) -> Router<AppState> {
    let api = Router::new()
        .nest("/user", user_routes(rate_limit))
        .nest("/food", food_routes())
        .nest("/cart", cart_routes())
        .nest("/order", order_routes())
        .nest("/promo", promo_routes())
        .nest("/review", review_routes())
        .nest("/wishlist", wishlist_routes())
        .nest("/notifications", notification_routes());

    match api_rate_limiter().filter(|_| rate_limit) {
        Some(limiter) => api.layer(limiter),
        None => api,
    }
}

/// Create all routes for the API server.
pub fn routes(rate_limit: bool) -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::ready))
        .nest("/api", api_routes(rate_limit))
}
