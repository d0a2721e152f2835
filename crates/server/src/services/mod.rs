//! Business logic services for CraveCart.
//!
//! # Services
//!
//! - `auth` - Registration, login and JWT access tokens
//! - `cart` - Per-user carts and cart summaries
//! - `promo` - Promo code validation, redemption and administration
//! - `orders` - Order placement and the order status workflow
//! - `payment` - Hosted checkout hand-off (`PaymentGateway`)
//! - `notify` - Order event notifications (`NotificationSink`)
//! - `reviews` - Dish reviews and the top-rated list
//! - `wishlist` - Saved dishes
//!
//! Services borrow what they need from [`AppState`](crate::state::AppState)
//! for the duration of one request and hold no state of their own.

pub mod auth;
pub mod cart;
pub mod notify;
pub mod orders;
pub mod payment;
pub mod promo;
pub mod reviews;
pub mod wishlist;
