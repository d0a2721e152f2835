//! Domain models for the CraveCart server.
//!
//! These are validated domain objects returned by the repositories and
//! serialized in API responses. Models whose columns map one-to-one derive
//! `sqlx::FromRow`; the rest are assembled from private row types in the
//! `PostgreSQL` adapter.

pub mod cart;
pub mod food;
pub mod notification;
pub mod order;
pub mod promo;
pub mod review;
pub mod user;
pub mod wishlist;

pub use cart::{CartEntry, CartLine, CartView};
pub use food::{FoodFilter, FoodItem, FoodUpdate, NewFoodItem};
pub use notification::{NewNotification, Notification};
pub use order::{DeliveryAddress, NewOrder, Order, OrderFilter, OrderLine, Placement};
pub use promo::{NewPromoCode, PromoCode, PromoStats, PromoUpdate};
pub use review::{NewReview, Review, ReviewUpdate, ReviewVotes};
pub use user::{NewUser, User};
pub use wishlist::{WishlistEntry, WishlistItem};
