//! CraveCart Core - Domain types and checkout rules.
//!
//! This crate provides the types and business rules shared by every CraveCart
//! component:
//! - `server` - JSON REST API (cart, checkout, orders, promo codes)
//! - `cli` - Command-line tools for migrations and management
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database
//! access, no HTTP clients. Everything that decides an amount of money or a
//! status change lives here so it can be tested without a running store.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, money, emails, and statuses
//! - [`pricing`] - Subtotal, tax, delivery fee and final charge
//! - [`promo`] - Promo code eligibility and discount computation
//! - [`lifecycle`] - Order status state machine
//! - [`pagination`] - Page/limit validation shared by list endpoints

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod lifecycle;
pub mod pagination;
pub mod pricing;
pub mod promo;
pub mod types;

pub use lifecycle::{StatusEvent, TransitionError};
pub use pagination::{Page, PageError, Paginated};
pub use pricing::{PriceBreakdown, PricingPolicy};
pub use promo::{DiscountQuote, PromoRejection, PromoTerms, RedemptionOutcome};
pub use types::*;
