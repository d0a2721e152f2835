//! `PostgreSQL` adapter.
//!
//! Queries are built at runtime with `sqlx::query_as` so the crate compiles
//! without a live database. Multi-step writes (placement, status changes,
//! ratings, reviews, redemptions) run in a single transaction each.

mod carts;
mod foods;
mod notifications;
mod orders;
mod promos;
mod reviews;
mod users;
mod wishlist;

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use cravecart_core::Page;

use super::{RepositoryError, Store, quantity_too_large};

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// [`Store`] backed by a `PostgreSQL` pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// `LIMIT` and `OFFSET` bind values for a page.
fn limit_offset(page: Page) -> (i64, i64) {
    (
        i64::from(page.limit()),
        i64::try_from(page.offset()).unwrap_or(i64::MAX),
    )
}

/// Convert a `COUNT(*)` result.
fn to_total(count: i64) -> u64 {
    u64::try_from(count).unwrap_or_default()
}

/// Quantities are stored as `INTEGER`.
fn to_db_quantity(quantity: u32) -> Result<i32, RepositoryError> {
    i32::try_from(quantity).map_err(|_| quantity_too_large(quantity))
}

fn from_db_quantity(quantity: i32) -> Result<u32, RepositoryError> {
    u32::try_from(quantity).map_err(|_| {
        RepositoryError::DataCorruption(format!("negative quantity in database: {quantity}"))
    })
}
