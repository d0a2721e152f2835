use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgConnection;

use cravecart_core::{Page, PromoCodeId, RedemptionOutcome, UserId};

use super::{PgStore, limit_offset, to_total};
use crate::db::{PageOf, PromoRepository, RepositoryError, conflict_on_unique};
use crate::models::{NewPromoCode, PromoCode, PromoUpdate};

const PROMO_COLUMNS: &str = "id, code, description, discount_type, discount_value, \
     min_order_amount, max_discount, usage_limit, usage_count, valid_from, valid_until, \
     active, created_at, updated_at";

/// Redeem inside the caller's transaction.
///
/// The promo row is locked first so concurrent redemptions of the same code
/// queue up. On anything but `Applied` the caller must roll back, since the
/// redemption row may already be written.
pub(super) async fn redeem_in(
    conn: &mut PgConnection,
    promo: PromoCodeId,
    user: UserId,
) -> Result<RedemptionOutcome, RepositoryError> {
    let exists: Option<PromoCodeId> =
        sqlx::query_scalar("SELECT id FROM promo_code WHERE id = $1 FOR UPDATE")
            .bind(promo)
            .fetch_optional(&mut *conn)
            .await?;
    if exists.is_none() {
        return Err(RepositoryError::NotFound);
    }

    let inserted = sqlx::query(
        "INSERT INTO promo_redemption (promo_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(promo)
    .bind(user)
    .execute(&mut *conn)
    .await?;
    if inserted.rows_affected() == 0 {
        return Ok(RedemptionOutcome::AlreadyApplied);
    }

    let bumped = sqlx::query(
        "UPDATE promo_code SET usage_count = usage_count + 1, updated_at = now() \
         WHERE id = $1 AND (usage_limit IS NULL OR usage_count < usage_limit)",
    )
    .bind(promo)
    .execute(&mut *conn)
    .await?;
    if bumped.rows_affected() == 0 {
        return Ok(RedemptionOutcome::LimitReached);
    }

    Ok(RedemptionOutcome::Applied)
}

#[async_trait]
impl PromoRepository for PgStore {
    async fn find_promo_by_code(&self, code: &str) -> Result<Option<PromoCode>, RepositoryError> {
        let promo = sqlx::query_as::<_, PromoCode>(&format!(
            "SELECT {PROMO_COLUMNS} FROM promo_code WHERE code = $1"
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(promo)
    }

    async fn get_promo(&self, id: PromoCodeId) -> Result<Option<PromoCode>, RepositoryError> {
        let promo = sqlx::query_as::<_, PromoCode>(&format!(
            "SELECT {PROMO_COLUMNS} FROM promo_code WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(promo)
    }

    async fn has_redeemed(
        &self,
        promo: PromoCodeId,
        user: UserId,
    ) -> Result<bool, RepositoryError> {
        let redeemed = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM promo_redemption WHERE promo_id = $1 AND user_id = $2)",
        )
        .bind(promo)
        .bind(user)
        .fetch_one(&self.pool)
        .await?;
        Ok(redeemed)
    }

    async fn redeem_promo(
        &self,
        promo: PromoCodeId,
        user: UserId,
    ) -> Result<RedemptionOutcome, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let outcome = redeem_in(&mut tx, promo, user).await?;
        if outcome == RedemptionOutcome::Applied {
            tx.commit().await?;
        } else {
            tx.rollback().await?;
        }
        Ok(outcome)
    }

    async fn create_promo(
        &self,
        code: &str,
        promo: &NewPromoCode,
    ) -> Result<PromoCode, RepositoryError> {
        sqlx::query_as::<_, PromoCode>(&format!(
            "INSERT INTO promo_code \
                 (code, description, discount_type, discount_value, min_order_amount, \
                  max_discount, usage_limit, valid_from, valid_until) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {PROMO_COLUMNS}"
        ))
        .bind(code)
        .bind(&promo.description)
        .bind(promo.discount_type)
        .bind(promo.discount_value)
        .bind(promo.min_order_amount)
        .bind(promo.max_discount)
        .bind(promo.usage_limit)
        .bind(promo.valid_from)
        .bind(promo.valid_until)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "promo code"))
    }

    async fn list_promos(
        &self,
        active: Option<bool>,
        page: Page,
    ) -> Result<PageOf<PromoCode>, RepositoryError> {
        let (limit, offset) = limit_offset(page);
        let promos = sqlx::query_as::<_, PromoCode>(&format!(
            "SELECT {PROMO_COLUMNS} FROM promo_code \
             WHERE ($1::bool IS NULL OR active = $1) \
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"
        ))
        .bind(active)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM promo_code WHERE ($1::bool IS NULL OR active = $1)",
        )
        .bind(active)
        .fetch_one(&self.pool)
        .await?;

        Ok((promos, to_total(total)))
    }

    async fn list_live_promos(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<PromoCode>, RepositoryError> {
        let promos = sqlx::query_as::<_, PromoCode>(&format!(
            "SELECT {PROMO_COLUMNS} FROM promo_code \
             WHERE active \
               AND (valid_from IS NULL OR valid_from <= $1) \
               AND (valid_until IS NULL OR valid_until >= $1) \
             ORDER BY id"
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(promos)
    }

    async fn update_promo(
        &self,
        id: PromoCodeId,
        update: &PromoUpdate,
    ) -> Result<PromoCode, RepositoryError> {
        sqlx::query_as::<_, PromoCode>(&format!(
            "UPDATE promo_code SET \
                 description = COALESCE($2, description), \
                 discount_value = COALESCE($3, discount_value), \
                 active = COALESCE($4, active), \
                 valid_until = COALESCE($5, valid_until), \
                 usage_limit = COALESCE($6, usage_limit), \
                 updated_at = now() \
             WHERE id = $1 \
             RETURNING {PROMO_COLUMNS}"
        ))
        .bind(id)
        .bind(update.description.as_deref())
        .bind(update.discount_value)
        .bind(update.active)
        .bind(update.valid_until)
        .bind(update.usage_limit)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    async fn delete_promo(&self, id: PromoCodeId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM promo_code WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn promo_redeemer_count(&self, id: PromoCodeId) -> Result<u64, RepositoryError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM promo_redemption WHERE promo_id = $1")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
        Ok(to_total(count))
    }
}
