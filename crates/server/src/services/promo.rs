//! Promo code service.
//!
//! Eligibility rules live in [`cravecart_core::promo`]; this service feeds
//! them from the store and performs redemptions and admin edits.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::instrument;

use cravecart_core::promo::{self, DiscountQuote, PromoRejection, RedemptionOutcome};
use cravecart_core::{Page, PromoCodeId, UserId};

use crate::db::{PageOf, PromoRepository, RepositoryError, Store};
use crate::error::AppError;
use crate::models::{NewPromoCode, PromoCode, PromoStats, PromoUpdate};

/// A code that passed validation, with its effect on the order amount.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatedPromo {
    pub code: String,
    pub description: String,
    #[serde(flatten)]
    pub quote: DiscountQuote,
}

/// A code looked up and checked for one user.
pub(crate) struct Eligible {
    pub promo: PromoCode,
    pub quote: DiscountQuote,
}

pub struct PromoService<'a> {
    store: &'a dyn Store,
}

impl<'a> PromoService<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// Check a code against an order amount without redeeming it.
    ///
    /// # Errors
    ///
    /// Returns the first [`PromoRejection`] that applies.
    #[instrument(skip(self), fields(user_id = %user))]
    pub async fn validate(
        &self,
        user: UserId,
        code: &str,
        order_amount: Decimal,
    ) -> Result<ValidatedPromo, AppError> {
        let Eligible { promo, quote } = self.check(user, code, order_amount, Utc::now()).await?;
        Ok(ValidatedPromo {
            code: promo.code,
            description: promo.description,
            quote,
        })
    }

    /// Look up `code` and evaluate it for `user`.
    pub(crate) async fn check(
        &self,
        user: UserId,
        code: &str,
        order_amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Eligible, AppError> {
        let code = promo::normalize_code(code)
            .ok_or_else(|| AppError::BadRequest("Promo code is required".to_string()))?;
        let found = self.store.find_promo_by_code(&code).await?;
        let redeemed = match &found {
            Some(p) => self.store.has_redeemed(p.id, user).await?,
            None => false,
        };

        let terms = found.as_ref().map(PromoCode::terms);
        let quote = promo::evaluate(terms.as_ref(), redeemed, order_amount, now)?;
        let promo = found.ok_or(PromoRejection::NotFound)?;
        Ok(Eligible { promo, quote })
    }

    /// Record that `user` used `code`.
    ///
    /// Re-applying a code the user already redeemed changes nothing.
    ///
    /// # Errors
    ///
    /// `PromoRejection::NotFound` for an unknown code,
    /// `PromoRejection::LimitExceeded` when the last use is gone.
    #[instrument(skip(self), fields(user_id = %user))]
    pub async fn apply(&self, user: UserId, code: &str) -> Result<PromoCode, AppError> {
        let code = promo::normalize_code(code)
            .ok_or_else(|| AppError::BadRequest("Promo code is required".to_string()))?;
        let found = self
            .store
            .find_promo_by_code(&code)
            .await?
            .ok_or(PromoRejection::NotFound)?;

        match self.store.redeem_promo(found.id, user).await {
            Ok(RedemptionOutcome::Applied) => {
                tracing::info!(code = %found.code, "Promo code applied");
            }
            Ok(RedemptionOutcome::AlreadyApplied) => {
                tracing::debug!(code = %found.code, "Promo code already applied");
            }
            Ok(RedemptionOutcome::LimitReached) => return Err(PromoRejection::LimitExceeded.into()),
            Err(RepositoryError::NotFound) => return Err(PromoRejection::NotFound.into()),
            Err(e) => return Err(e.into()),
        }

        self.store
            .get_promo(found.id)
            .await?
            .ok_or_else(|| AppError::NotFound("Promo code not found".to_string()))
    }

    /// Codes customers can use right now.
    ///
    /// # Errors
    ///
    /// Store failures only.
    pub async fn list_live(&self) -> Result<Vec<PromoCode>, AppError> {
        Ok(self.store.list_live_promos(Utc::now()).await?)
    }

    /// # Errors
    ///
    /// `BadRequest` for a malformed definition, `Conflict` for a duplicate code.
    #[instrument(skip(self, new), fields(code = %new.code))]
    pub async fn create(&self, new: &NewPromoCode) -> Result<PromoCode, AppError> {
        let code = promo::validate_code(&new.code)?;
        promo::validate_terms(&new.terms())?;

        let created = self.store.create_promo(&code, new).await?;
        tracing::info!(promo_id = %created.id, code = %created.code, "Promo code created");
        Ok(created)
    }

    /// # Errors
    ///
    /// Store failures only.
    pub async fn list(
        &self,
        active: Option<bool>,
        page: Page,
    ) -> Result<PageOf<PromoCode>, AppError> {
        Ok(self.store.list_promos(active, page).await?)
    }

    /// # Errors
    ///
    /// `NotFound` for an unknown id, `BadRequest` when the edited code would
    /// be invalid.
    #[instrument(skip(self, update))]
    pub async fn update(&self, id: PromoCodeId, update: &PromoUpdate) -> Result<PromoCode, AppError> {
        let current = self.get(id).await?;
        promo::validate_terms(&update.applied_to(&current).terms())?;

        let updated = self.store.update_promo(id, update).await?;
        tracing::info!(promo_id = %id, "Promo code updated");
        Ok(updated)
    }

    /// # Errors
    ///
    /// `NotFound` for an unknown id.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: PromoCodeId) -> Result<(), AppError> {
        self.store.delete_promo(id).await?;
        tracing::info!(promo_id = %id, "Promo code deleted");
        Ok(())
    }

    /// # Errors
    ///
    /// `NotFound` for an unknown id.
    pub async fn stats(&self, id: PromoCodeId) -> Result<PromoStats, AppError> {
        let promo = self.get(id).await?;
        let user_count = self.store.promo_redeemer_count(id).await?;
        let terms = promo.terms();
        Ok(PromoStats {
            code: promo.code,
            usage_count: promo.usage_count,
            usage_limit: promo.usage_limit,
            remaining_usage: terms.remaining_uses(),
            usage_percentage: terms.usage_percentage(),
            user_count,
            active: promo.active,
            valid_from: promo.valid_from,
            valid_until: promo.valid_until,
        })
    }

    async fn get(&self, id: PromoCodeId) -> Result<PromoCode, AppError> {
        self.store
            .get_promo(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Promo code not found".to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use cravecart_core::{DiscountType, Money};

    use crate::db::MemoryStore;

    fn flat50(limit: Option<i32>) -> NewPromoCode {
        NewPromoCode {
            code: "flat50".to_string(),
            description: "Rs 50 off".to_string(),
            discount_type: DiscountType::Fixed,
            discount_value: Decimal::from(50),
            min_order_amount: Money::new(Decimal::from(100)),
            max_discount: None,
            usage_limit: limit,
            valid_from: None,
            valid_until: None,
        }
    }

    #[tokio::test]
    async fn create_normalizes_and_rejects_duplicates() {
        let store = MemoryStore::default();
        let promos = PromoService::new(&store);

        let created = promos.create(&flat50(None)).await.unwrap();
        assert_eq!(created.code, "FLAT50");
        assert!(matches!(
            promos.create(&flat50(None)).await,
            Err(AppError::Database(RepositoryError::Conflict(_)))
        ));
    }

    #[tokio::test]
    async fn create_rejects_bad_terms() {
        let store = MemoryStore::default();
        let promos = PromoService::new(&store);
        let mut bad = flat50(None);
        bad.discount_value = Decimal::ZERO;
        assert!(matches!(
            promos.create(&bad).await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn validate_quotes_the_discount() {
        let store = MemoryStore::default();
        let promos = PromoService::new(&store);
        promos.create(&flat50(None)).await.unwrap();

        let quote = promos
            .validate(UserId::new(1), " flat50 ", Decimal::from(200))
            .await
            .unwrap();
        assert_eq!(quote.code, "FLAT50");
        assert_eq!(quote.quote.discount_amount, Money::new(Decimal::from(50)));
        assert_eq!(quote.quote.final_amount, Money::new(Decimal::from(150)));

        assert!(matches!(
            promos.validate(UserId::new(1), "FLAT50", Decimal::from(80)).await,
            Err(AppError::Promo(PromoRejection::BelowMinimum { .. }))
        ));
        assert!(matches!(
            promos.validate(UserId::new(1), "NOPE", Decimal::from(80)).await,
            Err(AppError::Promo(PromoRejection::NotFound))
        ));
    }

    #[tokio::test]
    async fn single_use_code_after_redemption() {
        let store = MemoryStore::default();
        let promos = PromoService::new(&store);
        promos.create(&flat50(Some(1))).await.unwrap();
        let (owner, other) = (UserId::new(1), UserId::new(2));

        promos.apply(owner, "FLAT50").await.unwrap();
        // Applying again is a no-op.
        let again = promos.apply(owner, "FLAT50").await.unwrap();
        assert_eq!(again.usage_count, 1);

        assert!(matches!(
            promos.validate(owner, "FLAT50", Decimal::from(200)).await,
            Err(AppError::Promo(PromoRejection::AlreadyUsed))
        ));
        assert!(matches!(
            promos.validate(other, "FLAT50", Decimal::from(200)).await,
            Err(AppError::Promo(PromoRejection::LimitExceeded))
        ));
        assert!(matches!(
            promos.apply(other, "FLAT50").await,
            Err(AppError::Promo(PromoRejection::LimitExceeded))
        ));
    }

    #[tokio::test]
    async fn stats_report_usage() {
        let store = MemoryStore::default();
        let promos = PromoService::new(&store);
        let created = promos.create(&flat50(Some(4))).await.unwrap();
        promos.apply(UserId::new(1), "FLAT50").await.unwrap();

        let stats = promos.stats(created.id).await.unwrap();
        assert_eq!(stats.usage_count, 1);
        assert_eq!(stats.remaining_usage, Some(3));
        assert_eq!(stats.usage_percentage, 25);
        assert_eq!(stats.user_count, 1);
    }

    #[tokio::test]
    async fn update_revalidates_terms() {
        let store = MemoryStore::default();
        let promos = PromoService::new(&store);
        let created = promos.create(&flat50(None)).await.unwrap();

        let bad = PromoUpdate {
            usage_limit: Some(0),
            ..PromoUpdate::default()
        };
        assert!(matches!(
            promos.update(created.id, &bad).await,
            Err(AppError::BadRequest(_))
        ));

        let off = PromoUpdate {
            active: Some(false),
            ..PromoUpdate::default()
        };
        assert!(!promos.update(created.id, &off).await.unwrap().active);
        assert!(promos.list_live().await.unwrap().is_empty());
    }
}
