use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use sqlx::types::Json;

use cravecart_core::{
    Money, OrderId, OrderStatus, Page, PaymentMethod, PromoCodeId, RedemptionOutcome, StatusEvent,
    UserId,
};

use super::carts::CartRow;
use super::{PgStore, limit_offset, promos, to_total};
use crate::db::{OrderRepository, PageOf, RepositoryError};
use crate::models::{
    CartEntry, DeliveryAddress, NewOrder, Order, OrderFilter, OrderLine, Placement,
};

const ORDER_COLUMNS: &str = "id, user_id, items, subtotal, tax, delivery_fee, discount, \
     promo_code, amount, address, payment_method, status, payment_confirmed, \
     payment_session_id, special_instructions, rating, review, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    user_id: UserId,
    items: Json<Vec<OrderLine>>,
    subtotal: Money,
    tax: Money,
    delivery_fee: Money,
    discount: Money,
    promo_code: Option<String>,
    amount: Money,
    address: Json<DeliveryAddress>,
    payment_method: PaymentMethod,
    status: OrderStatus,
    payment_confirmed: bool,
    payment_session_id: Option<String>,
    special_instructions: Option<String>,
    rating: Option<i16>,
    review: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self, status_history: Vec<StatusEvent>) -> Order {
        Order {
            id: self.id,
            user_id: self.user_id,
            items: self.items.0,
            subtotal: self.subtotal,
            tax: self.tax,
            delivery_fee: self.delivery_fee,
            discount: self.discount,
            promo_code: self.promo_code,
            amount: self.amount,
            address: self.address.0,
            payment_method: self.payment_method,
            status: self.status,
            payment_confirmed: self.payment_confirmed,
            payment_session_id: self.payment_session_id,
            special_instructions: self.special_instructions,
            rating: self.rating,
            review: self.review,
            status_history,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    order_id: OrderId,
    status: OrderStatus,
    message: String,
    occurred_at: DateTime<Utc>,
}

async fn insert_event(
    conn: &mut PgConnection,
    order: OrderId,
    event: &StatusEvent,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO order_status_event (order_id, status, message, occurred_at) \
         VALUES ($1, $2, $3, $4)",
    )
    .bind(order)
    .bind(event.status)
    .bind(&event.message)
    .bind(event.timestamp)
    .execute(conn)
    .await?;
    Ok(())
}

/// Attach status logs to a batch of order rows, preserving row order.
async fn with_history(
    conn: &mut PgConnection,
    rows: Vec<OrderRow>,
) -> Result<Vec<Order>, RepositoryError> {
    let ids: Vec<i32> = rows.iter().map(|r| r.id.as_i32()).collect();
    let events = sqlx::query_as::<_, EventRow>(
        "SELECT order_id, status, message, occurred_at FROM order_status_event \
         WHERE order_id = ANY($1) ORDER BY id",
    )
    .bind(ids)
    .fetch_all(conn)
    .await?;

    let mut history: HashMap<OrderId, Vec<StatusEvent>> = HashMap::new();
    for event in events {
        history
            .entry(event.order_id)
            .or_default()
            .push(StatusEvent::new(event.status, event.message, event.occurred_at));
    }

    Ok(rows
        .into_iter()
        .map(|row| {
            let events = history.remove(&row.id).unwrap_or_default();
            row.into_order(events)
        })
        .collect())
}

async fn single(conn: &mut PgConnection, row: OrderRow) -> Result<Order, RepositoryError> {
    with_history(conn, vec![row])
        .await?
        .pop()
        .ok_or_else(|| RepositoryError::DataCorruption("order vanished while loading".into()))
}

#[async_trait]
impl OrderRepository for PgStore {
    async fn place_order(
        &self,
        order: &NewOrder,
        expected_cart: &[CartEntry],
        redeem: Option<PromoCodeId>,
    ) -> Result<Placement, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, CartRow>(
            "SELECT food_id, quantity FROM cart_entry WHERE user_id = $1 \
             ORDER BY food_id FOR UPDATE",
        )
        .bind(order.user_id)
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(CartEntry::try_from)
        .collect::<Result<Vec<_>, _>>()?;
        if current != expected_cart {
            return Ok(Placement::CartChanged);
        }

        if let Some(promo) = redeem {
            match promos::redeem_in(&mut tx, promo, order.user_id).await? {
                RedemptionOutcome::Applied => {}
                RedemptionOutcome::AlreadyApplied => return Ok(Placement::PromoAlreadyUsed),
                RedemptionOutcome::LimitReached => return Ok(Placement::PromoExhausted),
            }
        }

        let event = &order.initial_event;
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "INSERT INTO customer_order \
                 (user_id, items, subtotal, tax, delivery_fee, discount, promo_code, amount, \
                  address, payment_method, status, special_instructions, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $13) \
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(order.user_id)
        .bind(Json(&order.items))
        .bind(order.pricing.subtotal)
        .bind(order.pricing.tax)
        .bind(order.pricing.delivery_fee)
        .bind(order.pricing.discount)
        .bind(order.promo_code.as_deref())
        .bind(order.pricing.total)
        .bind(Json(&order.address))
        .bind(order.payment_method)
        .bind(event.status)
        .bind(order.special_instructions.as_deref())
        .bind(event.timestamp)
        .fetch_one(&mut *tx)
        .await?;
        insert_event(&mut tx, row.id, event).await?;

        // Only the priced lines; anything added concurrently stays in the cart.
        let priced: Vec<i32> = expected_cart.iter().map(|e| e.food_id.as_i32()).collect();
        sqlx::query("DELETE FROM cart_entry WHERE user_id = $1 AND food_id = ANY($2)")
            .bind(order.user_id)
            .bind(priced)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Placement::Placed(Box::new(
            row.into_order(vec![event.clone()]),
        )))
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM customer_order WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
        match row {
            Some(row) => Ok(Some(single(&mut conn, row).await?)),
            None => Ok(None),
        }
    }

    async fn list_orders(
        &self,
        filter: &OrderFilter,
        page: Page,
    ) -> Result<PageOf<Order>, RepositoryError> {
        let (limit, offset) = limit_offset(page);
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM customer_order \
             WHERE ($1::int IS NULL OR user_id = $1) AND ($2::text IS NULL OR status = $2) \
             ORDER BY created_at DESC, id DESC LIMIT $3 OFFSET $4"
        ))
        .bind(filter.user_id)
        .bind(filter.status)
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut *conn)
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM customer_order \
             WHERE ($1::int IS NULL OR user_id = $1) AND ($2::text IS NULL OR status = $2)",
        )
        .bind(filter.user_id)
        .bind(filter.status)
        .fetch_one(&mut *conn)
        .await?;

        let orders = with_history(&mut conn, rows).await?;
        Ok((orders, to_total(total)))
    }

    async fn transition_order(
        &self,
        id: OrderId,
        expected: OrderStatus,
        event: &StatusEvent,
        payment_confirmed: Option<bool>,
    ) -> Result<Option<Order>, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "UPDATE customer_order SET \
                 status = $3, \
                 payment_confirmed = COALESCE($4, payment_confirmed), \
                 updated_at = $5 \
             WHERE id = $1 AND status = $2 \
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(id)
        .bind(expected)
        .bind(event.status)
        .bind(payment_confirmed)
        .bind(event.timestamp)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        insert_event(&mut tx, id, event).await?;
        let order = single(&mut tx, row).await?;
        tx.commit().await?;
        Ok(Some(order))
    }

    async fn attach_payment_session(
        &self,
        id: OrderId,
        session_id: &str,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE customer_order SET payment_session_id = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn rate_order(
        &self,
        id: OrderId,
        rating: i16,
        review: Option<&str>,
    ) -> Result<Option<Order>, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "UPDATE customer_order SET rating = $2, review = $3, updated_at = now() \
             WHERE id = $1 AND status = $4 AND rating IS NULL \
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(id)
        .bind(rating)
        .bind(review)
        .bind(OrderStatus::Delivered)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let rated: BTreeSet<i32> = row.items.0.iter().map(|l| l.food_id.as_i32()).collect();
        sqlx::query(
            "UPDATE food SET \
                 rating = ROUND((rating * review_count + $2) / (review_count + 1), 2), \
                 review_count = review_count + 1, \
                 updated_at = now() \
             WHERE id = ANY($1)",
        )
        .bind(rated.into_iter().collect::<Vec<_>>())
        .bind(rating)
        .execute(&mut *tx)
        .await?;

        let order = single(&mut tx, row).await?;
        tx.commit().await?;
        Ok(Some(order))
    }
}
