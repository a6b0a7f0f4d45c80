//! Postgres-backed order store.
//!
//! The audit write accompanying a state change commits in the same
//! transaction, and guarded updates compare-and-set on the current status
//! so a raced writer cannot double-apply a transition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::db::Db;
use crate::error::Result;
use crate::models::{NewTradeLog, OrderStatus, SellOrder, TradeLog};

use super::{decode_items, encode_items, OrderStore};

#[derive(Clone)]
pub struct PgOrderStore {
    pool: Db,
}

impl PgOrderStore {
    pub fn new(pool: Db) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct SellOrderRow {
    id: String,
    user_id: Uuid,
    steam_id: String,
    items: String,
    status: OrderStatus,
    trade_offer_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl SellOrderRow {
    fn into_order(self) -> Result<SellOrder> {
        Ok(SellOrder {
            items: decode_items(&self.items)?,
            id: self.id,
            user_id: self.user_id,
            steam_id: self.steam_id,
            status: self.status,
            trade_offer_id: self.trade_offer_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
            expires_at: self.expires_at,
        })
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn insert_order(&self, order: &SellOrder, log: NewTradeLog) -> Result<()> {
        let items = encode_items(&order.items)?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO sell_orders (
                id, user_id, steam_id, items, status, trade_offer_id,
                created_at, updated_at, expires_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&order.id)
        .bind(order.user_id)
        .bind(&order.steam_id)
        .bind(&items)
        .bind(order.status)
        .bind(&order.trade_offer_id)
        .bind(order.created_at)
        .bind(order.updated_at)
        .bind(order.expires_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO trade_logs (order_id, action, details, steam_trade_offer_id) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(&order.id)
        .bind(log.action.as_str())
        .bind(&log.details)
        .bind(&log.steam_trade_offer_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn order(&self, order_id: &str) -> Result<Option<SellOrder>> {
        let row = sqlx::query_as::<_, SellOrderRow>("SELECT * FROM sell_orders WHERE id = $1")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(SellOrderRow::into_order).transpose()
    }

    async fn orders_by_owner(&self, user_id: Uuid) -> Result<Vec<SellOrder>> {
        let rows = sqlx::query_as::<_, SellOrderRow>(
            "SELECT * FROM sell_orders WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SellOrderRow::into_order).collect()
    }

    async fn transition(
        &self,
        order_id: &str,
        from: OrderStatus,
        to: OrderStatus,
        log: NewTradeLog,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE sell_orders SET status = $1, updated_at = NOW() \
             WHERE id = $2 AND status = $3",
        )
        .bind(to)
        .bind(order_id)
        .bind(from)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO trade_logs (order_id, action, details, steam_trade_offer_id) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(order_id)
        .bind(log.action.as_str())
        .bind(&log.details)
        .bind(&log.steam_trade_offer_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn link_offer(&self, order_id: &str, offer_id: &str, log: NewTradeLog) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE sell_orders SET status = $1, trade_offer_id = $2, updated_at = NOW() \
             WHERE id = $3 AND status = $4",
        )
        .bind(OrderStatus::TradeSent)
        .bind(offer_id)
        .bind(order_id)
        .bind(OrderStatus::Pending)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO trade_logs (order_id, action, details, steam_trade_offer_id) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(order_id)
        .bind(log.action.as_str())
        .bind(&log.details)
        .bind(&log.steam_trade_offer_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn logs_for_order(&self, order_id: &str) -> Result<Vec<TradeLog>> {
        let logs = sqlx::query_as::<_, TradeLog>(
            "SELECT * FROM trade_logs WHERE order_id = $1 ORDER BY created_at ASC, id ASC",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(logs)
    }
}
