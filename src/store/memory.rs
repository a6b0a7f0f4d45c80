//! In-memory order store.
//!
//! Backs the test harness with the same transactional contract as the
//! Postgres store: each mutation and its audit entry land under one lock
//! acquisition, and guarded updates compare-and-set on the current status.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{NewTradeLog, OrderStatus, SellOrder, TradeLog};

use super::OrderStore;

#[derive(Default)]
pub struct MemoryOrderStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    orders: HashMap<String, SellOrder>,
    logs: Vec<TradeLog>,
    next_log_id: i64,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Inner {
    fn append_log(&mut self, order_id: &str, log: NewTradeLog) {
        self.next_log_id += 1;
        self.logs.push(TradeLog {
            id: self.next_log_id,
            order_id: order_id.to_string(),
            action: log.action.as_str().to_string(),
            details: Some(log.details),
            steam_trade_offer_id: log.steam_trade_offer_id,
            created_at: Utc::now(),
        });
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn insert_order(&self, order: &SellOrder, log: NewTradeLog) -> Result<()> {
        let mut inner = self.inner.lock().expect("order store lock poisoned");
        inner.orders.insert(order.id.clone(), order.clone());
        inner.append_log(&order.id, log);
        Ok(())
    }

    async fn order(&self, order_id: &str) -> Result<Option<SellOrder>> {
        let inner = self.inner.lock().expect("order store lock poisoned");
        Ok(inner.orders.get(order_id).cloned())
    }

    async fn orders_by_owner(&self, user_id: Uuid) -> Result<Vec<SellOrder>> {
        let inner = self.inner.lock().expect("order store lock poisoned");
        let mut orders: Vec<SellOrder> = inner
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn transition(
        &self,
        order_id: &str,
        from: OrderStatus,
        to: OrderStatus,
        log: NewTradeLog,
    ) -> Result<bool> {
        let mut inner = self.inner.lock().expect("order store lock poisoned");
        let Some(order) = inner.orders.get_mut(order_id) else {
            return Ok(false);
        };
        if order.status != from {
            return Ok(false);
        }
        order.status = to;
        order.updated_at = Utc::now();
        inner.append_log(order_id, log);
        Ok(true)
    }

    async fn link_offer(&self, order_id: &str, offer_id: &str, log: NewTradeLog) -> Result<bool> {
        let mut inner = self.inner.lock().expect("order store lock poisoned");
        let Some(order) = inner.orders.get_mut(order_id) else {
            return Ok(false);
        };
        if order.status != OrderStatus::Pending {
            return Ok(false);
        }
        order.status = OrderStatus::TradeSent;
        order.trade_offer_id = Some(offer_id.to_string());
        order.updated_at = Utc::now();
        inner.append_log(order_id, log);
        Ok(true)
    }

    async fn logs_for_order(&self, order_id: &str) -> Result<Vec<TradeLog>> {
        let inner = self.inner.lock().expect("order store lock poisoned");
        let mut logs: Vec<TradeLog> = inner
            .logs
            .iter()
            .filter(|l| l.order_id == order_id)
            .cloned()
            .collect();
        logs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(logs)
    }
}
