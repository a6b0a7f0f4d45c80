//! Sell-order lifecycle: creation, lookup and guarded status transitions.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::info;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{LogAction, NewTradeLog, OrderStatus, SellOrder, TradeItem};
use crate::store::OrderStore;

/// Orders expire 24 hours after creation; the deadline is fixed at
/// creation and never extended.
pub const ORDER_TTL_HOURS: i64 = 24;

pub struct OrderLifecycle {
    store: Arc<dyn OrderStore>,
    trade_url: String,
}

impl OrderLifecycle {
    pub fn new(store: Arc<dyn OrderStore>, trade_url: String) -> Self {
        Self { store, trade_url }
    }

    /// The trade-offer URL template sellers use to reach the bot account.
    /// Informational only; it embeds no verification capability.
    pub fn trade_url(&self) -> &str {
        &self.trade_url
    }

    pub async fn create(
        &self,
        user_id: Uuid,
        steam_id: &str,
        items: Vec<TradeItem>,
    ) -> Result<SellOrder> {
        if items.is_empty() {
            return Err(Error::Validation(
                "sell order requires at least one item".to_string(),
            ));
        }

        let now = Utc::now();
        let order = SellOrder {
            id: format!("sell_{}", Uuid::new_v4().simple()),
            user_id,
            steam_id: steam_id.to_string(),
            items,
            status: OrderStatus::Pending,
            trade_offer_id: None,
            created_at: now,
            updated_at: now,
            expires_at: now + Duration::hours(ORDER_TTL_HOURS),
        };

        let log = NewTradeLog::new(
            LogAction::OrderCreated,
            format!("Created sell order with {} items", order.items.len()),
        );
        self.store.insert_order(&order, log).await?;

        info!(
            order_id = %order.id,
            user_id = %user_id,
            item_count = order.items.len(),
            "sell order created"
        );
        Ok(order)
    }

    pub async fn get(&self, order_id: &str) -> Result<SellOrder> {
        self.store
            .order(order_id)
            .await?
            .ok_or_else(|| Error::OrderNotFound(order_id.to_string()))
    }

    pub async fn list_by_owner(&self, user_id: Uuid) -> Result<Vec<SellOrder>> {
        self.store.orders_by_owner(user_id).await
    }

    /// Apply a status change through the central transition guard.
    ///
    /// Illegal edges are rejected with `InvalidState`; the persisted write
    /// compare-and-sets on the observed status so a concurrent writer
    /// cannot slip an extra transition in between.
    pub async fn set_status(&self, order_id: &str, requested: OrderStatus) -> Result<()> {
        let order = self.get(order_id).await?;

        if !order.status.can_transition_to(requested) {
            return Err(Error::InvalidState(format!(
                "order {} cannot move from {} to {}",
                order_id, order.status, requested
            )));
        }

        let log = NewTradeLog::new(
            LogAction::StatusUpdated,
            format!("Order status updated to: {requested}"),
        );
        let applied = self
            .store
            .transition(order_id, order.status, requested, log)
            .await?;
        if !applied {
            return Err(Error::InvalidState(format!(
                "order {order_id} was updated concurrently"
            )));
        }

        info!(order_id, from = %order.status, to = %requested, "order status updated");
        Ok(())
    }
}
