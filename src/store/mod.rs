//! Order storage: capability trait, Postgres implementation and an
//! in-memory implementation used by tests.

mod memory;
mod postgres;

pub use memory::MemoryOrderStore;
pub use postgres::PgOrderStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{NewTradeLog, OrderStatus, SellOrder, TradeItem, TradeLog};

/// Persistence seam for sell orders and their audit trail.
///
/// Every mutation that changes order state takes the audit entry that
/// documents it and commits both in one unit of work. The compare-and-set
/// methods return `Ok(false)` when the row's current status no longer
/// matches `from`: the caller lost the race or the state already moved on.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert_order(&self, order: &SellOrder, log: NewTradeLog) -> Result<()>;

    async fn order(&self, order_id: &str) -> Result<Option<SellOrder>>;

    /// Orders for one owner, newest first.
    async fn orders_by_owner(&self, user_id: Uuid) -> Result<Vec<SellOrder>>;

    /// Guarded status write: succeeds only while the row is still in `from`.
    async fn transition(
        &self,
        order_id: &str,
        from: OrderStatus,
        to: OrderStatus,
        log: NewTradeLog,
    ) -> Result<bool>;

    /// The `pending -> trade_sent` write that records the matched offer id.
    /// Same single-winner semantics as [`OrderStore::transition`].
    async fn link_offer(&self, order_id: &str, offer_id: &str, log: NewTradeLog) -> Result<bool>;

    /// Audit entries for one order, oldest first.
    async fn logs_for_order(&self, order_id: &str) -> Result<Vec<TradeLog>>;
}

/// Versioned text encoding for the `sell_orders.items` column.
///
/// The column is opaque text at the storage boundary; core logic only ever
/// sees the structured item sequence.
#[derive(Serialize, Deserialize)]
struct ItemsEnvelope {
    v: u32,
    items: Vec<TradeItem>,
}

const ITEMS_CODEC_VERSION: u32 = 1;

pub fn encode_items(items: &[TradeItem]) -> Result<String> {
    let envelope = ItemsEnvelope {
        v: ITEMS_CODEC_VERSION,
        items: items.to_vec(),
    };
    serde_json::to_string(&envelope).map_err(|e| Error::Codec(e.to_string()))
}

pub fn decode_items(raw: &str) -> Result<Vec<TradeItem>> {
    // Legacy rows hold a bare item array without the version envelope.
    if raw.trim_start().starts_with('[') {
        return serde_json::from_str(raw).map_err(|e| Error::Codec(e.to_string()));
    }

    let envelope: ItemsEnvelope =
        serde_json::from_str(raw).map_err(|e| Error::Codec(e.to_string()))?;
    if envelope.v != ITEMS_CODEC_VERSION {
        return Err(Error::Codec(format!(
            "unsupported items encoding version {}",
            envelope.v
        )));
    }
    Ok(envelope.items)
}
