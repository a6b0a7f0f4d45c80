use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Sell-order lifecycle status.
///
/// Transitions only move forward; the legal edges are enumerated in
/// [`OrderStatus::can_transition_to`] and every write path goes through it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "order_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    TradeSent,
    ItemsReceived,
    Completed,
    Cancelled,
    Expired,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::TradeSent => "trade_sent",
            OrderStatus::ItemsReceived => "items_received",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Expired => "expired",
        }
    }

    /// The forward-only state machine. `completed`, `cancelled` and
    /// `expired` are terminal.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, TradeSent)
                | (Pending, Cancelled)
                | (Pending, Expired)
                | (TradeSent, ItemsReceived)
                | (TradeSent, Cancelled)
                | (ItemsReceived, Completed)
        )
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit-trail action, a closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogAction {
    OrderCreated,
    TradeVerified,
    StatusUpdated,
}

impl LogAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogAction::OrderCreated => "order_created",
            LogAction::TradeVerified => "trade_verified",
            LogAction::StatusUpdated => "status_updated",
        }
    }
}

/// A tradable unit on the external network.
///
/// Identity for matching purposes is the (asset, class, instance) triple;
/// the remaining fields are display metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeItem {
    pub asset_id: String,
    pub class_id: String,
    pub instance_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub market_hash_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rarity: Option<String>,
}

impl TradeItem {
    pub fn identity(&self) -> (&str, &str, &str) {
        (&self.asset_id, &self.class_id, &self.instance_id)
    }
}

/// Persisted sell order. `items` is immutable after creation and
/// `expires_at` is fixed at creation, never extended.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SellOrder {
    pub id: String,
    pub user_id: Uuid,
    pub steam_id: String,
    pub items: Vec<TradeItem>,
    pub status: OrderStatus,
    pub trade_offer_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Append-only audit record for a sell order.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeLog {
    pub id: i64,
    pub order_id: String,
    pub action: String,
    pub details: Option<String>,
    pub steam_trade_offer_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Audit entry to append alongside a state change.
#[derive(Debug, Clone)]
pub struct NewTradeLog {
    pub action: LogAction,
    pub details: String,
    pub steam_trade_offer_id: Option<String>,
}

impl NewTradeLog {
    pub fn new(action: LogAction, details: impl Into<String>) -> Self {
        Self {
            action,
            details: details.into(),
            steam_trade_offer_id: None,
        }
    }

    pub fn with_offer(mut self, offer_id: impl Into<String>) -> Self {
        self.steam_trade_offer_id = Some(offer_id.into());
        self
    }
}

/// Trade-offer lifecycle state as reported by the external network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferState {
    Active,
    Accepted,
    Declined,
    Expired,
    Invalid,
    Unknown,
}

impl OfferState {
    /// Map the network's numeric state codes; anything unrecognized is
    /// reported as `Unknown` rather than rejected.
    pub fn from_code(code: i32) -> Self {
        match code {
            2 => OfferState::Active,
            3 => OfferState::Accepted,
            7 => OfferState::Declined,
            6 => OfferState::Expired,
            1 | 10 => OfferState::Invalid,
            _ => OfferState::Unknown,
        }
    }
}

/// An external trade offer, fetched on demand and never persisted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalOffer {
    pub id: String,
    pub partner_steam_id: String,
    pub items_to_bot: Vec<TradeItem>,
    pub items_from_bot: Vec<TradeItem>,
    pub state: OfferState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// An item in an account's inventory on the external network, with the
/// application/context metadata the network attaches to it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    pub asset_id: String,
    pub class_id: String,
    pub instance_id: String,
    pub app_id: u32,
    pub context_id: String,
    pub name: String,
    pub market_hash_name: String,
    pub icon_url: String,
    pub tradable: bool,
}

// Request types for the API

#[derive(Debug, Deserialize, validator::Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateSellOrderRequest {
    pub user_id: Uuid,
    #[validate(length(min = 1))]
    pub steam_id: String,
    #[validate(length(min = 1, message = "at least one item is required"))]
    pub items: Vec<TradeItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyTradeRequest {
    pub order_id: String,
    pub trade_offer_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
}

// Response types for the API

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSellOrderResponse {
    pub order_id: String,
    pub trade_url: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListOrdersResponse {
    pub orders: Vec<SellOrder>,
    pub total: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BotStatusResponse {
    pub is_online: bool,
    pub is_logged_in: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steam_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OffersResponse {
    pub offers: Vec<ExternalOffer>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryResponse {
    pub items: Vec<InventoryItem>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeLogsResponse {
    pub logs: Vec<TradeLog>,
}
