//! Typed adapter over the session's raw offer and inventory operations.
//!
//! Maps wire records into domain shapes, filling permissive defaults
//! where the network omits optional metadata. Read-only calls retry once
//! on a transient network failure; accept/decline never retry.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{ExternalOffer, InventoryItem, OfferState, TradeItem};
use crate::steam::net::{RawAsset, RawTradeOffer};
use crate::steam::session::BotSession;

/// Application id assumed when the network omits one.
pub const DEFAULT_APP_ID: u32 = 730;
/// Inventory context id assumed when the network omits one.
pub const DEFAULT_CONTEXT_ID: &str = "2";

pub struct OfferGateway {
    session: Arc<BotSession>,
}

impl OfferGateway {
    pub fn new(session: Arc<BotSession>) -> Self {
        Self { session }
    }

    pub async fn pending_offers(&self) -> Result<Vec<ExternalOffer>> {
        let raw = match self.session.pending_offers().await {
            Err(Error::Network(reason)) => {
                debug!(%reason, "offer listing failed, retrying once");
                self.session.pending_offers().await?
            }
            other => other?,
        };
        Ok(raw.into_iter().map(map_offer).collect())
    }

    pub async fn offer(&self, offer_id: &str) -> Result<ExternalOffer> {
        let raw = match self.session.offer(offer_id).await {
            Err(Error::Network(reason)) => {
                debug!(offer_id, %reason, "offer fetch failed, retrying once");
                self.session.offer(offer_id).await?
            }
            other => other?,
        };
        Ok(map_offer(raw))
    }

    pub async fn accept(&self, offer_id: &str) -> Result<()> {
        self.session.accept(offer_id).await
    }

    pub async fn decline(&self, offer_id: &str) -> Result<()> {
        self.session.decline(offer_id).await
    }

    pub async fn inventory(&self, steam_id: &str, app_id: u32) -> Result<Vec<InventoryItem>> {
        let raw = match self.session.inventory(steam_id, app_id).await {
            Err(Error::Network(reason)) => {
                debug!(steam_id, %reason, "inventory fetch failed, retrying once");
                self.session.inventory(steam_id, app_id).await?
            }
            other => other?,
        };
        Ok(raw.into_iter().map(map_inventory_item).collect())
    }
}

fn map_offer(raw: RawTradeOffer) -> ExternalOffer {
    ExternalOffer {
        id: raw.id,
        partner_steam_id: raw.partner,
        items_to_bot: raw.items_to_receive.into_iter().map(map_trade_item).collect(),
        items_from_bot: raw.items_to_give.into_iter().map(map_trade_item).collect(),
        state: OfferState::from_code(raw.state),
        created_at: timestamp(raw.created),
        updated_at: timestamp(raw.updated),
        expires_at: timestamp(raw.expires),
    }
}

fn map_trade_item(asset: RawAsset) -> TradeItem {
    TradeItem {
        asset_id: asset.asset_id,
        class_id: asset.class_id,
        instance_id: asset.instance_id,
        name: asset.name.unwrap_or_default(),
        market_hash_name: asset.market_hash_name.unwrap_or_default(),
        condition: None,
        rarity: None,
    }
}

fn map_inventory_item(asset: RawAsset) -> InventoryItem {
    InventoryItem {
        asset_id: asset.asset_id,
        class_id: asset.class_id,
        instance_id: asset.instance_id,
        app_id: asset.app_id.unwrap_or(DEFAULT_APP_ID),
        context_id: asset
            .context_id
            .unwrap_or_else(|| DEFAULT_CONTEXT_ID.to_string()),
        name: asset.name.unwrap_or_default(),
        market_hash_name: asset.market_hash_name.unwrap_or_default(),
        icon_url: asset.icon_url.unwrap_or_default(),
        tradable: asset.tradable.unwrap_or(false),
    }
}

fn timestamp(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or(DateTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inventory_mapping_fills_permissive_defaults() {
        let raw = RawAsset {
            asset_id: "A1".to_string(),
            class_id: "C1".to_string(),
            instance_id: "I1".to_string(),
            ..RawAsset::default()
        };

        let item = map_inventory_item(raw);
        assert_eq!(item.app_id, DEFAULT_APP_ID);
        assert_eq!(item.context_id, DEFAULT_CONTEXT_ID);
        assert_eq!(item.name, "");
        assert!(!item.tradable);
    }

    #[test]
    fn offer_mapping_splits_item_directions() {
        let raw = RawTradeOffer {
            id: "9001".to_string(),
            partner: "76561198000000001".to_string(),
            items_to_give: vec![RawAsset {
                asset_id: "G1".to_string(),
                ..RawAsset::default()
            }],
            items_to_receive: vec![RawAsset {
                asset_id: "R1".to_string(),
                ..RawAsset::default()
            }],
            state: 2,
            created: 1_700_000_000,
            updated: 1_700_000_100,
            expires: 1_701_000_000,
        };

        let offer = map_offer(raw);
        assert_eq!(offer.state, OfferState::Active);
        assert_eq!(offer.items_to_bot[0].asset_id, "R1");
        assert_eq!(offer.items_from_bot[0].asset_id, "G1");
        assert_eq!(offer.created_at.timestamp(), 1_700_000_000);
    }

    #[test]
    fn unknown_offer_state_codes_are_tolerated() {
        assert_eq!(OfferState::from_code(42), OfferState::Unknown);
        assert_eq!(OfferState::from_code(3), OfferState::Accepted);
    }
}
