//! Trade reconciliation: match an external offer against a pending sell
//! order and advance the order on success.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::models::{LogAction, NewTradeLog, OrderStatus, TradeItem};
use crate::steam::OfferGateway;
use crate::store::OrderStore;

/// Outcome of a verification attempt. Rejections are data, not errors;
/// infrastructure failures (session down, storage) propagate as `Error`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Verification {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Verification {
    fn ok() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    fn rejected(reason: &str) -> Self {
        Self {
            valid: false,
            reason: Some(reason.to_string()),
        }
    }
}

pub struct TradeReconciler {
    store: Arc<dyn OrderStore>,
    gateway: Arc<OfferGateway>,
}

impl TradeReconciler {
    pub fn new(store: Arc<dyn OrderStore>, gateway: Arc<OfferGateway>) -> Self {
        Self { store, gateway }
    }

    /// Decide whether `offer_id` satisfies `order_id`.
    ///
    /// Safe to retry: a re-run against a still-pending order repeats the
    /// checks, while an order that already reached `trade_sent` is rejected
    /// by the pending check. The write below compare-and-sets on `pending`,
    /// so exactly one caller can ever win for a given order.
    pub async fn verify(&self, order_id: &str, offer_id: &str) -> Result<Verification> {
        let Some(order) = self.store.order(order_id).await? else {
            return Ok(Verification::rejected("sell order not found"));
        };

        if order.status != OrderStatus::Pending {
            return Ok(Verification::rejected("sell order is not in pending status"));
        }

        if Utc::now() > order.expires_at {
            // Lazy expiry: this is the only path that fires it. Losing the
            // compare-and-set just means another caller expired it first.
            let log = NewTradeLog::new(
                LogAction::StatusUpdated,
                format!("Order status updated to: {}", OrderStatus::Expired),
            );
            self.store
                .transition(order_id, OrderStatus::Pending, OrderStatus::Expired, log)
                .await?;
            warn!(order_id, "sell order expired before verification");
            return Ok(Verification::rejected("sell order has expired"));
        }

        let offer = match self.gateway.offer(offer_id).await {
            Ok(offer) => offer,
            Err(Error::OfferNotFound(_)) => {
                return Ok(Verification::rejected("trade offer not found"));
            }
            Err(e) => return Err(e),
        };

        if !items_match(&order.items, &offer.items_to_bot) {
            info!(order_id, offer_id, "offer items do not match order");
            return Ok(Verification::rejected(
                "trade offer items do not match sell order",
            ));
        }

        let log = NewTradeLog::new(
            LogAction::TradeVerified,
            format!("Trade offer {offer_id} verified and matched"),
        )
        .with_offer(offer_id);

        let won = self.store.link_offer(order_id, offer_id, log).await?;
        if !won {
            // A concurrent verify reached trade_sent first.
            return Ok(Verification::rejected("sell order is not in pending status"));
        }

        info!(order_id, offer_id, "trade offer verified, order moved to trade_sent");
        Ok(Verification::ok())
    }
}

/// Set equality over the (asset, class, instance) identity triple:
/// order-independent and duplicate-insensitive. Display metadata never
/// participates in matching.
fn items_match(expected: &[TradeItem], offered: &[TradeItem]) -> bool {
    let want: HashSet<(&str, &str, &str)> = expected.iter().map(TradeItem::identity).collect();
    let got: HashSet<(&str, &str, &str)> = offered.iter().map(TradeItem::identity).collect();
    want == got
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(asset: &str, class: &str, instance: &str) -> TradeItem {
        TradeItem {
            asset_id: asset.to_string(),
            class_id: class.to_string(),
            instance_id: instance.to_string(),
            name: String::new(),
            market_hash_name: String::new(),
            condition: None,
            rarity: None,
        }
    }

    #[test]
    fn matching_is_order_independent() {
        let expected = vec![item("A1", "C1", "I1"), item("A2", "C2", "I2")];
        let offered = vec![item("A2", "C2", "I2"), item("A1", "C1", "I1")];
        assert!(items_match(&expected, &offered));
    }

    #[test]
    fn matching_is_duplicate_insensitive() {
        let expected = vec![item("A1", "C1", "I1")];
        let offered = vec![item("A1", "C1", "I1"), item("A1", "C1", "I1")];
        assert!(items_match(&expected, &offered));
    }

    #[test]
    fn missing_item_does_not_match() {
        let expected = vec![item("A1", "C1", "I1"), item("A2", "C2", "I2")];
        let offered = vec![item("A1", "C1", "I1")];
        assert!(!items_match(&expected, &offered));
    }

    #[test]
    fn extra_item_does_not_match() {
        let expected = vec![item("A1", "C1", "I1")];
        let offered = vec![item("A1", "C1", "I1"), item("A9", "C9", "I9")];
        assert!(!items_match(&expected, &offered));
    }

    #[test]
    fn identity_uses_the_full_triple() {
        // same asset id, different instance
        let expected = vec![item("A1", "C1", "I1")];
        let offered = vec![item("A1", "C1", "I2")];
        assert!(!items_match(&expected, &offered));
    }

    #[test]
    fn display_metadata_is_ignored() {
        let mut renamed = item("A1", "C1", "I1");
        renamed.name = "Completely different display name".to_string();
        renamed.condition = Some("Battle-Scarred".to_string());
        assert!(items_match(&[item("A1", "C1", "I1")], &[renamed]));
    }
}
