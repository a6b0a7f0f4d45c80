//! End-to-end order/offer reconciliation flows over the in-memory store
//! and the scripted fake network.

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use skinflow::error::Error;
use skinflow::models::{
    LogAction, NewTradeLog, OrderStatus, SellOrder, TradeItem,
};
use skinflow::orders::{OrderLifecycle, TradeReconciler};
use skinflow::steam::fake::{asset, FakeNetwork};
use skinflow::steam::{BotSession, Credentials, OfferGateway};
use skinflow::store::{MemoryOrderStore, OrderStore};

const SELLER_STEAM_ID: &str = "76561198000000001";

struct Harness {
    network: FakeNetwork,
    store: Arc<MemoryOrderStore>,
    session: Arc<BotSession>,
    lifecycle: OrderLifecycle,
    reconciler: TradeReconciler,
}

fn credentials() -> Credentials {
    Credentials {
        account_name: "bot_account".to_string(),
        password: "hunter2".to_string(),
        shared_secret: None,
    }
}

fn item(asset_id: &str) -> TradeItem {
    TradeItem {
        asset_id: asset_id.to_string(),
        class_id: format!("C_{asset_id}"),
        instance_id: format!("I_{asset_id}"),
        name: "AK-47 | Redline".to_string(),
        market_hash_name: "AK-47 | Redline (Field-Tested)".to_string(),
        condition: Some("Field-Tested".to_string()),
        rarity: None,
    }
}

/// The fake-network asset carrying the same identity triple as `item`.
fn offer_asset(asset_id: &str) -> skinflow::steam::RawAsset {
    asset(asset_id, &format!("C_{asset_id}"), &format!("I_{asset_id}"))
}

fn harness() -> Harness {
    let network = FakeNetwork::new();
    let store = Arc::new(MemoryOrderStore::new());
    let session = Arc::new(BotSession::new(network.connector()));
    let gateway = Arc::new(OfferGateway::new(session.clone()));
    let store_dyn: Arc<dyn OrderStore> = store.clone();
    Harness {
        network,
        store,
        session: session.clone(),
        lifecycle: OrderLifecycle::new(
            store_dyn.clone(),
            "https://steamcommunity.com/tradeoffer/new/?partner=P&token=T".to_string(),
        ),
        reconciler: TradeReconciler::new(store_dyn, gateway),
    }
}

async fn logged_in_harness() -> Harness {
    let h = harness();
    h.session.initialize(&credentials()).await.unwrap();
    h
}

#[tokio::test]
async fn matching_offer_advances_order_to_trade_sent() {
    let h = logged_in_harness().await;
    let order = h
        .lifecycle
        .create(Uuid::new_v4(), SELLER_STEAM_ID, vec![item("A1")])
        .await
        .unwrap();

    h.network
        .add_incoming_offer("9001", SELLER_STEAM_ID, vec![offer_asset("A1")]);

    let verification = h.reconciler.verify(&order.id, "9001").await.unwrap();
    assert!(verification.valid);
    assert!(verification.reason.is_none());

    let reloaded = h.lifecycle.get(&order.id).await.unwrap();
    assert_eq!(reloaded.status, OrderStatus::TradeSent);
    assert_eq!(reloaded.trade_offer_id.as_deref(), Some("9001"));

    let logs = h.store.logs_for_order(&order.id).await.unwrap();
    let actions: Vec<&str> = logs.iter().map(|l| l.action.as_str()).collect();
    assert_eq!(actions, vec!["order_created", "trade_verified"]);
    assert_eq!(logs[1].steam_trade_offer_id.as_deref(), Some("9001"));
}

#[tokio::test]
async fn orders_verify_at_most_once() {
    let h = logged_in_harness().await;
    let order = h
        .lifecycle
        .create(Uuid::new_v4(), SELLER_STEAM_ID, vec![item("A1")])
        .await
        .unwrap();

    h.network
        .add_incoming_offer("9001", SELLER_STEAM_ID, vec![offer_asset("A1")]);
    h.network
        .add_incoming_offer("9002", SELLER_STEAM_ID, vec![offer_asset("A1")]);

    assert!(h.reconciler.verify(&order.id, "9001").await.unwrap().valid);

    let second = h.reconciler.verify(&order.id, "9002").await.unwrap();
    assert!(!second.valid);
    assert_eq!(
        second.reason.as_deref(),
        Some("sell order is not in pending status")
    );

    // The first match sticks.
    let reloaded = h.lifecycle.get(&order.id).await.unwrap();
    assert_eq!(reloaded.trade_offer_id.as_deref(), Some("9001"));
}

#[tokio::test]
async fn concurrent_verification_has_exactly_one_winner() {
    let h = Arc::new(logged_in_harness().await);
    let order = h
        .lifecycle
        .create(Uuid::new_v4(), SELLER_STEAM_ID, vec![item("A1")])
        .await
        .unwrap();

    h.network
        .add_incoming_offer("9001", SELLER_STEAM_ID, vec![offer_asset("A1")]);
    h.network
        .add_incoming_offer("9002", SELLER_STEAM_ID, vec![offer_asset("A1")]);

    let (a, b) = tokio::join!(
        h.reconciler.verify(&order.id, "9001"),
        h.reconciler.verify(&order.id, "9002"),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert!(a.valid ^ b.valid, "exactly one verification may win");

    let reloaded = h.lifecycle.get(&order.id).await.unwrap();
    assert_eq!(reloaded.status, OrderStatus::TradeSent);

    let winner = if a.valid { "9001" } else { "9002" };
    assert_eq!(reloaded.trade_offer_id.as_deref(), Some(winner));

    // One trade_verified entry, not two.
    let logs = h.store.logs_for_order(&order.id).await.unwrap();
    let verified = logs.iter().filter(|l| l.action == "trade_verified").count();
    assert_eq!(verified, 1);
}

#[tokio::test]
async fn mismatched_items_leave_the_order_pending() {
    let h = logged_in_harness().await;
    let order = h
        .lifecycle
        .create(Uuid::new_v4(), SELLER_STEAM_ID, vec![item("A1")])
        .await
        .unwrap();

    h.network
        .add_incoming_offer("9001", SELLER_STEAM_ID, vec![offer_asset("A2")]);

    let verification = h.reconciler.verify(&order.id, "9001").await.unwrap();
    assert!(!verification.valid);
    assert_eq!(
        verification.reason.as_deref(),
        Some("trade offer items do not match sell order")
    );

    let reloaded = h.lifecycle.get(&order.id).await.unwrap();
    assert_eq!(reloaded.status, OrderStatus::Pending);
    assert!(reloaded.trade_offer_id.is_none());
}

#[tokio::test]
async fn item_matching_accepts_permutations() {
    let h = logged_in_harness().await;
    let order = h
        .lifecycle
        .create(
            Uuid::new_v4(),
            SELLER_STEAM_ID,
            vec![item("A1"), item("A2"), item("A3")],
        )
        .await
        .unwrap();

    h.network.add_incoming_offer(
        "9001",
        SELLER_STEAM_ID,
        vec![offer_asset("A3"), offer_asset("A1"), offer_asset("A2")],
    );

    assert!(h.reconciler.verify(&order.id, "9001").await.unwrap().valid);
}

#[tokio::test]
async fn offer_missing_a_required_item_does_not_match() {
    let h = logged_in_harness().await;
    let order = h
        .lifecycle
        .create(
            Uuid::new_v4(),
            SELLER_STEAM_ID,
            vec![item("A1"), item("A2")],
        )
        .await
        .unwrap();

    h.network
        .add_incoming_offer("9001", SELLER_STEAM_ID, vec![offer_asset("A1")]);

    let verification = h.reconciler.verify(&order.id, "9001").await.unwrap();
    assert!(!verification.valid);
}

#[tokio::test]
async fn expired_order_is_expired_exactly_once() {
    let h = logged_in_harness().await;

    // Backdate an order past its deadline through the store seam.
    let created = Utc::now() - Duration::hours(25);
    let order = SellOrder {
        id: "sell_expired".to_string(),
        user_id: Uuid::new_v4(),
        steam_id: SELLER_STEAM_ID.to_string(),
        items: vec![item("A1")],
        status: OrderStatus::Pending,
        trade_offer_id: None,
        created_at: created,
        updated_at: created,
        expires_at: created + Duration::hours(24),
    };
    h.store
        .insert_order(
            &order,
            NewTradeLog::new(LogAction::OrderCreated, "Created sell order with 1 items"),
        )
        .await
        .unwrap();

    h.network
        .add_incoming_offer("9001", SELLER_STEAM_ID, vec![offer_asset("A1")]);

    let first = h.reconciler.verify(&order.id, "9001").await.unwrap();
    assert!(!first.valid);
    assert_eq!(first.reason.as_deref(), Some("sell order has expired"));
    assert_eq!(
        h.lifecycle.get(&order.id).await.unwrap().status,
        OrderStatus::Expired
    );

    // Later attempts short-circuit on the not-pending path.
    let second = h.reconciler.verify(&order.id, "9001").await.unwrap();
    assert_eq!(
        second.reason.as_deref(),
        Some("sell order is not in pending status")
    );

    let logs = h.store.logs_for_order(&order.id).await.unwrap();
    let expiries = logs
        .iter()
        .filter(|l| l.action == "status_updated")
        .count();
    assert_eq!(expiries, 1);
}

#[tokio::test]
async fn unknown_order_and_offer_are_reported_as_reasons() {
    let h = logged_in_harness().await;

    let missing_order = h.reconciler.verify("sell_missing", "9001").await.unwrap();
    assert_eq!(missing_order.reason.as_deref(), Some("sell order not found"));

    let order = h
        .lifecycle
        .create(Uuid::new_v4(), SELLER_STEAM_ID, vec![item("A1")])
        .await
        .unwrap();
    let missing_offer = h.reconciler.verify(&order.id, "404404").await.unwrap();
    assert_eq!(missing_offer.reason.as_deref(), Some("trade offer not found"));
}

#[tokio::test]
async fn verification_requires_a_live_session() {
    let h = harness();
    let order = h
        .lifecycle
        .create(Uuid::new_v4(), SELLER_STEAM_ID, vec![item("A1")])
        .await
        .unwrap();

    let err = h.reconciler.verify(&order.id, "9001").await.unwrap_err();
    assert!(matches!(err, Error::NotReady));

    // Order untouched by the failure.
    assert_eq!(
        h.lifecycle.get(&order.id).await.unwrap().status,
        OrderStatus::Pending
    );
}

#[tokio::test]
async fn shared_secret_yields_a_fresh_guard_code_at_login() {
    let h = harness();
    h.network.require_guard_code();

    // Without a secret the network rejects the handshake.
    let err = h.session.initialize(&credentials()).await.unwrap_err();
    assert!(matches!(err, Error::Auth(_)));

    let with_secret = Credentials {
        shared_secret: Some("zvIJKf0QOsnoU9EWmi3yEPyQCpE=".to_string()),
        ..credentials()
    };
    h.session.initialize(&with_secret).await.unwrap();

    let login = h.network.last_login().unwrap();
    let code = login.guard_code.expect("guard code should be derived");
    assert_eq!(code.len(), 5);
}

#[tokio::test]
async fn accept_and_decline_act_on_the_network_only() {
    let h = logged_in_harness().await;
    let order = h
        .lifecycle
        .create(Uuid::new_v4(), SELLER_STEAM_ID, vec![item("A1")])
        .await
        .unwrap();

    h.network
        .add_incoming_offer("9001", SELLER_STEAM_ID, vec![offer_asset("A1")]);
    h.network
        .add_incoming_offer("9002", SELLER_STEAM_ID, vec![offer_asset("A2")]);

    let gateway = OfferGateway::new(h.session.clone());
    gateway.accept("9001").await.unwrap();
    gateway.decline("9002").await.unwrap();

    assert_eq!(h.network.accepted_offers(), vec!["9001".to_string()]);
    assert_eq!(h.network.declined_offers(), vec!["9002".to_string()]);

    // Fire-and-forget: no sell order moved.
    assert_eq!(
        h.lifecycle.get(&order.id).await.unwrap().status,
        OrderStatus::Pending
    );

    let err = gateway.accept("404404").await.unwrap_err();
    assert!(matches!(err, Error::OfferNotFound(_)));
}

#[tokio::test]
async fn listing_offers_maps_items_to_the_bot() {
    let h = logged_in_harness().await;
    h.network
        .add_incoming_offer("9001", SELLER_STEAM_ID, vec![offer_asset("A1")]);

    let gateway = OfferGateway::new(h.session.clone());
    let offers = gateway.pending_offers().await.unwrap();
    assert_eq!(offers.len(), 1);
    assert_eq!(offers[0].id, "9001");
    assert_eq!(offers[0].partner_steam_id, SELLER_STEAM_ID);
    assert_eq!(offers[0].items_to_bot[0].asset_id, "A1");
    assert!(offers[0].items_from_bot.is_empty());
}

#[tokio::test]
async fn audit_trail_is_ordered_and_append_only() {
    let h = logged_in_harness().await;
    let order = h
        .lifecycle
        .create(Uuid::new_v4(), SELLER_STEAM_ID, vec![item("A1")])
        .await
        .unwrap();

    h.network
        .add_incoming_offer("9001", SELLER_STEAM_ID, vec![offer_asset("A1")]);
    h.reconciler.verify(&order.id, "9001").await.unwrap();
    h.lifecycle
        .set_status(&order.id, OrderStatus::ItemsReceived)
        .await
        .unwrap();
    h.lifecycle
        .set_status(&order.id, OrderStatus::Completed)
        .await
        .unwrap();

    let logs = h.store.logs_for_order(&order.id).await.unwrap();
    let actions: Vec<&str> = logs.iter().map(|l| l.action.as_str()).collect();
    assert_eq!(
        actions,
        vec![
            "order_created",
            "trade_verified",
            "status_updated",
            "status_updated"
        ]
    );
    for pair in logs.windows(2) {
        assert!(pair[0].created_at <= pair[1].created_at);
    }
}

#[tokio::test]
async fn orders_list_newest_first_per_owner() {
    let h = logged_in_harness().await;
    let owner = Uuid::new_v4();

    let first = h
        .lifecycle
        .create(owner, SELLER_STEAM_ID, vec![item("A1")])
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let second = h
        .lifecycle
        .create(owner, SELLER_STEAM_ID, vec![item("A2")])
        .await
        .unwrap();

    // Another owner's order stays out of the listing.
    h.lifecycle
        .create(Uuid::new_v4(), SELLER_STEAM_ID, vec![item("A3")])
        .await
        .unwrap();

    let orders = h.lifecycle.list_by_owner(owner).await.unwrap();
    let ids: Vec<&str> = orders.iter().map(|o| o.id.as_str()).collect();
    assert_eq!(ids, vec![second.id.as_str(), first.id.as_str()]);
}
