//! Scripted in-memory trading network.
//!
//! Implements the connector capability set so the session, gateway and
//! reconciler can be exercised without the real network. Tests configure
//! login behavior, seed offers and inventories, and push session events.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::steam::net::{
    LoginRequest, RawAsset, RawTradeOffer, SessionEvent, SteamConnection, SteamConnector,
};

const EVENT_CHANNEL_CAPACITY: usize = 32;

#[derive(Default)]
struct FakeState {
    deny_login: bool,
    require_guard_code: bool,
    connect_delay: Option<Duration>,
    connects: u32,
    offers: HashMap<String, RawTradeOffer>,
    inventories: HashMap<(String, u32), Vec<RawAsset>>,
    accepted: Vec<String>,
    declined: Vec<String>,
    last_login: Option<LoginRequest>,
    events: Option<mpsc::Sender<SessionEvent>>,
}

#[derive(Clone, Default)]
pub struct FakeNetwork {
    inner: Arc<Mutex<FakeState>>,
}

impl FakeNetwork {
    pub const BOT_STEAM_ID: &'static str = "76561198099999999";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn connector(&self) -> Arc<dyn SteamConnector> {
        Arc::new(FakeConnector {
            inner: self.inner.clone(),
        })
    }

    pub fn deny_login(&self) {
        self.inner.lock().expect("fake network lock poisoned").deny_login = true;
    }

    pub fn require_guard_code(&self) {
        self.inner
            .lock()
            .expect("fake network lock poisoned")
            .require_guard_code = true;
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        self.inner
            .lock()
            .expect("fake network lock poisoned")
            .connect_delay = Some(delay);
    }

    pub fn connect_count(&self) -> u32 {
        self.inner.lock().expect("fake network lock poisoned").connects
    }

    pub fn last_login(&self) -> Option<LoginRequest> {
        self.inner
            .lock()
            .expect("fake network lock poisoned")
            .last_login
            .clone()
    }

    pub fn accepted_offers(&self) -> Vec<String> {
        self.inner
            .lock()
            .expect("fake network lock poisoned")
            .accepted
            .clone()
    }

    pub fn declined_offers(&self) -> Vec<String> {
        self.inner
            .lock()
            .expect("fake network lock poisoned")
            .declined
            .clone()
    }

    /// Seed an active offer addressed to the bot.
    pub fn add_incoming_offer(&self, offer_id: &str, partner: &str, items_to_bot: Vec<RawAsset>) {
        let now = Utc::now().timestamp();
        let offer = RawTradeOffer {
            id: offer_id.to_string(),
            partner: partner.to_string(),
            items_to_give: Vec::new(),
            items_to_receive: items_to_bot,
            state: 2,
            created: now,
            updated: now,
            expires: now + 14 * 24 * 3600,
        };
        self.inner
            .lock()
            .expect("fake network lock poisoned")
            .offers
            .insert(offer_id.to_string(), offer);
    }

    pub fn add_inventory(&self, steam_id: &str, app_id: u32, assets: Vec<RawAsset>) {
        self.inner
            .lock()
            .expect("fake network lock poisoned")
            .inventories
            .insert((steam_id.to_string(), app_id), assets);
    }

    /// Push an event into the currently connected session, if any.
    pub async fn push_event(&self, event: SessionEvent) {
        let sender = self
            .inner
            .lock()
            .expect("fake network lock poisoned")
            .events
            .clone();
        if let Some(sender) = sender {
            let _ = sender.send(event).await;
        }
    }
}

/// Minimal asset record for seeding offers and inventories.
pub fn asset(asset_id: &str, class_id: &str, instance_id: &str) -> RawAsset {
    RawAsset {
        asset_id: asset_id.to_string(),
        class_id: class_id.to_string(),
        instance_id: instance_id.to_string(),
        ..RawAsset::default()
    }
}

struct FakeConnector {
    inner: Arc<Mutex<FakeState>>,
}

#[async_trait]
impl SteamConnector for FakeConnector {
    async fn connect(
        &self,
        login: LoginRequest,
    ) -> Result<(Arc<dyn SteamConnection>, mpsc::Receiver<SessionEvent>)> {
        let delay = {
            let mut state = self.inner.lock().expect("fake network lock poisoned");
            state.connects += 1;
            state.last_login = Some(login.clone());
            state.connect_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let rejected = {
            let state = self.inner.lock().expect("fake network lock poisoned");
            state.deny_login || (state.require_guard_code && login.guard_code.is_none())
        };

        if rejected {
            let _ = tx
                .send(SessionEvent::LogOnFailed {
                    reason: "credentials rejected".to_string(),
                })
                .await;
        } else {
            let _ = tx
                .send(SessionEvent::LoggedOn {
                    steam_id: FakeNetwork::BOT_STEAM_ID.to_string(),
                })
                .await;
        }

        // Keep the sender alive so tests can push events later.
        self.inner
            .lock()
            .expect("fake network lock poisoned")
            .events = Some(tx);

        let connection = FakeConnection {
            inner: self.inner.clone(),
        };
        Ok((Arc::new(connection), rx))
    }
}

struct FakeConnection {
    inner: Arc<Mutex<FakeState>>,
}

#[async_trait]
impl SteamConnection for FakeConnection {
    async fn pending_offers(&self) -> Result<Vec<RawTradeOffer>> {
        let state = self.inner.lock().expect("fake network lock poisoned");
        let mut offers: Vec<RawTradeOffer> =
            state.offers.values().filter(|o| o.state == 2).cloned().collect();
        offers.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(offers)
    }

    async fn offer(&self, offer_id: &str) -> Result<RawTradeOffer> {
        let state = self.inner.lock().expect("fake network lock poisoned");
        state
            .offers
            .get(offer_id)
            .cloned()
            .ok_or_else(|| Error::OfferNotFound(offer_id.to_string()))
    }

    async fn accept(&self, offer_id: &str) -> Result<()> {
        let mut state = self.inner.lock().expect("fake network lock poisoned");
        let Some(offer) = state.offers.get_mut(offer_id) else {
            return Err(Error::OfferNotFound(offer_id.to_string()));
        };
        offer.state = 3;
        state.accepted.push(offer_id.to_string());
        Ok(())
    }

    async fn decline(&self, offer_id: &str) -> Result<()> {
        let mut state = self.inner.lock().expect("fake network lock poisoned");
        let Some(offer) = state.offers.get_mut(offer_id) else {
            return Err(Error::OfferNotFound(offer_id.to_string()));
        };
        offer.state = 7;
        state.declined.push(offer_id.to_string());
        Ok(())
    }

    async fn inventory(&self, steam_id: &str, app_id: u32) -> Result<Vec<RawAsset>> {
        let state = self.inner.lock().expect("fake network lock poisoned");
        Ok(state
            .inventories
            .get(&(steam_id.to_string(), app_id))
            .cloned()
            .unwrap_or_default())
    }
}
