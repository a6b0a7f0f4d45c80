//! Connector seam to the external trading network.
//!
//! The session never speaks the wire protocol itself: it drives a
//! [`SteamConnector`] that opens a connection and streams session/offer
//! events back, and a [`SteamConnection`] for the raw offer and inventory
//! operations. Production uses the Web API client below; tests substitute
//! the scripted fake in [`crate::steam::fake`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Bot account credentials. The shared secret, when present, is used to
/// derive a fresh guard code at the moment of each login attempt.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub account_name: String,
    pub password: String,
    pub shared_secret: Option<String>,
}

/// A single login attempt handed to the connector.
#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub account_name: String,
    pub password: String,
    pub guard_code: Option<String>,
}

/// Asynchronous signals from the network. Session events drive the
/// session's logged-in state; offer events are observational.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    LoggedOn { steam_id: String },
    LogOnFailed { reason: String },
    Disconnected { reason: String },
    OfferReceived { offer_id: String },
    OfferChanged { offer_id: String, old_state: i32, new_state: i32 },
}

/// A trade offer as the network reports it, before domain mapping.
#[derive(Debug, Clone, Default)]
pub struct RawTradeOffer {
    pub id: String,
    pub partner: String,
    pub items_to_give: Vec<RawAsset>,
    pub items_to_receive: Vec<RawAsset>,
    pub state: i32,
    pub created: i64,
    pub updated: i64,
    pub expires: i64,
}

/// An asset record as the network reports it. Metadata fields are
/// optional on the wire; the gateway substitutes permissive defaults.
#[derive(Debug, Clone, Default)]
pub struct RawAsset {
    pub app_id: Option<u32>,
    pub context_id: Option<String>,
    pub asset_id: String,
    pub class_id: String,
    pub instance_id: String,
    pub amount: Option<String>,
    pub name: Option<String>,
    pub market_hash_name: Option<String>,
    pub icon_url: Option<String>,
    pub tradable: Option<bool>,
}

/// Opens connections to the trading network. `connect` performs the
/// transport-level open and begins the login handshake; the handshake
/// outcome arrives as the first session event on the returned channel.
#[async_trait]
pub trait SteamConnector: Send + Sync {
    async fn connect(
        &self,
        login: LoginRequest,
    ) -> Result<(Arc<dyn SteamConnection>, mpsc::Receiver<SessionEvent>)>;
}

/// Raw offer and inventory operations over an open connection. Every call
/// is bounded by the transport's own timeout.
#[async_trait]
pub trait SteamConnection: Send + Sync {
    async fn pending_offers(&self) -> Result<Vec<RawTradeOffer>>;
    async fn offer(&self, offer_id: &str) -> Result<RawTradeOffer>;
    async fn accept(&self, offer_id: &str) -> Result<()>;
    async fn decline(&self, offer_id: &str) -> Result<()>;
    async fn inventory(&self, steam_id: &str, app_id: u32) -> Result<Vec<RawAsset>>;
}

const DEFAULT_API_BASE: &str = "https://api.steampowered.com";
const DEFAULT_COMMUNITY_BASE: &str = "https://steamcommunity.com";
const REQUEST_TIMEOUT_SECS: u64 = 30;
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Web API connector for the trading network.
pub struct WebApiConnector {
    client: Client,
    api_base: String,
    community_base: String,
    web_api_key: String,
}

impl WebApiConnector {
    pub fn new(web_api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::Network(format!("failed to build http client: {e}")))?;

        Ok(Self {
            client,
            api_base: DEFAULT_API_BASE.to_string(),
            community_base: DEFAULT_COMMUNITY_BASE.to_string(),
            web_api_key,
        })
    }

    fn transport_error(e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::Network("request to trading network timed out".to_string())
        } else {
            Error::Network(e.to_string())
        }
    }
}

// Login handshake wire shapes.

#[derive(Debug, Deserialize)]
struct BeginSessionEnvelope {
    response: BeginSessionBody,
}

#[derive(Debug, Deserialize, Default)]
struct BeginSessionBody {
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    request_id: Option<String>,
    #[serde(default)]
    steamid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PollSessionEnvelope {
    response: PollSessionBody,
}

#[derive(Debug, Deserialize, Default)]
struct PollSessionBody {
    #[serde(default)]
    access_token: Option<String>,
}

#[async_trait]
impl SteamConnector for WebApiConnector {
    async fn connect(
        &self,
        login: LoginRequest,
    ) -> Result<(Arc<dyn SteamConnection>, mpsc::Receiver<SessionEvent>)> {
        let (events, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        info!(account = %login.account_name, "starting login handshake");

        let begin_url = format!(
            "{}/IAuthenticationService/BeginAuthSessionViaCredentials/v1/",
            self.api_base
        );
        let response = self
            .client
            .post(&begin_url)
            .form(&[
                ("account_name", login.account_name.as_str()),
                ("password", login.password.as_str()),
            ])
            .send()
            .await
            .map_err(Self::transport_error)?;

        if response.status() == StatusCode::UNAUTHORIZED || response.status() == StatusCode::FORBIDDEN {
            let reason = "credentials rejected".to_string();
            let _ = events.send(SessionEvent::LogOnFailed { reason: reason.clone() }).await;
            return Err(Error::Auth(reason));
        }
        if !response.status().is_success() {
            return Err(Error::Network(format!(
                "login handshake failed with status {}",
                response.status()
            )));
        }

        let begin: BeginSessionEnvelope = response
            .json()
            .await
            .map_err(|e| Error::Network(format!("unreadable handshake response: {e}")))?;
        let (Some(client_id), Some(request_id), Some(steam_id)) = (
            begin.response.client_id,
            begin.response.request_id,
            begin.response.steamid,
        ) else {
            let reason = "handshake did not open an auth session".to_string();
            let _ = events.send(SessionEvent::LogOnFailed { reason: reason.clone() }).await;
            return Err(Error::Auth(reason));
        };

        if let Some(code) = &login.guard_code {
            let update_url = format!(
                "{}/IAuthenticationService/UpdateAuthSessionWithSteamGuardCode/v1/",
                self.api_base
            );
            self.client
                .post(&update_url)
                .form(&[
                    ("client_id", client_id.as_str()),
                    ("steamid", steam_id.as_str()),
                    ("code", code.as_str()),
                    ("code_type", "3"),
                ])
                .send()
                .await
                .map_err(Self::transport_error)?
                .error_for_status()
                .map_err(|e| Error::Auth(format!("guard code rejected: {e}")))?;
        }

        let poll_url = format!(
            "{}/IAuthenticationService/PollAuthSessionStatus/v1/",
            self.api_base
        );
        let poll: PollSessionEnvelope = self
            .client
            .post(&poll_url)
            .form(&[
                ("client_id", client_id.as_str()),
                ("request_id", request_id.as_str()),
            ])
            .send()
            .await
            .map_err(Self::transport_error)?
            .json()
            .await
            .map_err(|e| Error::Network(format!("unreadable poll response: {e}")))?;

        let Some(access_token) = poll.response.access_token else {
            let reason = "login denied by the network".to_string();
            let _ = events.send(SessionEvent::LogOnFailed { reason: reason.clone() }).await;
            return Err(Error::Auth(reason));
        };

        let connection = WebApiConnection {
            client: self.client.clone(),
            api_base: self.api_base.clone(),
            community_base: self.community_base.clone(),
            web_api_key: self.web_api_key.clone(),
            access_token,
            events: events.clone(),
        };

        let _ = events
            .send(SessionEvent::LoggedOn {
                steam_id: steam_id.clone(),
            })
            .await;

        Ok((Arc::new(connection), rx))
    }
}

struct WebApiConnection {
    client: Client,
    api_base: String,
    community_base: String,
    web_api_key: String,
    access_token: String,
    events: mpsc::Sender<SessionEvent>,
}

// Offer and inventory wire shapes.

#[derive(Debug, Deserialize)]
struct OffersEnvelope {
    #[serde(default)]
    response: OffersBody,
}

#[derive(Debug, Deserialize, Default)]
struct OffersBody {
    #[serde(default)]
    trade_offers_received: Vec<WireOffer>,
    #[serde(default)]
    offer: Option<WireOffer>,
    #[serde(default)]
    descriptions: Vec<WireDescription>,
}

#[derive(Debug, Deserialize)]
struct WireOffer {
    tradeofferid: String,
    #[serde(default)]
    accountid_other: i64,
    #[serde(default)]
    items_to_give: Vec<WireAsset>,
    #[serde(default)]
    items_to_receive: Vec<WireAsset>,
    #[serde(default)]
    trade_offer_state: i32,
    #[serde(default)]
    time_created: i64,
    #[serde(default)]
    time_updated: i64,
    #[serde(default)]
    expiration_time: i64,
}

#[derive(Debug, Deserialize)]
struct WireAsset {
    #[serde(default)]
    appid: Option<u32>,
    #[serde(default)]
    contextid: Option<String>,
    #[serde(default)]
    assetid: String,
    #[serde(default)]
    classid: String,
    #[serde(default)]
    instanceid: String,
    #[serde(default)]
    amount: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireDescription {
    #[serde(default)]
    classid: String,
    #[serde(default)]
    instanceid: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    market_hash_name: Option<String>,
    #[serde(default)]
    icon_url: Option<String>,
    #[serde(default)]
    tradable: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct InventoryEnvelope {
    #[serde(default)]
    assets: Vec<WireAsset>,
    #[serde(default)]
    descriptions: Vec<WireDescription>,
}

impl WebApiConnection {
    /// Auth-expired responses also mean the session is gone; signal it so
    /// the session manager flips out of ready.
    async fn triage(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                let reason = "session token no longer accepted".to_string();
                let _ = self
                    .events
                    .send(SessionEvent::Disconnected {
                        reason: reason.clone(),
                    })
                    .await;
                Err(Error::Auth(reason))
            }
            status if !status.is_success() => Err(Error::Network(format!(
                "trading network returned status {status}"
            ))),
            _ => Ok(response),
        }
    }

    fn join_assets(assets: Vec<WireAsset>, descriptions: &[WireDescription]) -> Vec<RawAsset> {
        assets
            .into_iter()
            .map(|asset| {
                let description = descriptions
                    .iter()
                    .find(|d| d.classid == asset.classid && d.instanceid == asset.instanceid);
                RawAsset {
                    app_id: asset.appid,
                    context_id: asset.contextid,
                    asset_id: asset.assetid,
                    class_id: asset.classid,
                    instance_id: asset.instanceid,
                    amount: asset.amount,
                    name: description.and_then(|d| d.name.clone()),
                    market_hash_name: description.and_then(|d| d.market_hash_name.clone()),
                    icon_url: description.and_then(|d| d.icon_url.clone()),
                    tradable: description.and_then(|d| d.tradable.map(|t| t != 0)),
                }
            })
            .collect()
    }

    fn map_offer(offer: WireOffer, descriptions: &[WireDescription]) -> RawTradeOffer {
        RawTradeOffer {
            id: offer.tradeofferid,
            partner: offer.accountid_other.to_string(),
            items_to_give: Self::join_assets(offer.items_to_give, descriptions),
            items_to_receive: Self::join_assets(offer.items_to_receive, descriptions),
            state: offer.trade_offer_state,
            created: offer.time_created,
            updated: offer.time_updated,
            expires: offer.expiration_time,
        }
    }
}

#[async_trait]
impl SteamConnection for WebApiConnection {
    async fn pending_offers(&self) -> Result<Vec<RawTradeOffer>> {
        let url = format!("{}/IEconService/GetTradeOffers/v1/", self.api_base);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("key", self.web_api_key.as_str()),
                ("access_token", self.access_token.as_str()),
                ("get_received_offers", "1"),
                ("active_only", "1"),
                ("get_descriptions", "1"),
                ("language", "en"),
            ])
            .send()
            .await
            .map_err(WebApiConnector::transport_error)?;

        let body: OffersEnvelope = self
            .triage(response)
            .await?
            .json()
            .await
            .map_err(|e| Error::Network(format!("unreadable offers response: {e}")))?;

        debug!(
            count = body.response.trade_offers_received.len(),
            "fetched pending offers"
        );
        let descriptions = body.response.descriptions;
        Ok(body
            .response
            .trade_offers_received
            .into_iter()
            .map(|o| Self::map_offer(o, &descriptions))
            .collect())
    }

    async fn offer(&self, offer_id: &str) -> Result<RawTradeOffer> {
        let url = format!("{}/IEconService/GetTradeOffer/v1/", self.api_base);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("key", self.web_api_key.as_str()),
                ("access_token", self.access_token.as_str()),
                ("tradeofferid", offer_id),
                ("get_descriptions", "1"),
                ("language", "en"),
            ])
            .send()
            .await
            .map_err(WebApiConnector::transport_error)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::OfferNotFound(offer_id.to_string()));
        }

        let body: OffersEnvelope = self
            .triage(response)
            .await?
            .json()
            .await
            .map_err(|e| Error::Network(format!("unreadable offer response: {e}")))?;

        let descriptions = body.response.descriptions;
        body.response
            .offer
            .map(|o| Self::map_offer(o, &descriptions))
            .ok_or_else(|| Error::OfferNotFound(offer_id.to_string()))
    }

    async fn accept(&self, offer_id: &str) -> Result<()> {
        let url = format!("{}/tradeoffer/{}/accept", self.community_base, offer_id);
        let response = self
            .client
            .post(&url)
            .header(
                reqwest::header::COOKIE,
                format!("steamLoginSecure={}", self.access_token),
            )
            .form(&[("tradeofferid", offer_id), ("serverid", "1")])
            .send()
            .await
            .map_err(WebApiConnector::transport_error)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::OfferNotFound(offer_id.to_string()));
        }
        self.triage(response).await?;
        info!(offer_id, "trade offer accepted");
        Ok(())
    }

    async fn decline(&self, offer_id: &str) -> Result<()> {
        let url = format!("{}/IEconService/DeclineTradeOffer/v1/", self.api_base);
        let response = self
            .client
            .post(&url)
            .form(&[
                ("key", self.web_api_key.as_str()),
                ("access_token", self.access_token.as_str()),
                ("tradeofferid", offer_id),
            ])
            .send()
            .await
            .map_err(WebApiConnector::transport_error)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::OfferNotFound(offer_id.to_string()));
        }
        self.triage(response).await?;
        info!(offer_id, "trade offer declined");
        Ok(())
    }

    async fn inventory(&self, steam_id: &str, app_id: u32) -> Result<Vec<RawAsset>> {
        let url = format!(
            "{}/inventory/{}/{}/2",
            self.community_base, steam_id, app_id
        );
        let response = self
            .client
            .get(&url)
            .query(&[("l", "english"), ("count", "5000")])
            .send()
            .await
            .map_err(WebApiConnector::transport_error)?;

        let body: InventoryEnvelope = self
            .triage(response)
            .await?
            .json()
            .await
            .map_err(|e| Error::Network(format!("unreadable inventory response: {e}")))?;

        Ok(Self::join_assets(body.assets, &body.descriptions))
    }
}
