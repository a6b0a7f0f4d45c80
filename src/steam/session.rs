//! Bot session manager.
//!
//! Bridges the event-driven connector into request/response calls: one
//! explicitly constructed session per process, a single connection
//! handshake in flight at a time, and fail-fast `NotReady` on every
//! operation once the session drops.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::steam::net::{
    Credentials, LoginRequest, RawAsset, RawTradeOffer, SessionEvent, SteamConnection,
    SteamConnector,
};
use crate::steam::totp;

const LOGIN_TIMEOUT_SECS: u64 = 45;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Uninitialized,
    Connecting,
    Ready,
    Faulted,
}

#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub phase: SessionPhase,
    pub steam_id: Option<String>,
}

struct Shared {
    phase: SessionPhase,
    connection: Option<Arc<dyn SteamConnection>>,
    steam_id: Option<String>,
    pump: Option<JoinHandle<()>>,
}

pub struct BotSession {
    connector: Arc<dyn SteamConnector>,
    login_timeout: Duration,
    /// Held for the duration of a connection handshake; `try_lock` gives
    /// the second concurrent initialize its busy rejection.
    connect_lock: Mutex<()>,
    shared: Arc<RwLock<Shared>>,
}

impl BotSession {
    pub fn new(connector: Arc<dyn SteamConnector>) -> Self {
        Self {
            connector,
            login_timeout: Duration::from_secs(LOGIN_TIMEOUT_SECS),
            connect_lock: Mutex::new(()),
            shared: Arc::new(RwLock::new(Shared {
                phase: SessionPhase::Uninitialized,
                connection: None,
                steam_id: None,
                pump: None,
            })),
        }
    }

    #[cfg(test)]
    fn with_login_timeout(mut self, timeout: Duration) -> Self {
        self.login_timeout = timeout;
        self
    }

    /// Open the connection and perform the login handshake.
    ///
    /// Re-initialization after a fault is allowed and replaces the
    /// previous connection. A call while another handshake is in flight
    /// is rejected with `LoginInProgress` rather than opening a second
    /// competing connection.
    pub async fn initialize(&self, credentials: &Credentials) -> Result<()> {
        let Ok(_guard) = self.connect_lock.try_lock() else {
            return Err(Error::LoginInProgress);
        };

        if credentials.account_name.is_empty() || credentials.password.is_empty() {
            return Err(Error::Validation(
                "bot credentials are not configured".to_string(),
            ));
        }

        self.set_phase(SessionPhase::Connecting);

        // Guard code is derived fresh for this attempt, never cached.
        let guard_code = match &credentials.shared_secret {
            Some(secret) => match totp::generate_auth_code_now(secret) {
                Ok(code) => Some(code),
                Err(e) => {
                    self.set_phase(SessionPhase::Faulted);
                    return Err(e);
                }
            },
            None => None,
        };

        let login = LoginRequest {
            account_name: credentials.account_name.clone(),
            password: credentials.password.clone(),
            guard_code,
        };

        let connected = timeout(self.login_timeout, self.connector.connect(login)).await;
        let (connection, mut events) = match connected {
            Err(_) => {
                self.set_phase(SessionPhase::Faulted);
                return Err(Error::Network("connection attempt timed out".to_string()));
            }
            Ok(Err(e)) => {
                self.set_phase(SessionPhase::Faulted);
                return Err(e);
            }
            Ok(Ok(pair)) => pair,
        };

        // One-shot bridge: the first session event settles the handshake.
        let settled = timeout(self.login_timeout, async {
            while let Some(event) = events.recv().await {
                match event {
                    SessionEvent::LoggedOn { steam_id } => return Ok(steam_id),
                    SessionEvent::LogOnFailed { reason } => return Err(Error::Auth(reason)),
                    SessionEvent::Disconnected { reason } => return Err(Error::Network(reason)),
                    other => debug!(?other, "offer event before login settled"),
                }
            }
            Err(Error::Network(
                "connection closed during login handshake".to_string(),
            ))
        })
        .await;

        let steam_id = match settled {
            Err(_) => {
                self.set_phase(SessionPhase::Faulted);
                return Err(Error::Network("login handshake timed out".to_string()));
            }
            Ok(Err(e)) => {
                self.set_phase(SessionPhase::Faulted);
                return Err(e);
            }
            Ok(Ok(steam_id)) => steam_id,
        };

        let pump = self.spawn_pump(connection.clone(), events);
        {
            let mut shared = self.shared.write().expect("session state lock poisoned");
            if let Some(old) = shared.pump.take() {
                old.abort();
            }
            shared.connection = Some(connection);
            shared.steam_id = Some(steam_id.clone());
            shared.phase = SessionPhase::Ready;
            shared.pump = Some(pump);
        }

        info!(%steam_id, "bot session ready");
        Ok(())
    }

    /// Non-blocking readiness check.
    pub fn is_ready(&self) -> bool {
        self.shared.read().expect("session state lock poisoned").phase == SessionPhase::Ready
    }

    pub fn status(&self) -> SessionStatus {
        let shared = self.shared.read().expect("session state lock poisoned");
        SessionStatus {
            phase: shared.phase,
            steam_id: shared.steam_id.clone(),
        }
    }

    pub async fn pending_offers(&self) -> Result<Vec<RawTradeOffer>> {
        let connection = self.connection()?;
        let result = connection.pending_offers().await;
        self.note_failure(&connection, result.as_ref().err());
        result
    }

    pub async fn offer(&self, offer_id: &str) -> Result<RawTradeOffer> {
        let connection = self.connection()?;
        let result = connection.offer(offer_id).await;
        self.note_failure(&connection, result.as_ref().err());
        result
    }

    pub async fn accept(&self, offer_id: &str) -> Result<()> {
        let connection = self.connection()?;
        let result = connection.accept(offer_id).await;
        self.note_failure(&connection, result.as_ref().err());
        result
    }

    pub async fn decline(&self, offer_id: &str) -> Result<()> {
        let connection = self.connection()?;
        let result = connection.decline(offer_id).await;
        self.note_failure(&connection, result.as_ref().err());
        result
    }

    pub async fn inventory(&self, steam_id: &str, app_id: u32) -> Result<Vec<RawAsset>> {
        let connection = self.connection()?;
        let result = connection.inventory(steam_id, app_id).await;
        self.note_failure(&connection, result.as_ref().err());
        result
    }

    fn connection(&self) -> Result<Arc<dyn SteamConnection>> {
        let shared = self.shared.read().expect("session state lock poisoned");
        if shared.phase != SessionPhase::Ready {
            return Err(Error::NotReady);
        }
        shared.connection.clone().ok_or(Error::NotReady)
    }

    fn set_phase(&self, phase: SessionPhase) {
        self.shared.write().expect("session state lock poisoned").phase = phase;
    }

    /// An auth failure mid-session means the login is gone; drop to
    /// faulted so later calls fail fast with `NotReady`.
    fn note_failure(&self, connection: &Arc<dyn SteamConnection>, err: Option<&Error>) {
        if matches!(err, Some(Error::Auth(_))) {
            fault_connection(&self.shared, connection);
        }
    }

    fn spawn_pump(
        &self,
        connection: Arc<dyn SteamConnection>,
        mut events: mpsc::Receiver<SessionEvent>,
    ) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    SessionEvent::LoggedOn { steam_id } => {
                        debug!(%steam_id, "session event: logged on");
                    }
                    SessionEvent::LogOnFailed { reason }
                    | SessionEvent::Disconnected { reason } => {
                        warn!(%reason, "bot session dropped");
                        fault_connection(&shared, &connection);
                    }
                    SessionEvent::OfferReceived { offer_id } => {
                        info!(%offer_id, "new trade offer received");
                    }
                    SessionEvent::OfferChanged {
                        offer_id,
                        old_state,
                        new_state,
                    } => {
                        info!(%offer_id, old_state, new_state, "trade offer state changed");
                    }
                }
            }
            // Channel closed: the connector side went away.
            fault_connection(&shared, &connection);
        })
    }
}

/// Flip to faulted, but only if `connection` is still the current one;
/// a stale pump must not clobber a replacement session.
fn fault_connection(shared: &RwLock<Shared>, connection: &Arc<dyn SteamConnection>) {
    let mut state = shared.write().expect("session state lock poisoned");
    let is_current = state
        .connection
        .as_ref()
        .map(|current| Arc::ptr_eq(current, connection))
        .unwrap_or(false);
    if is_current {
        state.phase = SessionPhase::Faulted;
        state.connection = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steam::fake::FakeNetwork;

    fn credentials() -> Credentials {
        Credentials {
            account_name: "bot_account".to_string(),
            password: "hunter2".to_string(),
            shared_secret: None,
        }
    }

    #[tokio::test]
    async fn initialize_brings_the_session_ready() {
        let network = FakeNetwork::new();
        let session = BotSession::new(network.connector());

        assert!(!session.is_ready());
        session.initialize(&credentials()).await.unwrap();
        assert!(session.is_ready());
        assert_eq!(session.status().steam_id.as_deref(), Some(FakeNetwork::BOT_STEAM_ID));
    }

    #[tokio::test]
    async fn rejected_login_faults_the_session() {
        let network = FakeNetwork::new();
        network.deny_login();
        let session = BotSession::new(network.connector());

        let err = session.initialize(&credentials()).await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
        assert_eq!(session.status().phase, SessionPhase::Faulted);
    }

    #[tokio::test]
    async fn operations_fail_fast_when_uninitialized() {
        let network = FakeNetwork::new();
        let session = BotSession::new(network.connector());

        let err = session.pending_offers().await.unwrap_err();
        assert!(matches!(err, Error::NotReady));
    }

    #[tokio::test]
    async fn concurrent_initialize_is_rejected_as_busy() {
        let network = FakeNetwork::new();
        network.set_connect_delay(Duration::from_millis(300));
        let session = Arc::new(
            BotSession::new(network.connector()).with_login_timeout(Duration::from_secs(5)),
        );

        let first = {
            let session = session.clone();
            tokio::spawn(async move { session.initialize(&credentials()).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let err = session.initialize(&credentials()).await.unwrap_err();
        assert!(matches!(err, Error::LoginInProgress));

        first.await.unwrap().unwrap();
        assert!(session.is_ready());
        assert_eq!(network.connect_count(), 1);
    }

    #[tokio::test]
    async fn disconnect_event_drops_readiness_until_reinitialized() {
        let network = FakeNetwork::new();
        let session = BotSession::new(network.connector());

        session.initialize(&credentials()).await.unwrap();
        network
            .push_event(SessionEvent::Disconnected {
                reason: "connection reset".to_string(),
            })
            .await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!session.is_ready());
        assert!(matches!(
            session.pending_offers().await.unwrap_err(),
            Error::NotReady
        ));

        // Re-initialization replaces the connection.
        session.initialize(&credentials()).await.unwrap();
        assert!(session.is_ready());
        assert_eq!(network.connect_count(), 2);
    }

    #[tokio::test]
    async fn missing_credentials_are_rejected() {
        let network = FakeNetwork::new();
        let session = BotSession::new(network.connector());

        let err = session
            .initialize(&Credentials {
                account_name: String::new(),
                password: String::new(),
                shared_secret: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
