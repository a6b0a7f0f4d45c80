//! Bot-side integration with the external trading network: guard-code
//! derivation, the connector seam, the session manager and the typed
//! offer gateway.

pub mod fake;
pub mod gateway;
pub mod net;
pub mod session;
pub mod totp;

pub use gateway::OfferGateway;
pub use net::{
    Credentials, LoginRequest, RawAsset, RawTradeOffer, SessionEvent, SteamConnection,
    SteamConnector, WebApiConnector,
};
pub use session::{BotSession, SessionPhase, SessionStatus};
