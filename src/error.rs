//! Unified error taxonomy for the trade core.

use axum::http::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("sell order {0} not found")]
    OrderNotFound(String),

    #[error("trade offer {0} not found")]
    OfferNotFound(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("steam session is not ready")]
    NotReady,

    #[error("bot login already in progress")]
    LoginInProgress,

    #[error("steam login rejected: {0}")]
    Auth(String),

    #[error("steam network error: {0}")]
    Network(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("stored item payload is unreadable: {0}")]
    Codec(String),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::OrderNotFound(_) | Error::OfferNotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidState(_) | Error::LoginInProgress => StatusCode::CONFLICT,
            Error::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            Error::Auth(_) => StatusCode::UNAUTHORIZED,
            Error::Network(_) => StatusCode::BAD_GATEWAY,
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Storage(_) | Error::Codec(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<Error> for (StatusCode, String) {
    fn from(err: Error) -> Self {
        (err.status_code(), err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
