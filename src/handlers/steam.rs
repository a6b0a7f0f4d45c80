//! Bot-session and offer handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::error;

use crate::{
    models::*,
    observability::metrics,
    steam::gateway::DEFAULT_APP_ID,
    steam::SessionPhase,
    AppState,
};

/// GET /steam/status - Non-blocking session status
pub async fn bot_status(State(state): State<Arc<AppState>>) -> Json<BotStatusResponse> {
    let status = state.session.status();
    let ready = status.phase == SessionPhase::Ready;
    Json(BotStatusResponse {
        is_online: ready,
        is_logged_in: ready,
        steam_id: if ready { status.steam_id } else { None },
    })
}

/// POST /steam/initialize - Log the bot account in
pub async fn initialize_bot(State(state): State<Arc<AppState>>) -> Json<ActionResponse> {
    let credentials = state.config.credentials();
    match state.session.initialize(&credentials).await {
        Ok(()) => {
            state.metrics.increment(metrics::BOT_LOGIN_OK, 1).await;
            Json(ActionResponse {
                success: true,
                message: "steam bot initialized successfully".to_string(),
            })
        }
        Err(e) => {
            error!(error = %e, "bot initialization failed");
            state.metrics.increment(metrics::BOT_LOGIN_FAILED, 1).await;
            Json(ActionResponse {
                success: false,
                message: format!("failed to initialize steam bot: {e}"),
            })
        }
    }
}

/// GET /steam/trade-offers - Offers currently addressed to the bot
pub async fn list_trade_offers(
    State(state): State<Arc<AppState>>,
) -> Result<Json<OffersResponse>, (StatusCode, String)> {
    let offers = state
        .gateway
        .pending_offers()
        .await
        .map_err(<(StatusCode, String)>::from)?;
    Ok(Json(OffersResponse { offers }))
}

/// POST /steam/trade-offers/{offer_id}/accept
pub async fn accept_trade_offer(
    State(state): State<Arc<AppState>>,
    Path(offer_id): Path<String>,
) -> Result<Json<ActionResponse>, (StatusCode, String)> {
    state
        .gateway
        .accept(&offer_id)
        .await
        .map_err(<(StatusCode, String)>::from)?;

    state.metrics.increment(metrics::OFFER_ACCEPTED, 1).await;
    Ok(Json(ActionResponse {
        success: true,
        message: format!("trade offer {offer_id} accepted"),
    }))
}

/// POST /steam/trade-offers/{offer_id}/decline
pub async fn decline_trade_offer(
    State(state): State<Arc<AppState>>,
    Path(offer_id): Path<String>,
) -> Result<Json<ActionResponse>, (StatusCode, String)> {
    state
        .gateway
        .decline(&offer_id)
        .await
        .map_err(<(StatusCode, String)>::from)?;

    state.metrics.increment(metrics::OFFER_DECLINED, 1).await;
    Ok(Json(ActionResponse {
        success: true,
        message: format!("trade offer {offer_id} declined"),
    }))
}

#[derive(Debug, Deserialize)]
pub struct InventoryQuery {
    #[serde(rename = "appId")]
    pub app_id: Option<u32>,
}

/// GET /steam/inventory/{steam_id} - Tradable items for an account
pub async fn get_inventory(
    State(state): State<Arc<AppState>>,
    Path(steam_id): Path<String>,
    Query(query): Query<InventoryQuery>,
) -> Result<Json<InventoryResponse>, (StatusCode, String)> {
    let items = state
        .gateway
        .inventory(&steam_id, query.app_id.unwrap_or(DEFAULT_APP_ID))
        .await
        .map_err(<(StatusCode, String)>::from)?;
    Ok(Json(InventoryResponse { items }))
}
