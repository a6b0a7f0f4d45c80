//! Sell-order handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::{
    models::*,
    observability::metrics,
    orders::Verification,
    store::OrderStore,
    AppState,
};

/// POST /trade/sell-orders - Create a sell order
pub async fn create_sell_order(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSellOrderRequest>,
) -> Result<Json<CreateSellOrderResponse>, (StatusCode, String)> {
    if let Err(errors) = req.validate() {
        return Err((StatusCode::BAD_REQUEST, errors.to_string()));
    }

    let order = state
        .orders
        .create(req.user_id, &req.steam_id, req.items)
        .await
        .map_err(<(StatusCode, String)>::from)?;

    state.metrics.increment(metrics::ORDER_CREATED, 1).await;

    Ok(Json(CreateSellOrderResponse {
        order_id: order.id,
        trade_url: state.orders.trade_url().to_string(),
        expires_at: order.expires_at,
    }))
}

/// GET /trade/sell-orders/{order_id} - Fetch one sell order
pub async fn get_sell_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<String>,
) -> Result<Json<SellOrder>, (StatusCode, String)> {
    let order = state
        .orders
        .get(&order_id)
        .await
        .map_err(<(StatusCode, String)>::from)?;
    Ok(Json(order))
}

/// GET /trade/users/{user_id}/sell-orders - List a user's orders, newest first
pub async fn list_user_orders(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ListOrdersResponse>, (StatusCode, String)> {
    let orders = state
        .orders
        .list_by_owner(user_id)
        .await
        .map_err(<(StatusCode, String)>::from)?;

    let total = orders.len() as i64;
    Ok(Json(ListOrdersResponse { orders, total }))
}

/// POST /trade/verify - Match an external offer against a pending order
pub async fn verify_trade(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VerifyTradeRequest>,
) -> Result<Json<Verification>, (StatusCode, String)> {
    let verification = state
        .reconciler
        .verify(&req.order_id, &req.trade_offer_id)
        .await
        .map_err(<(StatusCode, String)>::from)?;

    let counter = if verification.valid {
        metrics::TRADE_VERIFIED
    } else {
        metrics::TRADE_VERIFY_REJECTED
    };
    state.metrics.increment(counter, 1).await;

    Ok(Json(verification))
}

/// PUT /trade/sell-orders/{order_id}/status - Administrative status change
pub async fn update_order_status(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<String>,
    Json(req): Json<UpdateOrderStatusRequest>,
) -> Result<Json<SuccessResponse>, (StatusCode, String)> {
    state
        .orders
        .set_status(&order_id, req.status)
        .await
        .map_err(<(StatusCode, String)>::from)?;

    state.metrics.increment(metrics::ORDER_STATUS_UPDATED, 1).await;

    Ok(Json(SuccessResponse { success: true }))
}

/// GET /trade/sell-orders/{order_id}/logs - Audit trail for dispute review
pub async fn get_order_logs(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<String>,
) -> Result<Json<TradeLogsResponse>, (StatusCode, String)> {
    // Listing the trail of an unknown order is a 404, not an empty list.
    state
        .orders
        .get(&order_id)
        .await
        .map_err(<(StatusCode, String)>::from)?;

    let logs = state
        .store
        .logs_for_order(&order_id)
        .await
        .map_err(<(StatusCode, String)>::from)?;

    Ok(Json(TradeLogsResponse { logs }))
}
