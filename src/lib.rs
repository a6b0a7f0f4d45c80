pub mod config;
pub mod db;
pub mod error;
pub mod handlers {
    pub mod steam;
    pub mod trade;
}
pub mod models;
pub mod observability;
pub mod orders;
pub mod steam;
pub mod store;

use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::AppConfig;
pub use db::Db;
pub use error::{Error, Result};
pub use observability::MetricsCollector;
pub use orders::{OrderLifecycle, TradeReconciler};
pub use steam::{BotSession, OfferGateway, SteamConnector};
pub use store::OrderStore;

/// Application state shared across handlers.
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn OrderStore>,
    pub orders: OrderLifecycle,
    pub reconciler: TradeReconciler,
    pub session: Arc<BotSession>,
    pub gateway: Arc<OfferGateway>,
    pub metrics: MetricsCollector,
}

impl AppState {
    pub fn new(
        store: Arc<dyn OrderStore>,
        connector: Arc<dyn SteamConnector>,
        config: AppConfig,
    ) -> Self {
        let session = Arc::new(BotSession::new(connector));
        let gateway = Arc::new(OfferGateway::new(session.clone()));
        Self {
            orders: OrderLifecycle::new(store.clone(), config.trade_offer_url()),
            reconciler: TradeReconciler::new(store.clone(), gateway.clone()),
            store,
            session,
            gateway,
            metrics: MetricsCollector::new(),
            config,
        }
    }
}

/// Build the API router.
pub fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let trade_routes = Router::new()
        .route("/sell-orders", post(handlers::trade::create_sell_order))
        .route("/sell-orders/{order_id}", get(handlers::trade::get_sell_order))
        .route(
            "/sell-orders/{order_id}/status",
            put(handlers::trade::update_order_status),
        )
        .route(
            "/sell-orders/{order_id}/logs",
            get(handlers::trade::get_order_logs),
        )
        .route(
            "/users/{user_id}/sell-orders",
            get(handlers::trade::list_user_orders),
        )
        .route("/verify", post(handlers::trade::verify_trade));

    let steam_routes = Router::new()
        .route("/status", get(handlers::steam::bot_status))
        .route("/initialize", post(handlers::steam::initialize_bot))
        .route("/trade-offers", get(handlers::steam::list_trade_offers))
        .route(
            "/trade-offers/{offer_id}/accept",
            post(handlers::steam::accept_trade_offer),
        )
        .route(
            "/trade-offers/{offer_id}/decline",
            post(handlers::steam::decline_trade_offer),
        )
        .route("/inventory/{steam_id}", get(handlers::steam::get_inventory));

    Router::new()
        .nest("/trade", trade_routes)
        .nest("/steam", steam_routes)
        .route("/healthz", get(health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
