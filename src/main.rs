use std::sync::Arc;
use tracing::{info, Level};

use skinflow::steam::WebApiConnector;
use skinflow::store::PgOrderStore;
use skinflow::{app, AppConfig, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    info!("Starting Skinflow trade service...");

    let config = AppConfig::from_env();

    info!("Connecting to database...");
    let db = skinflow::db::init_db(&config.database_url).await?;
    info!("✓ Database connected");

    info!("Running migrations...");
    sqlx::migrate!("./migrations").run(&db).await?;
    info!("✓ Migrations applied");

    let store = Arc::new(PgOrderStore::new(db));
    let connector = Arc::new(WebApiConnector::new(config.steam_web_api_key.clone())?);

    // The bot session starts idle; it goes live through POST /steam/initialize.
    let state = Arc::new(AppState::new(store, connector, config.clone()));
    let router = app(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!("🚀 Trade service listening on port {}", config.port);

    axum::serve(listener, router).await?;

    Ok(())
}
