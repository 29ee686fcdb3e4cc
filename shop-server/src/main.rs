//! shop-server entry point
//!
//! Long-running service that:
//! - Accepts storefront checkout requests (idempotent order creation)
//! - Serves administrative order listing/detail/status endpoints
//! - Applies schema migrations on boot

use shop_server::api;
use shop_server::config::Config;
use shop_server::state::AppState;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // Load .env file
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shop_server=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env()?;

    tracing::info!("Starting shop-server (env: {})", config.environment);

    // Initialize application state (pool + migrations)
    let state = AppState::new(&config).await?;

    let app = api::create_router(state);

    let http_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&http_addr).await?;
    tracing::info!("shop-server HTTP listening on {http_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
