use tracing_subscriber::EnvFilter;

mod config;
mod database;
mod dtos;
mod errors;
mod handlers;
mod middleware;
mod models;
mod routes;
mod services;
mod state;
mod store;

use config::AppConfig;
use database::connect_store;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env()?;
    let store = connect_store(&config).await?;
    let app_state = AppState::new(store, &config);
    let autosave = app_state.autosave.clone();

    let app = routes::build_router(app_state);
    let addr = config.bind_address();

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind to {}: {}", addr, e);
            return Err(e.into());
        }
    };
    tracing::info!("🚀 Server starting on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    autosave.cancel_all();
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown signal received");
}
