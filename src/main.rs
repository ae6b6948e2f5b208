//! Podium server.
//!
//! Loads configuration, prepares the store, restores the last session if
//! one was saved and serves the HTTP API.

use std::net::SocketAddr;

use chrono::Local;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use podium::api::{AppState, router};
use podium::config::Config;
use podium::engine::Gamification;
use podium::storage::Storage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("podium=info".parse()?))
        .init();

    info!(port = config.port, db_url = %config.database_url, "Starting Podium server");

    let storage = Storage::new(&config.database_url).await?;
    info!("Database initialized");

    let engine = Gamification::new(storage, &config);
    engine.seed(Local::now().date_naive()).await?;

    match engine.restore_session().await {
        Ok(Some(user)) => info!(user_id = %user.id, admin = user.is_admin, "Session restored"),
        Ok(None) => info!("No saved session, waiting for login"),
        Err(e) => warn!(error = %e, "Failed to restore session"),
    }

    let app = router(AppState { engine });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;

    info!(%addr, "Podium is listening");

    axum::serve(listener, app).await?;

    Ok(())
}
