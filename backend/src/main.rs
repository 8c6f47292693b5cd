use std::net::SocketAddr;

use tracing::info;
use tracing_subscriber::EnvFilter;
use wheel_backend::config::AppConfig;
use wheel_backend::{app, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env()?;
    let catalog = config.load_catalog().await?;
    info!(prizes = catalog.prizes().len(), "catalog loaded");

    let state = AppState::from_config(&config, catalog);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!(%addr, data_file = %config.data_file.display(), "prize wheel listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state)).await?;
    Ok(())
}
