mod auth;
mod config;
mod error;
mod merge;
mod rate_limit;
mod routes;

use std::sync::Arc;

use config::AppConfig;
use merge::MergeEngine;
use routes::{app_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(debug_assertions)]
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("notely_api=info".parse().expect("valid directive")),
        )
        .init();

    let config = Arc::new(AppConfig::from_env()?);
    tracing::info!("Starting notely-api with config: {:?}", config);

    let merge = MergeEngine::open(&config.database_path).await?;
    let state = AppState::new(Arc::clone(&config), merge);
    let bind_addr = state.config.bind_addr.clone();
    let router = app_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("notely-api listening on {}", bind_addr);
    axum::serve(listener, router).await?;
    Ok(())
}
