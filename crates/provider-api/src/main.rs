mod auth;
mod config;
mod error;
mod routes;
mod state;

use std::process::ExitCode;
use std::sync::Arc;

use azure_provider::{AzureProvider, ProviderConfig};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::routes::api_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let provider_config = ProviderConfig::from_env();
    tracing::info!(
        dial_timeout_secs = provider_config.reachability.timeout.as_secs(),
        control_port = provider_config.reachability.port,
        "azure provider ready"
    );

    let state = AppState {
        provider: Arc::new(AzureProvider::new(provider_config)),
        config: config.clone(),
    };

    let app = api_router(state).layer(TraceLayer::new_for_http());

    let listener = match tokio::net::TcpListener::bind(config.listen_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %config.listen_addr, "failed to bind listener: {e}");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(addr = %config.listen_addr, auth = config.api_key.is_some(), "starting provider API");

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("server error: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
