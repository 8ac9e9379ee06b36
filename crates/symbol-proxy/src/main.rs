//! Symbol Proxy - caching proxy for symbol servers
//!
//! Serves debug symbol files from a local cache directory, downloading them
//! from an upstream symbol server on first request.

mod config;
mod error;
mod server;

use crate::config::Config;
use crate::error::{ProxyError, Result};
use crate::server::{start_server, ServerState, SharedState};
use std::sync::Arc;
use symbol_cache::SymbolCache;
use tracing::info;
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration from environment
    let config = Config::from_env()?;

    // Initialize logging
    let env_filter = EnvFilter::from_default_env()
        .add_directive("symbol_proxy=info".parse()?)
        .add_directive("symbol_cache=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if config.json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    info!("Starting Symbol Proxy...");
    info!("Port: {}", config.port);
    info!("Cache dir: {:?}", config.cache.storage_root);
    info!("Upstream: {}", config.cache.upstream_url);
    info!("Upstream timeout: {} seconds", config.cache.timeout.as_secs());
    info!("Endpoint: GET /download/symbols/{{name}}/{{hash}}/{{name}}");

    let cache = SymbolCache::new(config.cache)?;
    cache.init().await?;

    // Create shared state
    let state: SharedState = Arc::new(ServerState::new(cache));

    // Start HTTP server (blocking)
    start_server(state, config.port)
        .await
        .map_err(|e| ProxyError::Config(format!("Server error: {}", e)))?;

    Ok(())
}
