//! HTTP server for symbol proxy endpoints
//!
//! Provides /health and /download/symbols/{name}/{hash}/{name}.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use symbol_cache::{CacheOrigin, CacheStats, SymbolCache};
use tokio_util::io::ReaderStream;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

const USAGE: &str =
    "Symbol Proxy - use /download/symbols/{name}/{hash}/{name} to fetch symbol files";
const NOT_FOUND: &str = "symbol not found";

/// Shared state for the HTTP server
pub struct ServerState {
    pub cache: SymbolCache,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    pub fn new(cache: SymbolCache) -> Self {
        Self {
            cache,
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<ServerState>;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub cache: CacheStats,
}

/// Create the HTTP router
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(usage))
        .route("/health", get(health))
        .route("/download/symbols/{name}/{hash}/{file}", get(get_symbol))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(state: SharedState, port: u16) -> std::io::Result<()> {
    let router = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await
}

/// Health check endpoint
async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let uptime_secs = (Utc::now() - state.started_at).num_seconds().max(0) as u64;

    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs,
        cache: state.cache.stats(),
    })
}

/// Plain-text pointer to the download route
async fn usage() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, USAGE)
}

/// Unmatched routes
async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, NOT_FOUND)
}

/// Serve a symbol file, fetching it upstream on a cache miss
async fn get_symbol(
    State(state): State<SharedState>,
    Path((name, hash, file)): Path<(String, String, String)>,
) -> Response {
    // Symbol server URLs repeat the file name after the hash
    if name != file {
        debug!(name = %name, file = %file, "Mismatched symbol name segments");
        return StatusCode::NOT_FOUND.into_response();
    }

    let symbol = match state.cache.serve(&name, &hash).await {
        Ok(symbol) => symbol,
        Err(e) => {
            debug!(name = %name, hash = %hash, error = %e, "Symbol not served");
            return StatusCode::NOT_FOUND.into_response();
        }
    };

    let cache_header = match symbol.origin {
        CacheOrigin::Hit => "HIT",
        CacheOrigin::Fetched => "MISS",
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, symbol.len)
        .header("X-Cache", cache_header)
        .body(Body::from_stream(ReaderStream::new(symbol.file)))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
