//! WJL Relay
//!
//! Central relay for WiFi jamming / deauth monitoring nodes.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        WJL RELAY                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐  ┌───────────┐  ┌─────────────────────────┐ │
//! │  │  Node API │  │ Ingestion │  │  Event Detection        │ │
//! │  │  (Axum)   │─▶│  Service  │─▶│  (threshold rules)      │ │
//! │  └───────────┘  └─────┬─────┘  └────────────┬────────────┘ │
//! │  ┌───────────┐        ▼                     ▼              │
//! │  │ Dashboard │  ┌─────────────────────────────────────┐    │
//! │  │  (read)   │─▶│ SQLite: nodes / measurements / events│    │
//! │  └───────────┘  └─────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod db;
mod detection;
mod models;
mod services;
mod handlers;
mod middleware;
mod error;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router,
    routing::{get, post},
    middleware as axum_middleware,
};
use tower_http::{
    cors::{CorsLayer, Any},
    trace::TraceLayer,
    compression::CompressionLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::detection::ThresholdDetector;
use crate::services::{IngestionService, QueryService};

pub use error::{AppError, AppResult};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = config::Config::from_env();

    tracing::info!(environment = %config.environment, "WJL relay starting...");
    tracing::info!(
        database = %config.database_url,
        deauth_threshold = config.thresholds.deauth_count_threshold,
        disassoc_threshold = config.thresholds.disassoc_count_threshold,
        "Configuration loaded"
    );
    if config.relay_api_key.is_none() {
        if config.is_production() {
            tracing::warn!("RELAY_API_KEY is not set; any credential will register a new node");
        } else {
            tracing::info!("RELAY_API_KEY not set, nodes self-register");
        }
    }

    let pool = db::create_pool(&config.database_url, config.db_max_connections)
        .await
        .context("Failed to create database pool")?;

    tracing::info!("Running database migrations...");
    db::run_migrations(&pool)
        .await
        .context("Failed to run migrations")?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let state = AppState::new(pool, config);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Relay listening on http://{}", addr);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

/// `LOG_FORMAT=json` switches to structured JSON lines
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "wjl_relay=debug,tower_http=debug".into());

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: sqlx::SqlitePool,
    pub config: Arc<config::Config>,
    pub ingestion: IngestionService,
    pub query: QueryService,
}

impl AppState {
    pub fn new(pool: sqlx::SqlitePool, config: config::Config) -> Self {
        let ingestion = IngestionService::new(pool.clone(), &config, Arc::new(ThresholdDetector));
        let query = QueryService::new(pool.clone(), config.relay_node.clone());
        Self {
            pool,
            config: Arc::new(config),
            ingestion,
            query,
        }
    }
}

/// Create the main router with all routes
fn create_router(state: AppState) -> Router {
    // Dashboard routes (read only, no auth)
    let public_routes = Router::new()
        .route("/health", get(handlers::health::check))
        .route("/api/measurements", get(handlers::dashboard::measurements))
        .route("/api/events", get(handlers::dashboard::events))
        .route("/api/events/:id/inferences", get(handlers::dashboard::event_inferences))
        .route("/api/nodes", get(handlers::dashboard::nodes))
        .route("/api/data_range", get(handlers::dashboard::data_range))
        .route("/api/metrics", get(handlers::dashboard::metrics))
        .route("/api/summary", get(handlers::dashboard::summary))
        .route("/api/channel_amplitude", get(handlers::dashboard::channel_amplitude));

    // Node routes (node credential)
    let node_routes = Router::new()
        .route("/api/measurements", post(handlers::relay::submit_measurement))
        .route("/api/channel_amplitude", post(handlers::relay::submit_channel_amplitude))
        .route("/api/config", get(handlers::relay::node_config))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_node_auth
        ));

    Router::new()
        .merge(public_routes)
        .merge(node_routes)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}
