//! Serial ingestion daemon and HTTP query API for thermolog.
//!
//! This crate provides a service that:
//! - Reads `T:<value> @ <timestamp>` lines from a serial device or TCP bridge
//! - Stores readings and their hourly/daily means in SQLite
//! - Exposes a REST API for querying data
//! - Provides a WebSocket feed of newly stored readings
//!
//! # REST API Endpoints
//!
//! - `GET /api/health` - Service health, database and ingest counters
//! - `GET /api/current` - Latest reading
//! - `GET /api/readings` - Readings between `start` and `end`, or the 20 most recent
//! - `GET /api/hourly` - Hourly means for the last 30 days
//! - `GET /api/daily` - Daily means
//! - `WS /api/ws` - Live readings stream
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/thermolog/server.toml`:
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:8080"
//!
//! [storage]
//! path = "/var/lib/thermolog/readings.db"
//!
//! [ingest]
//! source = "/dev/ttyUSB0"        # or "tcp://ser2net.local:3001"
//! read_timeout_ms = 1000
//! max_consecutive_failures = 5
//!
//! [ingest.backoff]
//! initial_delay_ms = 1000
//! max_delay_ms = 30000
//! ```

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod api;
pub mod config;
pub mod ingest;
pub mod state;
pub mod ws;

pub use config::{
    BackoffConfig, Config, ConfigError, IngestConfig, ServerConfig, StorageConfig,
    ValidationError,
};
pub use ingest::{Ingest, StoreSink};
pub use state::{AppState, ReadingEvent};

/// Build the full HTTP application over shared state.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(api::router())
        .merge(ws::router())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
