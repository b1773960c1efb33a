//! Application state shared across handlers.
//!
//! # Broadcast Channel Behavior
//!
//! `readings_tx` fans newly stored readings out to WebSocket clients. Its
//! capacity comes from `server.broadcast_buffer` (default: 100). Senders never
//! block; a subscriber that falls behind skips the oldest events.
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:8080"
//! broadcast_buffer = 200
//! ```

use std::sync::Arc;

use serde::Serialize;
use thermolog_core::ListenerStats;
use thermolog_store::Store;
use thermolog_types::types::format_timestamp;
use thermolog_types::Reading;
use tokio::sync::{Mutex, broadcast};

use crate::config::Config;

/// Shared application state.
pub struct AppState {
    /// The data store. The ingest writer and query handlers take turns on it.
    pub store: Mutex<Store>,
    /// Configuration the service was started with.
    pub config: Config,
    /// Broadcast channel for newly stored readings.
    pub readings_tx: broadcast::Sender<ReadingEvent>,
    /// Counters published by the ingest listener.
    pub ingest: Arc<ListenerStats>,
}

impl AppState {
    /// Create new application state.
    pub fn new(store: Store, config: Config) -> Arc<Self> {
        let (readings_tx, _) = broadcast::channel(config.server.broadcast_buffer.max(1));
        Arc::new(Self {
            store: Mutex::new(store),
            config,
            readings_tx,
            ingest: Arc::new(ListenerStats::new()),
        })
    }
}

/// A stored reading as sent to live-feed clients.
///
/// Matches the element shape of `GET /api/readings`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadingEvent {
    /// `YYYY-MM-DD HH:MM:SS`, UTC.
    pub time: String,
    /// Sensor value as received.
    pub temp: f64,
}

impl From<&Reading> for ReadingEvent {
    fn from(reading: &Reading) -> Self {
        Self {
            time: format_timestamp(reading.timestamp),
            temp: reading.value,
        }
    }
}
