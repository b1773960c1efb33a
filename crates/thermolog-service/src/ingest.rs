//! Background ingestion from the configured serial source.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use thermolog_core::{Listener, ListenerStatsSnapshot, ReadingSink, StreamSource};
use thermolog_types::Reading;

use crate::state::{AppState, ReadingEvent};

/// Writes readings into the shared store and announces them to live clients.
#[derive(Clone)]
pub struct StoreSink {
    state: Arc<AppState>,
}

impl StoreSink {
    /// Create a sink over the application state.
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl ReadingSink for StoreSink {
    async fn append(&self, reading: &Reading) -> thermolog_core::Result<()> {
        let id = {
            let store = self.state.store.lock().await;
            store
                .append(reading)
                .map_err(|e| thermolog_core::Error::StorageUnavailable(e.to_string()))?
        };
        debug!("Stored reading #{}: {}", id, reading);

        // No subscribers is the normal case
        let _ = self.state.readings_tx.send(ReadingEvent::from(reading));
        Ok(())
    }
}

/// Runs the ingestion listener for the service.
pub struct Ingest {
    state: Arc<AppState>,
}

impl Ingest {
    /// Create an ingest runner over the application state.
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Build a listener for the configured source.
    pub fn listener(&self) -> thermolog_core::Result<Listener<StoreSink>> {
        let spec = self.state.config.ingest.source_spec()?;
        Ok(self.listener_for(spec.into_source()))
    }

    /// Build a listener for an explicit source, using the configured options.
    ///
    /// Counters are shared with [`AppState::ingest`] so the health endpoint
    /// reports them live.
    pub fn listener_for(&self, source: Box<dyn StreamSource>) -> Listener<StoreSink> {
        Listener::new(source, StoreSink::new(Arc::clone(&self.state)))
            .with_options(self.state.config.ingest.listener_options())
            .with_stats(Arc::clone(&self.state.ingest))
    }

    /// Spawn the listener on the runtime.
    ///
    /// The task ends when `cancel` fires or the listener hits a fatal error;
    /// its result is the listener's.
    pub fn start(
        &self,
        cancel: CancellationToken,
    ) -> thermolog_core::Result<JoinHandle<thermolog_core::Result<ListenerStatsSnapshot>>> {
        let listener = self.listener()?;
        info!("Starting ingest from {}", self.state.config.ingest.source);
        Ok(tokio::spawn(async move { listener.run(cancel).await }))
    }
}
