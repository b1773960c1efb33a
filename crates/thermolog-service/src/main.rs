//! thermolog-service - serial ingestion and HTTP query API.
//!
//! Run with: `cargo run -p thermolog-service`

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use thermolog_service::{AppState, Config, Ingest};
use thermolog_store::Store;

/// thermolog-service - serial ingestion and HTTP query API.
#[derive(Parser, Debug)]
#[command(name = "thermolog-service")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address (overrides config).
    #[arg(short, long)]
    bind: Option<String>,

    /// Database path (overrides config).
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Serial device path or tcp://host:port bridge (overrides config).
    #[arg(short, long)]
    source: Option<String>,

    /// Disable serial ingestion (API only mode).
    #[arg(long)]
    no_ingest: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("thermolog_service=info".parse()?)
                .add_directive("thermolog_core=info".parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default().unwrap_or_else(|e| {
            warn!("Ignoring default config: {}", e);
            Config::default()
        }),
    };

    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(db_path) = args.database {
        config.storage.path = db_path;
    }
    if let Some(source) = args.source {
        config.ingest.source = source;
    }
    if args.no_ingest {
        config.ingest.enabled = false;
    }
    config.validate()?;

    info!("Opening database at {:?}", config.storage.path);
    let store = Store::open(&config.storage.path)?;

    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {}", config.server.bind))?;

    let state = AppState::new(store, config);
    let cancel = CancellationToken::new();

    let mut ingest = if state.config.ingest.enabled {
        Some(Ingest::new(Arc::clone(&state)).start(cancel.clone())?)
    } else {
        info!("Serial ingestion disabled");
        None
    };

    let app = thermolog_service::app(state);

    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // The server stops on ctrl-c or when ingestion ends on its own
    let shutdown = {
        let cancel = cancel.clone();
        async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("Shutdown requested"),
                _ = cancel.cancelled() => {}
            }
            cancel.cancel();
        }
    };

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown);

    match ingest.as_mut() {
        Some(handle) => {
            let server = server.into_future();
            tokio::pin!(server);
            tokio::select! {
                result = &mut server => {
                    cancel.cancel();
                    result?;
                    handle.await??;
                }
                joined = &mut *handle => {
                    cancel.cancel();
                    server.await?;
                    match joined? {
                        Ok(stats) => info!("Ingest stopped after {} readings", stats.stored),
                        Err(e) => {
                            error!("Ingest failed, shutting down: {}", e);
                            return Err(e.into());
                        }
                    }
                }
            }
        }
        None => server.await?,
    }

    info!("Server stopped");
    Ok(())
}
