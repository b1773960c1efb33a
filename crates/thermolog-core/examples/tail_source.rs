//! Example: Printing Readings From a Source
//!
//! Opens a serial device, FIFO, or `tcp://host:port` bridge and prints every
//! valid reading until Ctrl-C. Nothing is stored.
//!
//! Run with: `cargo run --example tail_source -- /dev/ttyUSB0`

use std::env;
use std::sync::Arc;

use async_trait::async_trait;
use thermolog_core::{Listener, Reading, ReadingSink, Result, SourceSpec};
use tokio_util::sync::CancellationToken;

struct PrintSink;

#[async_trait]
impl ReadingSink for PrintSink {
    async fn append(&self, reading: &Reading) -> Result<()> {
        println!("{}", reading);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let Some(spec) = args.get(1) else {
        eprintln!("Usage: {} <DEVICE_PATH | tcp://HOST:PORT>", args[0]);
        eprintln!();
        eprintln!("Example:");
        eprintln!("  {} /dev/ttyUSB0", args[0]);
        eprintln!("  {} tcp://ser2net.local:3001", args[0]);
        std::process::exit(1);
    };

    let source = spec.parse::<SourceSpec>()?.into_source();
    let listener = Listener::new(source, Arc::new(PrintSink));

    let cancel = CancellationToken::new();
    let stop = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        stop.cancel();
    });

    let stats = listener.run(cancel).await?;
    println!();
    println!(
        "{} lines, {} readings, {} rejected, {} reconnects",
        stats.lines, stats.stored, stats.parse_failures, stats.reconnects
    );
    Ok(())
}
