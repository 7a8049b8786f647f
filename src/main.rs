//! hopper - WebSocket job-queue client

use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use serde_json::Value;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hopper::{Args, JobHandler, Queue};

/// Demo handler: logs each drained job
struct LogHandler;

#[async_trait]
impl JobHandler for LogHandler {
    async fn handle(&self, job: Value) -> hopper::Result<()> {
        info!("Processing job: {}", job);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Initialize tracing/logging
    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("hopper={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  hopper - job-queue client");
    info!("  v{} ({})", env!("CARGO_PKG_VERSION"), env!("GIT_COMMIT_SHORT"));
    info!("======================================");
    info!("Server: {}", args.url);
    info!("Channel: {}", args.channel);
    info!("Poll interval: {}ms", args.poll_interval_ms);
    info!("Reconnect delay: {}ms", args.reconnect_delay_ms);
    info!("Page size: {}", args.page_size);
    info!("======================================");

    let queue = Queue::new(args.queue_config(), Arc::new(LogHandler));
    queue.start(&args.url).await?;

    // The library performs no signal registration; the shutdown contract
    // is driven from here
    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");
    queue.dump_state().await;
    queue.shutdown().await;

    Ok(())
}
