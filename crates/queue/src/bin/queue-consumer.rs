//! queue-consumer: drains parsed license events from the Redis queue.
//!
//! Runs independently of `log-archiver`; the Redis list is the only thing the
//! two processes share. Each popped event is handed to the logging handler.

use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};

use licarch_core::config::{self, Config};
use licarch_queue::{LoggingHandler, QueueConsumer, RedisQueue};

// ── CLI ─────────────────────────────────────────────────────────────

/// Consume license events published by log-archiver.
#[derive(Parser, Debug)]
#[command(name = "queue-consumer", version, about)]
struct Cli {}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    Cli::parse();

    config::load_dotenv();
    let config = Config::from_env();
    config.log_summary();

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    // The broker may not be up yet; keep retrying with the backoff cooldown.
    let redis = loop {
        match RedisQueue::connect(&config.queue).await {
            Ok(redis) => break redis,
            Err(e) => {
                warn!(
                    error = %e,
                    retry_secs = config.queue.backoff_secs,
                    "Redis not available, retrying"
                );
                tokio::select! {
                    _ = tokio::time::sleep(config.queue.backoff()) => {}
                    _ = shutdown_rx.changed() => {
                        info!("queue-consumer exited before connecting");
                        return Ok(());
                    }
                }
            }
        }
    };

    info!(
        url = redis.url(),
        queue = %config.queue.queue_name,
        "Connected, listening for license events"
    );

    let consumer = QueueConsumer::new(Arc::new(redis), LoggingHandler, &config.queue);
    let stats = consumer.run(shutdown_rx).await;

    info!(
        handled = stats.handled,
        dropped = stats.dropped,
        "queue-consumer exited cleanly"
    );
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {},
            _ = sigterm.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("failed to listen for ctrl_c");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_name_only_from_environment() {
        assert!(Cli::try_parse_from(["queue-consumer"]).is_ok());
        assert!(Cli::try_parse_from(["queue-consumer", "--queue", "other"]).is_err());
    }
}
