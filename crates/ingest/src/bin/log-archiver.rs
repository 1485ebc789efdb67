//! log-archiver: archives vendor license-server logs into SQLite and
//! forwards each parsed event onto the Redis queue when it is reachable.

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use licarch_core::config::{self, Config};
use licarch_ingest::{Archiver, SqliteEventStore, VendorLogParser};
use licarch_queue::QueuePublisher;

/// Archive license-server log files.
#[derive(Parser, Debug)]
#[command(name = "log-archiver", version, about)]
struct Cli {
    /// Ignore the progress record and reprocess every log file.
    #[arg(long)]
    force: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    config::load_dotenv();
    let config = Config::from_env();
    config.log_summary();

    let store = SqliteEventStore::open(&config.archiver.db_path)
        .await
        .with_context(|| format!("opening archive {}", config.archiver.db_path.display()))?;
    let pool = store.pool().clone();

    let parser = VendorLogParser::new().context("compiling log line patterns")?;
    let mut archiver = Archiver::new(config.archiver.clone(), Box::new(parser), Box::new(store));

    match QueuePublisher::connect(&config.queue).await {
        Ok(publisher) => {
            info!(queue = %config.queue.queue_name, "Publishing parsed events to queue");
            archiver = archiver.with_publisher(publisher);
        }
        Err(e) => {
            warn!(
                error = %e,
                url = %config.queue.connection_url(),
                "Redis not available, continuing with archive only"
            );
        }
    }

    let result = archiver.run(cli.force).await;
    pool.close().await;

    let summary = result.context("log archival failed")?;
    if summary.files_failed > 0 {
        warn!(failed = summary.files_failed, "Some files could not be processed");
    }
    Ok(())
}
