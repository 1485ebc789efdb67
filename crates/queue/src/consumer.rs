//! Long-running queue consumer.
//!
//! Modelled as a small state machine so each transition can be driven and
//! tested on its own:
//!
//! ```text
//!            pop timeout / event handled
//!              ┌──────────┐
//!              ▼          │
//!         ┌───────────┐───┘   error    ┌─────────┐
//!   ────▶ │ Listening │ ─────────────▶ │ Backoff │
//!         └───────────┘ ◀───────────── └─────────┘
//!               │          cooldown         │
//!               └──────── shutdown ─────────┴──▶ Stopped
//! ```
//!
//! Shutdown is only observed between pops and while sleeping in Backoff. An
//! in-flight pop is never abandoned, so a message is either left in the queue
//! or handed to the handler.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, error, info};

use licarch_core::config::QueueConfig;
use licarch_core::LicenseEvent;

use crate::client::QueueClient;

/// Downstream processing for one consumed event.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: LicenseEvent) -> anyhow::Result<()>;
}

/// Default handler: logs the license, user and action of each event.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

#[async_trait]
impl EventHandler for LoggingHandler {
    async fn handle(&self, event: LicenseEvent) -> anyhow::Result<()> {
        info!(
            "Processing: {} | {} | {}",
            event.license_type, event.user_name, event.action
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Listening,
    Backoff,
    Stopped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    /// Elements removed from the queue.
    pub received: u64,
    /// Events the handler accepted.
    pub handled: u64,
    /// Elements lost because the payload could not be decoded.
    pub dropped: u64,
    /// Events the handler rejected.
    pub failed: u64,
    /// Pops that returned nothing within the wait bound.
    pub idle_polls: u64,
    /// Times the consumer entered Backoff.
    pub backoffs: u64,
}

pub struct QueueConsumer<H> {
    client: Arc<dyn QueueClient>,
    handler: H,
    queue_name: String,
    pop_timeout: Duration,
    backoff: Duration,
    state: ConsumerState,
    stats: ConsumerStats,
}

impl<H: EventHandler> QueueConsumer<H> {
    pub fn new(client: Arc<dyn QueueClient>, handler: H, config: &QueueConfig) -> Self {
        Self {
            client,
            handler,
            queue_name: config.queue_name.clone(),
            pop_timeout: config.pop_timeout(),
            backoff: config.backoff(),
            state: ConsumerState::Listening,
            stats: ConsumerStats::default(),
        }
    }

    pub fn state(&self) -> ConsumerState {
        self.state
    }

    pub fn stats(&self) -> ConsumerStats {
        self.stats
    }

    /// Move to the terminal state; further steps are no-ops.
    pub fn stop(&mut self) {
        self.state = ConsumerState::Stopped;
    }

    /// Perform exactly one transition and return the new state.
    pub async fn step(&mut self) -> ConsumerState {
        self.state = match self.state {
            ConsumerState::Listening => self.listen().await,
            ConsumerState::Backoff => {
                tokio::time::sleep(self.backoff).await;
                ConsumerState::Listening
            }
            ConsumerState::Stopped => ConsumerState::Stopped,
        };
        self.state
    }

    /// Drive the state machine until `shutdown` flips to `true` (or its
    /// sender is dropped). Returns the final counters.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> ConsumerStats {
        info!(
            queue = %self.queue_name,
            provider = self.client.provider(),
            "Listening on queue"
        );

        loop {
            if *shutdown.borrow() || shutdown.has_changed().is_err() {
                break;
            }
            match self.state {
                ConsumerState::Listening => {
                    self.step().await;
                }
                ConsumerState::Backoff => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.backoff) => {
                            self.state = ConsumerState::Listening;
                        }
                        changed = shutdown.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                    }
                }
                ConsumerState::Stopped => break,
            }
        }

        self.stop();
        info!(
            received = self.stats.received,
            handled = self.stats.handled,
            dropped = self.stats.dropped,
            failed = self.stats.failed,
            "Shutting down consumer"
        );
        self.stats
    }

    async fn listen(&mut self) -> ConsumerState {
        let body = match self
            .client
            .blocking_pop(&self.queue_name, self.pop_timeout)
            .await
        {
            Ok(Some(body)) => body,
            Ok(None) => {
                self.stats.idle_polls += 1;
                debug!(queue = %self.queue_name, "No message within pop timeout");
                return ConsumerState::Listening;
            }
            Err(e) => {
                error!(error = %e, "Queue pop failed");
                return self.enter_backoff();
            }
        };
        self.stats.received += 1;

        // The element is already removed; a payload that cannot be decoded is lost.
        let event: LicenseEvent = match serde_json::from_str(&body) {
            Ok(event) => event,
            Err(e) => {
                self.stats.dropped += 1;
                error!(error = %e, payload_len = body.len(), "Dropping undecodable queue message");
                return self.enter_backoff();
            }
        };

        match self.handler.handle(event).await {
            Ok(()) => {
                self.stats.handled += 1;
                ConsumerState::Listening
            }
            Err(e) => {
                self.stats.failed += 1;
                error!(error = %e, "Event handler failed");
                self.enter_backoff()
            }
        }
    }

    fn enter_backoff(&mut self) -> ConsumerState {
        self.stats.backoffs += 1;
        debug!(cooldown_secs = self.backoff.as_secs(), "Entering backoff");
        ConsumerState::Backoff
    }
}
