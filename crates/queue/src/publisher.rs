//! Best-effort forwarding of parsed events onto the queue.

use std::sync::Arc;

use tracing::{debug, info};

use licarch_core::config::QueueConfig;
use licarch_core::ParsedEvent;

use crate::client::QueueClient;
use crate::error::QueueError;
use crate::redis_queue::RedisQueue;

/// Counts from one [`QueuePublisher::publish_all`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishSummary {
    pub pushed: u64,
    pub failed: u64,
}

/// Tail-enqueues event payloads onto a named list so a consumer can pop FIFO.
pub struct QueuePublisher {
    client: Arc<dyn QueueClient>,
    queue_name: String,
}

impl QueuePublisher {
    pub fn new(client: Arc<dyn QueueClient>, queue_name: impl Into<String>) -> Self {
        Self {
            client,
            queue_name: queue_name.into(),
        }
    }

    /// Connect to Redis. Callers treat an error as "run archive-only".
    pub async fn connect(config: &QueueConfig) -> Result<Self, QueueError> {
        let redis = RedisQueue::connect(config).await?;
        Ok(Self::new(Arc::new(redis), config.queue_name.clone()))
    }

    /// Wrap an existing client after proving it responds.
    pub async fn with_client(
        client: Arc<dyn QueueClient>,
        queue_name: impl Into<String>,
    ) -> Result<Self, QueueError> {
        client.ping().await?;
        Ok(Self::new(client, queue_name))
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Push one event's JSON payload to the tail of the queue.
    pub async fn publish(&self, event: &ParsedEvent) -> Result<(), QueueError> {
        let payload = event.to_payload()?;
        self.client.push(&self.queue_name, &payload).await
    }

    /// Publish each event individually. Failures are logged at debug and
    /// counted; they never abort the remaining events.
    pub async fn publish_all(&self, events: &[ParsedEvent]) -> PublishSummary {
        let mut summary = PublishSummary::default();
        for event in events {
            match self.publish(event).await {
                Ok(()) => summary.pushed += 1,
                Err(e) => {
                    summary.failed += 1;
                    debug!(error = %e, fingerprint = event.fingerprint(), "Queue push failed (continuing)");
                }
            }
        }
        info!(
            queue = %self.queue_name,
            provider = self.client.provider(),
            pushed = summary.pushed,
            failed = summary.failed,
            "Pushed entries to queue"
        );
        summary
    }
}
