//! Redis list backend (`RPUSH` / `BLPOP`).

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::{debug, info};

use licarch_core::config::QueueConfig;

use crate::client::QueueClient;
use crate::error::QueueError;

/// Redis-backed queue client.
///
/// Holds one multiplexed connection; cloning it per call is cheap and is how
/// the redis crate expects `&self` methods to issue commands.
#[derive(Clone)]
pub struct RedisQueue {
    conn: MultiplexedConnection,
    url: String,
}

impl RedisQueue {
    /// Connect and PING, bounded by the configured connect timeout.
    pub async fn connect(config: &QueueConfig) -> Result<Self, QueueError> {
        let url = config.connection_url();
        let timeout = config.connect_timeout();

        let client = redis::Client::open(url.as_str())
            .map_err(|e| QueueError::Connection(format!("invalid redis url {url}: {e}")))?;

        let conn = tokio::time::timeout(timeout, client.get_multiplexed_async_connection())
            .await
            .map_err(|_| QueueError::Timeout(timeout.as_millis() as u64))??;

        let queue = Self { conn, url };
        tokio::time::timeout(timeout, queue.ping())
            .await
            .map_err(|_| QueueError::Timeout(timeout.as_millis() as u64))??;

        info!(url = %queue.url, "Connected to Redis");
        Ok(queue)
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl QueueClient for RedisQueue {
    async fn push(&self, queue: &str, payload: &str) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let _len: i64 = conn.rpush(queue, payload).await?;
        Ok(())
    }

    async fn blocking_pop(&self, queue: &str, timeout: Duration) -> Result<Option<String>, QueueError> {
        let mut conn = self.conn.clone();
        // BLPOP replies with (key, value), or nil once the timeout elapses.
        let reply: Option<(String, String)> = conn.blpop(queue, timeout.as_secs_f64()).await?;
        debug!(queue, received = reply.is_some(), "BLPOP returned");
        Ok(reply.map(|(_key, value)| value))
    }

    async fn ping(&self) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        if pong != "PONG" {
            return Err(QueueError::Provider(format!("unexpected PING reply: {pong}")));
        }
        Ok(())
    }

    fn provider(&self) -> &'static str {
        "redis"
    }
}
