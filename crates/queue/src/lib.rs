pub mod client;
pub mod consumer;
pub mod error;
pub mod memory;
pub mod publisher;
pub mod redis_queue;

pub use client::QueueClient;
pub use consumer::{ConsumerState, ConsumerStats, EventHandler, LoggingHandler, QueueConsumer};
pub use error::QueueError;
pub use memory::InMemoryQueue;
pub use publisher::{PublishSummary, QueuePublisher};
pub use redis_queue::RedisQueue;
