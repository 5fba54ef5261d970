//! Durable work queue for processing tasks
//!
//! At-least-once delivery with manual commit: a fetched task is redelivered
//! until the consumer commits its receipt, so the retry policy lives entirely
//! with the consumer. The queue itself is a thin adapter.

pub mod memory;
pub mod redis;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;
use crate::types::ProcessingTask;

pub use memory::MemoryWorkQueue;
pub use self::redis::RedisWorkQueue;

/// One fetched task plus the receipt needed to commit it
#[derive(Debug, Clone)]
pub struct Delivery {
    pub task: ProcessingTask,
    pub receipt: String,
}

/// At-least-once task transport
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Enqueue a task
    async fn publish(&self, task: &ProcessingTask) -> Result<()>;

    /// Next delivery, waiting up to `wait`. Unacknowledged deliveries are
    /// handed out again before new ones.
    async fn fetch(&self, wait: Duration) -> Result<Option<Delivery>>;

    /// Acknowledge a delivery so it is never redelivered
    async fn commit(&self, delivery: &Delivery) -> Result<()>;

    /// Backend name for logging
    fn name(&self) -> &str;
}
