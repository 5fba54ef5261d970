//! Queue consumer with bounded retry
//!
//! One long-lived loop per process reads one task at a time. A delivery is
//! committed on success or once the attempt counter reaches the ceiling;
//! anything else stays uncommitted so the queue redelivers it. If the counter
//! store itself is unreachable, the delivery is left alone.

use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::providers::ProgressStore;
use crate::queue::WorkQueue;

use super::pipeline::IngestPipeline;

const FETCH_WAIT: Duration = Duration::from_secs(5);

/// Single-threaded pipeline consumer
pub struct PipelineConsumer {
    queue: Arc<dyn WorkQueue>,
    progress: Arc<dyn ProgressStore>,
    pipeline: Arc<IngestPipeline>,
    retry_cap: u64,
}

impl PipelineConsumer {
    pub fn new(
        queue: Arc<dyn WorkQueue>,
        progress: Arc<dyn ProgressStore>,
        pipeline: Arc<IngestPipeline>,
        retry_cap: u64,
    ) -> Self {
        Self {
            queue,
            progress,
            pipeline,
            retry_cap,
        }
    }

    /// Consume until the queue goes away
    pub async fn run(self: Arc<Self>) {
        tracing::info!(queue = self.queue.name(), "pipeline consumer started");
        loop {
            if let Err(e) = self.step(FETCH_WAIT).await {
                tracing::error!(error = %e, "consumer fetch failed, backing off");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }

    /// Fetch and handle at most one delivery; returns whether one was seen
    pub async fn step(&self, wait: Duration) -> Result<bool> {
        let delivery = match self.queue.fetch(wait).await? {
            Some(delivery) => delivery,
            None => return Ok(false),
        };
        let file_md5 = delivery.task.file_md5.clone();
        tracing::info!(file_md5, "task received");

        match self.pipeline.process(&delivery.task).await {
            Ok(()) => {
                if let Err(e) = self.progress.clear_attempts(&file_md5).await {
                    tracing::warn!(file_md5, error = %e, "failed to clear attempt counter");
                }
                self.queue.commit(&delivery).await?;
                tracing::info!(file_md5, "task completed");
            }
            Err(process_err) => {
                tracing::error!(file_md5, error = %process_err, "task failed");
                match self.progress.record_attempt(&file_md5).await {
                    Ok(attempts) if attempts >= self.retry_cap => {
                        // Poison pill: stop redelivery by committing anyway.
                        tracing::error!(
                            file_md5,
                            attempts,
                            "retry ceiling reached, dropping task"
                        );
                        self.queue.commit(&delivery).await?;
                    }
                    Ok(attempts) => {
                        tracing::warn!(file_md5, attempts, "leaving task for redelivery");
                    }
                    Err(counter_err) => {
                        // Counter store down: stay conservative, let the
                        // queue redeliver.
                        tracing::warn!(
                            file_md5,
                            error = %counter_err,
                            "attempt counter unavailable, not acknowledging"
                        );
                    }
                }
            }
        }
        Ok(true)
    }
}
