//! In-process work queue
//!
//! Channel-backed transport with the same redelivery contract as the durable
//! backend: an uncommitted delivery is returned again on the next fetch.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::types::ProcessingTask;

use super::{Delivery, WorkQueue};

/// Process-local queue for tests and embedded runs
pub struct MemoryWorkQueue {
    sender: mpsc::Sender<ProcessingTask>,
    receiver: tokio::sync::Mutex<mpsc::Receiver<ProcessingTask>>,
    /// Fetched but not yet committed, oldest first
    pending: Mutex<VecDeque<Delivery>>,
    next_receipt: AtomicU64,
}

impl Default for MemoryWorkQueue {
    fn default() -> Self {
        let (sender, receiver) = mpsc::channel(1000);
        Self {
            sender,
            receiver: tokio::sync::Mutex::new(receiver),
            pending: Mutex::new(VecDeque::new()),
            next_receipt: AtomicU64::new(1),
        }
    }
}

impl MemoryWorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of uncommitted deliveries
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }
}

#[async_trait]
impl WorkQueue for MemoryWorkQueue {
    async fn publish(&self, task: &ProcessingTask) -> Result<()> {
        self.sender
            .send(task.clone())
            .await
            .map_err(|e| Error::Unavailable(format!("queue closed: {}", e)))
    }

    async fn fetch(&self, wait: Duration) -> Result<Option<Delivery>> {
        if let Some(delivery) = self.pending.lock().front().cloned() {
            return Ok(Some(delivery));
        }

        let mut receiver = self.receiver.lock().await;
        match tokio::time::timeout(wait, receiver.recv()).await {
            Ok(Some(task)) => {
                let receipt = self.next_receipt.fetch_add(1, Ordering::SeqCst).to_string();
                let delivery = Delivery { task, receipt };
                self.pending.lock().push_back(delivery.clone());
                Ok(Some(delivery))
            }
            Ok(None) => Err(Error::Unavailable("queue closed".to_string())),
            Err(_) => Ok(None),
        }
    }

    async fn commit(&self, delivery: &Delivery) -> Result<()> {
        self.pending.lock().retain(|d| d.receipt != delivery.receipt);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
