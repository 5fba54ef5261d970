//! Redis Streams work queue
//!
//! One stream per topic, one consumer group. Fetch reads the consumer's
//! pending entries before new ones, so a crashed-and-restarted consumer picks
//! its unacknowledged task back up; commit is XACK.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::ProcessingTask;

use super::{Delivery, WorkQueue};

const TASK_FIELD: &str = "task";

/// Work queue over a Redis stream
pub struct RedisWorkQueue {
    conn: ConnectionManager,
    stream: String,
    group: String,
    consumer: String,
}

impl RedisWorkQueue {
    /// Connect and create the stream + consumer group when missing
    pub async fn connect(url: &str, stream: &str, group: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let mut conn = ConnectionManager::new(client).await?;

        let created: std::result::Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(stream)
            .arg(group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;
        if let Err(e) = created {
            // BUSYGROUP means the group already exists
            if !e.to_string().contains("BUSYGROUP") {
                return Err(e.into());
            }
        }

        Ok(Self {
            conn,
            stream: stream.to_string(),
            group: group.to_string(),
            consumer: format!("consumer-{}", std::process::id()),
        })
    }

    fn first_delivery(&self, reply: StreamReadReply) -> Result<Option<Delivery>> {
        for key in reply.keys {
            for entry in key.ids {
                let raw = entry
                    .map
                    .get(TASK_FIELD)
                    .ok_or_else(|| Error::Internal("queue entry missing task field".to_string()))?;
                let json: String = redis::from_redis_value(raw)?;
                let task: ProcessingTask = serde_json::from_str(&json)?;
                return Ok(Some(Delivery {
                    task,
                    receipt: entry.id,
                }));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl WorkQueue for RedisWorkQueue {
    async fn publish(&self, task: &ProcessingTask) -> Result<()> {
        let json = serde_json::to_string(task)?;
        let mut conn = self.conn.clone();
        let _: String = conn
            .xadd(&self.stream, "*", &[(TASK_FIELD, json.as_str())])
            .await?;
        Ok(())
    }

    async fn fetch(&self, wait: Duration) -> Result<Option<Delivery>> {
        let mut conn = self.conn.clone();

        // Pending entries first: anything delivered to this consumer but not
        // yet acknowledged.
        let pending_opts = StreamReadOptions::default()
            .group(&self.group, &self.consumer)
            .count(1);
        let pending: StreamReadReply = conn
            .xread_options(&[&self.stream], &["0"], &pending_opts)
            .await?;
        if let Some(delivery) = self.first_delivery(pending)? {
            return Ok(Some(delivery));
        }

        let opts = StreamReadOptions::default()
            .group(&self.group, &self.consumer)
            .count(1)
            .block(wait.as_millis() as usize);
        let reply: StreamReadReply = conn
            .xread_options(&[&self.stream], &[">"], &opts)
            .await?;
        self.first_delivery(reply)
    }

    async fn commit(&self, delivery: &Delivery) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .xack(&self.stream, &self.group, &[&delivery.receipt])
            .await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "redis-streams"
    }
}
