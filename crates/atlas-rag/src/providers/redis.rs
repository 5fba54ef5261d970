//! Redis-backed progress store
//!
//! Part bitmaps use SETBIT/GET with Redis bit order (most significant bit
//! first within each byte). Attempt counters and conversation keys carry the
//! TTLs the data model requires; conversation creation is an atomic
//! SET NX EX so concurrent sessions agree on one id.

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::error::Result;
use crate::providers::progress_store::{
    attempts_key, conversation_key, conversation_pointer_key, upload_key, ProgressStore,
};
use crate::types::ChatMessage;

/// Progress store over a shared Redis connection
pub struct RedisProgressStore {
    conn: ConnectionManager,
    retry_ttl_secs: i64,
    history_ttl_secs: u64,
    history_cap: usize,
}

impl RedisProgressStore {
    /// Connect and hold a multiplexed connection
    pub async fn connect(
        url: &str,
        retry_ttl_secs: u64,
        history_ttl_secs: u64,
        history_cap: usize,
    ) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            retry_ttl_secs: retry_ttl_secs as i64,
            history_ttl_secs,
            history_cap,
        })
    }
}

#[async_trait]
impl ProgressStore for RedisProgressStore {
    async fn is_part_received(&self, user_id: u64, file_md5: &str, index: u32) -> Result<bool> {
        let mut conn = self.conn.clone();
        let set: bool = conn.getbit(upload_key(user_id, file_md5), index as usize).await?;
        Ok(set)
    }

    async fn mark_part_received(&self, user_id: u64, file_md5: &str, index: u32) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: bool = conn
            .setbit(upload_key(user_id, file_md5), index as usize, true)
            .await?;
        Ok(())
    }

    async fn received_parts(&self, user_id: u64, file_md5: &str, total_chunks: u32) -> Result<Vec<u32>> {
        if total_chunks == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let bitmap: Option<Vec<u8>> = conn.get(upload_key(user_id, file_md5)).await?;
        let bitmap = bitmap.unwrap_or_default();

        let mut received = Vec::new();
        for index in 0..total_chunks {
            let byte = (index / 8) as usize;
            let bit = 7 - (index % 8);
            if byte < bitmap.len() && (bitmap[byte] >> bit) & 1 == 1 {
                received.push(index);
            }
        }
        Ok(received)
    }

    async fn clear_parts(&self, user_id: u64, file_md5: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.del(upload_key(user_id, file_md5)).await?;
        Ok(())
    }

    async fn record_attempt(&self, file_md5: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        let key = attempts_key(file_md5);
        let attempts: u64 = conn.incr(&key, 1i64).await?;
        let _: bool = conn.expire(&key, self.retry_ttl_secs).await?;
        Ok(attempts)
    }

    async fn clear_attempts(&self, file_md5: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.del(attempts_key(file_md5)).await?;
        Ok(())
    }

    async fn get_or_create_conversation(&self, user_id: u64) -> Result<String> {
        let mut conn = self.conn.clone();
        let key = conversation_pointer_key(user_id);
        let candidate = format!(
            "{}-{}",
            Utc::now().timestamp_nanos_opt().unwrap_or_default(),
            user_id
        );

        let created: bool = redis::cmd("SET")
            .arg(&key)
            .arg(&candidate)
            .arg("NX")
            .arg("EX")
            .arg(self.history_ttl_secs)
            .query_async(&mut conn)
            .await?;
        if created {
            return Ok(candidate);
        }

        let existing: Option<String> = conn.get(&key).await?;
        Ok(existing.unwrap_or(candidate))
    }

    async fn history(&self, conversation_id: &str) -> Result<Vec<ChatMessage>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(conversation_key(conversation_id)).await?;
        match raw {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Vec::new()),
        }
    }

    async fn put_history(&self, conversation_id: &str, messages: &[ChatMessage]) -> Result<()> {
        let keep = if messages.len() > self.history_cap {
            &messages[messages.len() - self.history_cap..]
        } else {
            messages
        };
        let json = serde_json::to_string(keep)?;

        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(conversation_key(conversation_id), json, self.history_ttl_secs)
            .await?;
        Ok(())
    }

    async fn conversation_mappings(&self) -> Result<Vec<(u64, String)>> {
        let mut scan_conn = self.conn.clone();
        let mut keys: Vec<String> = Vec::new();
        {
            let mut iter = scan_conn
                .scan_match::<_, String>("user:*:current_conversation")
                .await?;
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
        }

        let mut conn = self.conn.clone();
        let mut mappings = Vec::with_capacity(keys.len());
        for key in keys {
            let user_id = match key.split(':').nth(1).and_then(|s| s.parse::<u64>().ok()) {
                Some(id) => id,
                None => continue,
            };
            let conversation: Option<String> = conn.get(&key).await?;
            if let Some(conversation) = conversation {
                mappings.push((user_id, conversation));
            }
        }
        Ok(mappings)
    }
}
