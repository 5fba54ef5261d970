//! Volatile per-tenant progress state
//!
//! Three concerns share one store: the received-part bitmap per
//! `(user, file)`, the bounded retry counters the pipeline consults, and
//! per-user conversation state. Keys and lifetimes:
//!
//! - `upload:<user_id>:<md5>`: part bitmap, bit i set iff part i received
//! - `kafka:attempts:<md5>`: delivery attempt counter, expires after 24 h
//! - `user:<user_id>:current_conversation`: conversation id, expires after
//!   7 days of inactivity
//! - `conversation:<conv_id>`: JSON message array capped at the most recent
//!   20 entries, same 7-day lifetime

use async_trait::async_trait;

use crate::error::Result;
use crate::types::ChatMessage;

/// Bitmaps, retry counters, and conversation state
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Whether part `index` of `(user, file)` was already received
    async fn is_part_received(&self, user_id: u64, file_md5: &str, index: u32) -> Result<bool>;

    /// Mark part `index` received; last writer wins
    async fn mark_part_received(&self, user_id: u64, file_md5: &str, index: u32) -> Result<()>;

    /// Indices of received parts, truncated to `total_chunks`
    async fn received_parts(&self, user_id: u64, file_md5: &str, total_chunks: u32) -> Result<Vec<u32>>;

    /// Drop the bitmap after a successful merge
    async fn clear_parts(&self, user_id: u64, file_md5: &str) -> Result<()>;

    /// Increment and return the delivery attempt counter for a file
    async fn record_attempt(&self, file_md5: &str) -> Result<u64>;

    /// Reset the attempt counter after a successful run
    async fn clear_attempts(&self, file_md5: &str) -> Result<()>;

    /// Current conversation id for the user, created atomically when absent
    async fn get_or_create_conversation(&self, user_id: u64) -> Result<String>;

    /// Message history for a conversation, empty when unknown
    async fn history(&self, conversation_id: &str) -> Result<Vec<ChatMessage>>;

    /// Replace the history, truncated to the configured cap
    async fn put_history(&self, conversation_id: &str, messages: &[ChatMessage]) -> Result<()>;

    /// All `(user_id, conversation_id)` mappings; admin read-only use
    async fn conversation_mappings(&self) -> Result<Vec<(u64, String)>>;
}

/// Bitmap key for a `(user, file)` pair
pub fn upload_key(user_id: u64, file_md5: &str) -> String {
    format!("upload:{}:{}", user_id, file_md5)
}

/// Attempt counter key for a file
pub fn attempts_key(file_md5: &str) -> String {
    format!("kafka:attempts:{}", file_md5)
}

/// Current-conversation pointer key for a user
pub fn conversation_pointer_key(user_id: u64) -> String {
    format!("user:{}:current_conversation", user_id)
}

/// History key for a conversation
pub fn conversation_key(conversation_id: &str) -> String {
    format!("conversation:{}", conversation_id)
}
