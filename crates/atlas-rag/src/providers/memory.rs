//! In-memory provider implementations
//!
//! Process-local backends for tests and embedded runs. They honor the same
//! contracts as the networked implementations: idempotent object overwrite,
//! last-writer-wins bit set, history capping, and the OR-of-three access
//! filter.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::providers::blob_store::BlobStore;
use crate::providers::progress_store::ProgressStore;
use crate::providers::search_index::{HybridQuery, ScoredDocument, SearchIndex};
use crate::types::{ChatMessage, IndexDocument};

/// Object store held in a process-local map
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: DashMap<String, Vec<u8>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Whether an object exists
    pub fn contains(&self, object: &str) -> bool {
        self.objects.contains_key(object)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, object: &str, bytes: Vec<u8>) -> Result<()> {
        self.objects.insert(object.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, object: &str) -> Result<Vec<u8>> {
        self.objects
            .get(object)
            .map(|v| v.clone())
            .ok_or_else(|| Error::NotFound(format!("object '{}'", object)))
    }

    async fn compose(&self, sources: &[String], dest: &str) -> Result<()> {
        let mut merged = Vec::new();
        for source in sources {
            let part = self
                .objects
                .get(source)
                .map(|v| v.clone())
                .ok_or_else(|| Error::NotFound(format!("object '{}'", source)))?;
            merged.extend_from_slice(&part);
        }
        self.objects.insert(dest.to_string(), merged);
        Ok(())
    }

    async fn copy(&self, source: &str, dest: &str) -> Result<()> {
        let bytes = self
            .objects
            .get(source)
            .map(|v| v.clone())
            .ok_or_else(|| Error::NotFound(format!("object '{}'", source)))?;
        self.objects.insert(dest.to_string(), bytes);
        Ok(())
    }

    async fn delete(&self, object: &str) -> Result<()> {
        self.objects.remove(object);
        Ok(())
    }

    async fn presign_get(&self, object: &str, ttl: Duration) -> Result<String> {
        Ok(format!("memory://{}?expires={}", object, ttl.as_secs()))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Progress store held in process-local maps; TTLs are not enforced
pub struct MemoryProgressStore {
    bitmaps: Mutex<HashMap<String, BTreeSet<u32>>>,
    attempts: Mutex<HashMap<String, u64>>,
    conversations: Mutex<HashMap<u64, String>>,
    histories: Mutex<HashMap<String, Vec<ChatMessage>>>,
    history_cap: usize,
    /// When set, counter operations fail, mimicking an unreachable backend
    unavailable: Mutex<bool>,
}

impl Default for MemoryProgressStore {
    fn default() -> Self {
        Self {
            bitmaps: Mutex::new(HashMap::new()),
            attempts: Mutex::new(HashMap::new()),
            conversations: Mutex::new(HashMap::new()),
            histories: Mutex::new(HashMap::new()),
            history_cap: 20,
            unavailable: Mutex::new(false),
        }
    }
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the backend going away; counter calls error until restored
    pub fn set_unavailable(&self, down: bool) {
        *self.unavailable.lock() = down;
    }

    /// Current attempt count for a file
    pub fn attempts(&self, file_md5: &str) -> u64 {
        *self.attempts.lock().get(file_md5).unwrap_or(&0)
    }

    fn check_available(&self) -> Result<()> {
        if *self.unavailable.lock() {
            return Err(Error::Unavailable("progress store unreachable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn is_part_received(&self, user_id: u64, file_md5: &str, index: u32) -> Result<bool> {
        let key = super::progress_store::upload_key(user_id, file_md5);
        Ok(self
            .bitmaps
            .lock()
            .get(&key)
            .map(|bits| bits.contains(&index))
            .unwrap_or(false))
    }

    async fn mark_part_received(&self, user_id: u64, file_md5: &str, index: u32) -> Result<()> {
        let key = super::progress_store::upload_key(user_id, file_md5);
        self.bitmaps.lock().entry(key).or_default().insert(index);
        Ok(())
    }

    async fn received_parts(&self, user_id: u64, file_md5: &str, total_chunks: u32) -> Result<Vec<u32>> {
        let key = super::progress_store::upload_key(user_id, file_md5);
        Ok(self
            .bitmaps
            .lock()
            .get(&key)
            .map(|bits| bits.iter().copied().filter(|i| *i < total_chunks).collect())
            .unwrap_or_default())
    }

    async fn clear_parts(&self, user_id: u64, file_md5: &str) -> Result<()> {
        let key = super::progress_store::upload_key(user_id, file_md5);
        self.bitmaps.lock().remove(&key);
        Ok(())
    }

    async fn record_attempt(&self, file_md5: &str) -> Result<u64> {
        self.check_available()?;
        let mut attempts = self.attempts.lock();
        let counter = attempts.entry(file_md5.to_string()).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn clear_attempts(&self, file_md5: &str) -> Result<()> {
        self.check_available()?;
        self.attempts.lock().remove(file_md5);
        Ok(())
    }

    async fn get_or_create_conversation(&self, user_id: u64) -> Result<String> {
        let mut conversations = self.conversations.lock();
        if let Some(existing) = conversations.get(&user_id) {
            return Ok(existing.clone());
        }
        let id = format!(
            "{}-{}",
            Utc::now().timestamp_nanos_opt().unwrap_or_default(),
            user_id
        );
        conversations.insert(user_id, id.clone());
        Ok(id)
    }

    async fn history(&self, conversation_id: &str) -> Result<Vec<ChatMessage>> {
        Ok(self
            .histories
            .lock()
            .get(conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn put_history(&self, conversation_id: &str, messages: &[ChatMessage]) -> Result<()> {
        let keep = if messages.len() > self.history_cap {
            &messages[messages.len() - self.history_cap..]
        } else {
            messages
        };
        self.histories
            .lock()
            .insert(conversation_id.to_string(), keep.to_vec());
        Ok(())
    }

    async fn conversation_mappings(&self) -> Result<Vec<(u64, String)>> {
        Ok(self
            .conversations
            .lock()
            .iter()
            .map(|(uid, conv)| (*uid, conv.clone()))
            .collect())
    }
}

/// Search index held in a process-local map. Scoring approximates the real
/// backend: vector similarity weighted by `query_weight`, lexical term
/// overlap weighted by `rescore_weight`, and a flat phrase bonus.
#[derive(Default)]
pub struct MemorySearchIndex {
    documents: DashMap<String, IndexDocument>,
}

impl MemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of indexed documents
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Whether a document id is present
    pub fn contains(&self, vector_id: &str) -> bool {
        self.documents.contains_key(vector_id)
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += (*x as f64) * (*y as f64);
        norm_a += (*x as f64) * (*x as f64);
        norm_b += (*y as f64) * (*y as f64);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

fn term_overlap(query: &str, text: &str) -> f64 {
    let haystack = text.to_lowercase();
    let mut matched = 0usize;
    let mut total = 0usize;
    for term in query.to_lowercase().split_whitespace() {
        total += 1;
        if haystack.contains(term) {
            matched += 1;
        }
    }
    if total == 0 {
        return 0.0;
    }
    matched as f64 / total as f64
}

#[async_trait]
impl SearchIndex for MemorySearchIndex {
    async fn ensure_index(&self) -> Result<()> {
        Ok(())
    }

    async fn index(&self, doc: &IndexDocument) -> Result<()> {
        self.documents.insert(doc.vector_id.clone(), doc.clone());
        Ok(())
    }

    async fn search(&self, query: &HybridQuery) -> Result<Vec<ScoredDocument>> {
        let mut hits = Vec::new();

        for entry in self.documents.iter() {
            let doc = entry.value();

            let allowed = doc.user_id == query.filter.user_id
                || doc.is_public
                || query.filter.effective_tags.iter().any(|t| *t == doc.org_tag);
            if !allowed {
                continue;
            }

            let lexical = term_overlap(&query.text, &doc.text);
            let similarity = cosine(&query.vector, &doc.vector);
            if lexical == 0.0 && similarity <= 0.0 {
                continue;
            }

            let mut score = query.query_weight * similarity + query.rescore_weight * lexical;
            if let Some(phrase) = &query.phrase {
                if !phrase.is_empty() && doc.text.to_lowercase().contains(&phrase.to_lowercase()) {
                    score += query.phrase_boost;
                }
            }

            hits.push(ScoredDocument {
                file_md5: doc.file_md5.clone(),
                chunk_id: doc.chunk_id,
                text: doc.text.clone(),
                user_id: doc.user_id,
                org_tag: doc.org_tag.clone(),
                is_public: doc.is_public,
                score,
            });
        }

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(query.size);
        Ok(hits)
    }

    async fn delete_by_file(&self, file_md5: &str) -> Result<()> {
        self.documents.retain(|_, doc| doc.file_md5 != file_md5);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
