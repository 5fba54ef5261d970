//! Shared fakes for unit tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::chat::EventSink;
use crate::error::{Error, Result};
use crate::providers::chat_model::{ChatModel, GenerationParams, PromptMessage, TokenStream};
use crate::providers::embedding::EmbeddingProvider;
use crate::providers::extractor::TextExtractor;
use crate::providers::search_index::{HybridQuery, ScoredDocument, SearchIndex};
use crate::types::IndexDocument;

/// Extractor that treats the payload as UTF-8 text
pub struct PlainTextExtractor;

#[async_trait]
impl TextExtractor for PlainTextExtractor {
    async fn extract(&self, _file_name: &str, bytes: Vec<u8>) -> Result<String> {
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn name(&self) -> &str {
        "plain"
    }
}

/// Deterministic embedder: buckets code points into a small vector
pub struct HashEmbedder {
    dims: usize,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dims];
        for (i, ch) in text.chars().enumerate() {
            vector[(ch as usize + i) % self.dims] += 1.0;
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model(&self) -> &str {
        "fake-embedder"
    }

    fn name(&self) -> &str {
        "fake"
    }
}

/// Chat model that replays scripted fragments, or fails on call
pub struct ScriptedChatModel {
    fragments: Vec<String>,
    fail: bool,
}

impl ScriptedChatModel {
    pub fn new(fragments: &[&str]) -> Self {
        Self {
            fragments: fragments.iter().map(|s| s.to_string()).collect(),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fragments: Vec::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl ChatModel for ScriptedChatModel {
    async fn stream_chat(&self, _messages: &[PromptMessage], _params: &GenerationParams) -> Result<TokenStream> {
        if self.fail {
            return Err(Error::Unavailable("scripted llm failure".to_string()));
        }
        let fragments: Vec<Result<String>> = self.fragments.iter().cloned().map(Ok).collect();
        Ok(Box::pin(futures_util::stream::iter(fragments)))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Search index that replays scripted responses and records the queries it saw
#[derive(Default)]
pub struct ScriptedIndex {
    responses: Mutex<VecDeque<Vec<ScoredDocument>>>,
    queries: Mutex<Vec<HybridQuery>>,
    fail_delete: AtomicBool,
}

impl ScriptedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_response(&self, hits: Vec<ScoredDocument>) {
        self.responses.lock().push_back(hits);
    }

    pub fn recorded_queries(&self) -> Vec<HybridQuery> {
        self.queries.lock().clone()
    }

    pub fn fail_deletes(&self) {
        self.fail_delete.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl SearchIndex for ScriptedIndex {
    async fn ensure_index(&self) -> Result<()> {
        Ok(())
    }

    async fn index(&self, _doc: &IndexDocument) -> Result<()> {
        Ok(())
    }

    async fn search(&self, query: &HybridQuery) -> Result<Vec<ScoredDocument>> {
        self.queries.lock().push(query.clone());
        Ok(self.responses.lock().pop_front().unwrap_or_default())
    }

    async fn delete_by_file(&self, _file_md5: &str) -> Result<()> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(Error::Unavailable("scripted index delete failure".to_string()));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Event sink that collects every payload it is sent
#[derive(Default)]
pub struct CollectingSink {
    pub payloads: Vec<String>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Payloads parsed as JSON values
    pub fn json_payloads(&self) -> Vec<serde_json::Value> {
        self.payloads
            .iter()
            .filter_map(|p| serde_json::from_str(p).ok())
            .collect()
    }
}

#[async_trait]
impl EventSink for CollectingSink {
    async fn send(&mut self, payload: String) -> Result<()> {
        self.payloads.push(payload);
        Ok(())
    }
}
