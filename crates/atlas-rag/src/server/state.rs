//! Application state for the knowledge service
//!
//! Every external collaborator is injected here once and shared as a trait
//! object; no component reaches for a global client.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::chat::ChatOrchestrator;
use crate::config::ServiceConfig;
use crate::documents::DocumentService;
use crate::processing::{IngestPipeline, PipelineConsumer};
use crate::providers::{BlobStore, ChatModel, EmbeddingProvider, ProgressStore, SearchIndex, TextExtractor};
use crate::queue::WorkQueue;
use crate::retrieval::Retriever;
use crate::storage::MetaStore;
use crate::upload::UploadCoordinator;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ServiceConfig,
    meta: Arc<MetaStore>,
    progress: Arc<dyn ProgressStore>,
    uploads: Arc<UploadCoordinator>,
    documents: Arc<DocumentService>,
    retriever: Arc<Retriever>,
    chat: Arc<ChatOrchestrator>,
    /// Rotating process-wide stop token
    stop_token: Mutex<String>,
    /// Per-session cancellation flags, removed on session close
    sessions: DashMap<u64, Arc<AtomicBool>>,
    session_counter: AtomicU64,
}

impl AppState {
    /// Wire all components from their injected providers and start the
    /// pipeline consumer.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: ServiceConfig,
        meta: Arc<MetaStore>,
        blobs: Arc<dyn BlobStore>,
        progress: Arc<dyn ProgressStore>,
        queue: Arc<dyn WorkQueue>,
        embedder: Arc<dyn EmbeddingProvider>,
        extractor: Arc<dyn TextExtractor>,
        llm: Arc<dyn ChatModel>,
        index: Arc<dyn SearchIndex>,
    ) -> Self {
        let presign_ttl = Duration::from_secs(config.upload.presign_ttl_secs);

        let uploads = Arc::new(UploadCoordinator::new(
            Arc::clone(&meta),
            Arc::clone(&blobs),
            Arc::clone(&progress),
            Arc::clone(&queue),
            config.upload.chunk_size,
            presign_ttl,
        ));

        let documents = Arc::new(DocumentService::new(
            Arc::clone(&meta),
            Arc::clone(&blobs),
            Arc::clone(&index),
            Arc::clone(&extractor),
            presign_ttl,
        ));

        let retriever = Arc::new(Retriever::new(
            Arc::clone(&meta),
            Arc::clone(&embedder),
            Arc::clone(&index),
            config.retrieval.clone(),
        ));

        let chat = Arc::new(ChatOrchestrator::new(
            Arc::clone(&retriever),
            llm,
            Arc::clone(&progress),
            config.prompt.clone(),
            &config.llm,
            config.retrieval.top_k,
        ));

        let pipeline = Arc::new(IngestPipeline::new(
            Arc::clone(&meta),
            Arc::clone(&blobs),
            extractor,
            embedder,
            Arc::clone(&index),
            config.chunking.clone(),
        ));
        let consumer = Arc::new(PipelineConsumer::new(
            queue,
            Arc::clone(&progress),
            pipeline,
            config.processing.retry_cap,
        ));
        tokio::spawn(consumer.run());
        tracing::info!("pipeline consumer spawned");

        Self {
            inner: Arc::new(AppStateInner {
                config,
                meta,
                progress,
                uploads,
                documents,
                retriever,
                chat,
                stop_token: Mutex::new(String::new()),
                sessions: DashMap::new(),
                session_counter: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.inner.config
    }

    pub fn meta(&self) -> &Arc<MetaStore> {
        &self.inner.meta
    }

    pub fn progress(&self) -> &Arc<dyn ProgressStore> {
        &self.inner.progress
    }

    pub fn uploads(&self) -> &UploadCoordinator {
        &self.inner.uploads
    }

    pub fn documents(&self) -> &DocumentService {
        &self.inner.documents
    }

    pub fn retriever(&self) -> &Retriever {
        &self.inner.retriever
    }

    pub fn chat(&self) -> &ChatOrchestrator {
        &self.inner.chat
    }

    /// Rotate and return the stop token; the previous one stops validating
    pub fn issue_stop_token(&self) -> String {
        let token = format!("WSS_STOP_CMD_{}", Uuid::new_v4().simple());
        *self.inner.stop_token.lock() = token.clone();
        token
    }

    /// Whether a presented token matches the current one
    pub fn validate_stop_token(&self, token: &str) -> bool {
        let current = self.inner.stop_token.lock();
        !current.is_empty() && *current == token
    }

    /// Allocate a session id and its cancellation flag
    pub fn register_session(&self) -> (u64, Arc<AtomicBool>) {
        let id = self.inner.session_counter.fetch_add(1, Ordering::SeqCst);
        let flag = Arc::new(AtomicBool::new(false));
        self.inner.sessions.insert(id, Arc::clone(&flag));
        (id, flag)
    }

    /// Drop a session's cancellation flag on close
    pub fn remove_session(&self, session_id: u64) {
        self.inner.sessions.remove(&session_id);
    }
}
