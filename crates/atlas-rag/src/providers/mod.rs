//! Provider abstractions for the service's external collaborators
//!
//! Every upstream (object store, progress store, embedder, extractor, LLM,
//! search index) is a trait injected at construction, so ingestion and
//! retrieval are testable against in-memory fakes.

pub mod blob_store;
pub mod chat_model;
pub mod embedding;
pub mod extractor;
pub mod memory;
pub mod progress_store;
pub mod redis;
pub mod search_index;

#[cfg(feature = "gcp")]
pub mod gcp;

pub use blob_store::BlobStore;
pub use chat_model::{ChatModel, GenerationParams, PromptMessage, TokenStream};
pub use embedding::EmbeddingProvider;
pub use extractor::TextExtractor;
pub use progress_store::ProgressStore;
pub use search_index::{AccessFilter, HybridQuery, ScoredDocument, SearchIndex};
