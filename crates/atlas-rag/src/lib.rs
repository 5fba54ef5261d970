//! atlas-rag: tenant-aware RAG knowledge service
//!
//! Ingestion-to-retrieval pipeline with retrieval-time access control:
//! resumable chunked uploads with deduplication, asynchronous document
//! processing over a durable work queue, hybrid (dense + lexical) retrieval
//! filtered by a hierarchical tag model, and streaming chat orchestration
//! with per-user history.

pub mod access;
pub mod chat;
pub mod config;
pub mod documents;
pub mod error;
pub mod processing;
pub mod providers;
pub mod queue;
pub mod retrieval;
pub mod server;
pub mod storage;
pub mod types;
pub mod upload;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::ServiceConfig;
pub use error::{Error, Result};
pub use types::{
    ChatMessage, ChunkInfo, DocumentVector, FileUpload, IndexDocument, OrganizationTag,
    ProcessingTask, SearchHit, UploadStatus, User, UserRole,
};
