//! Document ingestion pipeline
//!
//! One task per completed upload: fetch the merged object, extract text,
//! window it, persist the chunks, then embed and index each one. Processing
//! the same task twice converges on the same final state because existing
//! chunk rows are dropped before new ones are written.

use std::sync::Arc;

use crate::config::ChunkingConfig;
use crate::error::{Error, Result};
use crate::providers::blob_store::merged_object;
use crate::providers::{BlobStore, EmbeddingProvider, SearchIndex, TextExtractor};
use crate::storage::MetaStore;
use crate::types::{DocumentVector, IndexDocument, ProcessingTask};

use super::splitter::split_text;

/// Extract, split, persist, then embed and index each chunk
pub struct IngestPipeline {
    meta: Arc<MetaStore>,
    blobs: Arc<dyn BlobStore>,
    extractor: Arc<dyn TextExtractor>,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn SearchIndex>,
    chunking: ChunkingConfig,
}

impl IngestPipeline {
    pub fn new(
        meta: Arc<MetaStore>,
        blobs: Arc<dyn BlobStore>,
        extractor: Arc<dyn TextExtractor>,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn SearchIndex>,
        chunking: ChunkingConfig,
    ) -> Self {
        Self {
            meta,
            blobs,
            extractor,
            embedder,
            index,
            chunking,
        }
    }

    /// Process one task to completion; fails fast on the first error
    pub async fn process(&self, task: &ProcessingTask) -> Result<()> {
        let file_md5 = &task.file_md5;
        tracing::info!(file_md5, file_name = %task.file_name, "processing file");

        let object = merged_object(&task.file_name);
        let bytes = self.blobs.get(&object).await?;
        tracing::info!(file_md5, size = bytes.len(), "merged object fetched");
        if bytes.is_empty() {
            return Err(Error::InvalidArgument("file body is empty".to_string()));
        }

        let text = self.extractor.extract(&task.file_name, bytes).await?;
        if text.is_empty() {
            return Err(Error::InvalidArgument("extracted text is empty".to_string()));
        }
        tracing::info!(file_md5, chars = text.chars().count(), "text extracted");

        let chunks = split_text(&text, self.chunking.window, self.chunking.overlap);
        if chunks.is_empty() {
            return Err(Error::InvalidArgument("no text chunks produced".to_string()));
        }
        tracing::info!(file_md5, chunks = chunks.len(), "text split");

        // Idempotence reset: identical tasks must converge on the same rows.
        let removed = self.meta.delete_vectors(file_md5)?;
        if removed > 0 {
            tracing::info!(file_md5, removed, "dropped chunk rows from a previous run");
        }

        let model_version = self.embedder.model().to_string();
        let rows: Vec<DocumentVector> = chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| DocumentVector {
                vector_id: 0,
                file_md5: file_md5.clone(),
                chunk_id: i as u32,
                text: chunk.clone(),
                model_version: model_version.clone(),
                user_id: task.user_id,
                org_tag: task.org_tag.clone(),
                is_public: task.is_public,
            })
            .collect();
        for batch in rows.chunks(self.chunking.batch_size) {
            self.meta.insert_vectors(batch)?;
        }
        tracing::info!(file_md5, rows = rows.len(), "chunk rows persisted");

        // Re-read to pick up the stable row ids before indexing.
        let saved = self.meta.find_vectors(file_md5)?;
        for row in &saved {
            let vector = self.embedder.embed(&row.text).await?;
            let doc = IndexDocument {
                vector_id: format!("{}_{}", row.file_md5, row.chunk_id),
                file_md5: row.file_md5.clone(),
                chunk_id: row.chunk_id,
                text: row.text.clone(),
                vector,
                model_version: row.model_version.clone(),
                user_id: row.user_id,
                org_tag: row.org_tag.clone(),
                is_public: row.is_public,
            };
            self.index.index(&doc).await?;
            tracing::debug!(file_md5, chunk_id = row.chunk_id, "chunk indexed");
        }

        tracing::info!(file_md5, chunks = saved.len(), "file processed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::memory::{MemoryBlobStore, MemorySearchIndex};
    use crate::test_support::{HashEmbedder, PlainTextExtractor};

    struct Fixture {
        pipeline: IngestPipeline,
        meta: Arc<MetaStore>,
        blobs: Arc<MemoryBlobStore>,
        index: Arc<MemorySearchIndex>,
    }

    fn fixture() -> Fixture {
        let meta = Arc::new(MetaStore::in_memory().unwrap());
        let blobs = Arc::new(MemoryBlobStore::new());
        let index = Arc::new(MemorySearchIndex::new());
        let pipeline = IngestPipeline::new(
            Arc::clone(&meta),
            blobs.clone(),
            Arc::new(PlainTextExtractor),
            Arc::new(HashEmbedder::new(8)),
            index.clone(),
            ChunkingConfig {
                window: 10,
                overlap: 2,
                batch_size: 2,
            },
        );
        Fixture {
            pipeline,
            meta,
            blobs,
            index,
        }
    }

    fn task(md5: &str, name: &str) -> ProcessingTask {
        ProcessingTask {
            file_md5: md5.to_string(),
            object_url: format!("memory://merged/{}", name),
            file_name: name.to_string(),
            user_id: 1,
            org_tag: "team".to_string(),
            is_public: false,
        }
    }

    #[tokio::test]
    async fn indexes_every_chunk_with_stable_ids() {
        let f = fixture();
        let md5 = "a".repeat(32);
        // 26 chars, window 10, overlap 2 => windows start at 0, 8, 16
        f.blobs
            .put("merged/doc.txt", "abcdefghijklmnopqrstuvwxyz".into())
            .await
            .unwrap();

        f.pipeline.process(&task(&md5, "doc.txt")).await.unwrap();

        let rows = f.meta.find_vectors(&md5).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].text, "abcdefghij");
        assert_eq!(rows[1].text, "ijklmnopqr");
        assert_eq!(rows[2].text, "qrstuvwxyz");

        assert_eq!(f.index.len(), 3);
        for chunk_id in 0..3 {
            assert!(f.index.contains(&format!("{}_{}", md5, chunk_id)));
        }
    }

    #[tokio::test]
    async fn reprocessing_is_idempotent() {
        let f = fixture();
        let md5 = "b".repeat(32);
        f.blobs
            .put("merged/dup.txt", "0123456789012345678901234567890123456789012345678901234".into())
            .await
            .unwrap();

        f.pipeline.process(&task(&md5, "dup.txt")).await.unwrap();
        let first_rows = f.meta.find_vectors(&md5).unwrap();
        let first_docs = f.index.len();

        // duplicate delivery of the same task
        f.pipeline.process(&task(&md5, "dup.txt")).await.unwrap();
        let second_rows = f.meta.find_vectors(&md5).unwrap();

        assert_eq!(first_rows.len(), second_rows.len());
        assert_eq!(f.index.len(), first_docs);
        let texts_first: Vec<_> = first_rows.iter().map(|r| r.text.clone()).collect();
        let texts_second: Vec<_> = second_rows.iter().map(|r| r.text.clone()).collect();
        assert_eq!(texts_first, texts_second);
    }

    #[tokio::test]
    async fn empty_file_fails_before_indexing() {
        let f = fixture();
        let md5 = "c".repeat(32);
        f.blobs.put("merged/empty.txt", Vec::new()).await.unwrap();

        let err = f.pipeline.process(&task(&md5, "empty.txt")).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(f.index.is_empty());
        assert!(f.meta.find_vectors(&md5).unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_object_surfaces_not_found() {
        let f = fixture();
        let err = f
            .pipeline
            .process(&task(&"d".repeat(32), "ghost.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
