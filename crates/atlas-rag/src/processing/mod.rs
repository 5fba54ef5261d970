//! Asynchronous document processing

pub mod consumer;
pub mod pipeline;
pub mod splitter;

pub use consumer::PipelineConsumer;
pub use pipeline::IngestPipeline;

#[cfg(test)]
mod flow_tests {
    //! Upload through retrieval against the in-memory providers

    use std::sync::Arc;
    use std::time::Duration;

    use crate::config::{ChunkingConfig, RetrievalConfig};
    use crate::documents::DocumentService;
    use crate::providers::memory::{MemoryBlobStore, MemoryProgressStore, MemorySearchIndex};
    use crate::queue::MemoryWorkQueue;
    use crate::retrieval::Retriever;
    use crate::storage::MetaStore;
    use crate::test_support::{HashEmbedder, PlainTextExtractor};
    use crate::upload::UploadCoordinator;

    use super::{IngestPipeline, PipelineConsumer};

    const WAIT: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn uploaded_file_becomes_searchable_and_deletable() {
        let meta = Arc::new(MetaStore::in_memory().unwrap());
        let blobs = Arc::new(MemoryBlobStore::new());
        let progress = Arc::new(MemoryProgressStore::new());
        let queue = Arc::new(MemoryWorkQueue::new());
        let index = Arc::new(MemorySearchIndex::new());
        let embedder = Arc::new(HashEmbedder::new(8));

        let user = meta.create_user("alice").unwrap();

        let coordinator = UploadCoordinator::new(
            Arc::clone(&meta),
            blobs.clone(),
            progress.clone(),
            queue.clone(),
            8,
            Duration::from_secs(3600),
        );
        let pipeline = Arc::new(IngestPipeline::new(
            Arc::clone(&meta),
            blobs.clone(),
            Arc::new(PlainTextExtractor),
            embedder.clone(),
            index.clone(),
            ChunkingConfig::default(),
        ));
        let consumer = PipelineConsumer::new(queue.clone(), progress.clone(), pipeline, 3);
        let retriever = Retriever::new(
            Arc::clone(&meta),
            embedder,
            index.clone(),
            RetrievalConfig::default(),
        );

        // three parts, uploaded out of order
        let body = b"alpha beta gamma delta".to_vec();
        let md5 = "9".repeat(32);
        for part in [2u32, 0, 1] {
            let start = (part as usize) * 8;
            let end = (start + 8).min(body.len());
            coordinator
                .upload_part(
                    &md5,
                    "notes.txt",
                    body.len() as i64,
                    part,
                    body[start..end].to_vec(),
                    user.id,
                    "",
                    false,
                )
                .await
                .unwrap();
        }
        coordinator.merge(&md5, "notes.txt", user.id).await.unwrap();

        // the queued task drives the pipeline
        assert!(consumer.step(WAIT).await.unwrap());
        assert_eq!(index.len(), 1);

        let hits = retriever.hybrid_search("alpha", 10, &user).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].file_name, "notes.txt");
        assert_eq!(hits[0].file_md5, md5);

        // deletion clears rows and index entries; later searches are empty
        let documents = DocumentService::new(
            Arc::clone(&meta),
            blobs.clone(),
            index.clone(),
            Arc::new(PlainTextExtractor),
            Duration::from_secs(3600),
        );
        documents.delete_document(&md5, &user).await.unwrap();
        assert_eq!(index.len(), 0);

        let hits = retriever.hybrid_search("alpha", 10, &user).await.unwrap();
        assert!(hits.is_empty());
    }
}
