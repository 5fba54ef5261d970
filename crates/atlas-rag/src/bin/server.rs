//! Knowledge service server binary
//!
//! Run with: cargo run -p atlas-rag --bin atlas-rag-server

use std::sync::Arc;

use atlas_rag::config::ServiceConfig;
use atlas_rag::providers::chat_model::OpenAiChatModel;
use atlas_rag::providers::embedding::OpenAiEmbedder;
use atlas_rag::providers::extractor::TikaExtractor;
use atlas_rag::providers::memory::{MemoryBlobStore, MemoryProgressStore, MemorySearchIndex};
use atlas_rag::providers::redis::RedisProgressStore;
use atlas_rag::providers::search_index::ElasticIndex;
use atlas_rag::providers::{BlobStore, ProgressStore, SearchIndex};
use atlas_rag::queue::{MemoryWorkQueue, RedisWorkQueue, WorkQueue};
use atlas_rag::server::state::AppState;
use atlas_rag::server::AppServer;
use atlas_rag::storage::MetaStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "atlas_rag=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServiceConfig::default();
    tracing::info!("configuration loaded");
    tracing::info!("  embedding model: {}", config.embedding.model);
    tracing::info!("  embedding dimensions: {}", config.embedding.dimensions);
    tracing::info!("  chat model: {}", config.llm.model);
    tracing::info!("  index: {}", config.index.index_name);
    tracing::info!(
        "  chunking: window {} / overlap {}",
        config.chunking.window,
        config.chunking.overlap
    );

    let meta = Arc::new(MetaStore::new(&config.server.database_path)?);

    let (progress, queue): (Arc<dyn ProgressStore>, Arc<dyn WorkQueue>) =
        match &config.server.redis_url {
            Some(url) => {
                tracing::info!("using redis state at {}", url);
                let progress = RedisProgressStore::connect(
                    url,
                    config.processing.retry_ttl_secs,
                    config.conversation.history_ttl_secs,
                    config.conversation.history_cap,
                )
                .await?;
                let queue =
                    RedisWorkQueue::connect(url, &config.processing.topic, &config.processing.group)
                        .await?;
                (Arc::new(progress), Arc::new(queue))
            }
            None => {
                tracing::warn!("no redis configured, using process-local progress state and queue");
                (
                    Arc::new(MemoryProgressStore::new()),
                    Arc::new(MemoryWorkQueue::new()),
                )
            }
        };

    let index: Arc<dyn SearchIndex> = if config.index.endpoint.is_empty() {
        tracing::warn!("no index endpoint configured, using the in-memory index");
        Arc::new(MemorySearchIndex::new())
    } else {
        let elastic = ElasticIndex::new(config.index.clone())?;
        if let Err(e) = elastic.ensure_index().await {
            tracing::warn!(error = %e, "could not verify the search index; continuing");
        }
        Arc::new(elastic)
    };

    let blobs: Arc<dyn BlobStore> = blob_store().await?;

    let embedder = Arc::new(OpenAiEmbedder::new(config.embedding.clone()));
    let extractor = Arc::new(TikaExtractor::new(config.processing.extractor_url.clone()));
    let llm = Arc::new(OpenAiChatModel::new(config.llm.clone()));

    let state = AppState::new(
        config, meta, blobs, progress, queue, embedder, extractor, llm, index,
    );

    AppServer::new(state).start().await?;
    Ok(())
}

#[cfg(feature = "gcp")]
async fn blob_store() -> anyhow::Result<Arc<dyn BlobStore>> {
    match std::env::var("ATLAS_GCS_BUCKET") {
        Ok(bucket) => {
            tracing::info!("using GCS bucket {}", bucket);
            Ok(Arc::new(
                atlas_rag::providers::gcp::GcsBlobStore::new(bucket).await?,
            ))
        }
        Err(_) => {
            tracing::warn!("ATLAS_GCS_BUCKET not set, using the in-memory blob store");
            Ok(Arc::new(MemoryBlobStore::new()))
        }
    }
}

#[cfg(not(feature = "gcp"))]
async fn blob_store() -> anyhow::Result<Arc<dyn BlobStore>> {
    tracing::warn!("built without the gcp feature, using the in-memory blob store");
    Ok(Arc::new(MemoryBlobStore::new()))
}
