//! Configuration for the knowledge service

use serde::{Deserialize, Serialize};

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Upload configuration
    pub upload: UploadConfig,
    /// Text chunking configuration
    pub chunking: ChunkingConfig,
    /// Embedding configuration
    pub embedding: EmbeddingConfig,
    /// Search index configuration
    pub index: IndexConfig,
    /// Retrieval configuration
    pub retrieval: RetrievalConfig,
    /// LLM configuration
    pub llm: LlmConfig,
    /// Prompt configuration
    pub prompt: PromptConfig,
    /// Conversation history configuration
    pub conversation: ConversationConfig,
    /// Processing queue configuration
    pub processing: ProcessingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Maximum request body size in bytes
    pub max_body_size: usize,
    /// SQLite database path
    pub database_path: String,
    /// Redis URL for progress state and the work queue; None runs the
    /// process-local backends
    pub redis_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_body_size: 8 * 1024 * 1024,
            database_path: "atlas-rag.db".to_string(),
            redis_url: None,
        }
    }
}

/// Upload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Fixed part size used to derive the total part count (bytes)
    pub chunk_size: u64,
    /// Presigned GET URL lifetime in seconds
    pub presign_ttl_secs: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size: 5 * 1024 * 1024,
            presign_ttl_secs: 3600,
        }
    }
}

/// Text chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Window width in Unicode code points
    pub window: usize,
    /// Overlap between consecutive windows in code points
    pub overlap: usize,
    /// Rows per batch when persisting chunk text
    pub batch_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            window: 1000,
            overlap: 100,
            batch_size: 100,
        }
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// OpenAI-compatible base URL
    pub base_url: String,
    /// API key sent as a bearer token
    pub api_key: String,
    /// Model name, recorded on every indexed chunk
    pub model: String,
    /// Embedding dimensions
    pub dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8001/v1".to_string(),
            api_key: String::new(),
            model: "text-embedding-v3".to_string(),
            dimensions: 2048,
        }
    }
}

/// Search index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Elasticsearch endpoint
    pub endpoint: String,
    /// Basic auth username (empty to skip auth)
    pub username: String,
    /// Basic auth password
    pub password: String,
    /// Index name
    pub index_name: String,
    /// Dense vector dimensions, fixed at index creation
    pub dimensions: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9200".to_string(),
            username: String::new(),
            password: String::new(),
            index_name: "knowledge_base".to_string(),
            dimensions: 2048,
        }
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Results returned per query
    pub top_k: usize,
    /// Recall multiplier for the k-NN stage: k = top_k * knn_factor
    pub knn_factor: usize,
    /// Boost applied to the phrase-match should clause
    pub phrase_boost: f64,
    /// Weight kept from the first-pass score during rescoring
    pub rescore_query_weight: f64,
    /// Weight of the lexical rescore query
    pub rescore_weight: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 10,
            knn_factor: 30,
            phrase_boost: 3.0,
            rescore_query_weight: 0.2,
            rescore_weight: 1.0,
        }
    }
}

/// LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// OpenAI-compatible base URL
    pub base_url: String,
    /// API key sent as a bearer token
    pub api_key: String,
    /// Chat model name
    pub model: String,
    /// Sampling temperature (None leaves the provider default)
    pub temperature: Option<f64>,
    /// Nucleus sampling cutoff
    pub top_p: Option<f64>,
    /// Completion length cap
    pub max_tokens: Option<u32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.deepseek.com".to_string(),
            api_key: String::new(),
            model: "deepseek-chat".to_string(),
            temperature: None,
            top_p: None,
            max_tokens: None,
        }
    }
}

/// Prompt configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    /// Rule text prepended to the system message
    pub rules: String,
    /// Delimiter opening the reference block
    pub ref_start: String,
    /// Delimiter closing the reference block
    pub ref_end: String,
    /// Placeholder emitted when retrieval produced nothing
    pub no_result_text: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            rules: "Answer strictly from the reference material between the delimiters. \
                    If the references do not contain the answer, say so."
                .to_string(),
            ref_start: "<<REF>>".to_string(),
            ref_end: "<<END>>".to_string(),
            no_result_text: "(no retrieval results this turn)".to_string(),
        }
    }
}

/// Conversation history configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Most recent messages kept per conversation
    pub history_cap: usize,
    /// Conversation key lifetime in seconds
    pub history_ttl_secs: u64,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            history_cap: 20,
            history_ttl_secs: 7 * 24 * 3600,
        }
    }
}

/// Processing queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Queue topic / stream name
    pub topic: String,
    /// Consumer group name
    pub group: String,
    /// Deliveries after which a failing task is dropped
    pub retry_cap: u64,
    /// Attempt counter lifetime in seconds
    pub retry_ttl_secs: u64,
    /// Extractor endpoint
    pub extractor_url: String,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            topic: "file-processing".to_string(),
            group: "atlas-rag-consumer".to_string(),
            retry_cap: 3,
            retry_ttl_secs: 24 * 3600,
            extractor_url: "http://localhost:9998".to_string(),
        }
    }
}
