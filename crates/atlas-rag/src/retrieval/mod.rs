//! Hybrid retrieval
//!
//! One request per query: dense k-NN recall plus a lexical match, filtered by
//! the caller's effective tag set and rescored lexically over the recall
//! window. Queries are lightly normalized before the lexical clauses; the
//! embedding always sees the raw query to keep its semantic signal.

use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::OnceLock;

use crate::access::AccessResolver;
use crate::config::RetrievalConfig;
use crate::error::{Error, Result};
use crate::providers::search_index::{AccessFilter, HybridQuery};
use crate::providers::{EmbeddingProvider, SearchIndex};
use crate::storage::MetaStore;
use crate::types::{SearchHit, User};

/// Conversational filler stripped from queries before lexical matching
const STOP_PHRASES: [&str; 16] = [
    "是谁", "是什么", "是啥", "请问", "怎么", "如何", "告诉我", "严格", "按照",
    "不要补充", "的区别", "区别", "吗", "呢", "？", "?",
];

/// Access-filtered hybrid search with filename enrichment
pub struct Retriever {
    meta: Arc<MetaStore>,
    access: AccessResolver,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn SearchIndex>,
    config: RetrievalConfig,
}

impl Retriever {
    pub fn new(
        meta: Arc<MetaStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn SearchIndex>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            access: AccessResolver::new(Arc::clone(&meta)),
            meta,
            embedder,
            index,
            config,
        }
    }

    /// Ranked, access-filtered results for a query
    pub async fn hybrid_search(&self, query: &str, top_k: usize, user: &User) -> Result<Vec<SearchHit>> {
        if top_k == 0 {
            return Err(Error::InvalidArgument("top_k must be positive".to_string()));
        }
        tracing::info!(query, top_k, user = %user.name, "hybrid search");

        // A resolver failure only widens to the empty tag set; ownership and
        // public visibility still apply.
        let effective_tags = match self.access.resolve(user) {
            Ok(tags) => tags,
            Err(e) => {
                tracing::warn!(error = %e, "failed to resolve effective tags");
                Vec::new()
            }
        };
        tracing::debug!(tags = effective_tags.len(), "effective tag set resolved");

        let (normalized, phrase) = normalize_query(query);
        if normalized != query {
            tracing::info!(from = query, to = %normalized, "query normalized");
        }

        let vector = self.embedder.embed(query).await?;
        let recall_k = top_k * self.config.knn_factor;

        let hybrid = HybridQuery {
            vector,
            text: normalized.clone(),
            phrase: phrase.clone(),
            rescore_text: normalized.clone(),
            recall_k,
            size: top_k,
            filter: AccessFilter {
                user_id: user.id,
                effective_tags,
            },
            phrase_boost: self.config.phrase_boost,
            query_weight: self.config.rescore_query_weight,
            rescore_weight: self.config.rescore_weight,
        };

        let mut hits = self.index.search(&hybrid).await?;

        // Zero hits with a usable core phrase: retry once with the phrase as
        // the lexical signal.
        if hits.is_empty() {
            if let Some(phrase_text) = phrase.as_deref() {
                if phrase_text != query {
                    tracing::info!(phrase = phrase_text, "retrying with normalized phrase");
                    let retry = HybridQuery {
                        text: phrase_text.to_string(),
                        rescore_text: phrase_text.to_string(),
                        ..hybrid
                    };
                    hits = self.index.search(&retry).await?;
                }
            }
        }

        if hits.is_empty() {
            tracing::info!(query, "no hits");
            return Ok(Vec::new());
        }

        // Batch-load filenames over the distinct md5 set.
        let md5s: Vec<String> = hits
            .iter()
            .map(|h| h.file_md5.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let uploads = self.meta.find_uploads_by_md5s(&md5s)?;
        let names: HashMap<String, String> = uploads
            .into_iter()
            .map(|u| (u.file_md5, u.file_name))
            .collect();

        let results = hits
            .into_iter()
            .map(|hit| {
                let file_name = names
                    .get(&hit.file_md5)
                    .cloned()
                    .unwrap_or_else(|| "unknown".to_string());
                SearchHit {
                    file_md5: hit.file_md5,
                    file_name,
                    chunk_id: hit.chunk_id,
                    text: hit.text,
                    score: hit.score,
                    user_id: hit.user_id,
                    org_tag: hit.org_tag,
                    is_public: hit.is_public,
                }
            })
            .collect::<Vec<_>>();

        tracing::info!(hits = results.len(), "search complete");
        Ok(results)
    }
}

/// Lightweight query cleanup: lowercase, strip stop phrases, keep only Han
/// script, Latin letters, digits, and whitespace, then collapse whitespace.
/// Returns the normalized query and the core phrase for phrase matching; an
/// emptied query falls back to the original with no phrase.
pub fn normalize_query(query: &str) -> (String, Option<String>) {
    if query.is_empty() {
        return (query.to_string(), None);
    }

    static KEEP: OnceLock<Regex> = OnceLock::new();
    static SPACE: OnceLock<Regex> = OnceLock::new();
    let keep = KEEP.get_or_init(|| Regex::new(r"[^\p{Han}a-z0-9\s]+").unwrap());
    let space = SPACE.get_or_init(|| Regex::new(r"\s+").unwrap());

    let mut lower = query.to_lowercase();
    for stop in STOP_PHRASES {
        lower = lower.replace(stop, " ");
    }

    let kept = keep.replace_all(&lower, " ");
    let collapsed = space.replace_all(&kept, " ");
    let trimmed = collapsed.trim();

    if trimmed.is_empty() {
        (query.to_string(), None)
    } else {
        (trimmed.to_string(), Some(trimmed.to_string()))
    }
}
