//! Search index client
//!
//! One index holds text + dense vector per chunk. Queries are hybrid:
//! approximate k-NN recall combined with a lexical match, an access filter,
//! and a second-pass lexical rescore over the recalled window.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::IndexConfig;
use crate::error::{Error, Result};
use crate::types::IndexDocument;

/// Retrieval-time authorization filter: at least one of owner, public, or
/// org-tag membership must hold.
#[derive(Debug, Clone)]
pub struct AccessFilter {
    pub user_id: u64,
    pub effective_tags: Vec<String>,
}

/// One hybrid request against the index
#[derive(Debug, Clone)]
pub struct HybridQuery {
    /// Query embedding for the k-NN clause
    pub vector: Vec<f32>,
    /// Lexical must-match text
    pub text: String,
    /// Optional phrase-match should clause
    pub phrase: Option<String>,
    /// Lexical rescore text (AND operator)
    pub rescore_text: String,
    /// k-NN k, num_candidates, and rescore window
    pub recall_k: usize,
    /// Results returned
    pub size: usize,
    /// Access filter, always required
    pub filter: AccessFilter,
    pub phrase_boost: f64,
    pub query_weight: f64,
    pub rescore_weight: f64,
}

/// A hit as stored in the index, with its score
#[derive(Debug, Clone)]
pub struct ScoredDocument {
    pub file_md5: String,
    pub chunk_id: u32,
    pub text: String,
    pub user_id: u64,
    pub org_tag: String,
    pub is_public: bool,
    pub score: f64,
}

/// Index documents; run hybrid queries
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Create the index with its mapping when missing
    async fn ensure_index(&self) -> Result<()>;

    /// Index one document and refresh so it is immediately searchable
    async fn index(&self, doc: &IndexDocument) -> Result<()>;

    /// Execute a hybrid query; hits come back score-descending
    async fn search(&self, query: &HybridQuery) -> Result<Vec<ScoredDocument>>;

    /// Remove every document belonging to a file
    async fn delete_by_file(&self, file_md5: &str) -> Result<()>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// Elasticsearch over its JSON HTTP API
pub struct ElasticIndex {
    client: reqwest::Client,
    config: IndexConfig,
}

impl ElasticIndex {
    pub fn new(config: IndexConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| Error::Internal(format!("failed to build http client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{}", self.config.endpoint, path));
        if !self.config.username.is_empty() {
            builder = builder.basic_auth(&self.config.username, Some(&self.config.password));
        }
        builder
    }

    fn index_mapping(&self) -> Value {
        json!({
            "mappings": {
                "properties": {
                    "vector_id": { "type": "keyword" },
                    "file_md5": { "type": "keyword" },
                    "chunk_id": { "type": "integer" },
                    "text": {
                        "type": "text",
                        "analyzer": "ik_max_word",
                        "search_analyzer": "ik_smart"
                    },
                    "vector": {
                        "type": "dense_vector",
                        "dims": self.config.dimensions,
                        "index": true,
                        "similarity": "cosine"
                    },
                    "model_version": { "type": "keyword" },
                    "user_id": { "type": "long" },
                    "org_tag": { "type": "keyword" },
                    "is_public": { "type": "boolean" }
                }
            }
        })
    }

    fn search_body(query: &HybridQuery) -> Value {
        let mut bool_clause = json!({
            "must": { "match": { "text": query.text } },
            "filter": {
                "bool": {
                    "should": [
                        { "term": { "user_id": query.filter.user_id } },
                        { "term": { "is_public": true } },
                        { "terms": { "org_tag": query.filter.effective_tags } }
                    ],
                    "minimum_should_match": 1
                }
            }
        });
        if let Some(phrase) = &query.phrase {
            bool_clause["should"] = json!([
                {
                    "match_phrase": {
                        "text": { "query": phrase, "boost": query.phrase_boost }
                    }
                }
            ]);
        }

        json!({
            "knn": {
                "field": "vector",
                "query_vector": query.vector,
                "k": query.recall_k,
                "num_candidates": query.recall_k
            },
            "query": { "bool": bool_clause },
            "rescore": {
                "window_size": query.recall_k,
                "query": {
                    "rescore_query": {
                        "match": {
                            "text": { "query": query.rescore_text, "operator": "and" }
                        }
                    },
                    "query_weight": query.query_weight,
                    "rescore_query_weight": query.rescore_weight
                }
            },
            "size": query.size
        })
    }
}

#[async_trait]
impl SearchIndex for ElasticIndex {
    async fn ensure_index(&self) -> Result<()> {
        let head = self
            .request(reqwest::Method::HEAD, &format!("/{}", self.config.index_name))
            .send()
            .await
            .map_err(|e| Error::Unavailable(format!("index check failed: {}", e)))?;

        if head.status().is_success() {
            tracing::debug!(index = %self.config.index_name, "index already exists");
            return Ok(());
        }
        if head.status() != reqwest::StatusCode::NOT_FOUND {
            return Err(Error::Unavailable(format!(
                "unexpected status {} while checking index",
                head.status()
            )));
        }

        let response = self
            .request(reqwest::Method::PUT, &format!("/{}", self.config.index_name))
            .json(&self.index_mapping())
            .send()
            .await
            .map_err(|e| Error::Unavailable(format!("index create failed: {}", e)))?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Unavailable(format!("index create rejected: {}", body)));
        }

        tracing::info!(index = %self.config.index_name, "search index created");
        Ok(())
    }

    async fn index(&self, doc: &IndexDocument) -> Result<()> {
        let response = self
            .request(
                reqwest::Method::PUT,
                &format!("/{}/_doc/{}?refresh=true", self.config.index_name, doc.vector_id),
            )
            .json(doc)
            .send()
            .await
            .map_err(|e| Error::Unavailable(format!("index write failed: {}", e)))?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Unavailable(format!("index write rejected: {}", body)));
        }
        Ok(())
    }

    async fn search(&self, query: &HybridQuery) -> Result<Vec<ScoredDocument>> {
        let body = Self::search_body(query);
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/{}/_search", self.config.index_name),
            )
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Unavailable(format!("search failed: {}", e)))?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Unavailable(format!("search rejected: {}", body)));
        }

        let parsed: Value = response
            .json()
            .await
            .map_err(|e| Error::Unavailable(format!("failed to parse search response: {}", e)))?;

        let hits = parsed
            .pointer("/hits/hits")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut results = Vec::with_capacity(hits.len());
        for hit in hits {
            let score = hit.pointer("/_score").and_then(Value::as_f64).unwrap_or(0.0);
            let source = match hit.pointer("/_source") {
                Some(s) => s,
                None => continue,
            };
            results.push(ScoredDocument {
                file_md5: str_field(source, "file_md5"),
                chunk_id: source
                    .pointer("/chunk_id")
                    .and_then(Value::as_u64)
                    .unwrap_or(0) as u32,
                text: str_field(source, "text"),
                user_id: source
                    .pointer("/user_id")
                    .and_then(Value::as_u64)
                    .unwrap_or(0),
                org_tag: str_field(source, "org_tag"),
                is_public: source
                    .pointer("/is_public")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
                score,
            });
        }
        Ok(results)
    }

    async fn delete_by_file(&self, file_md5: &str) -> Result<()> {
        let body = json!({ "query": { "term": { "file_md5": file_md5 } } });
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/{}/_delete_by_query?refresh=true", self.config.index_name),
            )
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Unavailable(format!("index delete failed: {}", e)))?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Unavailable(format!("index delete rejected: {}", body)));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "elasticsearch"
    }
}

fn str_field(source: &Value, field: &str) -> String {
    source
        .pointer(&format!("/{}", field))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_query(phrase: Option<&str>) -> HybridQuery {
        HybridQuery {
            vector: vec![0.1, 0.2],
            text: "部署 流程".to_string(),
            phrase: phrase.map(|s| s.to_string()),
            rescore_text: "部署 流程".to_string(),
            recall_k: 300,
            size: 10,
            filter: AccessFilter {
                user_id: 7,
                effective_tags: vec!["T_child".to_string(), "T_parent".to_string()],
            },
            phrase_boost: 3.0,
            query_weight: 0.2,
            rescore_weight: 1.0,
        }
    }

    #[test]
    fn search_body_carries_all_clauses() {
        let body = ElasticIndex::search_body(&sample_query(Some("部署 流程")));

        assert_eq!(body["knn"]["k"], 300);
        assert_eq!(body["knn"]["num_candidates"], 300);
        assert_eq!(body["size"], 10);
        assert_eq!(body["rescore"]["window_size"], 300);
        assert_eq!(body["rescore"]["query"]["query_weight"], 0.2);
        assert_eq!(
            body["query"]["bool"]["filter"]["bool"]["minimum_should_match"],
            1
        );
        assert_eq!(
            body["query"]["bool"]["should"][0]["match_phrase"]["text"]["boost"],
            3.0
        );
    }

    #[test]
    fn search_body_omits_phrase_clause_when_absent() {
        let body = ElasticIndex::search_body(&sample_query(None));
        assert!(body["query"]["bool"].get("should").is_none());
    }
}
