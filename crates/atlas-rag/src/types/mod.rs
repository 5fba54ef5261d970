//! Domain types shared across the service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role attached to a user account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    User,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "USER",
            UserRole::Admin => "ADMIN",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "ADMIN" => UserRole::Admin,
            _ => UserRole::User,
        }
    }
}

/// A registered user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub name: String,
    pub role: UserRole,
    /// Tags the user is declared into, insertion order preserved
    pub org_tags: Vec<String>,
    /// Default tag applied to uploads that do not name one
    pub primary_org: Option<String>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

/// A node in the organization tag forest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationTag {
    pub tag_id: String,
    pub name: String,
    pub description: String,
    /// Parent tag id; None for roots
    pub parent_tag: Option<String>,
    pub created_by: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle of an upload record; advances monotonically
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Uploading,
    Complete,
    Failed,
}

impl UploadStatus {
    pub fn as_i64(&self) -> i64 {
        match self {
            UploadStatus::Uploading => 0,
            UploadStatus::Complete => 1,
            UploadStatus::Failed => 2,
        }
    }

    pub fn from_i64(v: i64) -> Self {
        match v {
            1 => UploadStatus::Complete,
            2 => UploadStatus::Failed,
            _ => UploadStatus::Uploading,
        }
    }
}

/// One uploaded file per (md5, user) pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileUpload {
    pub id: u64,
    pub file_md5: String,
    pub file_name: String,
    pub total_size: i64,
    pub status: UploadStatus,
    pub user_id: u64,
    pub org_tag: String,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub merged_at: Option<DateTime<Utc>>,
}

/// One received part of an upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkInfo {
    pub id: u64,
    pub file_md5: String,
    pub chunk_index: u32,
    pub storage_path: String,
}

/// Persisted text chunk; the row id doubles as the stable vector id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentVector {
    pub vector_id: u64,
    pub file_md5: String,
    pub chunk_id: u32,
    pub text: String,
    pub model_version: String,
    pub user_id: u64,
    pub org_tag: String,
    pub is_public: bool,
}

/// Document shape stored in the search index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexDocument {
    /// `<md5>_<chunk_id>`, also used as the index document id
    pub vector_id: String,
    pub file_md5: String,
    pub chunk_id: u32,
    pub text: String,
    pub vector: Vec<f32>,
    pub model_version: String,
    pub user_id: u64,
    pub org_tag: String,
    pub is_public: bool,
}

/// One ranked retrieval result, enriched with its filename
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub file_md5: String,
    pub file_name: String,
    pub chunk_id: u32,
    pub text: String,
    pub score: f64,
    pub user_id: u64,
    pub org_tag: String,
    pub is_public: bool,
}

/// A single conversation turn kept in history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Unit of work emitted on merge completion, one per completed upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingTask {
    pub file_md5: String,
    /// Presigned read URL, retained for diagnostics
    pub object_url: String,
    pub file_name: String,
    pub user_id: u64,
    pub org_tag: String,
    pub is_public: bool,
}
