//! Document management
//!
//! Read surfaces over completed uploads plus deletion. Listing filters on the
//! user's declared tags, not the transitive closure retrieval uses; both
//! behaviors are deliberate and pinned by tests.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::providers::blob_store::merged_object;
use crate::providers::{BlobStore, SearchIndex, TextExtractor};
use crate::storage::MetaStore;
use crate::types::{FileUpload, User};

/// Upload record plus the display name of its org tag
#[derive(Debug, Clone, Serialize)]
pub struct FileUploadView {
    #[serde(flatten)]
    pub record: FileUpload,
    pub org_tag_name: String,
}

/// Presigned download handle
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadInfo {
    pub file_name: String,
    pub download_url: String,
    pub file_size: i64,
}

/// Plain-text preview of a document
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewInfo {
    pub file_name: String,
    pub content: String,
    pub file_size: i64,
}

/// Listing, deletion, downloads, and previews over uploaded documents
pub struct DocumentService {
    meta: Arc<MetaStore>,
    blobs: Arc<dyn BlobStore>,
    index: Arc<dyn SearchIndex>,
    extractor: Arc<dyn TextExtractor>,
    presign_ttl: Duration,
}

impl DocumentService {
    pub fn new(
        meta: Arc<MetaStore>,
        blobs: Arc<dyn BlobStore>,
        index: Arc<dyn SearchIndex>,
        extractor: Arc<dyn TextExtractor>,
        presign_ttl: Duration,
    ) -> Self {
        Self {
            meta,
            blobs,
            index,
            extractor,
            presign_ttl,
        }
    }

    /// Completed files the user may see. Tag matching here uses the declared
    /// tags only.
    pub fn list_accessible_files(&self, user: &User) -> Result<Vec<FileUpload>> {
        self.meta.find_accessible_uploads(user.id, &user.org_tags)
    }

    /// The user's own uploads with org tag display names attached
    pub fn list_uploaded_files(&self, user_id: u64) -> Result<Vec<FileUploadView>> {
        let files = self.meta.find_uploads_by_user(user_id)?;

        let tag_ids: Vec<String> = files
            .iter()
            .filter(|f| !f.org_tag.is_empty())
            .map(|f| f.org_tag.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let tags = self.meta.find_tags(&tag_ids)?;
        let names: HashMap<String, String> = tags.into_iter().map(|t| (t.tag_id, t.name)).collect();

        Ok(files
            .into_iter()
            .map(|record| {
                let org_tag_name = names.get(&record.org_tag).cloned().unwrap_or_default();
                FileUploadView {
                    record,
                    org_tag_name,
                }
            })
            .collect())
    }

    /// Delete a document: merged object, chunk rows, text chunks, upload
    /// record, and its index entries. Owner or admin only. An index failure
    /// surfaces after the other deletions applied, so operators can re-run.
    pub async fn delete_document(&self, file_md5: &str, user: &User) -> Result<()> {
        let record = match self.meta.get_upload(file_md5, user.id)? {
            Some(record) => Some(record),
            None if user.is_admin() => self.meta.find_upload_by_md5(file_md5)?,
            None => None,
        };
        let record = record.ok_or_else(|| Error::NotFound(format!("document '{}'", file_md5)))?;

        if record.user_id != user.id && !user.is_admin() {
            return Err(Error::Forbidden("not allowed to delete this document".to_string()));
        }

        let object = merged_object(&record.file_name);
        if let Err(e) = self.blobs.delete(&object).await {
            tracing::warn!(file_md5, error = %e, "failed to delete merged object");
        }

        self.meta.delete_upload_records(file_md5, record.user_id)?;
        tracing::info!(file_md5, "document rows deleted");

        if let Err(e) = self.index.delete_by_file(file_md5).await {
            return Err(Error::Internal(format!(
                "document rows deleted but index cleanup failed: {}",
                e
            )));
        }
        Ok(())
    }

    /// Presigned download link for an accessible file
    pub async fn download_url(&self, file_name: &str, user: &User) -> Result<DownloadInfo> {
        let accessible = self.list_accessible_files(user)?;
        let record = accessible
            .into_iter()
            .find(|f| f.file_name == file_name)
            .ok_or_else(|| Error::NotFound(format!("file '{}'", file_name)))?;

        let url = self
            .blobs
            .presign_get(&merged_object(&record.file_name), self.presign_ttl)
            .await?;
        Ok(DownloadInfo {
            file_name: record.file_name,
            download_url: url,
            file_size: record.total_size,
        })
    }

    /// Plain-text preview of an accessible file, extracted from the merged
    /// object on demand
    pub async fn preview(&self, file_name: &str, user: &User) -> Result<PreviewInfo> {
        let accessible = self.list_accessible_files(user)?;
        let record = accessible
            .into_iter()
            .find(|f| f.file_name == file_name)
            .ok_or_else(|| Error::NotFound(format!("file '{}'", file_name)))?;

        let bytes = self.blobs.get(&merged_object(&record.file_name)).await?;
        let content = self.extractor.extract(&record.file_name, bytes).await?;
        Ok(PreviewInfo {
            file_name: record.file_name,
            content,
            file_size: record.total_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::memory::{MemoryBlobStore, MemorySearchIndex};
    use crate::test_support::{PlainTextExtractor, ScriptedIndex};
    use crate::types::{UploadStatus, UserRole};

    fn user(id: u64, role: UserRole, tags: &[&str]) -> User {
        User {
            id,
            name: format!("user{}", id),
            role,
            org_tags: tags.iter().map(|t| t.to_string()).collect(),
            primary_org: None,
        }
    }

    fn service_with(index: Arc<dyn SearchIndex>) -> (DocumentService, Arc<MetaStore>, Arc<MemoryBlobStore>) {
        let meta = Arc::new(MetaStore::in_memory().unwrap());
        let blobs = Arc::new(MemoryBlobStore::new());
        let service = DocumentService::new(
            Arc::clone(&meta),
            blobs.clone(),
            index,
            Arc::new(PlainTextExtractor),
            Duration::from_secs(3600),
        );
        (service, meta, blobs)
    }

    #[tokio::test]
    async fn owner_deletes_everything() {
        let (service, meta, blobs) = service_with(Arc::new(MemorySearchIndex::new()));
        let md5 = "a".repeat(32);
        let record = meta.create_upload(&md5, "doc.pdf", 10, 1, "t", false).unwrap();
        meta.set_upload_status(record.id, UploadStatus::Complete).unwrap();
        blobs.put("merged/doc.pdf", vec![1, 2, 3]).await.unwrap();

        service
            .delete_document(&md5, &user(1, UserRole::User, &[]))
            .await
            .unwrap();

        assert!(meta.get_upload(&md5, 1).unwrap().is_none());
        assert!(!blobs.contains("merged/doc.pdf"));
    }

    #[tokio::test]
    async fn non_owner_cannot_delete_admin_can() {
        let (service, meta, _blobs) = service_with(Arc::new(MemorySearchIndex::new()));
        let md5 = "b".repeat(32);
        meta.create_upload(&md5, "doc.pdf", 10, 1, "t", false).unwrap();

        // another plain user does not even see the record
        let err = service
            .delete_document(&md5, &user(2, UserRole::User, &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(meta.get_upload(&md5, 1).unwrap().is_some());

        // admin reaches across owners
        service
            .delete_document(&md5, &user(9, UserRole::Admin, &[]))
            .await
            .unwrap();
        assert!(meta.get_upload(&md5, 1).unwrap().is_none());
    }

    #[tokio::test]
    async fn index_failure_surfaces_after_row_deletion() {
        let index = Arc::new(ScriptedIndex::new());
        index.fail_deletes();
        let (service, meta, _blobs) = service_with(index);
        let md5 = "c".repeat(32);
        meta.create_upload(&md5, "doc.pdf", 10, 1, "t", false).unwrap();

        let err = service
            .delete_document(&md5, &user(1, UserRole::User, &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
        // relational deletion already applied
        assert!(meta.get_upload(&md5, 1).unwrap().is_none());
    }

    #[tokio::test]
    async fn download_requires_access() {
        let (service, meta, _blobs) = service_with(Arc::new(MemorySearchIndex::new()));
        let md5 = "d".repeat(32);
        let record = meta.create_upload(&md5, "shared.pdf", 42, 1, "team", true).unwrap();
        meta.set_upload_status(record.id, UploadStatus::Complete).unwrap();

        // public file: any user gets a link
        let info = service
            .download_url("shared.pdf", &user(2, UserRole::User, &[]))
            .await
            .unwrap();
        assert_eq!(info.file_size, 42);
        assert!(info.download_url.contains("merged/shared.pdf"));

        let err = service
            .download_url("missing.pdf", &user(2, UserRole::User, &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn preview_extracts_accessible_file_text() {
        let (service, meta, blobs) = service_with(Arc::new(MemorySearchIndex::new()));
        let md5 = "1".repeat(32);
        let record = meta.create_upload(&md5, "notes.txt", 11, 1, "team", true).unwrap();
        meta.set_upload_status(record.id, UploadStatus::Complete).unwrap();
        blobs.put("merged/notes.txt", b"hello there".to_vec()).await.unwrap();

        // public file: another user can preview it
        let info = service
            .preview("notes.txt", &user(2, UserRole::User, &[]))
            .await
            .unwrap();
        assert_eq!(info.file_name, "notes.txt");
        assert_eq!(info.content, "hello there");
        assert_eq!(info.file_size, 11);

        // inaccessible names are indistinguishable from missing ones
        let err = service
            .preview("ghost.txt", &user(2, UserRole::User, &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn uploaded_listing_attaches_tag_names() {
        let (service, meta, _blobs) = service_with(Arc::new(MemorySearchIndex::new()));
        meta.create_tag("team", "Platform Team", "", None, 1).unwrap();
        meta.create_upload(&"e".repeat(32), "mine.pdf", 1, 1, "team", false).unwrap();
        meta.create_upload(&"f".repeat(32), "untagged.pdf", 1, 1, "ghost", false).unwrap();

        let views = service.list_uploaded_files(1).unwrap();
        let by_name: HashMap<_, _> = views
            .iter()
            .map(|v| (v.record.file_name.clone(), v.org_tag_name.clone()))
            .collect();
        assert_eq!(by_name["mine.pdf"], "Platform Team");
        assert_eq!(by_name["untagged.pdf"], "");
    }
}
