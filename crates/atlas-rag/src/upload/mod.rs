//! Resumable chunked upload coordination
//!
//! Parts arrive in any order, addressed by `(md5, index)`. Progress lives in
//! the progress-store bitmap so uploads survive restarts; merge requires every
//! part, composes server-side, and hands the completed file to the processing
//! queue.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::providers::blob_store::{merged_object, part_object};
use crate::providers::{BlobStore, ProgressStore};
use crate::queue::WorkQueue;
use crate::storage::MetaStore;
use crate::types::{ProcessingTask, UploadStatus};

/// Extensions accepted at part 0, lowercased with leading dot
pub const SUPPORTED_EXTENSIONS: [&str; 9] = [
    ".pdf", ".doc", ".docx", ".xls", ".xlsx", ".ppt", ".pptx", ".txt", ".md",
];

/// Outcome of a fast-upload / resume check
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub completed: bool,
    pub uploaded_parts: Vec<u32>,
}

/// Progress after accepting a part
#[derive(Debug, Clone, Serialize)]
pub struct PartProgress {
    pub uploaded_parts: Vec<u32>,
    pub total_chunks: u32,
}

/// Read-only upload status
#[derive(Debug, Clone, Serialize)]
pub struct UploadStatusView {
    pub file_name: String,
    pub file_type: String,
    pub uploaded_parts: Vec<u32>,
    pub total_chunks: u32,
}

/// Supported upload formats, for client display
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedFileTypes {
    pub supported_extensions: Vec<&'static str>,
    pub supported_types: Vec<&'static str>,
    pub description: &'static str,
}

/// Orchestrates check / part / merge for resumable uploads
pub struct UploadCoordinator {
    meta: Arc<MetaStore>,
    blobs: Arc<dyn BlobStore>,
    progress: Arc<dyn ProgressStore>,
    queue: Arc<dyn WorkQueue>,
    chunk_size: u64,
    presign_ttl: Duration,
}

impl UploadCoordinator {
    pub fn new(
        meta: Arc<MetaStore>,
        blobs: Arc<dyn BlobStore>,
        progress: Arc<dyn ProgressStore>,
        queue: Arc<dyn WorkQueue>,
        chunk_size: u64,
        presign_ttl: Duration,
    ) -> Self {
        Self {
            meta,
            blobs,
            progress,
            queue,
            chunk_size,
            presign_ttl,
        }
    }

    fn total_chunks(&self, total_size: i64) -> u32 {
        if total_size <= 0 {
            return 0;
        }
        ((total_size as u64 + self.chunk_size - 1) / self.chunk_size) as u32
    }

    /// Resume check: returns completion and the set of received part indices
    pub async fn check(&self, file_md5: &str, user_id: u64) -> Result<CheckResult> {
        let record = match self.meta.get_upload(file_md5, user_id)? {
            Some(record) => record,
            None => {
                tracing::info!(file_md5, user_id, "no upload record, full upload required");
                return Ok(CheckResult {
                    completed: false,
                    uploaded_parts: Vec::new(),
                });
            }
        };

        if record.status == UploadStatus::Complete {
            tracing::info!(file_md5, user_id, "upload already complete");
            return Ok(CheckResult {
                completed: true,
                uploaded_parts: Vec::new(),
            });
        }

        let total_chunks = self.total_chunks(record.total_size);
        let uploaded_parts = self.progress.received_parts(user_id, file_md5, total_chunks).await?;
        Ok(CheckResult {
            completed: false,
            uploaded_parts,
        })
    }

    /// Accept one part. Effects in order with strict early exits: validate
    /// the extension on part 0, upsert the record, skip already-received
    /// parts, then object write, chunk row, and progress bit.
    #[allow(clippy::too_many_arguments)]
    pub async fn upload_part(
        &self,
        file_md5: &str,
        file_name: &str,
        total_size: i64,
        index: u32,
        bytes: Vec<u8>,
        user_id: u64,
        org_tag: &str,
        is_public: bool,
    ) -> Result<PartProgress> {
        if index == 0 && !is_supported_file(file_name) {
            return Err(Error::InvalidArgument(format!(
                "unsupported file type for '{}'",
                file_name
            )));
        }

        let record = match self.meta.get_upload(file_md5, user_id)? {
            Some(record) => record,
            None => {
                // first part seen for this file: resolve the org tag and
                // create the record as UPLOADING
                let org_tag = if org_tag.is_empty() {
                    let user = self.meta.find_user(user_id)?;
                    user.primary_org.unwrap_or_default()
                } else {
                    org_tag.to_string()
                };
                tracing::info!(file_md5, user_id, org_tag, "creating upload record");
                self.meta
                    .create_upload(file_md5, file_name, total_size, user_id, &org_tag, is_public)?
            }
        };

        let total_chunks = self.total_chunks(record.total_size);

        if self.progress.is_part_received(user_id, file_md5, index).await? {
            tracing::info!(file_md5, index, "part already received, skipping write");
            let uploaded_parts = self.progress.received_parts(user_id, file_md5, total_chunks).await?;
            return Ok(PartProgress {
                uploaded_parts,
                total_chunks,
            });
        }

        let object = part_object(file_md5, index);
        self.blobs.put(&object, bytes).await?;
        self.meta.insert_chunk_info(file_md5, index, &object)?;
        self.progress.mark_part_received(user_id, file_md5, index).await?;

        let uploaded_parts = self.progress.received_parts(user_id, file_md5, total_chunks).await?;
        tracing::info!(
            file_md5,
            index,
            progress = format!("{}/{}", uploaded_parts.len(), total_chunks),
            "part stored"
        );
        Ok(PartProgress {
            uploaded_parts,
            total_chunks,
        })
    }

    /// Merge all parts into `merged/<filename>`, mark the record COMPLETE,
    /// publish the processing task, and clean parts up in the background.
    pub async fn merge(&self, file_md5: &str, file_name: &str, user_id: u64) -> Result<String> {
        let record = self
            .meta
            .get_upload(file_md5, user_id)?
            .ok_or_else(|| Error::NotFound(format!("upload record for '{}'", file_md5)))?;

        let total_chunks = self.total_chunks(record.total_size);
        let uploaded = self.progress.received_parts(user_id, file_md5, total_chunks).await?;
        if (uploaded.len() as u32) < total_chunks {
            return Err(Error::Incomplete(format!(
                "expected {} parts, received {}",
                total_chunks,
                uploaded.len()
            )));
        }

        let dest = merged_object(file_name);
        if total_chunks == 1 {
            self.blobs.copy(&part_object(file_md5, 0), &dest).await?;
        } else {
            let sources: Vec<String> = (0..total_chunks).map(|i| part_object(file_md5, i)).collect();
            self.blobs.compose(&sources, &dest).await?;
        }
        tracing::info!(file_md5, dest, parts = total_chunks, "parts merged");

        self.meta.set_upload_status(record.id, UploadStatus::Complete)?;

        let object_url = self.blobs.presign_get(&dest, self.presign_ttl).await.unwrap_or_default();
        let task = ProcessingTask {
            file_md5: file_md5.to_string(),
            object_url: object_url.clone(),
            file_name: file_name.to_string(),
            user_id,
            org_tag: record.org_tag.clone(),
            is_public: record.is_public,
        };
        // The status change is never rolled back on publish failure; an
        // operator can re-emit the task through `republish`.
        if let Err(e) = self.queue.publish(&task).await {
            tracing::error!(file_md5, error = %e, "failed to publish processing task");
        } else {
            tracing::info!(file_md5, "processing task published");
        }

        self.spawn_cleanup(file_md5.to_string(), user_id, total_chunks);

        Ok(object_url)
    }

    /// True iff a COMPLETE upload exists for `(md5, user)`
    pub async fn fast_upload(&self, file_md5: &str, user_id: u64) -> Result<bool> {
        Ok(self
            .meta
            .get_upload(file_md5, user_id)?
            .map(|record| record.status == UploadStatus::Complete)
            .unwrap_or(false))
    }

    /// Pure read of the current upload state
    pub async fn status(&self, file_md5: &str, user_id: u64) -> Result<UploadStatusView> {
        let record = self
            .meta
            .get_upload(file_md5, user_id)?
            .ok_or_else(|| Error::NotFound(format!("upload record for '{}'", file_md5)))?;

        let total_chunks = self.total_chunks(record.total_size);
        let uploaded_parts = self.progress.received_parts(user_id, file_md5, total_chunks).await?;
        Ok(UploadStatusView {
            file_type: file_type_label(&record.file_name).to_string(),
            file_name: record.file_name,
            uploaded_parts,
            total_chunks,
        })
    }

    /// Operator hook: re-emit the processing task for a COMPLETE upload whose
    /// original publish failed. Unlike merge, a publish failure here is
    /// surfaced.
    pub async fn republish(&self, file_md5: &str, user_id: u64) -> Result<()> {
        let record = self
            .meta
            .get_upload(file_md5, user_id)?
            .ok_or_else(|| Error::NotFound(format!("upload record for '{}'", file_md5)))?;
        if record.status != UploadStatus::Complete {
            return Err(Error::InvalidArgument(format!(
                "upload '{}' is not complete",
                file_md5
            )));
        }

        let dest = merged_object(&record.file_name);
        let object_url = self.blobs.presign_get(&dest, self.presign_ttl).await.unwrap_or_default();
        self.queue
            .publish(&ProcessingTask {
                file_md5: file_md5.to_string(),
                object_url,
                file_name: record.file_name.clone(),
                user_id,
                org_tag: record.org_tag.clone(),
                is_public: record.is_public,
            })
            .await?;
        tracing::info!(file_md5, "processing task re-published");
        Ok(())
    }

    /// Supported formats for client display
    pub fn supported_file_types(&self) -> SupportedFileTypes {
        SupportedFileTypes {
            supported_extensions: SUPPORTED_EXTENSIONS.to_vec(),
            supported_types: vec![
                "PDF document",
                "Word document",
                "Excel workbook",
                "PowerPoint presentation",
                "Plain text",
                "Markdown document",
            ],
            description: "Document formats the pipeline can extract and index",
        }
    }

    fn spawn_cleanup(&self, file_md5: String, user_id: u64, total_chunks: u32) {
        let progress = Arc::clone(&self.progress);
        let blobs = Arc::clone(&self.blobs);
        tokio::spawn(async move {
            if let Err(e) = progress.clear_parts(user_id, &file_md5).await {
                tracing::warn!(file_md5, error = %e, "failed to clear part bitmap");
            }
            for index in 0..total_chunks {
                if let Err(e) = blobs.delete(&part_object(&file_md5, index)).await {
                    tracing::warn!(file_md5, index, error = %e, "failed to delete part object");
                }
            }
            tracing::debug!(file_md5, "upload cleanup finished");
        });
    }
}

/// Whether the filename's lowercased suffix is an accepted format
pub fn is_supported_file(file_name: &str) -> bool {
    let lower = file_name.to_lowercase();
    SUPPORTED_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Human-readable label for the filename's format
pub fn file_type_label(file_name: &str) -> &'static str {
    let lower = file_name.to_lowercase();
    let ext = match lower.rsplit_once('.') {
        Some((_, ext)) => ext,
        None => return "unknown",
    };
    match ext {
        "pdf" => "PDF document",
        "doc" | "docx" => "Word document",
        "xls" | "xlsx" => "Excel workbook",
        "ppt" | "pptx" => "PowerPoint presentation",
        "txt" => "Plain text",
        "md" => "Markdown document",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::memory::{MemoryBlobStore, MemoryProgressStore};
    use crate::queue::MemoryWorkQueue;

    const PART: u64 = 8;

    struct Fixture {
        coordinator: UploadCoordinator,
        meta: Arc<MetaStore>,
        blobs: Arc<MemoryBlobStore>,
        queue: Arc<MemoryWorkQueue>,
    }

    fn fixture() -> Fixture {
        let meta = Arc::new(MetaStore::in_memory().unwrap());
        let blobs = Arc::new(MemoryBlobStore::new());
        let progress = Arc::new(MemoryProgressStore::new());
        let queue = Arc::new(MemoryWorkQueue::new());
        let coordinator = UploadCoordinator::new(
            Arc::clone(&meta),
            blobs.clone(),
            progress,
            queue.clone(),
            PART,
            Duration::from_secs(3600),
        );
        meta.create_user("alice").unwrap();
        Fixture {
            coordinator,
            meta,
            blobs,
            queue,
        }
    }

    #[tokio::test]
    async fn resumable_upload_out_of_order() {
        let f = fixture();
        let md5 = "1".repeat(32);
        // 2.5 parts worth of bytes => 3 parts
        let body: Vec<u8> = (0..20).collect();
        let total = body.len() as i64;

        f.coordinator
            .upload_part(&md5, "a.pdf", total, 0, body[..8].to_vec(), 1, "", false)
            .await
            .unwrap();
        f.coordinator
            .upload_part(&md5, "a.pdf", total, 2, body[16..].to_vec(), 1, "", false)
            .await
            .unwrap();

        let check = f.coordinator.check(&md5, 1).await.unwrap();
        assert!(!check.completed);
        assert_eq!(check.uploaded_parts, vec![0, 2]);

        // merge refuses while a part is missing
        let err = f.coordinator.merge(&md5, "a.pdf", 1).await.unwrap_err();
        assert!(matches!(err, Error::Incomplete(_)));

        f.coordinator
            .upload_part(&md5, "a.pdf", total, 1, body[8..16].to_vec(), 1, "", false)
            .await
            .unwrap();
        let check = f.coordinator.check(&md5, 1).await.unwrap();
        assert_eq!(check.uploaded_parts, vec![0, 1, 2]);

        f.coordinator.merge(&md5, "a.pdf", 1).await.unwrap();

        // merged bytes equal the original, status flips, a task is enqueued
        assert_eq!(f.blobs.get("merged/a.pdf").await.unwrap(), body);
        let check = f.coordinator.check(&md5, 1).await.unwrap();
        assert!(check.completed);
        let delivery = f.queue.fetch(Duration::from_millis(50)).await.unwrap().unwrap();
        assert_eq!(delivery.task.file_md5, md5);
        assert_eq!(delivery.task.file_name, "a.pdf");
    }

    #[tokio::test]
    async fn single_part_merge_uses_copy_path() {
        let f = fixture();
        let md5 = "2".repeat(32);
        let body = b"tiny".to_vec();

        f.coordinator
            .upload_part(&md5, "b.txt", body.len() as i64, 0, body.clone(), 1, "", false)
            .await
            .unwrap();
        f.coordinator.merge(&md5, "b.txt", 1).await.unwrap();

        assert_eq!(f.blobs.get("merged/b.txt").await.unwrap(), body);
    }

    #[tokio::test]
    async fn rejects_unknown_extension_on_first_part() {
        let f = fixture();
        let err = f
            .coordinator
            .upload_part(&"3".repeat(32), "evil.exe", 4, 0, vec![0, 1, 2, 3], 1, "", false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        // no record was created
        assert!(f.meta.get_upload(&"3".repeat(32), 1).unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_part_is_skipped() {
        let f = fixture();
        let md5 = "4".repeat(32);

        f.coordinator
            .upload_part(&md5, "c.md", 4, 0, b"data".to_vec(), 1, "", false)
            .await
            .unwrap();
        let progress = f
            .coordinator
            .upload_part(&md5, "c.md", 4, 0, b"data".to_vec(), 1, "", false)
            .await
            .unwrap();

        assert_eq!(progress.uploaded_parts, vec![0]);
        // the skip happens before the chunk row insert
        assert_eq!(f.meta.list_chunk_info(&md5).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_org_tag_defaults_to_primary_org() {
        let f = fixture();
        let md5 = "5".repeat(32);
        f.coordinator
            .upload_part(&md5, "d.txt", 2, 0, b"ab".to_vec(), 1, "", false)
            .await
            .unwrap();

        let record = f.meta.get_upload(&md5, 1).unwrap().unwrap();
        assert_eq!(record.org_tag, "PRIVATE_alice");
    }

    #[tokio::test]
    async fn fast_upload_only_after_complete() {
        let f = fixture();
        let md5 = "6".repeat(32);
        assert!(!f.coordinator.fast_upload(&md5, 1).await.unwrap());

        f.coordinator
            .upload_part(&md5, "e.txt", 2, 0, b"ab".to_vec(), 1, "", false)
            .await
            .unwrap();
        assert!(!f.coordinator.fast_upload(&md5, 1).await.unwrap());

        f.coordinator.merge(&md5, "e.txt", 1).await.unwrap();
        assert!(f.coordinator.fast_upload(&md5, 1).await.unwrap());
    }

    #[tokio::test]
    async fn remerge_is_idempotent_for_object_content() {
        let f = fixture();
        let md5 = "7".repeat(32);
        let body: Vec<u8> = (0..16).collect();

        f.coordinator
            .upload_part(&md5, "f.txt", 16, 0, body[..8].to_vec(), 1, "", false)
            .await
            .unwrap();
        f.coordinator
            .upload_part(&md5, "f.txt", 16, 1, body[8..].to_vec(), 1, "", false)
            .await
            .unwrap();

        f.coordinator.merge(&md5, "f.txt", 1).await.unwrap();
        let first = f.blobs.get("merged/f.txt").await.unwrap();

        // let the background part cleanup finish, then re-upload and re-merge
        tokio::time::sleep(Duration::from_millis(50)).await;
        f.coordinator
            .upload_part(&md5, "f.txt", 16, 0, body[..8].to_vec(), 1, "", false)
            .await
            .unwrap();
        f.coordinator
            .upload_part(&md5, "f.txt", 16, 1, body[8..].to_vec(), 1, "", false)
            .await
            .unwrap();
        f.coordinator.merge(&md5, "f.txt", 1).await.unwrap();
        let second = f.blobs.get("merged/f.txt").await.unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn extension_gate_is_case_insensitive() {
        assert!(is_supported_file("Report.PDF"));
        assert!(is_supported_file("notes.md"));
        assert!(!is_supported_file("archive.zip"));
        assert!(!is_supported_file("no_extension"));
    }
}
