//! Object store gateway
//!
//! Part objects live at `chunks/<md5>/<index>`; a successful merge writes
//! `merged/<filename>`, which must outlive the upload record. Implementations
//! must make `put` an idempotent overwrite so concurrent part uploads stay
//! safe.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Object key for one uploaded part
pub fn part_object(file_md5: &str, index: u32) -> String {
    format!("chunks/{}/{}", file_md5, index)
}

/// Object key for the merged file
pub fn merged_object(file_name: &str) -> String {
    format!("merged/{}", file_name)
}

/// Part/object lifecycle in an object store
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write an object, overwriting any previous content
    async fn put(&self, object: &str, bytes: Vec<u8>) -> Result<()>;

    /// Read an object in full
    async fn get(&self, object: &str) -> Result<Vec<u8>>;

    /// Server-side concatenation of `sources` (in order) into `dest`
    async fn compose(&self, sources: &[String], dest: &str) -> Result<()>;

    /// Server-side copy of a single object
    async fn copy(&self, source: &str, dest: &str) -> Result<()>;

    /// Delete an object; deleting a missing object is not an error
    async fn delete(&self, object: &str) -> Result<()>;

    /// Time-limited credential-free GET URL
    async fn presign_get(&self, object: &str, ttl: Duration) -> Result<String>;

    /// Backend name for logging
    fn name(&self) -> &str;
}
