//! Google Cloud Storage blob store
//!
//! Part and merged objects live in one bucket; compose and copy run
//! server-side so merge never moves bytes through this process.

use async_trait::async_trait;
use std::time::Duration;

use google_cloud_storage::client::{Client as GcsClient, ClientConfig};
use google_cloud_storage::http::objects::compose::{ComposeObjectRequest, ComposingTargets, SourceObjects};
use google_cloud_storage::http::objects::copy::CopyObjectRequest;
use google_cloud_storage::http::objects::delete::DeleteObjectRequest;
use google_cloud_storage::http::objects::download::Range;
use google_cloud_storage::http::objects::get::GetObjectRequest;
use google_cloud_storage::http::objects::upload::{Media, UploadObjectRequest, UploadType};
use google_cloud_storage::sign::{SignedURLMethod, SignedURLOptions};

use crate::error::{Error, Result};
use crate::providers::blob_store::BlobStore;

/// Blob store over a GCS bucket
pub struct GcsBlobStore {
    client: GcsClient,
    bucket: String,
}

impl GcsBlobStore {
    /// Create a store using ambient application credentials
    pub async fn new(bucket: String) -> Result<Self> {
        let config = ClientConfig::default()
            .with_auth()
            .await
            .map_err(|e| Error::Internal(format!("failed to create GCS client: {}", e)))?;
        Ok(Self {
            client: GcsClient::new(config),
            bucket,
        })
    }
}

#[async_trait]
impl BlobStore for GcsBlobStore {
    async fn put(&self, object: &str, bytes: Vec<u8>) -> Result<()> {
        let upload_type = UploadType::Simple(Media::new(object.to_string()));
        self.client
            .upload_object(
                &UploadObjectRequest {
                    bucket: self.bucket.clone(),
                    ..Default::default()
                },
                bytes,
                &upload_type,
            )
            .await
            .map_err(|e| Error::Unavailable(format!("failed to upload to GCS: {}", e)))?;
        Ok(())
    }

    async fn get(&self, object: &str) -> Result<Vec<u8>> {
        self.client
            .download_object(
                &GetObjectRequest {
                    bucket: self.bucket.clone(),
                    object: object.to_string(),
                    ..Default::default()
                },
                &Range::default(),
            )
            .await
            .map_err(|e| Error::Unavailable(format!("failed to download from GCS: {}", e)))
    }

    async fn compose(&self, sources: &[String], dest: &str) -> Result<()> {
        let source_objects = sources
            .iter()
            .map(|name| SourceObjects {
                name: name.clone(),
                ..Default::default()
            })
            .collect();

        self.client
            .compose_object(&ComposeObjectRequest {
                bucket: self.bucket.clone(),
                destination_object: dest.to_string(),
                composing_targets: ComposingTargets {
                    source_objects,
                    ..Default::default()
                },
                ..Default::default()
            })
            .await
            .map_err(|e| Error::Unavailable(format!("failed to compose GCS objects: {}", e)))?;
        Ok(())
    }

    async fn copy(&self, source: &str, dest: &str) -> Result<()> {
        self.client
            .copy_object(&CopyObjectRequest {
                source_bucket: self.bucket.clone(),
                source_object: source.to_string(),
                destination_bucket: self.bucket.clone(),
                destination_object: dest.to_string(),
                ..Default::default()
            })
            .await
            .map_err(|e| Error::Unavailable(format!("failed to copy GCS object: {}", e)))?;
        Ok(())
    }

    async fn delete(&self, object: &str) -> Result<()> {
        let _ = self
            .client
            .delete_object(&DeleteObjectRequest {
                bucket: self.bucket.clone(),
                object: object.to_string(),
                ..Default::default()
            })
            .await;
        Ok(())
    }

    async fn presign_get(&self, object: &str, ttl: Duration) -> Result<String> {
        self.client
            .signed_url(
                &self.bucket,
                object,
                None,
                None,
                SignedURLOptions {
                    method: SignedURLMethod::GET,
                    expires: ttl,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| Error::Unavailable(format!("failed to presign GCS url: {}", e)))
    }

    fn name(&self) -> &str {
        "gcs"
    }
}
