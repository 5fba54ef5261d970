//! Text extraction client

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Bytes + filename to plain text
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extract plain text from a document
    async fn extract(&self, file_name: &str, bytes: Vec<u8>) -> Result<String>;

    /// Provider name for logging
    fn name(&self) -> &str;
}

/// Tika-style extraction server client. The document body is PUT with a
/// `Content-Type` derived from the filename extension; the server answers
/// with `text/plain`.
pub struct TikaExtractor {
    client: reqwest::Client,
    server_url: String,
}

impl TikaExtractor {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            server_url: server_url.into(),
        }
    }
}

#[async_trait]
impl TextExtractor for TikaExtractor {
    async fn extract(&self, file_name: &str, bytes: Vec<u8>) -> Result<String> {
        let content_type = mime_guess::from_path(file_name)
            .first_or_octet_stream()
            .to_string();

        let response = self
            .client
            .put(format!("{}/tika", self.server_url))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header(reqwest::header::ACCEPT, "text/plain")
            .body(bytes)
            .send()
            .await
            .map_err(|e| Error::Unavailable(format!("extractor request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Unavailable(format!(
                "extractor returned {}: {}",
                status, body
            )));
        }

        response
            .text()
            .await
            .map_err(|e| Error::Unavailable(format!("failed to read extractor response: {}", e)))
    }

    fn name(&self) -> &str {
        "tika"
    }
}
