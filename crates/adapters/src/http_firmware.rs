//! HTTP firmware store
//!
//! Streams image blobs from the image service into the staging directory.

use accel_ports::{FirmwareError, FirmwareStore};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::StatusCode;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

pub struct HttpFirmwareStore {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
    connect_timeout: Duration,
}

impl HttpFirmwareStore {
    pub fn new(base_url: &str, connect_timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
            client: reqwest::Client::new(),
            connect_timeout,
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    fn image_url(&self, reference: &str) -> String {
        format!("{}/v1/images/{}/file", self.base_url, reference)
    }

    async fn fetch(&self, reference: &str, dest_path: &Path) -> Result<u64, FirmwareError> {
        let mut request = self.client.get(self.image_url(reference));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = tokio::time::timeout(self.connect_timeout, request.send())
            .await
            .map_err(|_| {
                FirmwareError::Transfer(format!(
                    "no response for image {} after {:?}",
                    reference, self.connect_timeout
                ))
            })?
            .map_err(|e| FirmwareError::Transfer(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => return Err(FirmwareError::NotFound(reference.to_string())),
            status if !status.is_success() => {
                return Err(FirmwareError::Transfer(format!(
                    "image {} download failed with status {}",
                    reference, status
                )))
            }
            _ => {}
        }

        let mut file = tokio::fs::File::create(dest_path).await?;
        let mut written = 0u64;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| FirmwareError::Transfer(e.to_string()))?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }
}

#[async_trait]
impl FirmwareStore for HttpFirmwareStore {
    async fn download(&self, reference: &str, dest_path: &Path) -> Result<(), FirmwareError> {
        match self.fetch(reference, dest_path).await {
            Ok(bytes) => {
                info!(image = %reference, path = %dest_path.display(), bytes, "Firmware image staged");
                Ok(())
            }
            Err(e) => {
                // drop the partial image
                if tokio::fs::remove_file(dest_path).await.is_ok() {
                    warn!(path = %dest_path.display(), "Removed partial firmware image");
                }
                Err(e)
            }
        }
    }
}
