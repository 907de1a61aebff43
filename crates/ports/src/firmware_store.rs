//! Firmware Store Port
//!
//! Retrieval of firmware images from the blob store into local staging.

use async_trait::async_trait;
use std::path::Path;

#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait FirmwareStore: Send + Sync {
    /// Fetch the image named by `reference` and write it to `dest_path`
    async fn download(&self, reference: &str, dest_path: &Path) -> Result<(), FirmwareError>;
}

#[derive(thiserror::Error, Debug)]
pub enum FirmwareError {
    #[error("Firmware image not found: {0}")]
    NotFound(String),

    #[error("Firmware transfer failed: {0}")]
    Transfer(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
