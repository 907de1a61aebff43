//! Catalog Client Port
//!
//! Defines the interface to the control service that persists deployables.

use accel_domain::{Deployable, Uuid};
use async_trait::async_trait;

/// Remote resource catalog
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// All deployables recorded for a host, every category
    async fn list_by_host(&self, host: &str) -> Result<Vec<Deployable>, CatalogError>;

    /// Persist a new deployable; the returned record carries the confirmed id
    async fn create(&self, deployable: &Deployable) -> Result<Deployable, CatalogError>;

    /// Overwrite an existing deployable with the given record
    async fn update(&self, deployable: &Deployable) -> Result<(), CatalogError>;

    async fn delete(&self, deployable: &Deployable) -> Result<(), CatalogError>;

    async fn get(&self, uuid: &Uuid) -> Result<Option<Deployable>, CatalogError>;
}

/// Catalog client error
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Deployable not found: {0}")]
    NotFound(Uuid),

    #[error("Remote call rejected: {0}")]
    Rejected(String),

    #[error("Communication error: {0}")]
    Communication(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Timeout")]
    Timeout,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_catalog_client_trait_is_object_safe() {
        let _client: Option<Box<dyn CatalogClient>> = None;
        fn assert_send_sync<T: Send + Sync + ?Sized>() {}
        assert_send_sync::<dyn CatalogClient>();
    }

    #[test]
    fn test_catalog_error_display() {
        let id = Uuid::nil();
        assert!(CatalogError::NotFound(id).to_string().contains("not found"));
        assert!(CatalogError::Communication("refused".to_string())
            .to_string()
            .contains("Communication error"));
        assert_eq!(CatalogError::Timeout.to_string(), "Timeout");
    }
}
