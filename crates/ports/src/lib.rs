//! Ports - Abstraction Layer
//!
//! This crate defines the traits the agent needs from the outside world:
//! the remote resource catalog and the firmware blob store. Adapters
//! implement them in `accel-adapters`.

pub mod catalog_client;
pub mod firmware_store;

pub use crate::catalog_client::{CatalogClient, CatalogError};
pub use crate::firmware_store::{FirmwareError, FirmwareStore};

#[cfg(feature = "testing")]
pub use crate::catalog_client::MockCatalogClient;
#[cfg(feature = "testing")]
pub use crate::firmware_store::MockFirmwareStore;
