//! Infrastructure Adapters
//!
//! Implementations of the ports defined in `accel-ports`: the HTTP catalog
//! client, an in-memory catalog and the HTTP firmware store.

pub mod http_catalog;
pub mod http_firmware;
pub mod in_memory_catalog;

pub use crate::http_catalog::HttpCatalogClient;
pub use crate::http_firmware::HttpFirmwareStore;
pub use crate::in_memory_catalog::{CatalogCall, CatalogOp, InMemoryCatalog};
