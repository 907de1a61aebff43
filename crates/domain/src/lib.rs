//! Domain Core - Accelerator Inventory Model
//!
//! This crate contains the entities and value objects shared by the
//! reconciliation engine, the programming lifecycle and the drivers:
//! devices found on the local bus, deployables persisted by the catalog,
//! and validated PCI addresses.

pub mod inventory;
pub mod shared_kernel;

pub use crate::inventory::{Deployable, Device, PciAddress, DEPLOYABLE_VERSION};
pub use crate::shared_kernel::{
    Availability, DeviceCategory, DomainError, DomainResult, VendorId,
};
pub use uuid::Uuid;

// Domain result type
pub type Result<T> = std::result::Result<T, DomainError>;
