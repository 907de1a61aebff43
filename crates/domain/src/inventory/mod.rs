//! Accelerator inventory: local devices and their catalog records

pub mod deployable;
pub mod device;
pub mod pci_address;

pub use deployable::{Deployable, DEPLOYABLE_VERSION};
pub use device::Device;
pub use pci_address::PciAddress;
