//! Accelerator driver layer
//!
//! This crate provides the per-vendor device drivers used by the host agent:
//!
//! - Driver abstraction with trait-based interfaces
//! - Registry mapping (category, vendor id) to a driver factory
//! - `lspci`-based vendor probing
//! - Bundled NVIDIA, Intel QAT and Xilinx drivers

pub mod factory;
pub mod models;
pub mod sysinfo;
pub mod traits;
pub mod vendors;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use factory::{DriverFactory, DriverRegistry};
pub use models::DriverError;
pub use sysinfo::{CommandOutput, CommandRunner, LspciProbe, SystemCommandRunner};
pub use traits::{AcceleratorDriver, VendorProbe};
