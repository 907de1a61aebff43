//! Driver traits module
//!
//! This module contains the trait definitions every vendor driver implements.

use accel_domain::{Deployable, Device, DeviceCategory, VendorId};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::Path;

use crate::DriverError;

/// Core accelerator driver trait, one implementation per vendor
#[async_trait]
pub trait AcceleratorDriver: Send + Sync {
    /// Short driver name used in logs
    fn name(&self) -> &'static str;

    /// Enumerate this vendor's devices on the local bus
    async fn discover(&self) -> Result<Vec<Device>, DriverError>;

    /// Load the firmware image at `image` onto the device
    async fn program(&self, _deployable: &Deployable, _image: &Path) -> Result<(), DriverError> {
        Err(DriverError::not_implemented(self.name(), "program"))
    }

    /// Whether a previously started programming run has completed
    async fn check_program_status(&self, _deployable: &Deployable) -> Result<bool, DriverError> {
        Err(DriverError::not_implemented(self.name(), "check_program_status"))
    }

    /// Function currently loaded on the device
    async fn get_function(&self, deployable: &Deployable) -> Result<Option<String>, DriverError> {
        Ok(deployable.function.clone())
    }
}

/// Reports which vendors have devices of a category on this host
#[async_trait]
pub trait VendorProbe: Send + Sync {
    async fn discover_vendors(
        &self,
        category: DeviceCategory,
    ) -> Result<BTreeSet<VendorId>, DriverError>;
}
