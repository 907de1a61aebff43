//! Devices as reported by a discovery pass
//!
//! A `Device` lives for one discovery cycle. Hierarchical accelerators report
//! their dependent regions inline; the reconciliation engine flattens them.

use serde::{Deserialize, Serialize};

use super::pci_address::PciAddress;
use crate::shared_kernel::{DeviceCategory, VendorId};

/// One accelerator function found on the local bus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub address: PciAddress,
    pub name: String,
    pub vendor_id: VendorId,
    pub product_id: String,
    pub category: DeviceCategory,
    pub assignable: bool,
    pub programmable: bool,
    pub function: Option<String>,
    /// Physical function this device depends on, if any
    pub parent: Option<PciAddress>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub regions: Vec<Device>,
}

impl Device {
    pub fn new(
        address: PciAddress,
        category: DeviceCategory,
        vendor_id: VendorId,
        product_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            address,
            name: name.into(),
            vendor_id,
            product_id: product_id.into(),
            category,
            assignable: true,
            programmable: false,
            function: None,
            parent: None,
            regions: Vec::new(),
        }
    }

    pub fn with_function(mut self, function: impl Into<String>) -> Self {
        self.function = Some(function.into());
        self
    }

    pub fn with_parent(mut self, parent: PciAddress) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_regions(mut self, regions: Vec<Device>) -> Self {
        self.regions = regions;
        self
    }

    pub fn programmable(mut self, programmable: bool) -> Self {
        self.programmable = programmable;
        self
    }

    pub fn assignable(mut self, assignable: bool) -> Self {
        self.assignable = assignable;
        self
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}
