//! Deployables: the catalog's record of one accelerator on one host
//!
//! The agent never owns a deployable; it proposes changes that the catalog
//! persists. State transitions for firmware programming live here so every
//! caller moves a record through the same steps.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::device::Device;
use super::pci_address::PciAddress;
use crate::shared_kernel::{Availability, DeviceCategory, DomainResult, VendorId};

/// Schema version stamped on every deployable the agent creates
pub const DEPLOYABLE_VERSION: &str = "1.0";

/// Persisted accelerator resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployable {
    pub uuid: Uuid,
    pub host: String,
    #[serde(rename = "type")]
    pub category: DeviceCategory,
    pub vendor_id: VendorId,
    pub product_id: String,
    /// Stored as received; see [`Deployable::address`]
    pub pcie_address: String,
    pub parent_uuid: Option<Uuid>,
    pub availability: Availability,
    pub assignable: bool,
    pub programmable: bool,
    pub name: String,
    pub function: Option<String>,
    pub version: String,
}

impl Deployable {
    /// Build the record for a device seen for the first time
    pub fn from_device(host: &str, device: &Device, parent_uuid: Option<Uuid>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            host: host.to_string(),
            category: device.category,
            vendor_id: device.vendor_id.clone(),
            product_id: device.product_id.clone(),
            pcie_address: device.address.to_string(),
            parent_uuid,
            availability: Availability::Free,
            assignable: device.assignable,
            programmable: device.programmable,
            name: device.name.clone(),
            function: device.function.clone(),
            version: DEPLOYABLE_VERSION.to_string(),
        }
    }

    pub fn address(&self) -> DomainResult<PciAddress> {
        PciAddress::parse(&self.pcie_address)
    }

    /// Copy the tracked device attributes onto this record.
    ///
    /// Returns the names of the fields that changed; an empty list means the
    /// record already matches the device. `assignable` belongs to the
    /// programming lifecycle while the record is not `free` and is left as is.
    pub fn sync_with(&mut self, device: &Device) -> Vec<&'static str> {
        let mut drifted = Vec::new();

        if self.availability == Availability::Free && self.assignable != device.assignable {
            self.assignable = device.assignable;
            drifted.push("assignable");
        }
        let address = device.address.to_string();
        if self.pcie_address != address {
            self.pcie_address = address;
            drifted.push("pcie_address");
        }
        if self.product_id != device.product_id {
            self.product_id = device.product_id.clone();
            drifted.push("product_id");
        }
        if self.category != device.category {
            self.category = device.category;
            drifted.push("type");
        }
        if self.vendor_id != device.vendor_id {
            self.vendor_id = device.vendor_id.clone();
            drifted.push("vendor_id");
        }
        if self.name != device.name {
            self.name = device.name.clone();
            drifted.push("name");
        }
        if self.programmable != device.programmable {
            self.programmable = device.programmable;
            drifted.push("programmable");
        }

        drifted
    }

    /// free/error -> in-programing
    pub fn begin_programming(&mut self) {
        self.assignable = false;
        self.availability = Availability::InPrograming;
    }

    /// in-programing -> free, used when the driver cannot program this device
    pub fn rollback_programming(&mut self) {
        self.assignable = true;
        self.availability = Availability::Free;
    }

    /// in-programing -> free with the function now loaded
    pub fn complete_programming(&mut self, function: Option<String>) {
        self.assignable = true;
        self.availability = Availability::Free;
        self.function = function;
    }

    /// in-programing -> error
    pub fn fail_programming(&mut self) {
        self.availability = Availability::Error;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gpu() -> Device {
        Device::new(
            PciAddress::parse("0000:3b:00.0").unwrap(),
            DeviceCategory::Gpu,
            VendorId::new(VendorId::NVIDIA).unwrap(),
            "1eb8",
            "TU104GL [Tesla T4]",
        )
    }

    #[test]
    fn test_from_device_defaults() {
        let dep = Deployable::from_device("compute-1", &gpu(), None);
        assert_eq!(dep.host, "compute-1");
        assert_eq!(dep.availability, Availability::Free);
        assert_eq!(dep.version, DEPLOYABLE_VERSION);
        assert_eq!(dep.pcie_address, "0000:3b:00.0");
        assert!(dep.assignable);
        assert!(dep.parent_uuid.is_none());
        assert!(dep.function.is_none());
    }

    #[test]
    fn test_fresh_records_get_distinct_ids() {
        let a = Deployable::from_device("h", &gpu(), None);
        let b = Deployable::from_device("h", &gpu(), None);
        assert_ne!(a.uuid, b.uuid);
    }

    #[test]
    fn test_sync_with_reports_drift() {
        let device = gpu();
        let mut dep = Deployable::from_device("h", &device, None);
        assert!(dep.sync_with(&device).is_empty());

        let changed = device.clone().assignable(false);
        assert_eq!(dep.sync_with(&changed), vec!["assignable"]);
        assert!(!dep.assignable);
        assert!(dep.sync_with(&changed).is_empty());
    }

    #[test]
    fn test_sync_ignores_untracked_fields() {
        let device = gpu();
        let mut dep = Deployable::from_device("h", &device, None);
        dep.availability = Availability::Error;
        dep.function = Some("crypto".to_string());
        assert!(dep.sync_with(&device).is_empty());
        assert_eq!(dep.availability, Availability::Error);
    }

    #[test]
    fn test_sync_keeps_assignable_while_not_free() {
        let device = gpu();
        for availability in [Availability::Error, Availability::InPrograming] {
            let mut dep = Deployable::from_device("h", &device, None);
            dep.availability = availability;
            dep.assignable = false;

            assert!(dep.sync_with(&device).is_empty());
            assert!(!dep.assignable);
            assert_eq!(dep.availability, availability);
        }
    }

    #[test]
    fn test_programming_transitions() {
        let mut dep = Deployable::from_device("h", &gpu(), None);

        dep.begin_programming();
        assert!(!dep.assignable);
        assert_eq!(dep.availability, Availability::InPrograming);

        dep.rollback_programming();
        assert!(dep.assignable);
        assert_eq!(dep.availability, Availability::Free);

        dep.begin_programming();
        dep.fail_programming();
        assert_eq!(dep.availability, Availability::Error);
        assert!(!dep.assignable);

        dep.begin_programming();
        dep.complete_programming(Some("gzip".to_string()));
        assert_eq!(dep.availability, Availability::Free);
        assert_eq!(dep.function.as_deref(), Some("gzip"));
    }

    #[test]
    fn test_wire_format_uses_type_key() {
        let dep = Deployable::from_device("h", &gpu(), None);
        let value = serde_json::to_value(&dep).unwrap();
        assert_eq!(value["type"], "GPU");
        assert_eq!(value["availability"], "free");
        assert_eq!(value["vendor_id"], "10de");
    }
}
