//! Resource tracker
//!
//! Converges the catalog's deployables for this host with the devices the
//! vendor drivers report. One run handles one category: discover, snapshot,
//! then diff on bus address.

mod report;

pub use report::{ReconcileOperation, ReconcileReport, SkippedOperation};

use accel_domain::{Deployable, Device, DeviceCategory, PciAddress, Uuid, VendorId};
use accel_drivers::{DriverError, DriverRegistry};
use accel_ports::{CatalogClient, CatalogError};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Failures that abort a run before any catalog change
#[derive(thiserror::Error, Debug)]
pub enum ReconcileError {
    #[error("Device discovery failed: {0}")]
    Discovery(#[from] DriverError),

    #[error("Catalog snapshot failed: {0}")]
    Snapshot(#[from] CatalogError),
}

pub struct ResourceTracker {
    host: String,
    catalog: Arc<dyn CatalogClient>,
    drivers: Arc<DriverRegistry>,
    updates: Mutex<()>,
}

impl ResourceTracker {
    pub fn new(host: &str, catalog: Arc<dyn CatalogClient>, drivers: Arc<DriverRegistry>) -> Self {
        Self {
            host: host.to_string(),
            catalog,
            drivers,
            updates: Mutex::new(()),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Reconcile every vendor reporting devices of `category`
    pub async fn reconcile(
        &self,
        category: DeviceCategory,
    ) -> Result<ReconcileReport, ReconcileError> {
        let _updates = self.updates.lock().await;
        let vendors = self.drivers.discover_vendors(category).await?;
        self.run(category, vendors).await
    }

    /// Reconcile a single vendor's devices of `category`
    pub async fn reconcile_vendor(
        &self,
        category: DeviceCategory,
        vendor: &VendorId,
    ) -> Result<ReconcileReport, ReconcileError> {
        let _updates = self.updates.lock().await;
        self.run(category, BTreeSet::from([vendor.clone()])).await
    }

    async fn run(
        &self,
        category: DeviceCategory,
        vendors: BTreeSet<VendorId>,
    ) -> Result<ReconcileReport, ReconcileError> {
        let mut report = ReconcileReport::new(&self.host, category);

        let discovered = self.discover(category, &vendors).await?;
        let records = self.catalog.list_by_host(&self.host).await?;
        let (snapshot, duplicates) = self.index_snapshot(category, records, &mut report);

        debug!(
            host = %self.host,
            category = %category,
            discovered = discovered.len(),
            catalogued = snapshot.len(),
            "Diffing device inventory"
        );

        self.update_drifted(&discovered, &snapshot, &mut report).await;
        self.create_new(&discovered, &snapshot, &mut report).await;

        let mut stale: Vec<&Deployable> = snapshot
            .iter()
            .filter(|(address, _)| !discovered.contains_key(address))
            .map(|(_, record)| record)
            .chain(duplicates.iter())
            .collect();
        // children before their parents
        stale.sort_by_key(|record| record.parent_uuid.is_none());
        self.delete_stale(stale, &mut report).await;

        report.log_summary();
        Ok(report)
    }

    async fn discover(
        &self,
        category: DeviceCategory,
        vendors: &BTreeSet<VendorId>,
    ) -> Result<BTreeMap<PciAddress, Device>, DriverError> {
        let mut devices = BTreeMap::new();

        for vendor in vendors {
            let Some(driver) = self.drivers.create(category, vendor) else {
                warn!(category = %category, vendor = %vendor, "No driver registered, skipping vendor");
                continue;
            };
            let found = driver.discover().await?;
            debug!(driver = driver.name(), count = found.len(), "Discovered devices");
            flatten(found, None, &mut devices);
        }

        Ok(devices)
    }

    /// Index this category's records by address. Records sharing an
    /// address with an earlier one are returned separately.
    fn index_snapshot(
        &self,
        category: DeviceCategory,
        records: Vec<Deployable>,
        report: &mut ReconcileReport,
    ) -> (BTreeMap<PciAddress, Deployable>, Vec<Deployable>) {
        let mut snapshot = BTreeMap::new();
        let mut duplicates = Vec::new();

        for record in records.into_iter().filter(|r| r.category == category) {
            let address = match record.address() {
                Ok(address) => address,
                Err(e) => {
                    report.skip(
                        record.pcie_address.clone(),
                        ReconcileOperation::Inspect,
                        format!("record {} left alone: {}", record.uuid, e),
                    );
                    continue;
                }
            };
            if snapshot.contains_key(&address) {
                warn!(uuid = %record.uuid, address = %address, "Duplicate deployable for address");
                duplicates.push(record);
            } else {
                snapshot.insert(address, record);
            }
        }

        (snapshot, duplicates)
    }

    async fn update_drifted(
        &self,
        discovered: &BTreeMap<PciAddress, Device>,
        snapshot: &BTreeMap<PciAddress, Deployable>,
        report: &mut ReconcileReport,
    ) {
        for (address, record) in snapshot {
            let Some(device) = discovered.get(address) else {
                continue;
            };
            let mut record = record.clone();
            let drifted = record.sync_with(device);
            if drifted.is_empty() {
                continue;
            }

            info!(uuid = %record.uuid, address = %address, fields = ?drifted, "Updating drifted deployable");
            match self.catalog.update(&record).await {
                Ok(()) => report.updated.push(address.to_string()),
                Err(e) => report.skip(address.to_string(), ReconcileOperation::Update, e.to_string()),
            }
        }
    }

    async fn create_new(
        &self,
        discovered: &BTreeMap<PciAddress, Device>,
        snapshot: &BTreeMap<PciAddress, Deployable>,
        report: &mut ReconcileReport,
    ) {
        // stale records are deleted later in the run and cannot anchor children
        let mut known: HashMap<PciAddress, Uuid> = snapshot
            .iter()
            .filter(|(address, _)| discovered.contains_key(address))
            .map(|(address, record)| (*address, record.uuid))
            .collect();
        let mut failed: HashSet<PciAddress> = HashSet::new();
        let mut pending: Vec<&Device> = discovered
            .iter()
            .filter(|(address, _)| !snapshot.contains_key(address))
            .map(|(_, device)| device)
            .collect();

        // Each pass creates every device whose parent is resolved; parents
        // created in one pass release their children in the next.
        while !pending.is_empty() {
            let mut waiting = Vec::new();
            let mut progressed = false;

            for device in pending {
                let parent_uuid = match device.parent {
                    None => None,
                    Some(parent) => match known.get(&parent) {
                        Some(uuid) => Some(*uuid),
                        None if failed.contains(&parent) || !discovered.contains_key(&parent) => {
                            failed.insert(device.address);
                            report.skip(
                                device.address.to_string(),
                                ReconcileOperation::Attach,
                                format!("parent {} is not present on this host", parent),
                            );
                            progressed = true;
                            continue;
                        }
                        None => {
                            waiting.push(device);
                            continue;
                        }
                    },
                };

                progressed = true;
                let deployable = Deployable::from_device(&self.host, device, parent_uuid);
                info!(address = %device.address, uuid = %deployable.uuid, "Creating deployable");
                match self.catalog.create(&deployable).await {
                    Ok(created) => {
                        known.insert(device.address, created.uuid);
                        report.created.push(device.address.to_string());
                    }
                    Err(e) => {
                        failed.insert(device.address);
                        report.skip(
                            device.address.to_string(),
                            ReconcileOperation::Create,
                            e.to_string(),
                        );
                    }
                }
            }

            if !progressed {
                for device in waiting {
                    report.skip(
                        device.address.to_string(),
                        ReconcileOperation::Attach,
                        "parent chain never resolved",
                    );
                }
                break;
            }
            pending = waiting;
        }
    }

    async fn delete_stale(&self, stale: Vec<&Deployable>, report: &mut ReconcileReport) {
        for record in stale {
            info!(uuid = %record.uuid, address = %record.pcie_address, "Deleting stale deployable");
            match self.catalog.delete(record).await {
                Ok(()) => report.deleted.push(record.pcie_address.clone()),
                Err(e) => report.skip(
                    record.pcie_address.clone(),
                    ReconcileOperation::Delete,
                    e.to_string(),
                ),
            }
        }
    }
}

/// Flatten region trees into `out`; regions without an explicit parent hang
/// off the device that reported them.
fn flatten(devices: Vec<Device>, owner: Option<PciAddress>, out: &mut BTreeMap<PciAddress, Device>) {
    for mut device in devices {
        if device.parent.is_none() {
            device.parent = owner;
        }
        let regions = std::mem::take(&mut device.regions);
        let address = device.address;
        if out.insert(address, device).is_some() {
            warn!(address = %address, "Device reported twice, keeping the last report");
        }
        flatten(regions, Some(address), out);
    }
}
