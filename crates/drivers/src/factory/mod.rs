//! Driver Registry Module
//!
//! Explicit (category, vendor id) -> driver factory table, built once at
//! start-up and shared by the reconciliation engine and the programming
//! controller.

use accel_domain::{Deployable, DeviceCategory, VendorId};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::debug;

use crate::sysinfo::{CommandRunner, LspciProbe};
use crate::traits::{AcceleratorDriver, VendorProbe};
use crate::vendors::{IntelQatDriver, NvidiaGpuDriver, XilinxFpgaDriver};
use crate::DriverError;

pub type DriverFactory = Arc<dyn Fn() -> Arc<dyn AcceleratorDriver> + Send + Sync>;

pub struct DriverRegistry {
    probe: Arc<dyn VendorProbe>,
    factories: HashMap<(DeviceCategory, VendorId), DriverFactory>,
}

impl DriverRegistry {
    /// Empty registry; vendors are reported by `probe`
    pub fn new(probe: Arc<dyn VendorProbe>) -> Self {
        Self {
            probe,
            factories: HashMap::new(),
        }
    }

    /// Registry with the bundled drivers, all sharing `runner` for host tools
    pub fn with_builtin_drivers(runner: Arc<dyn CommandRunner>) -> Self {
        let lspci = LspciProbe::new(runner.clone());
        let mut registry = Self::new(Arc::new(lspci.clone()));

        let probe = lspci.clone();
        registry.register(
            DeviceCategory::Gpu,
            VendorId::nvidia(),
            Arc::new(move || -> Arc<dyn AcceleratorDriver> {
                Arc::new(NvidiaGpuDriver::new(probe.clone()))
            }),
        );

        let probe = lspci.clone();
        registry.register(
            DeviceCategory::CoProcessor,
            VendorId::intel(),
            Arc::new(move || -> Arc<dyn AcceleratorDriver> {
                Arc::new(IntelQatDriver::new(probe.clone()))
            }),
        );

        registry.register(
            DeviceCategory::Fpga,
            VendorId::xilinx(),
            Arc::new(move || -> Arc<dyn AcceleratorDriver> {
                Arc::new(XilinxFpgaDriver::new(lspci.clone(), runner.clone()))
            }),
        );

        registry
    }

    pub fn register(&mut self, category: DeviceCategory, vendor: VendorId, factory: DriverFactory) {
        debug!(category = %category, vendor = %vendor, "Registering accelerator driver");
        self.factories.insert((category, vendor), factory);
    }

    /// Vendors with at least one device of `category` on this host
    pub async fn discover_vendors(
        &self,
        category: DeviceCategory,
    ) -> Result<BTreeSet<VendorId>, DriverError> {
        self.probe.discover_vendors(category).await
    }

    pub fn create(
        &self,
        category: DeviceCategory,
        vendor: &VendorId,
    ) -> Option<Arc<dyn AcceleratorDriver>> {
        self.factories
            .get(&(category, vendor.clone()))
            .map(|factory| factory())
    }

    /// Driver responsible for an existing deployable
    pub fn driver_for(
        &self,
        deployable: &Deployable,
    ) -> Result<Arc<dyn AcceleratorDriver>, DriverError> {
        self.create(deployable.category, &deployable.vendor_id)
            .ok_or_else(|| DriverError::NoDriver {
                category: deployable.category,
                vendor: deployable.vendor_id.clone(),
            })
    }

    pub fn registered(&self) -> Vec<(DeviceCategory, VendorId)> {
        let mut keys: Vec<_> = self.factories.keys().cloned().collect();
        keys.sort();
        keys
    }
}
