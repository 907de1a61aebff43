//! NVIDIA GPU driver
//!
//! Discovery only; GPUs carry no loadable firmware.

use accel_domain::{Device, DeviceCategory, VendorId};
use async_trait::async_trait;

use crate::sysinfo::LspciProbe;
use crate::traits::AcceleratorDriver;
use crate::DriverError;

pub struct NvidiaGpuDriver {
    probe: LspciProbe,
}

impl NvidiaGpuDriver {
    pub fn new(probe: LspciProbe) -> Self {
        Self { probe }
    }
}

#[async_trait]
impl AcceleratorDriver for NvidiaGpuDriver {
    fn name(&self) -> &'static str {
        "nvidia"
    }

    async fn discover(&self) -> Result<Vec<Device>, DriverError> {
        let entries = self
            .probe
            .list_category(DeviceCategory::Gpu, Some(VendorId::NVIDIA))
            .await?;

        Ok(entries
            .into_iter()
            .map(|entry| {
                Device::new(
                    entry.address,
                    DeviceCategory::Gpu,
                    entry.vendor_id,
                    entry.product_id,
                    entry.name,
                )
            })
            .collect())
    }
}
