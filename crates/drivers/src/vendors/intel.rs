//! Intel QAT co-processor driver

use accel_domain::{Device, DeviceCategory, VendorId};
use async_trait::async_trait;

use crate::sysinfo::LspciProbe;
use crate::traits::AcceleratorDriver;
use crate::DriverError;

const QAT_FUNCTION: &str = "QAT";

pub struct IntelQatDriver {
    probe: LspciProbe,
}

impl IntelQatDriver {
    pub fn new(probe: LspciProbe) -> Self {
        Self { probe }
    }
}

#[async_trait]
impl AcceleratorDriver for IntelQatDriver {
    fn name(&self) -> &'static str {
        "intel-qat"
    }

    async fn discover(&self) -> Result<Vec<Device>, DriverError> {
        let entries = self
            .probe
            .list_category(DeviceCategory::CoProcessor, Some(VendorId::INTEL))
            .await?;

        Ok(entries
            .into_iter()
            .map(|entry| {
                Device::new(
                    entry.address,
                    DeviceCategory::CoProcessor,
                    entry.vendor_id,
                    entry.product_id,
                    entry.name,
                )
                .with_function(QAT_FUNCTION)
            })
            .collect())
    }
}
