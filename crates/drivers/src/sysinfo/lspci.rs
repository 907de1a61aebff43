//! `lspci -nnn` parsing
//!
//! A line looks like
//! `3b:00.0 3D controller [0302]: NVIDIA Corporation GV100GL [Tesla V100] [10de:1db4] (rev a1)`:
//! slot, class name with numeric class, then the device description ending
//! in a `[vendor:product]` pair.

use accel_domain::{DeviceCategory, PciAddress, VendorId};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

use super::CommandRunner;
use crate::traits::VendorProbe;
use crate::DriverError;

const GPU_CLASSES: [&str; 2] = ["VGA compatible controller", "3D controller"];
const CO_PROCESSOR_CLASS: &str = "Co-processor";
const CO_PROCESSOR_MARKERS: [&str; 2] = ["QAT", "Intel Corporation Device"];
const FPGA_CLASS: &str = "Memory controller";
const FPGA_MARKER: &str = "Xilinx";

/// One parsed lspci line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LspciEntry {
    pub address: PciAddress,
    pub class_name: String,
    pub class_code: Option<String>,
    pub name: String,
    pub vendor_id: VendorId,
    pub product_id: String,
}

impl LspciEntry {
    pub fn parse(line: &str) -> Option<Self> {
        let (slot, rest) = line.trim().split_once(' ')?;
        let address = PciAddress::parse(slot).ok()?;
        let (class, description) = rest.split_once(": ")?;
        let (class_name, class_code) = split_class(class);
        let (name, vendor, product) = split_ids(description)?;

        Some(Self {
            address,
            class_name: class_name.to_string(),
            class_code: class_code.map(str::to_string),
            name: name.to_string(),
            vendor_id: VendorId::new(vendor).ok()?,
            product_id: product.to_ascii_lowercase(),
        })
    }

    pub fn matches_category(&self, category: DeviceCategory) -> bool {
        match category {
            DeviceCategory::Gpu => GPU_CLASSES.contains(&self.class_name.as_str()),
            DeviceCategory::CoProcessor => {
                self.class_name == CO_PROCESSOR_CLASS
                    && CO_PROCESSOR_MARKERS.iter().any(|m| self.name.contains(m))
            }
            DeviceCategory::Fpga => {
                self.class_name == FPGA_CLASS || self.name.contains(FPGA_MARKER)
            }
        }
    }
}

/// "3D controller [0302]" -> ("3D controller", Some("0302"))
fn split_class(class: &str) -> (&str, Option<&str>) {
    let class = class.trim();
    match class.rsplit_once(" [") {
        Some((name, code)) if code.ends_with(']') => (name, Some(&code[..code.len() - 1])),
        _ => (class, None),
    }
}

/// Finds the rightmost `[hhhh:hhhh]` and returns (name before it, vendor, product)
fn split_ids(description: &str) -> Option<(&str, &str, &str)> {
    for (idx, _) in description.rmatch_indices('[') {
        let Some(candidate) = description.get(idx + 1..idx + 11) else {
            continue;
        };
        let (Some(ids), Some("]")) = (candidate.get(..9), candidate.get(9..)) else {
            continue;
        };
        let Some((vendor, product)) = ids.split_once(':') else {
            continue;
        };
        let is_hex4 = |s: &str| s.len() == 4 && s.chars().all(|c| c.is_ascii_hexdigit());
        if is_hex4(vendor) && is_hex4(product) {
            return Some((description[..idx].trim_end(), vendor, product));
        }
    }
    None
}

/// Parse full `lspci -nnn` output, skipping lines that do not match
pub fn parse_output(output: &str) -> Vec<LspciEntry> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let entry = LspciEntry::parse(line);
            if entry.is_none() {
                debug!("Skipping unrecognized lspci line: {}", line);
            }
            entry
        })
        .collect()
}

/// Lists PCI devices through `lspci -nnn`
#[derive(Clone)]
pub struct LspciProbe {
    runner: Arc<dyn CommandRunner>,
}

impl LspciProbe {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    pub async fn list(&self) -> Result<Vec<LspciEntry>, DriverError> {
        let output = self.runner.run("lspci", &["-nnn".to_string()]).await?;
        if !output.success() {
            return Err(DriverError::ShellReturnFailed(format!(
                "lspci exited with {:?}",
                output.status_code
            )));
        }
        Ok(parse_output(&output.stdout))
    }

    /// Entries of one category, optionally restricted to one vendor
    pub async fn list_category(
        &self,
        category: DeviceCategory,
        vendor: Option<&str>,
    ) -> Result<Vec<LspciEntry>, DriverError> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|entry| entry.matches_category(category))
            .filter(|entry| vendor.map_or(true, |v| entry.vendor_id.as_str() == v))
            .collect())
    }
}

#[async_trait]
impl VendorProbe for LspciProbe {
    async fn discover_vendors(
        &self,
        category: DeviceCategory,
    ) -> Result<BTreeSet<VendorId>, DriverError> {
        let entries = self.list_category(category, None).await?;
        Ok(entries
            .into_iter()
            // co-processor vendors are identified by their physical functions
            .filter(|entry| {
                category != DeviceCategory::CoProcessor || entry.address.is_physical_function()
            })
            .map(|entry| entry.vendor_id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticCommandRunner;

    const SAMPLE: &str = "\
00:02.0 VGA compatible controller [0300]: Intel Corporation HD Graphics 630 [8086:5912] (rev 04)
3b:00.0 3D controller [0302]: NVIDIA Corporation GV100GL [Tesla V100 PCIe 16GB] [10de:1db4] (rev a1)
3d:00.0 Co-processor [0b40]: Intel Corporation DH895XCC Series QAT [8086:0435]
3d:01.0 Co-processor [0b40]: Intel Corporation DH895XCC Series QAT Virtual Function [8086:0443]
5e:00.0 Memory controller [0580]: Xilinx Corporation Device [10ee:5000]
5e:00.1 Memory controller [0580]: Xilinx Corporation Device [10ee:5001]
garbage line without structure
";

    #[test]
    fn test_parse_gpu_line() {
        let entry = LspciEntry::parse(
            "3b:00.0 3D controller [0302]: NVIDIA Corporation GV100GL [Tesla V100 PCIe 16GB] [10de:1db4] (rev a1)",
        )
        .unwrap();
        assert_eq!(entry.address.to_string(), "0000:3b:00.0");
        assert_eq!(entry.class_name, "3D controller");
        assert_eq!(entry.class_code.as_deref(), Some("0302"));
        assert_eq!(entry.name, "NVIDIA Corporation GV100GL [Tesla V100 PCIe 16GB]");
        assert_eq!(entry.vendor_id.as_str(), "10de");
        assert_eq!(entry.product_id, "1db4");
    }

    #[test]
    fn test_parse_output_skips_garbage() {
        let entries = parse_output(SAMPLE);
        assert_eq!(entries.len(), 6);
    }

    #[test]
    fn test_category_filters() {
        let entries = parse_output(SAMPLE);
        let count = |category| entries.iter().filter(|e| e.matches_category(category)).count();
        assert_eq!(count(DeviceCategory::Gpu), 2);
        assert_eq!(count(DeviceCategory::CoProcessor), 2);
        assert_eq!(count(DeviceCategory::Fpga), 2);
    }

    #[tokio::test]
    async fn test_discover_vendors_per_category() {
        let runner = StaticCommandRunner::new().with_output("lspci -nnn", SAMPLE);
        let probe = LspciProbe::new(Arc::new(runner));

        let gpu = probe.discover_vendors(DeviceCategory::Gpu).await.unwrap();
        assert_eq!(
            gpu.iter().map(VendorId::as_str).collect::<Vec<_>>(),
            vec!["10de", "8086"]
        );

        let qat = probe
            .discover_vendors(DeviceCategory::CoProcessor)
            .await
            .unwrap();
        assert_eq!(qat.len(), 1);
        assert!(qat.contains(&VendorId::new("8086").unwrap()));
    }

    #[tokio::test]
    async fn test_lspci_failure_is_reported() {
        let runner = StaticCommandRunner::new().with_failure("lspci -nnn", 1);
        let probe = LspciProbe::new(Arc::new(runner));
        let result = probe.discover_vendors(DeviceCategory::Gpu).await;
        assert!(matches!(result, Err(DriverError::ShellReturnFailed(_))));
    }
}
