//! Shared fixtures for the agent integration tests

#![allow(dead_code)]

use accel_adapters::InMemoryCatalog;
use accel_agent::{AgentManager, Config, ResourceTracker};
use accel_domain::{Deployable, Device, DeviceCategory, PciAddress, VendorId};
use accel_drivers::testing::{ScriptedDriver, StaticVendorProbe};
use accel_drivers::{AcceleratorDriver, DriverError, DriverRegistry};
use accel_ports::{FirmwareError, FirmwareStore};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

pub const HOST: &str = "compute-1";

/// Firmware store that writes a fixed payload for any reference except
/// `missing`
pub struct LocalFirmware;

#[async_trait]
impl FirmwareStore for LocalFirmware {
    async fn download(&self, reference: &str, dest_path: &Path) -> Result<(), FirmwareError> {
        if reference == "missing" {
            return Err(FirmwareError::NotFound(reference.to_string()));
        }
        tokio::fs::write(dest_path, b"bitstream").await?;
        Ok(())
    }
}

/// Driver whose discovery always fails
pub struct BrokenDriver;

#[async_trait]
impl AcceleratorDriver for BrokenDriver {
    fn name(&self) -> &'static str {
        "broken"
    }

    async fn discover(&self) -> Result<Vec<Device>, DriverError> {
        Err(DriverError::ShellExecFailed("lspci: not found".to_string()))
    }
}

pub fn addr(raw: &str) -> PciAddress {
    PciAddress::parse(raw).unwrap()
}

pub fn gpu(address: &str) -> Device {
    Device::new(
        addr(address),
        DeviceCategory::Gpu,
        VendorId::nvidia(),
        "1eb8",
        "NVIDIA Corporation TU104GL [Tesla T4]",
    )
}

pub fn fpga_card(address: &str) -> Device {
    Device::new(
        addr(address),
        DeviceCategory::Fpga,
        VendorId::xilinx(),
        "5000",
        "Xilinx Corporation Device",
    )
    .assignable(false)
}

pub fn fpga_region(address: &str) -> Device {
    Device::new(
        addr(address),
        DeviceCategory::Fpga,
        VendorId::xilinx(),
        "5001",
        "Xilinx Corporation Device",
    )
    .programmable(true)
    .with_function("none")
}

pub fn record(device: &Device) -> Deployable {
    Deployable::from_device(HOST, device, None)
}

/// Registry with one scripted driver per (category, vendor) pair
pub struct Drivers {
    pub registry: Arc<DriverRegistry>,
    pub gpu: Arc<ScriptedDriver>,
    pub fpga: Arc<ScriptedDriver>,
}

pub fn drivers(probe: StaticVendorProbe) -> Drivers {
    let gpu = Arc::new(ScriptedDriver::new());
    let fpga = Arc::new(ScriptedDriver::new());
    let mut registry = DriverRegistry::new(Arc::new(probe));

    let shared = gpu.clone();
    registry.register(
        DeviceCategory::Gpu,
        VendorId::nvidia(),
        Arc::new(move || shared.clone() as Arc<dyn AcceleratorDriver>),
    );
    let shared = fpga.clone();
    registry.register(
        DeviceCategory::Fpga,
        VendorId::xilinx(),
        Arc::new(move || shared.clone() as Arc<dyn AcceleratorDriver>),
    );

    Drivers {
        registry: Arc::new(registry),
        gpu,
        fpga,
    }
}

pub fn default_probe() -> StaticVendorProbe {
    StaticVendorProbe::new()
        .with_vendor(DeviceCategory::Gpu, VendorId::NVIDIA)
        .with_vendor(DeviceCategory::Fpga, VendorId::XILINX)
}

pub fn tracker(catalog: &InMemoryCatalog, drivers: &Drivers) -> ResourceTracker {
    ResourceTracker::new(HOST, Arc::new(catalog.clone()), drivers.registry.clone())
}

pub fn test_config(cache: &Path) -> Config {
    Config {
        host: HOST.to_string(),
        catalog_url: "memory://".to_string(),
        listen_addr: "127.0.0.1:0".to_string(),
        firmware_cache_folder: cache.join("firmware_cache"),
        use_sudo: false,
        ..Config::default()
    }
}

pub fn manager(config: Config, catalog: &InMemoryCatalog, drivers: &Drivers) -> AgentManager {
    AgentManager::new(
        config,
        Arc::new(catalog.clone()),
        Arc::new(LocalFirmware),
        drivers.registry.clone(),
    )
    .unwrap()
}
