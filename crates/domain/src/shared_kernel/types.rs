//! Core types shared across the inventory model
//!
//! Contains primitive value objects and enums that are fundamental
//! to devices and deployables

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::error::DomainError;

/// Accelerator family a device belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DeviceCategory {
    #[serde(rename = "GPU")]
    Gpu,
    #[serde(rename = "FPGA")]
    Fpga,
    #[serde(rename = "Co-processor")]
    CoProcessor,
}

impl DeviceCategory {
    /// Categories in the order a periodic sweep reconciles them
    pub const SWEEP_ORDER: [DeviceCategory; 3] = [
        DeviceCategory::Gpu,
        DeviceCategory::CoProcessor,
        DeviceCategory::Fpga,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceCategory::Gpu => "GPU",
            DeviceCategory::Fpga => "FPGA",
            DeviceCategory::CoProcessor => "Co-processor",
        }
    }

    /// Whether devices of this category may expose dependent regions
    pub fn is_hierarchical(&self) -> bool {
        matches!(self, DeviceCategory::Fpga)
    }
}

impl std::fmt::Display for DeviceCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DeviceCategory {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GPU" => Ok(DeviceCategory::Gpu),
            "FPGA" => Ok(DeviceCategory::Fpga),
            "Co-processor" => Ok(DeviceCategory::CoProcessor),
            other => Err(DomainError::UnknownCategory(other.to_string())),
        }
    }
}

/// Availability of a deployable as seen by schedulers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Availability {
    #[serde(rename = "free")]
    Free,
    #[serde(rename = "in-programing")]
    InPrograming,
    #[serde(rename = "error")]
    Error,
}

impl Availability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Availability::Free => "free",
            Availability::InPrograming => "in-programing",
            Availability::Error => "error",
        }
    }
}

impl std::fmt::Display for Availability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Availability {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(Availability::Free),
            "in-programing" => Ok(Availability::InPrograming),
            "error" => Ok(Availability::Error),
            other => Err(DomainError::UnknownAvailability(other.to_string())),
        }
    }
}

/// PCI vendor identifier, four lowercase hex digits
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VendorId(String);

impl VendorId {
    pub const NVIDIA: &'static str = "10de";
    pub const INTEL: &'static str = "8086";
    pub const XILINX: &'static str = "10ee";

    pub fn new(id: &str) -> Result<Self, DomainError> {
        if id.len() == 4 && id.chars().all(|c| c.is_ascii_hexdigit()) {
            Ok(Self(id.to_ascii_lowercase()))
        } else {
            Err(DomainError::InvalidVendorId(id.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn nvidia() -> Self {
        Self(Self::NVIDIA.to_string())
    }

    pub fn intel() -> Self {
        Self(Self::INTEL.to_string())
    }

    pub fn xilinx() -> Self {
        Self(Self::XILINX.to_string())
    }
}

impl FromStr for VendorId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VendorId::new(s)
    }
}

impl TryFrom<String> for VendorId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        VendorId::new(&value)
    }
}

impl From<VendorId> for String {
    fn from(value: VendorId) -> Self {
        value.0
    }
}

impl std::fmt::Display for VendorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
