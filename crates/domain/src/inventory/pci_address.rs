//! PCI bus addresses
//!
//! A device is keyed by its `domain:bus:device.function` address. Discovery
//! tools report the short `bus:device.function` form and older catalog records
//! use a colon-only `domain:bus:device:function` form; both are normalized to
//! the canonical form on parse.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::shared_kernel::{DomainError, DomainResult};

const MAX_DEVICE: u8 = 0x1f;
const MAX_FUNCTION: u8 = 0x7;

/// Validated PCI address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PciAddress {
    domain: u16,
    bus: u8,
    device: u8,
    function: u8,
}

impl PciAddress {
    pub fn new(domain: u16, bus: u8, device: u8, function: u8) -> DomainResult<Self> {
        let address = Self {
            domain,
            bus,
            device,
            function,
        };
        if device > MAX_DEVICE {
            return Err(invalid(&address.to_string(), "device number above 0x1f"));
        }
        if function > MAX_FUNCTION {
            return Err(invalid(&address.to_string(), "function number above 7"));
        }
        Ok(address)
    }

    pub fn parse(raw: &str) -> DomainResult<Self> {
        let raw = raw.trim();
        let parts: Vec<&str> = raw.split(':').collect();

        let (domain, bus, device, function) = match parts.as_slice() {
            [bus, slot] => {
                let (device, function) = split_slot(raw, slot)?;
                ("0000", *bus, device, function)
            }
            [domain, bus, slot] => {
                let (device, function) = split_slot(raw, slot)?;
                (*domain, *bus, device, function)
            }
            [domain, bus, device, function] => (*domain, *bus, *device, *function),
            _ => return Err(invalid(raw, "expected domain:bus:device.function")),
        };

        let domain = hex_field(raw, "domain", domain, 4)?;
        let bus = hex_field(raw, "bus", bus, 2)?;
        let device = hex_field(raw, "device", device, 2)?;
        let function = hex_field(raw, "function", function, 1)?;

        Self::new(domain as u16, bus as u8, device as u8, function as u8)
            .map_err(|_| invalid(raw, "device or function number out of range"))
    }

    pub fn domain(&self) -> u16 {
        self.domain
    }

    pub fn bus(&self) -> u8 {
        self.bus
    }

    pub fn device(&self) -> u8 {
        self.device
    }

    pub fn function(&self) -> u8 {
        self.function
    }

    /// Address of the physical function sharing this device slot
    pub fn physical_function(&self) -> PciAddress {
        PciAddress {
            function: 0,
            ..*self
        }
    }

    pub fn is_physical_function(&self) -> bool {
        self.function == 0
    }

    /// `bus:device.function`, the form vendor tooling expects
    pub fn short_form(&self) -> String {
        format!("{:02x}:{:02x}.{:x}", self.bus, self.device, self.function)
    }
}

fn split_slot<'a>(raw: &str, slot: &'a str) -> DomainResult<(&'a str, &'a str)> {
    slot.split_once('.')
        .ok_or_else(|| invalid(raw, "missing '.' between device and function"))
}

fn hex_field(raw: &str, name: &str, value: &str, width: usize) -> DomainResult<u32> {
    if value.len() != width || !value.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid(
            raw,
            &format!("{} must be {} hex digit(s)", name, width),
        ));
    }
    u32::from_str_radix(value, 16).map_err(|e| invalid(raw, &e.to_string()))
}

fn invalid(address: &str, reason: &str) -> DomainError {
    DomainError::InvalidPciAddress {
        address: address.to_string(),
        reason: reason.to_string(),
    }
}

impl std::fmt::Display for PciAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:04x}:{:02x}:{:02x}.{:x}",
            self.domain, self.bus, self.device, self.function
        )
    }
}

impl FromStr for PciAddress {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PciAddress::parse(s)
    }
}

impl TryFrom<String> for PciAddress {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        PciAddress::parse(&value)
    }
}

impl From<PciAddress> for String {
    fn from(value: PciAddress) -> Self {
        value.to_string()
    }
}
