//! Shared Kernel - Common types shared across the inventory model
//!
//! This module contains:
//! - Error types and DomainResult
//! - Core enums and identifiers (DeviceCategory, Availability, VendorId)

pub mod error;
pub mod types;

pub use error::{DomainError, DomainResult};
pub use types::*;
