//! Models module
//!
//! Error type shared by every accelerator driver.

use accel_domain::{DeviceCategory, DomainError, VendorId};

/// Core error types for accelerator drivers
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// The driver does not support this operation for the device
    #[error("operation not implemented: {0}")]
    NotImplemented(String),

    /// The vendor helper binary could not be executed at all
    #[error("vendor tooling could not be executed: {0}")]
    ShellExecFailed(String),

    /// The vendor helper ran and reported failure
    #[error("vendor tooling reported failure: {0}")]
    ShellReturnFailed(String),

    #[error("driver execution failed: {0}")]
    Execution(String),

    #[error("unexpected tool output: {0}")]
    InvalidOutput(String),

    #[error("no driver registered for {category} vendor {vendor}")]
    NoDriver {
        category: DeviceCategory,
        vendor: VendorId,
    },

    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
}

impl DriverError {
    pub fn not_implemented(driver: &str, operation: &str) -> Self {
        DriverError::NotImplemented(format!("{} driver does not support {}", driver, operation))
    }

    pub fn is_not_implemented(&self) -> bool {
        matches!(self, DriverError::NotImplemented(_))
    }

    /// Failures of the tooling itself, never worth retrying
    pub fn is_tooling_failure(&self) -> bool {
        matches!(self, DriverError::ShellExecFailed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(DriverError::not_implemented("nvidia", "program").is_not_implemented());
        assert!(DriverError::ShellExecFailed("sudo".to_string()).is_tooling_failure());
        assert!(!DriverError::ShellReturnFailed("x".to_string()).is_tooling_failure());
        assert!(!DriverError::Execution("x".to_string()).is_not_implemented());
    }

    #[test]
    fn test_no_driver_display() {
        let err = DriverError::NoDriver {
            category: DeviceCategory::Fpga,
            vendor: VendorId::new("1172").unwrap(),
        };
        assert_eq!(err.to_string(), "no driver registered for FPGA vendor 1172");
    }
}
