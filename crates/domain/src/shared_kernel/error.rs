//! Domain Error Types
//!
//! Centralized error handling for the domain layer

/// Result type for domain operations
pub type DomainResult<T> = std::result::Result<T, DomainError>;

/// Main domain error enum
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid PCI address '{address}': {reason}")]
    InvalidPciAddress { address: String, reason: String },

    #[error("Unknown device category: {0}")]
    UnknownCategory(String),

    #[error("Unknown availability state: {0}")]
    UnknownAvailability(String),

    #[error("Invalid vendor id: {0}")]
    InvalidVendorId(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),
}
