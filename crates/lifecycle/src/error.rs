use accel_domain::Uuid;
use accel_drivers::DriverError;
use accel_ports::{CatalogError, FirmwareError};

/// Programming lifecycle errors
#[derive(thiserror::Error, Debug)]
pub enum ProgrammingError {
    #[error("Invalid firmware id '{0}'")]
    InvalidFirmwareId(String),

    #[error("Programming already in progress for deployable {0}")]
    AlreadyInProgress(Uuid),

    #[error("Programming controller is shutting down")]
    ShuttingDown,

    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Firmware error: {0}")]
    Firmware(#[from] FirmwareError),

    #[error("Firmware staging failed: {0}")]
    Staging(#[from] std::io::Error),
}

impl ProgrammingError {
    pub fn is_not_implemented(&self) -> bool {
        matches!(self, ProgrammingError::Driver(e) if e.is_not_implemented())
    }
}
