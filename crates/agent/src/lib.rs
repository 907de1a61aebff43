//! Accelerator Agent - host-side inventory and programming service
//!
//! Runs on every compute host with accelerators attached. It keeps the
//! remote catalog's deployables in step with the GPUs, FPGAs and
//! co-processors the vendor drivers find on this host, and programs FPGA
//! regions when the control plane asks for it.

pub mod api;
pub mod config;
pub mod manager;
pub mod rpc;
pub mod tracker;

pub use api::{router, AppState, ProgramAccepted, ProgramRequest};
pub use config::{Config, ConfigError};
pub use manager::AgentManager;
pub use rpc::{compute_host, AgentClient};
pub use tracker::{ReconcileError, ReconcileOperation, ReconcileReport, ResourceTracker, SkippedOperation};

use accel_domain::Uuid;
use accel_lifecycle::ProgrammingError;
use accel_ports::CatalogError;

/// Agent result type
pub type Result<T> = std::result::Result<T, AgentError>;

/// Agent error types
#[derive(thiserror::Error, Debug)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Reconciliation error: {0}")]
    Reconcile(#[from] ReconcileError),

    #[error("Programming error: {0}")]
    Programming(#[from] ProgrammingError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Deployable not found on this host: {0}")]
    DeployableNotFound(Uuid),

    #[error("No host found for the request")]
    HostNotFound,

    #[error("Agent RPC failed: {0}")]
    Rpc(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
