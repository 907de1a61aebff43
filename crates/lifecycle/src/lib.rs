//! Device Programming Lifecycle
//!
//! Loads firmware onto reconfigurable accelerators and tracks each request
//! through `free -> in-programing -> {free, error}`.
//!
//! Features:
//! - Firmware staging through the firmware store port
//! - Driver dispatch through the driver registry
//! - Background completion polling with a bounded retry budget
//! - One request per deployable at a time, bounded concurrency overall
//! - Event log and counters for observability

pub mod controller;
pub mod error;
pub mod events;

pub use controller::{ProgrammingConfig, ProgrammingController, ProgrammingOutcome, ProgrammingTask};
pub use error::ProgrammingError;
pub use events::{ProgrammingEvent, ProgrammingStage, ProgrammingStats};

pub type Result<T> = std::result::Result<T, ProgrammingError>;
