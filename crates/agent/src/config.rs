//! Configuration management for the accelerator agent

use accel_domain::VendorId;
use accel_lifecycle::ProgrammingConfig;
use serde::{Deserialize, Serialize};
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    Missing(String),

    #[error("Invalid configuration value: {0}")]
    Invalid(String),
}

/// Catalog URL that selects the in-memory catalog
pub const MEMORY_CATALOG_URL: &str = "memory://";

/// Agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host identity used for catalog records
    pub host: String,

    /// Catalog service settings
    pub catalog_url: String,
    pub catalog_token: Option<String>,
    pub catalog_timeout_ms: u64,

    /// Firmware image service
    pub firmware_url: String,

    /// Agent RPC listener
    pub listen_addr: String,

    /// Reconciliation settings
    pub periodic_interval_secs: u64,
    pub legacy_fpga_vendor: Option<String>,

    /// Programming settings
    pub program_check_interval_secs: u64,
    pub program_retry_count: u32,
    pub firmware_cache_folder: PathBuf,
    pub max_concurrent_programming: usize,

    /// Run host tools through `sudo -n`
    pub use_sudo: bool,

    /// Logging settings
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            catalog_url: "http://localhost:6666".to_string(),
            catalog_token: None,
            catalog_timeout_ms: 10_000,
            firmware_url: "http://localhost:9292".to_string(),
            listen_addr: "0.0.0.0:6667".to_string(),
            periodic_interval_secs: 60,
            legacy_fpga_vendor: None,
            program_check_interval_secs: 10,
            program_retry_count: 6,
            firmware_cache_folder: PathBuf::from("/tmp/firmware_cache/"),
            max_concurrent_programming: 4,
            use_sudo: true,
            log_level: "info".to_string(),
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{}={}", name, value)))
}

impl Config {
    /// Load configuration from `ACCEL_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from any variable source, over the defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        // Host (defaults to the system hostname)
        if let Some(host) = lookup("ACCEL_HOST") {
            config.host = host;
        } else if let Ok(hostname) = hostname::get() {
            config.host = hostname.to_string_lossy().to_string();
        }

        if let Some(url) = lookup("ACCEL_CATALOG_URL") {
            config.catalog_url = url;
        }
        config.catalog_token = lookup("ACCEL_CATALOG_TOKEN").filter(|t| !t.is_empty());
        if let Some(timeout) = lookup("ACCEL_CATALOG_TIMEOUT_MS") {
            config.catalog_timeout_ms = parse_var("ACCEL_CATALOG_TIMEOUT_MS", &timeout)?;
        }

        if let Some(url) = lookup("ACCEL_FIRMWARE_URL") {
            config.firmware_url = url;
        }
        if let Some(addr) = lookup("ACCEL_LISTEN_ADDR") {
            config.listen_addr = addr;
        }

        if let Some(interval) = lookup("ACCEL_PERIODIC_INTERVAL_SECS") {
            config.periodic_interval_secs = parse_var("ACCEL_PERIODIC_INTERVAL_SECS", &interval)?;
        }
        config.legacy_fpga_vendor = lookup("ACCEL_LEGACY_FPGA_VENDOR").filter(|v| !v.is_empty());

        if let Some(interval) = lookup("ACCEL_PROGRAM_CHECK_INTERVAL_SECS") {
            config.program_check_interval_secs =
                parse_var("ACCEL_PROGRAM_CHECK_INTERVAL_SECS", &interval)?;
        }
        if let Some(count) = lookup("ACCEL_PROGRAM_RETRY_COUNT") {
            config.program_retry_count = parse_var("ACCEL_PROGRAM_RETRY_COUNT", &count)?;
        }
        if let Some(folder) = lookup("ACCEL_FIRMWARE_CACHE_FOLDER") {
            config.firmware_cache_folder = PathBuf::from(folder);
        }
        if let Some(max) = lookup("ACCEL_MAX_CONCURRENT_PROGRAMMING") {
            config.max_concurrent_programming =
                parse_var("ACCEL_MAX_CONCURRENT_PROGRAMMING", &max)?;
        }

        if let Some(sudo) = lookup("ACCEL_USE_SUDO") {
            config.use_sudo = parse_var("ACCEL_USE_SUDO", &sudo.to_lowercase())?;
        }

        if let Some(level) = lookup("ACCEL_LOG_LEVEL") {
            config.log_level = level;
        }

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Missing("ACCEL_HOST".to_string()));
        }

        if self.catalog_url.trim().is_empty() {
            return Err(ConfigError::Missing("ACCEL_CATALOG_URL".to_string()));
        }

        if self.periodic_interval_secs == 0 || self.program_check_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "intervals must be at least one second".to_string(),
            ));
        }

        if self.program_retry_count == 0 {
            return Err(ConfigError::Invalid(
                "program_retry_count cannot be 0".to_string(),
            ));
        }

        if self.max_concurrent_programming == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_programming cannot be 0".to_string(),
            ));
        }

        if self.firmware_cache_folder.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "firmware_cache_folder cannot be empty".to_string(),
            ));
        }

        self.listen_socket_addr()?;
        self.legacy_vendor()?;

        Ok(())
    }

    pub fn uses_memory_catalog(&self) -> bool {
        self.catalog_url == MEMORY_CATALOG_URL
    }

    pub fn listen_socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen_addr
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("listen_addr {}", self.listen_addr)))
    }

    pub fn legacy_vendor(&self) -> Result<Option<VendorId>, ConfigError> {
        self.legacy_fpga_vendor
            .as_deref()
            .map(|vendor| {
                VendorId::new(vendor)
                    .map_err(|e| ConfigError::Invalid(format!("legacy_fpga_vendor: {}", e)))
            })
            .transpose()
    }

    pub fn periodic_interval(&self) -> Duration {
        Duration::from_secs(self.periodic_interval_secs)
    }

    pub fn catalog_timeout(&self) -> Duration {
        Duration::from_millis(self.catalog_timeout_ms)
    }

    pub fn programming(&self) -> ProgrammingConfig {
        ProgrammingConfig {
            firmware_cache_folder: self.firmware_cache_folder.clone(),
            program_check_interval: Duration::from_secs(self.program_check_interval_secs),
            program_retry_count: self.program_retry_count,
            max_concurrent_programming: self.max_concurrent_programming,
        }
    }
}
