//! Test doubles for drivers and host tooling
//!
//! Enabled for this crate's own tests and, through the `testing` feature,
//! for downstream crates.

use accel_domain::{Deployable, Device, DeviceCategory, VendorId};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::time::Instant;

use crate::sysinfo::{CommandOutput, CommandRunner};
use crate::traits::{AcceleratorDriver, VendorProbe};
use crate::DriverError;

/// Returns canned output keyed by the full command line
#[derive(Default)]
pub struct StaticCommandRunner {
    responses: HashMap<String, Result<CommandOutput, DriverError>>,
    calls: Mutex<Vec<String>>,
}

impl StaticCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(mut self, command_line: &str, stdout: &str) -> Self {
        self.responses.insert(
            command_line.to_string(),
            Ok(CommandOutput {
                status_code: Some(0),
                stdout: stdout.to_string(),
            }),
        );
        self
    }

    pub fn with_failure(mut self, command_line: &str, status_code: i32) -> Self {
        self.responses.insert(
            command_line.to_string(),
            Ok(CommandOutput {
                status_code: Some(status_code),
                stdout: String::new(),
            }),
        );
        self
    }

    pub fn with_error(mut self, command_line: &str, error: DriverError) -> Self {
        self.responses.insert(command_line.to_string(), Err(error));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for StaticCommandRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, DriverError> {
        let mut line = program.to_string();
        for arg in args {
            line.push(' ');
            line.push_str(arg);
        }
        self.calls.lock().unwrap().push(line.clone());
        self.responses
            .get(&line)
            .cloned()
            .unwrap_or_else(|| Err(DriverError::ShellExecFailed(format!("unscripted: {}", line))))
    }
}

/// Vendor probe with a fixed answer per category
#[derive(Default)]
pub struct StaticVendorProbe {
    vendors: HashMap<DeviceCategory, BTreeSet<VendorId>>,
}

impl StaticVendorProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vendor(mut self, category: DeviceCategory, vendor: &str) -> Self {
        let vendor = VendorId::new(vendor).expect("valid vendor id in test setup");
        self.vendors.entry(category).or_default().insert(vendor);
        self
    }
}

#[async_trait]
impl VendorProbe for StaticVendorProbe {
    async fn discover_vendors(
        &self,
        category: DeviceCategory,
    ) -> Result<BTreeSet<VendorId>, DriverError> {
        Ok(self.vendors.get(&category).cloned().unwrap_or_default())
    }
}

/// Driver whose answers are scripted by the test
pub struct ScriptedDriver {
    devices: Mutex<Vec<Device>>,
    program_error: Mutex<Option<DriverError>>,
    status_script: Mutex<VecDeque<Result<bool, DriverError>>>,
    function: Mutex<Option<String>>,
    programmed: Mutex<Vec<PathBuf>>,
    status_checks: Mutex<Vec<Instant>>,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self {
            devices: Mutex::new(Vec::new()),
            program_error: Mutex::new(None),
            status_script: Mutex::new(VecDeque::new()),
            function: Mutex::new(None),
            programmed: Mutex::new(Vec::new()),
            status_checks: Mutex::new(Vec::new()),
        }
    }

    pub fn set_devices(&self, devices: Vec<Device>) {
        *self.devices.lock().unwrap() = devices;
    }

    pub fn fail_program_with(&self, error: DriverError) {
        *self.program_error.lock().unwrap() = Some(error);
    }

    /// Queue status answers; once exhausted every check reports "not done"
    pub fn script_status(&self, answers: Vec<Result<bool, DriverError>>) {
        *self.status_script.lock().unwrap() = answers.into();
    }

    pub fn set_function(&self, function: &str) {
        *self.function.lock().unwrap() = Some(function.to_string());
    }

    pub fn programmed_images(&self) -> Vec<PathBuf> {
        self.programmed.lock().unwrap().clone()
    }

    /// Instants at which `check_program_status` was called
    pub fn status_checks(&self) -> Vec<Instant> {
        self.status_checks.lock().unwrap().clone()
    }
}

impl Default for ScriptedDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AcceleratorDriver for ScriptedDriver {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn discover(&self) -> Result<Vec<Device>, DriverError> {
        Ok(self.devices.lock().unwrap().clone())
    }

    async fn program(&self, _deployable: &Deployable, image: &Path) -> Result<(), DriverError> {
        self.programmed.lock().unwrap().push(image.to_path_buf());
        match self.program_error.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn check_program_status(&self, _deployable: &Deployable) -> Result<bool, DriverError> {
        self.status_checks.lock().unwrap().push(Instant::now());
        self.status_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(false))
    }

    async fn get_function(&self, deployable: &Deployable) -> Result<Option<String>, DriverError> {
        Ok(self
            .function
            .lock()
            .unwrap()
            .clone()
            .or_else(|| deployable.function.clone()))
    }
}
