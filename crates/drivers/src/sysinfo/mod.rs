//! Host probing helpers
//!
//! Vendor drivers shell out to bus-probing and vendor control utilities.
//! Every invocation goes through [`CommandRunner`] so parsing can be tested
//! against captured output.

pub mod lspci;

use async_trait::async_trait;
use tracing::debug;

use crate::DriverError;

pub use lspci::{LspciEntry, LspciProbe};

/// Captured result of one external command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub status_code: Option<i32>,
    pub stdout: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status_code == Some(0)
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args` and capture stdout.
    ///
    /// Fails with [`DriverError::ShellExecFailed`] only when the process could
    /// not be started or waited on; a non-zero exit is reported in the output.
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, DriverError>;
}

/// Runs commands on the host, optionally through `sudo`
#[derive(Debug, Clone)]
pub struct SystemCommandRunner {
    privileged: bool,
}

impl SystemCommandRunner {
    pub fn new(privileged: bool) -> Self {
        Self { privileged }
    }
}

impl Default for SystemCommandRunner {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, DriverError> {
        let mut command = if self.privileged {
            let mut command = tokio::process::Command::new("sudo");
            command.arg("-n").arg(program);
            command
        } else {
            tokio::process::Command::new(program)
        };
        command.args(args);
        command.stdin(std::process::Stdio::null());

        debug!("Running {} {:?}", program, args);
        let output = command
            .output()
            .await
            .map_err(|e| DriverError::ShellExecFailed(format!("{}: {}", program, e)))?;

        Ok(CommandOutput {
            status_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        })
    }
}
