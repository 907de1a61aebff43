//! Xilinx FPGA driver
//!
//! Cards expose a static shell on PCI function 0 and one reconfigurable
//! role region per further function. Everything past lspci goes through the
//! vendor's `shell_role` tool, which answers each sub-command with a single
//! JSON line such as `{"result": "custom", "ID": "gzip-v2"}`.

use accel_domain::{Deployable, Device, DeviceCategory, PciAddress, VendorId};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::sysinfo::{CommandRunner, LspciEntry, LspciProbe};
use crate::traits::AcceleratorDriver;
use crate::DriverError;

const SHELL_ROLE: &str = "shell_role";
const SUPPORTED_SHELLS: [&str; 1] = ["Lenovo_thinkcloud"];

#[derive(Debug, Deserialize)]
struct ShellRoleReply {
    result: String,
    #[serde(rename = "ID", default)]
    id: Option<String>,
}

pub struct XilinxFpgaDriver {
    probe: LspciProbe,
    runner: Arc<dyn CommandRunner>,
}

impl XilinxFpgaDriver {
    pub fn new(probe: LspciProbe, runner: Arc<dyn CommandRunner>) -> Self {
        Self { probe, runner }
    }

    async fn shell_role(&self, args: &[String]) -> Result<ShellRoleReply, DriverError> {
        let output = self.runner.run(SHELL_ROLE, args).await?;
        if !output.success() && output.stdout.trim().is_empty() {
            return Err(DriverError::ShellExecFailed(format!(
                "{} {} exited with status {:?}",
                SHELL_ROLE,
                args.join(" "),
                output.status_code
            )));
        }
        let line = output.stdout.lines().next().unwrap_or_default();
        let reply: ShellRoleReply = serde_json::from_str(line).map_err(|e| {
            DriverError::InvalidOutput(format!("{} {}: {}", SHELL_ROLE, args.join(" "), e))
        })?;

        if reply.result == "failed" {
            return Err(DriverError::ShellReturnFailed(format!(
                "{} {}",
                SHELL_ROLE,
                args.join(" ")
            )));
        }
        Ok(reply)
    }

    async fn shell_type(&self, shell: PciAddress) -> Result<Option<String>, DriverError> {
        let reply = self
            .shell_role(&["shell_type".to_string(), shell.short_form()])
            .await?;
        Ok((reply.result != "not found").then_some(reply.result))
    }

    async fn role_function(
        &self,
        shell: PciAddress,
        role: PciAddress,
    ) -> Result<Option<String>, DriverError> {
        let reply = self
            .shell_role(&[
                "get_function".to_string(),
                shell.short_form(),
                role.short_form(),
            ])
            .await?;
        if reply.result == "custom" {
            Ok(reply.id)
        } else {
            Ok(Some(reply.result))
        }
    }

    async fn card_tree(
        &self,
        shell: PciAddress,
        entries: Vec<LspciEntry>,
    ) -> Result<Vec<Device>, DriverError> {
        let mut root_entry = None;
        let mut regions = Vec::new();

        for entry in entries {
            if entry.address.is_physical_function() {
                root_entry = Some(entry);
                continue;
            }
            let function = self.role_function(shell, entry.address).await?;
            let mut region = Device::new(
                entry.address,
                DeviceCategory::Fpga,
                entry.vendor_id,
                entry.product_id,
                entry.name,
            )
            .programmable(true);
            region.function = function;
            regions.push(region);
        }

        match root_entry {
            Some(entry) => {
                let root = Device::new(
                    entry.address,
                    DeviceCategory::Fpga,
                    entry.vendor_id,
                    entry.product_id,
                    entry.name,
                )
                .assignable(false)
                .with_regions(regions);
                Ok(vec![root])
            }
            None => {
                warn!(shell = %shell, "Shell function not listed by lspci, reporting roles without parent");
                Ok(regions)
            }
        }
    }
}

#[async_trait]
impl AcceleratorDriver for XilinxFpgaDriver {
    fn name(&self) -> &'static str {
        "xilinx"
    }

    async fn discover(&self) -> Result<Vec<Device>, DriverError> {
        let entries = self
            .probe
            .list_category(DeviceCategory::Fpga, Some(VendorId::XILINX))
            .await?;

        let mut cards: BTreeMap<PciAddress, Vec<LspciEntry>> = BTreeMap::new();
        for entry in entries {
            cards
                .entry(entry.address.physical_function())
                .or_default()
                .push(entry);
        }

        let mut devices = Vec::new();
        for (shell, entries) in cards {
            match self.shell_type(shell).await? {
                Some(kind) if SUPPORTED_SHELLS.contains(&kind.as_str()) => {
                    devices.extend(self.card_tree(shell, entries).await?);
                }
                other => debug!(shell = %shell, shell_type = ?other, "Skipping unsupported FPGA shell"),
            }
        }
        Ok(devices)
    }

    async fn program(&self, deployable: &Deployable, image: &Path) -> Result<(), DriverError> {
        let role = deployable.address()?;
        let reply = self
            .shell_role(&[
                "program".to_string(),
                role.physical_function().short_form(),
                role.short_form(),
                image.display().to_string(),
            ])
            .await?;

        if reply.result == "success" {
            Ok(())
        } else {
            Err(DriverError::Execution(format!(
                "programming {} returned '{}'",
                role, reply.result
            )))
        }
    }

    async fn check_program_status(&self, deployable: &Deployable) -> Result<bool, DriverError> {
        let role = deployable.address()?;
        let reply = self
            .shell_role(&[
                "verify".to_string(),
                role.physical_function().short_form(),
                role.short_form(),
            ])
            .await?;

        match reply.result.as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(DriverError::InvalidOutput(format!(
                "verify {} returned '{}'",
                role, other
            ))),
        }
    }

    async fn get_function(&self, deployable: &Deployable) -> Result<Option<String>, DriverError> {
        let role = deployable.address()?;
        self.role_function(role.physical_function(), role).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticCommandRunner;

    const LSPCI: &str = "\
5e:00.0 Memory controller [0580]: Xilinx Corporation Device [10ee:5000]
5e:00.1 Memory controller [0580]: Xilinx Corporation Device [10ee:5001]
5e:00.2 Memory controller [0580]: Xilinx Corporation Device [10ee:5001]
af:00.0 Memory controller [0580]: Xilinx Corporation Device [10ee:5000]
3b:00.0 3D controller [0302]: NVIDIA Corporation TU104GL [Tesla T4] [10de:1eb8] (rev a1)
";

    fn scripted() -> StaticCommandRunner {
        StaticCommandRunner::new()
            .with_output("lspci -nnn", LSPCI)
            .with_output("shell_role shell_type 5e:00.0", r#"{"result": "Lenovo_thinkcloud"}"#)
            .with_output("shell_role shell_type af:00.0", r#"{"result": "not found"}"#)
            .with_output(
                "shell_role get_function 5e:00.0 5e:00.1",
                r#"{"result": "custom", "ID": "gzip-v2"}"#,
            )
            .with_output("shell_role get_function 5e:00.0 5e:00.2", r#"{"result": "none"}"#)
    }

    fn driver(runner: StaticCommandRunner) -> (XilinxFpgaDriver, Arc<StaticCommandRunner>) {
        let runner = Arc::new(runner);
        let driver = XilinxFpgaDriver::new(LspciProbe::new(runner.clone()), runner.clone());
        (driver, runner)
    }

    fn role_deployable() -> Deployable {
        let region = Device::new(
            PciAddress::parse("5e:00.1").unwrap(),
            DeviceCategory::Fpga,
            VendorId::new("10ee").unwrap(),
            "5001",
            "Xilinx Corporation Device",
        )
        .programmable(true);
        Deployable::from_device("host-a", &region, None)
    }

    #[tokio::test]
    async fn test_discover_builds_shell_tree() {
        let (driver, _) = driver(scripted());
        let devices = driver.discover().await.unwrap();

        assert_eq!(devices.len(), 1, "unsupported shell must be skipped");
        let shell = &devices[0];
        assert_eq!(shell.address.to_string(), "0000:5e:00.0");
        assert!(!shell.assignable);
        assert!(!shell.programmable);
        assert_eq!(shell.regions.len(), 2);

        let role = &shell.regions[0];
        assert_eq!(role.address.to_string(), "0000:5e:00.1");
        assert!(role.programmable && role.assignable);
        assert_eq!(role.function.as_deref(), Some("gzip-v2"));
        assert_eq!(shell.regions[1].function.as_deref(), Some("none"));
    }

    #[tokio::test]
    async fn test_shell_type_failure_fails_discovery() {
        let runner = StaticCommandRunner::new()
            .with_output("lspci -nnn", LSPCI)
            .with_output("shell_role shell_type 5e:00.0", r#"{"result": "failed"}"#);
        let (driver, _) = driver(runner);
        let err = driver.discover().await.unwrap_err();
        assert!(matches!(err, DriverError::ShellReturnFailed(_)));
    }

    #[tokio::test]
    async fn test_program_passes_shell_role_and_image() {
        let runner = StaticCommandRunner::new().with_output(
            "shell_role program 5e:00.0 5e:00.1 /tmp/firmware_cache/abc",
            r#"{"result": "success"}"#,
        );
        let (driver, runner) = driver(runner);

        driver
            .program(&role_deployable(), Path::new("/tmp/firmware_cache/abc"))
            .await
            .unwrap();
        assert_eq!(
            runner.calls(),
            vec!["shell_role program 5e:00.0 5e:00.1 /tmp/firmware_cache/abc"]
        );
    }

    #[tokio::test]
    async fn test_program_unexpected_result_is_execution_error() {
        let runner = StaticCommandRunner::new().with_output(
            "shell_role program 5e:00.0 5e:00.1 /img",
            r#"{"result": "busy"}"#,
        );
        let (driver, _) = driver(runner);
        let err = driver
            .program(&role_deployable(), Path::new("/img"))
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::Execution(_)));
    }

    #[tokio::test]
    async fn test_verify_results() {
        let runner = StaticCommandRunner::new()
            .with_output("shell_role verify 5e:00.0 5e:00.1", r#"{"result": "true"}"#);
        let (done, _) = driver(runner);
        assert!(done.check_program_status(&role_deployable()).await.unwrap());

        let runner = StaticCommandRunner::new()
            .with_output("shell_role verify 5e:00.0 5e:00.1", r#"{"result": "maybe"}"#);
        let (garbled, _) = driver(runner);
        assert!(matches!(
            garbled.check_program_status(&role_deployable()).await,
            Err(DriverError::InvalidOutput(_))
        ));
    }

    #[tokio::test]
    async fn test_non_json_reply_is_invalid_output() {
        let runner = StaticCommandRunner::new()
            .with_output("shell_role get_function 5e:00.0 5e:00.1", "Segmentation fault");
        let (driver, _) = driver(runner);
        assert!(matches!(
            driver.get_function(&role_deployable()).await,
            Err(DriverError::InvalidOutput(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_tool_is_exec_failure() {
        let (driver, _) = driver(StaticCommandRunner::new());
        assert!(driver
            .check_program_status(&role_deployable())
            .await
            .unwrap_err()
            .is_tooling_failure());
    }

    #[tokio::test]
    async fn test_failed_exit_without_output_is_exec_failure() {
        // sudo -n reports a missing tool as exit status 1 with nothing on stdout
        let runner =
            StaticCommandRunner::new().with_failure("shell_role verify 5e:00.0 5e:00.1", 1);
        let (driver, _) = driver(runner);

        let err = driver
            .check_program_status(&role_deployable())
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::ShellExecFailed(_)));
        assert!(err.is_tooling_failure());
    }
}
