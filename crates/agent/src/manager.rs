//! Agent manager
//!
//! Owns the resource tracker and the programming controller and drives them:
//! the periodic sweep on a fixed cadence and programming requests as they
//! arrive over the RPC surface.

use accel_adapters::{HttpCatalogClient, HttpFirmwareStore, InMemoryCatalog};
use accel_domain::{DeviceCategory, Uuid, VendorId};
use accel_drivers::{DriverRegistry, SystemCommandRunner};
use accel_lifecycle::{ProgrammingController, ProgrammingTask};
use accel_ports::{CatalogClient, FirmwareStore};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::tracker::{ReconcileReport, ResourceTracker};
use crate::{AgentError, Result};

pub struct AgentManager {
    config: Config,
    catalog: Arc<dyn CatalogClient>,
    tracker: ResourceTracker,
    controller: ProgrammingController,
    legacy_fpga_vendor: Option<VendorId>,
}

impl AgentManager {
    pub fn new(
        config: Config,
        catalog: Arc<dyn CatalogClient>,
        firmware: Arc<dyn FirmwareStore>,
        drivers: Arc<DriverRegistry>,
    ) -> Result<Self> {
        config.validate()?;
        let legacy_fpga_vendor = config.legacy_vendor()?;
        let tracker = ResourceTracker::new(&config.host, catalog.clone(), drivers.clone());
        let controller =
            ProgrammingController::new(catalog.clone(), firmware, drivers, config.programming());

        Ok(Self {
            config,
            catalog,
            tracker,
            controller,
            legacy_fpga_vendor,
        })
    }

    /// Wire the production adapters described by `config`
    pub fn from_config(config: Config) -> Result<Self> {
        let runner = Arc::new(SystemCommandRunner::new(config.use_sudo));
        let drivers = Arc::new(DriverRegistry::with_builtin_drivers(runner));

        let catalog: Arc<dyn CatalogClient> = if config.uses_memory_catalog() {
            warn!("Using in-memory catalog; inventory is not persisted");
            Arc::new(InMemoryCatalog::new())
        } else {
            Arc::new(
                HttpCatalogClient::new(&config.catalog_url, config.catalog_timeout())
                    .with_token(config.catalog_token.clone()),
            )
        };
        let firmware = Arc::new(
            HttpFirmwareStore::new(&config.firmware_url, config.catalog_timeout())
                .with_token(config.catalog_token.clone()),
        );

        Self::new(config, catalog, firmware, drivers)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn controller(&self) -> &ProgrammingController {
        &self.controller
    }

    /// One sweep over every category: GPU, co-processor, then FPGA.
    ///
    /// A failed category is logged and the sweep moves on.
    pub async fn periodic_update(&self) -> Vec<ReconcileReport> {
        let mut reports = Vec::new();

        for category in DeviceCategory::SWEEP_ORDER {
            let result = match (&self.legacy_fpga_vendor, category) {
                (Some(vendor), DeviceCategory::Fpga) => {
                    self.tracker.reconcile_vendor(category, vendor).await
                }
                _ => self.tracker.reconcile(category).await,
            };

            match result {
                Ok(report) => reports.push(report),
                Err(e) => error!(host = %self.config.host, category = %category, "Reconciliation failed: {}", e),
            }
        }

        reports
    }

    /// Run `periodic_update` every interval until `shutdown` flips to true
    pub async fn run_periodic(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.periodic_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(
            interval_secs = self.config.periodic_interval_secs,
            "Starting periodic resource updates"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {
                    self.periodic_update().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!("Periodic resource updates stopped");
    }

    /// Program a deployable of this host with the given firmware image
    pub async fn program_device(&self, uuid: Uuid, firmware_id: &str) -> Result<ProgrammingTask> {
        let deployable = self
            .catalog
            .get(&uuid)
            .await?
            .filter(|d| d.host == self.config.host)
            .ok_or(AgentError::DeployableNotFound(uuid))?;

        Ok(self.controller.program_device(deployable, firmware_id).await?)
    }

    pub async fn shutdown(&self) {
        self.controller.shutdown().await;
    }
}
