//! Programming controller
//!
//! Precommit runs on the caller's task: stage the image, mark the record
//! `in-programing` and hand the image to the driver. Postcommit polls the
//! driver from a background task and writes the final state exactly once.

use accel_domain::{Deployable, Uuid};
use accel_drivers::{AcceleratorDriver, DriverError, DriverRegistry};
use accel_ports::{CatalogClient, FirmwareStore};
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::events::{ProgrammingEvent, ProgrammingJournal, ProgrammingStage, ProgrammingStats};
use crate::ProgrammingError;

/// Programming controller configuration
#[derive(Debug, Clone)]
pub struct ProgrammingConfig {
    pub firmware_cache_folder: PathBuf,
    pub program_check_interval: Duration,
    pub program_retry_count: u32,
    pub max_concurrent_programming: usize,
}

impl Default for ProgrammingConfig {
    fn default() -> Self {
        Self {
            firmware_cache_folder: PathBuf::from("/tmp/firmware_cache/"),
            program_check_interval: Duration::from_secs(10),
            program_retry_count: 6,
            max_concurrent_programming: 4,
        }
    }
}

/// How a programming run ended once polling finished
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgrammingOutcome {
    Succeeded { function: Option<String> },
    Failed { reason: String },
    Cancelled,
}

/// Handle on the background completion poll of one accepted request
#[derive(Debug)]
pub struct ProgrammingTask {
    pub deployable_uuid: Uuid,
    pub firmware_id: String,
    handle: JoinHandle<ProgrammingOutcome>,
}

impl ProgrammingTask {
    pub async fn wait(self) -> ProgrammingOutcome {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(e) => ProgrammingOutcome::Failed {
                reason: format!("polling task aborted: {}", e),
            },
        }
    }
}

enum PollResult {
    Programmed,
    Exhausted,
    DriverFailed(DriverError),
    Cancelled,
}

/// Removes the deployable from the in-flight set when dropped
struct InFlightGuard {
    in_flight: Arc<DashMap<Uuid, String>>,
    uuid: Uuid,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.remove(&self.uuid);
    }
}

struct ControllerInner {
    catalog: Arc<dyn CatalogClient>,
    firmware: Arc<dyn FirmwareStore>,
    drivers: Arc<DriverRegistry>,
    config: ProgrammingConfig,
    permits: Arc<Semaphore>,
    in_flight: Arc<DashMap<Uuid, String>>,
    journal: ProgrammingJournal,
    shutdown: watch::Sender<bool>,
}

#[derive(Clone)]
pub struct ProgrammingController {
    inner: Arc<ControllerInner>,
}

impl ProgrammingController {
    pub fn new(
        catalog: Arc<dyn CatalogClient>,
        firmware: Arc<dyn FirmwareStore>,
        drivers: Arc<DriverRegistry>,
        config: ProgrammingConfig,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_programming.max(1)));
        let (shutdown, _) = watch::channel(false);

        Self {
            inner: Arc::new(ControllerInner {
                catalog,
                firmware,
                drivers,
                config,
                permits,
                in_flight: Arc::new(DashMap::new()),
                journal: ProgrammingJournal::default(),
                shutdown,
            }),
        }
    }

    pub fn config(&self) -> &ProgrammingConfig {
        &self.inner.config
    }

    /// Run precommit for `deployable` and start polling for completion.
    ///
    /// Returns once the driver accepted the image. Waits for a free
    /// programming slot when `max_concurrent_programming` runs are active.
    pub async fn program_device(
        &self,
        mut deployable: Deployable,
        firmware_id: &str,
    ) -> Result<ProgrammingTask, ProgrammingError> {
        validate_firmware_id(firmware_id)?;
        if *self.inner.shutdown.borrow() {
            return Err(ProgrammingError::ShuttingDown);
        }

        let guard = self.claim(deployable.uuid, firmware_id)?;
        let driver = self.inner.drivers.driver_for(&deployable)?;
        let permit = self
            .inner
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ProgrammingError::ShuttingDown)?;
        if *self.inner.shutdown.borrow() {
            return Err(ProgrammingError::ShuttingDown);
        }

        info!(
            uuid = %deployable.uuid,
            address = %deployable.pcie_address,
            firmware = %firmware_id,
            driver = driver.name(),
            "Programming deployable"
        );

        if let Err(e) = self.precommit(driver.as_ref(), &mut deployable, firmware_id).await {
            let stage = if e.is_not_implemented() {
                ProgrammingStage::RolledBack
            } else {
                ProgrammingStage::ProgramFailed
            };
            warn!(uuid = %deployable.uuid, firmware = %firmware_id, "Programming not started: {}", e);
            self.inner
                .journal
                .record(deployable.uuid, firmware_id, stage, e.to_string())
                .await;
            return Err(e);
        }

        self.inner
            .journal
            .record(
                deployable.uuid,
                firmware_id,
                ProgrammingStage::Accepted,
                format!("image handed to {} driver", driver.name()),
            )
            .await;

        let deployable_uuid = deployable.uuid;
        let inner = self.inner.clone();
        let firmware = firmware_id.to_string();
        let handle = tokio::spawn(async move {
            let outcome = inner.postcommit(driver, deployable, &firmware).await;
            drop(permit);
            drop(guard);
            outcome
        });

        Ok(ProgrammingTask {
            deployable_uuid,
            firmware_id: firmware_id.to_string(),
            handle,
        })
    }

    pub fn is_in_flight(&self, uuid: &Uuid) -> bool {
        self.inner.in_flight.contains_key(uuid)
    }

    pub async fn events(&self, limit: Option<usize>) -> Vec<ProgrammingEvent> {
        self.inner.journal.events(limit).await
    }

    pub async fn stats(&self) -> ProgrammingStats {
        self.inner.journal.stats().await
    }

    /// Stop accepting requests, interrupt polling and wait for every
    /// in-flight run to write its final state.
    pub async fn shutdown(&self) {
        if self.inner.shutdown.send_replace(true) {
            return;
        }
        info!(in_flight = self.inner.in_flight.len(), "Stopping programming controller");

        let total = self.inner.config.max_concurrent_programming.max(1) as u32;
        if let Ok(all) = self.inner.permits.acquire_many(total).await {
            all.forget();
        }
        self.inner.permits.close();
    }

    fn claim(&self, uuid: Uuid, firmware_id: &str) -> Result<InFlightGuard, ProgrammingError> {
        use dashmap::mapref::entry::Entry;

        match self.inner.in_flight.entry(uuid) {
            Entry::Occupied(running) => {
                warn!(uuid = %uuid, firmware = %running.get(), "Programming already in progress");
                Err(ProgrammingError::AlreadyInProgress(uuid))
            }
            Entry::Vacant(slot) => {
                slot.insert(firmware_id.to_string());
                Ok(InFlightGuard {
                    in_flight: self.inner.in_flight.clone(),
                    uuid,
                })
            }
        }
    }

    async fn precommit(
        &self,
        driver: &dyn AcceleratorDriver,
        deployable: &mut Deployable,
        firmware_id: &str,
    ) -> Result<(), ProgrammingError> {
        let inner = &self.inner;
        tokio::fs::create_dir_all(&inner.config.firmware_cache_folder).await?;
        let image = inner.config.firmware_cache_folder.join(firmware_id);
        inner.firmware.download(firmware_id, &image).await?;

        deployable.begin_programming();
        inner.catalog.update(deployable).await?;

        match driver.program(deployable, &image).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_implemented() => {
                deployable.rollback_programming();
                if let Err(update_err) = inner.catalog.update(deployable).await {
                    error!(uuid = %deployable.uuid, "Rollback update failed: {}", update_err);
                }
                Err(e.into())
            }
            Err(e) => {
                deployable.fail_programming();
                if let Err(update_err) = inner.catalog.update(deployable).await {
                    error!(uuid = %deployable.uuid, "Error state update failed: {}", update_err);
                }
                Err(e.into())
            }
        }
    }
}

impl ControllerInner {
    async fn postcommit(
        &self,
        driver: Arc<dyn AcceleratorDriver>,
        mut deployable: Deployable,
        firmware_id: &str,
    ) -> ProgrammingOutcome {
        let result = self.poll_until_programmed(driver.as_ref(), &deployable).await;

        let (stage, outcome) = match result {
            PollResult::Programmed => {
                let function = match driver.get_function(&deployable).await {
                    Ok(function) => function,
                    Err(e) => {
                        warn!(uuid = %deployable.uuid, "Could not read loaded function: {}", e);
                        deployable.function.clone()
                    }
                };
                deployable.complete_programming(function.clone());
                (ProgrammingStage::Succeeded, ProgrammingOutcome::Succeeded { function })
            }
            PollResult::Exhausted => {
                deployable.fail_programming();
                let reason = format!(
                    "not programmed after {} checks",
                    self.config.program_retry_count
                );
                (ProgrammingStage::Failed, ProgrammingOutcome::Failed { reason })
            }
            PollResult::DriverFailed(e) => {
                deployable.fail_programming();
                let reason = e.to_string();
                (ProgrammingStage::Failed, ProgrammingOutcome::Failed { reason })
            }
            PollResult::Cancelled => {
                deployable.fail_programming();
                (ProgrammingStage::Cancelled, ProgrammingOutcome::Cancelled)
            }
        };

        if let Err(e) = self.catalog.update(&deployable).await {
            error!(uuid = %deployable.uuid, "Final programming state not saved: {}", e);
        }

        let message = match &outcome {
            ProgrammingOutcome::Succeeded { function } => {
                format!("function now {}", function.as_deref().unwrap_or("unknown"))
            }
            ProgrammingOutcome::Failed { reason } => reason.clone(),
            ProgrammingOutcome::Cancelled => "interrupted by shutdown".to_string(),
        };
        info!(uuid = %deployable.uuid, firmware = %firmware_id, stage = ?stage, "{}", message);
        self.journal
            .record(deployable.uuid, firmware_id, stage, message)
            .await;

        outcome
    }

    async fn poll_until_programmed(
        &self,
        driver: &dyn AcceleratorDriver,
        deployable: &Deployable,
    ) -> PollResult {
        let mut shutdown = self.shutdown.subscribe();

        for attempt in 1..=self.config.program_retry_count {
            if attempt > 1 {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.program_check_interval) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            return PollResult::Cancelled;
                        }
                    }
                }
            }
            if *shutdown.borrow() {
                return PollResult::Cancelled;
            }

            match driver.check_program_status(deployable).await {
                Ok(true) => return PollResult::Programmed,
                Ok(false) => {
                    debug!(uuid = %deployable.uuid, attempt, "Programming not finished yet");
                }
                Err(e) if e.is_tooling_failure() => {
                    error!(uuid = %deployable.uuid, attempt, "Status tooling unavailable: {}", e);
                    return PollResult::DriverFailed(e);
                }
                Err(e) => {
                    warn!(uuid = %deployable.uuid, attempt, "Status check failed: {}", e);
                    return PollResult::DriverFailed(e);
                }
            }
        }

        PollResult::Exhausted
    }
}

/// Firmware ids name a file inside the staging directory
fn validate_firmware_id(firmware_id: &str) -> Result<(), ProgrammingError> {
    let invalid = firmware_id.is_empty()
        || firmware_id == "."
        || firmware_id == ".."
        || firmware_id.contains(['/', '\\', '\0']);
    if invalid {
        return Err(ProgrammingError::InvalidFirmwareId(firmware_id.to_string()));
    }
    Ok(())
}
