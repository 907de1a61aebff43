//! Programming events and statistics

use accel_domain::Uuid;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

const MAX_EVENTS: usize = 1000;

/// Lifecycle stages recorded per programming request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgrammingStage {
    /// Precommit done, completion polling started
    Accepted,
    /// Driver cannot program the device; record restored
    RolledBack,
    /// Precommit failed
    ProgramFailed,
    Succeeded,
    /// Polling ended without success
    Failed,
    /// Polling interrupted by shutdown
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgrammingEvent {
    pub deployable_uuid: Uuid,
    pub firmware_id: String,
    pub stage: ProgrammingStage,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ProgrammingStats {
    pub accepted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub rolled_back: u64,
    pub in_flight: u64,
}

/// Bounded event log plus counters, shared with the polling tasks
#[derive(Clone, Default)]
pub(crate) struct ProgrammingJournal {
    events: Arc<RwLock<Vec<ProgrammingEvent>>>,
    stats: Arc<RwLock<ProgrammingStats>>,
}

impl ProgrammingJournal {
    pub(crate) async fn record(
        &self,
        deployable_uuid: Uuid,
        firmware_id: &str,
        stage: ProgrammingStage,
        message: String,
    ) {
        {
            let mut stats = self.stats.write().await;
            match stage {
                ProgrammingStage::Accepted => {
                    stats.accepted += 1;
                    stats.in_flight += 1;
                }
                ProgrammingStage::RolledBack => stats.rolled_back += 1,
                ProgrammingStage::ProgramFailed => stats.failed += 1,
                ProgrammingStage::Succeeded => {
                    stats.succeeded += 1;
                    stats.in_flight = stats.in_flight.saturating_sub(1);
                }
                ProgrammingStage::Failed | ProgrammingStage::Cancelled => {
                    stats.failed += 1;
                    stats.in_flight = stats.in_flight.saturating_sub(1);
                }
            }
        }

        let mut events = self.events.write().await;
        events.push(ProgrammingEvent {
            deployable_uuid,
            firmware_id: firmware_id.to_string(),
            stage,
            timestamp: Utc::now(),
            message,
        });

        // Keep only recent events
        if events.len() > MAX_EVENTS {
            let excess = events.len() - MAX_EVENTS;
            events.drain(0..excess);
        }
    }

    /// Newest first
    pub(crate) async fn events(&self, limit: Option<usize>) -> Vec<ProgrammingEvent> {
        let events = self.events.read().await;
        events
            .iter()
            .rev()
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    pub(crate) async fn stats(&self) -> ProgrammingStats {
        self.stats.read().await.clone()
    }
}
