//! Outcome of one reconciliation run

use accel_domain::DeviceCategory;
use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

/// Catalog step that was not carried out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileOperation {
    /// Reading a stored record
    Inspect,
    Create,
    Update,
    Delete,
    /// Creating a child whose parent has no record
    Attach,
}

impl fmt::Display for ReconcileOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReconcileOperation::Inspect => "inspect",
            ReconcileOperation::Create => "create",
            ReconcileOperation::Update => "update",
            ReconcileOperation::Delete => "delete",
            ReconcileOperation::Attach => "attach",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedOperation {
    pub address: String,
    pub operation: ReconcileOperation,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub host: String,
    pub category: DeviceCategory,
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub deleted: Vec<String>,
    pub skipped: Vec<SkippedOperation>,
}

impl ReconcileReport {
    pub fn new(host: &str, category: DeviceCategory) -> Self {
        Self {
            host: host.to_string(),
            category,
            created: Vec::new(),
            updated: Vec::new(),
            deleted: Vec::new(),
            skipped: Vec::new(),
        }
    }

    pub fn skip(
        &mut self,
        address: impl Into<String>,
        operation: ReconcileOperation,
        reason: impl Into<String>,
    ) {
        let skipped = SkippedOperation {
            address: address.into(),
            operation,
            reason: reason.into(),
        };
        warn!(
            host = %self.host,
            category = %self.category,
            address = %skipped.address,
            operation = %skipped.operation,
            "Skipped: {}",
            skipped.reason
        );
        self.skipped.push(skipped);
    }

    /// Nothing was skipped; catalog and host agree after this run
    pub fn is_converged(&self) -> bool {
        self.skipped.is_empty()
    }

    pub fn mutation_count(&self) -> usize {
        self.created.len() + self.updated.len() + self.deleted.len()
    }

    pub(crate) fn log_summary(&self) {
        info!(
            host = %self.host,
            category = %self.category,
            created = self.created.len(),
            updated = self.updated.len(),
            deleted = self.deleted.len(),
            skipped = self.skipped.len(),
            "Reconciliation finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convergence_tracks_skips() {
        let mut report = ReconcileReport::new("host-a", DeviceCategory::Gpu);
        report.created.push("0000:3b:00.0".to_string());
        assert!(report.is_converged());
        assert_eq!(report.mutation_count(), 1);

        report.skip("0000:d8:00.0", ReconcileOperation::Delete, "Timeout");
        assert!(!report.is_converged());
        assert_eq!(report.skipped[0].operation.to_string(), "delete");
    }
}
