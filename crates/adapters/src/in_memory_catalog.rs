//! In-Memory Catalog Implementation
//!
//! Holds deployables in a map and records every call. Used for dry runs of
//! the agent (`memory://` catalog URL) and throughout the test suites.

use accel_domain::{Deployable, Uuid};
use accel_ports::{CatalogClient, CatalogError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// One call made against the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogCall {
    ListByHost(String),
    Create { uuid: Uuid, pcie_address: String },
    Update { uuid: Uuid, pcie_address: String },
    Delete { uuid: Uuid, pcie_address: String },
    Get(Uuid),
}

impl CatalogCall {
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            CatalogCall::Create { .. } | CatalogCall::Update { .. } | CatalogCall::Delete { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatalogOp {
    Create,
    Update,
    Delete,
}

#[derive(Default)]
struct CatalogState {
    records: HashMap<Uuid, Deployable>,
    calls: Vec<CatalogCall>,
    failures: HashMap<(CatalogOp, String), CatalogError>,
    list_failure: Option<CatalogError>,
}

#[derive(Clone, Default)]
pub struct InMemoryCatalog {
    state: Arc<RwLock<CatalogState>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record without recording a call
    pub async fn insert(&self, deployable: Deployable) {
        self.state
            .write()
            .await
            .records
            .insert(deployable.uuid, deployable);
    }

    /// Stored records ordered by bus address
    pub async fn records(&self) -> Vec<Deployable> {
        let mut records: Vec<_> = self.state.read().await.records.values().cloned().collect();
        records.sort_by(|a, b| a.pcie_address.cmp(&b.pcie_address));
        records
    }

    pub async fn record(&self, uuid: &Uuid) -> Option<Deployable> {
        self.state.read().await.records.get(uuid).cloned()
    }

    pub async fn find_by_address(&self, pcie_address: &str) -> Option<Deployable> {
        self.state
            .read()
            .await
            .records
            .values()
            .find(|d| d.pcie_address == pcie_address)
            .cloned()
    }

    pub async fn calls(&self) -> Vec<CatalogCall> {
        self.state.read().await.calls.clone()
    }

    /// Creates, updates and deletes, in call order
    pub async fn mutations(&self) -> Vec<CatalogCall> {
        self.state
            .read()
            .await
            .calls
            .iter()
            .filter(|call| call.is_mutation())
            .cloned()
            .collect()
    }

    pub async fn clear_calls(&self) {
        self.state.write().await.calls.clear();
    }

    /// Make every `op` on the record at `pcie_address` fail with `error`
    pub async fn fail_on(&self, op: CatalogOp, pcie_address: &str, error: CatalogError) {
        self.state
            .write()
            .await
            .failures
            .insert((op, pcie_address.to_string()), error);
    }

    pub async fn fail_list(&self, error: CatalogError) {
        self.state.write().await.list_failure = Some(error);
    }

    pub async fn clear_failures(&self) {
        let mut state = self.state.write().await;
        state.failures.clear();
        state.list_failure = None;
    }
}

impl CatalogState {
    fn injected(&self, op: CatalogOp, deployable: &Deployable) -> Result<(), CatalogError> {
        match self.failures.get(&(op, deployable.pcie_address.clone())) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl CatalogClient for InMemoryCatalog {
    async fn list_by_host(&self, host: &str) -> Result<Vec<Deployable>, CatalogError> {
        let mut state = self.state.write().await;
        state.calls.push(CatalogCall::ListByHost(host.to_string()));
        if let Some(error) = &state.list_failure {
            return Err(error.clone());
        }

        let mut records: Vec<_> = state
            .records
            .values()
            .filter(|d| d.host == host)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.pcie_address.cmp(&b.pcie_address));
        Ok(records)
    }

    async fn create(&self, deployable: &Deployable) -> Result<Deployable, CatalogError> {
        let mut state = self.state.write().await;
        state.calls.push(CatalogCall::Create {
            uuid: deployable.uuid,
            pcie_address: deployable.pcie_address.clone(),
        });
        state.injected(CatalogOp::Create, deployable)?;

        if state.records.contains_key(&deployable.uuid) {
            return Err(CatalogError::Rejected(format!(
                "deployable {} already exists",
                deployable.uuid
            )));
        }
        debug!(uuid = %deployable.uuid, address = %deployable.pcie_address, "Created deployable");
        state.records.insert(deployable.uuid, deployable.clone());
        Ok(deployable.clone())
    }

    async fn update(&self, deployable: &Deployable) -> Result<(), CatalogError> {
        let mut state = self.state.write().await;
        state.calls.push(CatalogCall::Update {
            uuid: deployable.uuid,
            pcie_address: deployable.pcie_address.clone(),
        });
        state.injected(CatalogOp::Update, deployable)?;

        match state.records.get_mut(&deployable.uuid) {
            Some(record) => {
                *record = deployable.clone();
                Ok(())
            }
            None => Err(CatalogError::NotFound(deployable.uuid)),
        }
    }

    async fn delete(&self, deployable: &Deployable) -> Result<(), CatalogError> {
        let mut state = self.state.write().await;
        state.calls.push(CatalogCall::Delete {
            uuid: deployable.uuid,
            pcie_address: deployable.pcie_address.clone(),
        });
        state.injected(CatalogOp::Delete, deployable)?;

        state
            .records
            .remove(&deployable.uuid)
            .map(|_| ())
            .ok_or(CatalogError::NotFound(deployable.uuid))
    }

    async fn get(&self, uuid: &Uuid) -> Result<Option<Deployable>, CatalogError> {
        let mut state = self.state.write().await;
        state.calls.push(CatalogCall::Get(*uuid));
        Ok(state.records.get(uuid).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accel_domain::{Device, DeviceCategory, PciAddress, VendorId};

    fn gpu(host: &str, address: &str) -> Deployable {
        let device = Device::new(
            PciAddress::parse(address).unwrap(),
            DeviceCategory::Gpu,
            VendorId::nvidia(),
            "1eb8",
            "Tesla T4",
        );
        Deployable::from_device(host, &device, None)
    }

    #[tokio::test]
    async fn test_list_filters_by_host() {
        let catalog = InMemoryCatalog::new();
        catalog.insert(gpu("host-a", "3b:00.0")).await;
        catalog.insert(gpu("host-b", "3b:00.0")).await;

        let listed = catalog.list_by_host("host-a").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].host, "host-a");
        assert_eq!(catalog.calls().await, vec![CatalogCall::ListByHost("host-a".into())]);
    }

    #[tokio::test]
    async fn test_crud_and_call_log() {
        let catalog = InMemoryCatalog::new();
        let mut dep = gpu("host-a", "3b:00.0");

        let created = catalog.create(&dep).await.unwrap();
        assert_eq!(created, dep);
        assert!(matches!(
            catalog.create(&dep).await,
            Err(CatalogError::Rejected(_))
        ));

        dep.assignable = false;
        catalog.update(&dep).await.unwrap();
        assert!(!catalog.record(&dep.uuid).await.unwrap().assignable);

        catalog.delete(&dep).await.unwrap();
        assert_eq!(
            catalog.delete(&dep).await,
            Err(CatalogError::NotFound(dep.uuid))
        );
        assert!(catalog.get(&dep.uuid).await.unwrap().is_none());
        assert_eq!(catalog.mutations().await.len(), 5);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let catalog = InMemoryCatalog::new();
        let dep = gpu("host-a", "3b:00.0");
        catalog
            .fail_on(CatalogOp::Create, "0000:3b:00.0", CatalogError::Timeout)
            .await;
        assert_eq!(catalog.create(&dep).await, Err(CatalogError::Timeout));
        assert!(catalog.records().await.is_empty());

        catalog
            .fail_list(CatalogError::Communication("down".into()))
            .await;
        assert!(catalog.list_by_host("host-a").await.is_err());

        catalog.clear_failures().await;
        catalog.create(&dep).await.unwrap();
        assert_eq!(catalog.list_by_host("host-a").await.unwrap().len(), 1);
    }
}
