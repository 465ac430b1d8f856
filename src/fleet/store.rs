//! Persistence of desired state and instance records.
//!
//! # Responsibilities
//! - Load service definitions joined with their instance records
//! - Upsert and delete individual instance records
//! - Bulk delete instances of one service (or all services)
//!
//! # Design Decisions
//! - Definitions are operator-owned; instances are orchestrator-owned.
//!   `JsonFileStore` keeps them in separate files so the definitions file can
//!   be watched for change notifications without reacting to our own writes
//! - Instance writes go to a temp file first and are renamed into place, so
//!   load balancers reading the same file never see a torn document
//! - Instance order in the file is insertion order; pools rely on it

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::StoreConfig;
use crate::fleet::model::{
    BackendInstance, InstanceId, LbInstance, Service, ServiceDefinition, ServiceId,
};

/// Errors raised by a service store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed store document {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode store document: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Desired state and instance records, as seen by the control plane and
/// by load balancers.
#[async_trait]
pub trait ServiceStore: Send + Sync {
    /// All services with their nested instance lists.
    async fn load_services(&self) -> Result<Vec<Service>, StoreError>;

    /// Insert or update a backend record.
    async fn save_backend(&self, backend: &BackendInstance) -> Result<(), StoreError>;

    /// Insert or update a load-balancer record.
    async fn save_load_balancer(&self, lb: &LbInstance) -> Result<(), StoreError>;

    async fn delete_backend(&self, id: InstanceId) -> Result<(), StoreError>;

    async fn delete_load_balancer(&self, id: InstanceId) -> Result<(), StoreError>;

    /// Delete every instance record owned by a service.
    async fn delete_service_instances(&self, service_id: ServiceId) -> Result<(), StoreError>;

    /// Delete every instance record of every service.
    async fn clear_instances(&self) -> Result<(), StoreError>;

    /// Look up a single service by its unique name.
    async fn find_service(&self, name: &str) -> Result<Option<Service>, StoreError> {
        Ok(self
            .load_services()
            .await?
            .into_iter()
            .find(|s| s.definition.name == name))
    }
}

/// Instance records of every service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InstanceRecords {
    pub backends: Vec<BackendInstance>,
    pub load_balancers: Vec<LbInstance>,
}

impl InstanceRecords {
    fn upsert_backend(&mut self, backend: &BackendInstance) {
        match self.backends.iter_mut().find(|b| b.id == backend.id) {
            Some(existing) => *existing = backend.clone(),
            None => self.backends.push(backend.clone()),
        }
    }

    fn upsert_load_balancer(&mut self, lb: &LbInstance) {
        match self.load_balancers.iter_mut().find(|l| l.id == lb.id) {
            Some(existing) => *existing = lb.clone(),
            None => self.load_balancers.push(lb.clone()),
        }
    }

    fn remove_service(&mut self, service_id: ServiceId) {
        self.backends.retain(|b| b.service_id != service_id);
        self.load_balancers.retain(|l| l.service_id != service_id);
    }
}

/// Join definitions with the instance records that reference them.
fn join(definitions: Vec<ServiceDefinition>, records: &InstanceRecords) -> Vec<Service> {
    definitions
        .into_iter()
        .map(|definition| {
            let id = definition.id;
            Service {
                definition,
                backends: records
                    .backends
                    .iter()
                    .filter(|b| b.service_id == id)
                    .cloned()
                    .collect(),
                load_balancers: records
                    .load_balancers
                    .iter()
                    .filter(|l| l.service_id == id)
                    .cloned()
                    .collect(),
            }
        })
        .collect()
}

/// Store backed by two JSON documents on disk.
pub struct JsonFileStore {
    services_path: PathBuf,
    instances_path: PathBuf,
    /// Serializes read-modify-write cycles on the instances document.
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonFileStore {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            services_path: config.services_path.clone(),
            instances_path: config.instances_path.clone(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn services_path(&self) -> &Path {
        &self.services_path
    }

    async fn read_definitions(&self) -> Result<Vec<ServiceDefinition>, StoreError> {
        read_json(&self.services_path).await
    }

    async fn read_records(&self) -> Result<InstanceRecords, StoreError> {
        read_json(&self.instances_path).await
    }

    async fn write_records(&self, records: &InstanceRecords) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(records)?;
        let tmp = self.instances_path.with_extension("json.tmp");

        if let Some(parent) = self.instances_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(io_error(parent))?;
            }
        }
        tokio::fs::write(&tmp, &bytes).await.map_err(io_error(&tmp))?;
        tokio::fs::rename(&tmp, &self.instances_path)
            .await
            .map_err(io_error(&self.instances_path))?;
        Ok(())
    }

    async fn modify<F>(&self, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut InstanceRecords) + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut records = self.read_records().await?;
        f(&mut records);
        self.write_records(&records).await
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError {
    let path = path.to_path_buf();
    move |source| StoreError::Io { path, source }
}

/// Read a JSON document, treating a missing file as empty.
async fn read_json<T>(path: &Path) -> Result<T, StoreError>
where
    T: for<'de> Deserialize<'de> + Default,
{
    match tokio::fs::read(path).await {
        Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(T::default()),
        Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| StoreError::Parse {
            path: path.to_path_buf(),
            source,
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(io_error(path)(e)),
    }
}

#[async_trait]
impl ServiceStore for JsonFileStore {
    async fn load_services(&self) -> Result<Vec<Service>, StoreError> {
        let definitions = self.read_definitions().await?;
        let records = self.read_records().await?;
        Ok(join(definitions, &records))
    }

    async fn save_backend(&self, backend: &BackendInstance) -> Result<(), StoreError> {
        self.modify(|r| r.upsert_backend(backend)).await
    }

    async fn save_load_balancer(&self, lb: &LbInstance) -> Result<(), StoreError> {
        self.modify(|r| r.upsert_load_balancer(lb)).await
    }

    async fn delete_backend(&self, id: InstanceId) -> Result<(), StoreError> {
        self.modify(|r| r.backends.retain(|b| b.id != id)).await
    }

    async fn delete_load_balancer(&self, id: InstanceId) -> Result<(), StoreError> {
        self.modify(|r| r.load_balancers.retain(|l| l.id != id)).await
    }

    async fn delete_service_instances(&self, service_id: ServiceId) -> Result<(), StoreError> {
        self.modify(|r| r.remove_service(service_id)).await
    }

    async fn clear_instances(&self) -> Result<(), StoreError> {
        self.modify(|r| *r = InstanceRecords::default()).await
    }
}

/// In-memory store for tests and single-process experiments.
#[derive(Debug, Default)]
pub struct MemoryStore {
    definitions: Mutex<Vec<ServiceDefinition>>,
    records: Mutex<InstanceRecords>,
}

impl MemoryStore {
    pub fn new(definitions: Vec<ServiceDefinition>) -> Self {
        Self {
            definitions: Mutex::new(definitions),
            records: Mutex::new(InstanceRecords::default()),
        }
    }

    /// Replace the desired service set.
    pub fn set_definitions(&self, definitions: Vec<ServiceDefinition>) {
        *self.definitions.lock().expect("store mutex poisoned") = definitions;
    }

    /// Snapshot of the persisted instance records.
    pub fn records(&self) -> InstanceRecords {
        self.records.lock().expect("store mutex poisoned").clone()
    }

    fn modify(&self, f: impl FnOnce(&mut InstanceRecords)) -> Result<(), StoreError> {
        f(&mut self.records.lock().expect("store mutex poisoned"));
        Ok(())
    }
}

#[async_trait]
impl ServiceStore for MemoryStore {
    async fn load_services(&self) -> Result<Vec<Service>, StoreError> {
        let definitions = self.definitions.lock().expect("store mutex poisoned").clone();
        let records = self.records();
        Ok(join(definitions, &records))
    }

    async fn save_backend(&self, backend: &BackendInstance) -> Result<(), StoreError> {
        self.modify(|r| r.upsert_backend(backend))
    }

    async fn save_load_balancer(&self, lb: &LbInstance) -> Result<(), StoreError> {
        self.modify(|r| r.upsert_load_balancer(lb))
    }

    async fn delete_backend(&self, id: InstanceId) -> Result<(), StoreError> {
        self.modify(|r| r.backends.retain(|b| b.id != id))
    }

    async fn delete_load_balancer(&self, id: InstanceId) -> Result<(), StoreError> {
        self.modify(|r| r.load_balancers.retain(|l| l.id != id))
    }

    async fn delete_service_instances(&self, service_id: ServiceId) -> Result<(), StoreError> {
        self.modify(|r| r.remove_service(service_id))
    }

    async fn clear_instances(&self) -> Result<(), StoreError> {
        self.modify(|r| *r = InstanceRecords::default())
    }
}
