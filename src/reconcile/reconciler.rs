//! Desired-state reconciliation.
//!
//! # Responsibilities
//! - Bootstrap the fleet when this node takes leadership
//! - Diff running services against the store on every change notification
//! - Own the lifecycle of one health monitor per service
//!
//! # Design Decisions
//! - Services are identified by (id, name); a service present on both sides
//!   of a diff keeps running untouched, scalar edits included
//! - Teardown cancels the monitor first and tears down exactly the instances
//!   the monitor handed back
//! - Invalid definitions are skipped with a warning, never fatal

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::Validate;
use crate::fleet::{Service, ServiceId, ServiceKey, ServiceStatus, StoreError};
use crate::health::{HealthMonitor, MonitorDeps};
use crate::reconcile::InstanceManager;

/// Errors surfaced by bootstrap and reload.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("failed to load services: {0}")]
    Store(#[from] StoreError),
}

/// A running health monitor.
struct ServiceHandle {
    cancel: watch::Sender<bool>,
    task: JoinHandle<Service>,
    status: watch::Receiver<ServiceStatus>,
}

/// Read-only view of running services, shared with the admin API.
#[derive(Clone, Default)]
pub struct FleetView {
    services: Arc<DashMap<ServiceId, watch::Receiver<ServiceStatus>>>,
}

impl FleetView {
    /// Latest status of every running service, ordered by id.
    pub fn statuses(&self) -> Vec<ServiceStatus> {
        let mut statuses: Vec<_> = self
            .services
            .iter()
            .map(|entry| entry.value().borrow().clone())
            .collect();
        statuses.sort_by_key(|s| s.id);
        statuses
    }

    pub fn get(&self, id: ServiceId) -> Option<ServiceStatus> {
        self.services.get(&id).map(|entry| entry.value().borrow().clone())
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

/// Keeps one health monitor running per desired service.
pub struct Reconciler {
    deps: MonitorDeps,
    full_reset: bool,
    running: BTreeMap<ServiceKey, ServiceHandle>,
    view: FleetView,
}

impl Reconciler {
    pub fn new(deps: MonitorDeps, full_reset: bool) -> Self {
        Self {
            deps,
            full_reset,
            running: BTreeMap::new(),
            view: FleetView::default(),
        }
    }

    pub fn view(&self) -> FleetView {
        self.view.clone()
    }

    /// Keys of every running service, in order.
    pub fn running_keys(&self) -> Vec<ServiceKey> {
        self.running.keys().cloned().collect()
    }

    fn instances(&self) -> &InstanceManager {
        &self.deps.instances
    }

    /// Load the desired set, dropping invalid and duplicate definitions.
    async fn desired(&self) -> Result<Vec<Service>, ReconcileError> {
        let services = self.instances().store().load_services().await?;
        Ok(Self::filter_desired(services))
    }

    fn filter_desired(services: Vec<Service>) -> Vec<Service> {
        let mut names = HashSet::new();
        let mut desired = Vec::with_capacity(services.len());

        for service in services {
            let definition = &service.definition;
            if let Err(errors) = definition.validate() {
                let reasons: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
                warn!(service = %definition.name, id = definition.id, errors = ?reasons, "Skipping invalid service definition");
                continue;
            }
            if !names.insert(definition.name.clone()) {
                warn!(service = %definition.name, id = definition.id, "Skipping duplicate service name");
                continue;
            }
            desired.push(service);
        }
        desired
    }

    /// Take over the fleet: reset or adopt instances, then start monitors.
    pub async fn bootstrap(&mut self) -> Result<(), ReconcileError> {
        let mut known = self.instances().store().load_services().await?;
        info!(services = known.len(), full_reset = self.full_reset, "Bootstrapping fleet");

        if self.full_reset {
            // every known service, including ones skipped below
            for service in &mut known {
                self.deps.instances.retire_all(service).await;
                service.backends.clear();
                service.load_balancers.clear();
            }
            self.instances().store().clear_instances().await?;
        } else {
            self.instances().ports().seed_from(&known);
        }

        let services = Self::filter_desired(known);

        self.instances().ensure_network().await;

        for service in services {
            self.spawn(service);
        }
        Ok(())
    }

    /// Converge the running set to the persisted set.
    pub async fn reload(&mut self) -> Result<(), ReconcileError> {
        let desired = self.desired().await?;
        let desired_keys: HashSet<ServiceKey> = desired.iter().map(Service::key).collect();

        let removed: Vec<ServiceKey> = self
            .running
            .keys()
            .filter(|key| !desired_keys.contains(*key))
            .cloned()
            .collect();
        for key in removed {
            self.teardown(&key).await;
        }

        for mut service in desired {
            if self.running.contains_key(&service.key()) {
                continue;
            }
            if !service.backends.is_empty() || !service.load_balancers.is_empty() {
                // stale records of a service this node never ran
                self.deps.instances.retire_all(&service).await;
                service.backends.clear();
                service.load_balancers.clear();
            }
            info!(service = %service.definition.name, id = service.definition.id, "Provisioning new service");
            self.spawn(service);
        }
        Ok(())
    }

    fn spawn(&mut self, service: Service) {
        let key = service.key();
        let (monitor, status) = HealthMonitor::new(service, self.deps.clone());
        let (cancel, cancel_rx) = watch::channel(false);
        let task = tokio::spawn(monitor.run(cancel_rx));

        self.view.services.insert(key.id, status.clone());
        self.running.insert(
            key,
            ServiceHandle {
                cancel,
                task,
                status,
            },
        );
    }

    /// Remove a service from the running set and cancel its monitor.
    fn detach(&mut self, key: &ServiceKey) -> Option<ServiceHandle> {
        let handle = self.running.remove(key)?;
        self.view.services.remove(&key.id);
        let _ = handle.cancel.send(true);
        Some(handle)
    }

    async fn teardown(&mut self, key: &ServiceKey) {
        let Some(handle) = self.detach(key) else {
            return;
        };
        info!(service = %key, "Tearing down removed service");

        match handle.task.await {
            Ok(service) => self.deps.instances.retire_all(&service).await,
            Err(e) => {
                error!(service = %key, error = %e, "Health monitor task failed, using last status");
                let status = handle.status.borrow().clone();
                self.deps
                    .instances
                    .retire_instances(status.id, &status.backends, &status.load_balancers)
                    .await;
            }
        }
    }

    /// Stop every monitor; running containers are left for the next leader.
    pub async fn shutdown(&mut self) {
        for key in self.running_keys() {
            if let Some(handle) = self.detach(&key) {
                if let Err(e) = handle.task.await {
                    error!(service = %key, error = %e, "Health monitor task failed");
                }
            }
        }
        info!("All health monitors stopped");
    }

    /// Serve change notifications until shutdown.
    pub async fn run(mut self, mut changes: mpsc::Receiver<()>, mut shutdown: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Reconciler received shutdown signal");
                    break;
                }
                change = changes.recv() => {
                    if change.is_none() {
                        break;
                    }
                    // coalesce notifications queued during the previous reload
                    while changes.try_recv().is_ok() {}
                    if let Err(e) = self.reload().await {
                        error!(error = %e, "Reload failed");
                    }
                }
            }
        }
        self.shutdown().await;
    }
}
