//! Backend pool of one load-balancer process.
//!
//! # Responsibilities
//! - Hold the authoritative backend list of the balanced service
//! - Cache a forwarding target per backend container
//! - Select the next backend and log the request for the rate meter
//!
//! # Design Decisions
//! - The list is swapped whole on refresh; selection never blocks a refresh
//! - Cached targets are only ever added, never evicted

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::config::{LoadBalancerConfig, TargetAddress};
use crate::fleet::{BackendInstance, ServiceStore, StoreError};
use crate::load_balancer::backend::Target;
use crate::load_balancer::rate::RequestLog;
use crate::load_balancer::round_robin::RoundRobin;
use crate::load_balancer::BackendSelector;

pub struct BackendPool {
    service_name: String,
    roster: ArcSwap<Vec<BackendInstance>>,
    targets: DashMap<String, Target>,
    selector: Box<dyn BackendSelector>,
    requests: RequestLog,
    address: TargetAddress,
    container_port: AtomicU16,
}

impl BackendPool {
    pub fn new(config: &LoadBalancerConfig) -> Self {
        Self::with_selector(config, Box::new(RoundRobin::new()))
    }

    pub fn with_selector(config: &LoadBalancerConfig, selector: Box<dyn BackendSelector>) -> Self {
        Self {
            service_name: config.service_name.clone(),
            roster: ArcSwap::from_pointee(Vec::new()),
            targets: DashMap::new(),
            selector,
            requests: RequestLog::new(
                Duration::from_secs(config.rate_window_secs),
                Duration::from_secs(config.retention_secs),
            ),
            address: config.target_address,
            container_port: AtomicU16::new(0),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Re-read the backend list. Returns false if the service is unknown,
    /// in which case the current list is kept.
    pub async fn refresh(&self, store: &dyn ServiceStore) -> Result<bool, StoreError> {
        let Some(service) = store.find_service(&self.service_name).await? else {
            warn!(service = %self.service_name, "Service not found, keeping backend list");
            return Ok(false);
        };
        self.container_port
            .store(service.definition.container_port, Ordering::Relaxed);
        self.replace(service.backends);
        Ok(true)
    }

    /// Install a new backend list and cache targets for unseen containers.
    pub fn replace(&self, backends: Vec<BackendInstance>) {
        let port = self.container_port.load(Ordering::Relaxed);
        for backend in &backends {
            if self.targets.contains_key(&backend.container_name) {
                continue;
            }
            match Target::for_backend(backend, self.address, port) {
                Ok(target) => {
                    debug!(container = %backend.container_name, url = %target.base_url, "Caching target");
                    self.targets.insert(backend.container_name.clone(), target);
                }
                Err(e) => warn!(container = %backend.container_name, error = %e, "Invalid backend address"),
            }
        }
        let healthy = backends.iter().filter(|b| b.is_healthy).count();
        info!(
            service = %self.service_name,
            backends = backends.len(),
            healthy,
            "Backend list refreshed"
        );
        self.roster.store(Arc::new(backends));
    }

    pub fn set_container_port(&self, port: u16) {
        self.container_port.store(port, Ordering::Relaxed);
    }

    /// Pick the next backend and count the request.
    pub fn select(&self) -> Option<Target> {
        let roster = self.roster.load();
        let backend = self.selector.select(&roster)?;
        let target = self.targets.get(&backend.container_name)?.value().clone();
        self.requests.record();
        Some(target)
    }

    pub fn rate(&self) -> f64 {
        self.requests.rate()
    }

    pub fn prune(&self) -> usize {
        self.requests.prune()
    }

    pub fn backends(&self) -> Arc<Vec<BackendInstance>> {
        self.roster.load_full()
    }

    pub fn cached_targets(&self) -> usize {
        self.targets.len()
    }
}
