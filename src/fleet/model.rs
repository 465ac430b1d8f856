//! Fleet data model.
//!
//! # Responsibilities
//! - Persisted service definitions (scalar desired state)
//! - Backend and load-balancer instance records
//! - The live `Service` record a health loop owns exclusively
//!
//! # Design Decisions
//! - Field names on the wire follow the persisted JSON (`camelCase`)
//! - Instance identity is a UUID generated at creation, never reused
//! - Unhealthy counters are in-memory only and never persisted

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Persisted identifier of a service definition.
pub type ServiceId = u64;

/// Unique identifier of a backend or load-balancer instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(Uuid);

impl InstanceId {
    /// Generate a new random instance ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity used when diffing the running set against the persisted set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceKey {
    pub id: ServiceId,
    pub name: String,
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.id)
    }
}

/// Scalar desired state of a service, as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDefinition {
    pub id: ServiceId,
    /// Unique service name.
    pub name: String,
    /// Path probed on every backend (e.g. `/health`).
    pub health_endpoint: String,
    /// Consecutive failed probes before a backend is replaced.
    #[serde(rename = "unHealthyThreshold")]
    pub unhealthy_threshold: u32,
    /// Backend probe cadence in seconds.
    #[serde(rename = "healthCheckInterval")]
    pub health_check_interval_secs: u64,
    /// Minimum number of backends.
    pub min: usize,
    /// Maximum number of backends.
    pub max: usize,
    /// Backend container image, optionally tagged.
    #[serde(rename = "containerImageName")]
    pub container_image: String,
    /// Port the backend listens on inside its container.
    pub container_port: u16,
}

impl ServiceDefinition {
    pub fn key(&self) -> ServiceKey {
        ServiceKey {
            id: self.id,
            name: self.name.clone(),
        }
    }

    /// Image name without its tag (`demo:1.2` → `demo`).
    pub fn image_base(&self) -> &str {
        self.container_image
            .split(':')
            .next()
            .unwrap_or(&self.container_image)
    }

    /// Upper bound on load balancers: `ceil(max / 2) + 1`.
    pub fn max_load_balancers(&self) -> usize {
        self.max.div_ceil(2) + 1
    }
}

/// One running backend container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendInstance {
    pub id: InstanceId,
    /// Back-reference to the owning service.
    pub service_id: ServiceId,
    /// Host the orchestrator reaches the published port on.
    pub host: String,
    /// Published host port.
    pub port: u16,
    pub is_healthy: bool,
    #[serde(skip)]
    pub unhealthy_count: u32,
    pub container_name: String,
}

impl BackendInstance {
    /// Record a successful probe. Returns true on an unhealthy → healthy transition.
    pub fn record_success(&mut self) -> bool {
        let recovered = !self.is_healthy;
        self.is_healthy = true;
        self.unhealthy_count = 0;
        recovered
    }

    /// Record a failed probe. Returns true if the health flag changed.
    pub fn record_failure(&mut self) -> bool {
        let changed = self.is_healthy;
        self.is_healthy = false;
        self.unhealthy_count += 1;
        changed
    }
}

/// One running load-balancer container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LbInstance {
    pub id: InstanceId,
    pub service_id: ServiceId,
    /// Published proxy port.
    pub port: u16,
    /// Published port of the health/report endpoint.
    pub health_port: u16,
    pub is_healthy: bool,
    #[serde(skip)]
    pub unhealthy_count: u32,
    pub container_name: String,
}

impl LbInstance {
    /// Record a successful report. The counter decays by one per success.
    /// Returns true if the health flag changed.
    pub fn record_success(&mut self) -> bool {
        let changed = !self.is_healthy;
        self.is_healthy = true;
        self.unhealthy_count = self.unhealthy_count.saturating_sub(1);
        changed
    }

    /// Record a failed report. Returns true if the health flag changed.
    pub fn record_failure(&mut self) -> bool {
        let changed = self.is_healthy;
        self.is_healthy = false;
        self.unhealthy_count += 1;
        changed
    }
}

/// A service together with the instance pools it exclusively owns.
#[derive(Debug, Clone, PartialEq)]
pub struct Service {
    pub definition: ServiceDefinition,
    pub backends: Vec<BackendInstance>,
    pub load_balancers: Vec<LbInstance>,
}

impl Service {
    pub fn new(definition: ServiceDefinition) -> Self {
        Self {
            definition,
            backends: Vec::new(),
            load_balancers: Vec::new(),
        }
    }

    pub fn key(&self) -> ServiceKey {
        self.definition.key()
    }

    pub fn healthy_backends(&self) -> usize {
        self.backends.iter().filter(|b| b.is_healthy).count()
    }

    pub fn healthy_load_balancers(&self) -> usize {
        self.load_balancers.iter().filter(|lb| lb.is_healthy).count()
    }
}

/// Read-only view of a service published by its health loop.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub id: ServiceId,
    pub name: String,
    pub min: usize,
    pub max: usize,
    pub backends: Vec<BackendInstance>,
    pub load_balancers: Vec<LbInstance>,
    /// Last evaluated per-backend request rate.
    pub avg_backend_rate: Option<f64>,
    /// Last evaluated per-LB request rate.
    pub avg_lb_rate: Option<f64>,
}

impl ServiceStatus {
    pub fn from_service(service: &Service) -> Self {
        Self {
            id: service.definition.id,
            name: service.definition.name.clone(),
            min: service.definition.min,
            max: service.definition.max,
            backends: service.backends.clone(),
            load_balancers: service.load_balancers.clone(),
            avg_backend_rate: None,
            avg_lb_rate: None,
        }
    }

    pub fn healthy_load_balancers(&self) -> Vec<LbInstance> {
        self.load_balancers
            .iter()
            .filter(|lb| lb.is_healthy)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn definition(id: ServiceId, name: &str) -> ServiceDefinition {
        ServiceDefinition {
            id,
            name: name.to_string(),
            health_endpoint: "/health".to_string(),
            unhealthy_threshold: 3,
            health_check_interval_secs: 5,
            min: 2,
            max: 6,
            container_image: "demo-backend:latest".to_string(),
            container_port: 8080,
        }
    }
}
