//! Probes the control plane sends to running instances.

use std::time::Duration;

use async_trait::async_trait;

use crate::config::{ProbeConfig, RuntimeConfig};
use crate::fleet::{BackendInstance, LbInstance};
use crate::http::{FleetClient, ProbeError};

/// Outbound calls a health monitor makes.
#[async_trait]
pub trait Prober: Send + Sync {
    /// `GET <healthEndpoint>` on a backend; success means 2xx.
    async fn check_backend(&self, backend: &BackendInstance, path: &str) -> Result<(), ProbeError>;

    /// `GET /lb-health` on a load balancer; answers its request rate.
    async fn lb_rate(&self, lb: &LbInstance) -> Result<f64, ProbeError>;

    /// `GET /service-update` on a load balancer so it re-reads its backends.
    async fn notify_refresh(&self, lb: &LbInstance) -> Result<(), ProbeError>;
}

/// HTTP prober over published host ports.
pub struct HttpProber {
    client: FleetClient,
    lb_host: String,
    backend_timeout: Duration,
    lb_report_timeout: Duration,
    notify_timeout: Duration,
}

impl HttpProber {
    pub fn new(client: FleetClient, probes: &ProbeConfig, runtime: &RuntimeConfig) -> Self {
        Self {
            client,
            lb_host: runtime.instance_host.clone(),
            backend_timeout: Duration::from_secs(probes.backend_timeout_secs),
            lb_report_timeout: Duration::from_secs(probes.lb_report_timeout_secs),
            notify_timeout: Duration::from_secs(probes.notify_timeout_secs),
        }
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn check_backend(&self, backend: &BackendInstance, path: &str) -> Result<(), ProbeError> {
        let url = format!("http://{}:{}{}", backend.host, backend.port, path);
        self.client.get(&url, self.backend_timeout).await.map(|_| ())
    }

    async fn lb_rate(&self, lb: &LbInstance) -> Result<f64, ProbeError> {
        let url = format!("http://{}:{}/lb-health", self.lb_host, lb.health_port);
        self.client.get_json(&url, self.lb_report_timeout).await
    }

    async fn notify_refresh(&self, lb: &LbInstance) -> Result<(), ProbeError> {
        let url = format!("http://{}:{}/service-update", self.lb_host, lb.health_port);
        self.client.get(&url, self.notify_timeout).await.map(|_| ())
    }
}
