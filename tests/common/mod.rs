//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use fleet_orchestrator::config::{AutoscaleConfig, PortConfig, RuntimeConfig, RuntimeKind};
use fleet_orchestrator::fleet::{
    BackendInstance, InstanceId, LbInstance, MemoryStore, PortAllocator, ServiceDefinition,
    ServiceId, ServiceStore,
};
use fleet_orchestrator::health::{MonitorDeps, Prober};
use fleet_orchestrator::http::ProbeError;
use fleet_orchestrator::reconcile::InstanceManager;
use fleet_orchestrator::runtime::{ContainerRuntime, MockRuntime};

/// Start a mock backend on an ephemeral port that returns a fixed body.
pub async fn start_mock_backend(response: &'static str) -> SocketAddr {
    start_programmable_backend(move || async move { (200, response.to_string()) }).await
}

/// Start a programmable mock backend on an ephemeral port.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        // read the request head; bodies are not used
                        let mut buf = [0u8; 4096];
                        let _ = socket.read(&mut buf).await;

                        let (status, body) = f().await;
                        let status_text = match status {
                            200 => "200 OK",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };
                        let response_str = format!(
                            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });
    addr
}

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

pub fn backend(service_id: ServiceId, port: u16, is_healthy: bool) -> BackendInstance {
    BackendInstance {
        id: InstanceId::new(),
        service_id,
        host: "localhost".into(),
        port,
        is_healthy,
        unhealthy_count: 0,
        container_name: format!("lb-adopted-backend-{port}"),
    }
}

pub fn load_balancer(service_id: ServiceId, port: u16, is_healthy: bool) -> LbInstance {
    LbInstance {
        id: InstanceId::new(),
        service_id,
        port,
        health_port: port + 1000,
        is_healthy,
        unhealthy_count: 0,
        container_name: format!("lb-adopted-load-balancer-{port}"),
    }
}

/// Probe results scripted per port.
///
/// Backends are healthy and load balancers report `default_lb_rate` unless
/// told otherwise.
#[derive(Default)]
pub struct FakeProber {
    failing_backends: Mutex<HashSet<u16>>,
    failing_lbs: Mutex<HashSet<u16>>,
    lb_rates: Mutex<HashMap<u16, f64>>,
    lb_delays: Mutex<HashMap<u16, Duration>>,
    default_lb_rate: Mutex<f64>,
    notified: Mutex<Vec<String>>,
    pub backend_probes: AtomicUsize,
    pub lb_reports: AtomicUsize,
}

impl FakeProber {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_backend(&self, port: u16) {
        self.failing_backends.lock().unwrap().insert(port);
    }

    pub fn heal_backend(&self, port: u16) {
        self.failing_backends.lock().unwrap().remove(&port);
    }

    pub fn fail_lb(&self, port: u16) {
        self.failing_lbs.lock().unwrap().insert(port);
    }

    pub fn set_lb_rate(&self, port: u16, rate: f64) {
        self.lb_rates.lock().unwrap().insert(port, rate);
    }

    pub fn set_default_lb_rate(&self, rate: f64) {
        *self.default_lb_rate.lock().unwrap() = rate;
    }

    pub fn delay_lb(&self, port: u16, delay: Duration) {
        self.lb_delays.lock().unwrap().insert(port, delay);
    }

    /// Container names of every load balancer told to refresh, in order.
    pub fn notified(&self) -> Vec<String> {
        self.notified.lock().unwrap().clone()
    }

    pub fn clear_notified(&self) {
        self.notified.lock().unwrap().clear();
    }

    fn refused(port: u16) -> ProbeError {
        ProbeError::Connect {
            url: format!("http://localhost:{port}"),
            reason: "connection refused".into(),
        }
    }
}

#[async_trait]
impl Prober for FakeProber {
    async fn check_backend(&self, backend: &BackendInstance, _path: &str) -> Result<(), ProbeError> {
        self.backend_probes.fetch_add(1, Ordering::SeqCst);
        if self.failing_backends.lock().unwrap().contains(&backend.port) {
            return Err(Self::refused(backend.port));
        }
        Ok(())
    }

    async fn lb_rate(&self, lb: &LbInstance) -> Result<f64, ProbeError> {
        let delay = self.lb_delays.lock().unwrap().get(&lb.port).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.lb_reports.fetch_add(1, Ordering::SeqCst);
        if self.failing_lbs.lock().unwrap().contains(&lb.port) {
            return Err(Self::refused(lb.health_port));
        }
        let rate = self.lb_rates.lock().unwrap().get(&lb.port).copied();
        Ok(rate.unwrap_or(*self.default_lb_rate.lock().unwrap()))
    }

    async fn notify_refresh(&self, lb: &LbInstance) -> Result<(), ProbeError> {
        self.notified.lock().unwrap().push(lb.container_name.clone());
        Ok(())
    }
}

/// Everything a health monitor needs, backed by in-memory fakes.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub runtime: Arc<MockRuntime>,
    pub prober: Arc<FakeProber>,
    pub deps: MonitorDeps,
}

impl Harness {
    pub fn new(definitions: Vec<ServiceDefinition>) -> Self {
        Self::with_autoscale(definitions, AutoscaleConfig::default())
    }

    pub fn with_autoscale(definitions: Vec<ServiceDefinition>, autoscale: AutoscaleConfig) -> Self {
        Self::build(definitions, autoscale, PortConfig::default())
    }

    pub fn with_ports(definitions: Vec<ServiceDefinition>, ports: PortConfig) -> Self {
        Self::build(definitions, AutoscaleConfig::default(), ports)
    }

    fn build(definitions: Vec<ServiceDefinition>, autoscale: AutoscaleConfig, ports: PortConfig) -> Self {
        let store = Arc::new(MemoryStore::new(definitions));
        let runtime = Arc::new(MockRuntime::new());
        let prober = FakeProber::new();
        let config = RuntimeConfig {
            kind: RuntimeKind::Mock,
            ..RuntimeConfig::default()
        };
        let instances = Arc::new(InstanceManager::new(
            runtime.clone() as Arc<dyn ContainerRuntime>,
            store.clone() as Arc<dyn ServiceStore>,
            PortAllocator::new(&ports),
            config,
        ));
        let deps = MonitorDeps {
            instances,
            prober: prober.clone(),
            autoscale,
            min_lb_count: 2,
        };
        Self {
            store,
            runtime,
            prober,
            deps,
        }
    }
}

/// Poll `check` until it holds or `timeout` elapses.
pub async fn wait_until<F>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
