//! Configuration schema definitions.
//!
//! This module defines the configuration of an orchestrator node and of a
//! load-balancer process. All types derive Serde traits for deserialization
//! from TOML files, and every field has a default so minimal files work.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration of an orchestrator node.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Ring membership and leader election.
    pub election: ElectionConfig,

    /// Reconciliation and provisioning settings.
    pub reconciler: ReconcilerConfig,

    /// Autoscaling thresholds and LB probe cadence.
    pub autoscale: AutoscaleConfig,

    /// Outbound probe timeouts.
    pub probes: ProbeConfig,

    /// Container runtime settings.
    pub runtime: RuntimeConfig,

    /// Persistence locations.
    pub store: StoreConfig,

    /// Admin API settings.
    pub admin: AdminConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Ring membership of this node.
///
/// The four identity fields are optional: a node missing any of them runs
/// as an unconditional leader instead of joining the ring.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ElectionConfig {
    /// Port this node serves `/health` and election messages on.
    pub runner_port: Option<u16>,

    /// Port of this node's successor on the ring.
    pub neighbour_port: Option<u16>,

    /// Number of nodes on the ring.
    pub max_nodes: Option<usize>,

    /// Whether this node starts as leader.
    pub is_leader: Option<bool>,

    /// Port of the first ring slot.
    pub base_port: u16,

    /// Distance between consecutive ring ports.
    pub port_step: u16,

    /// Host peers are reached on.
    pub peer_host: String,

    /// Neighbour probe interval in milliseconds.
    pub probe_interval_ms: u64,

    /// Consecutive failed probes before the neighbour is declared down.
    pub missed_heartbeat_limit: u32,

    /// Timeout for every call to a peer, in seconds.
    pub peer_timeout_secs: u64,

    /// An election not finished within this many seconds is abandoned.
    pub election_timeout_secs: u64,
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            runner_port: None,
            neighbour_port: None,
            max_nodes: None,
            is_leader: None,
            base_port: 3010,
            port_step: 10,
            peer_host: "localhost".to_string(),
            probe_interval_ms: 2000,
            missed_heartbeat_limit: 3,
            peer_timeout_secs: 2,
            election_timeout_secs: 30,
        }
    }
}

/// Reconciliation settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Tear down and re-provision every instance when leadership is taken.
    pub full_reset: bool,

    /// Floor on live load balancers per service.
    pub min_lb_count: usize,

    /// First host port of each kind.
    pub ports: PortConfig,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            full_reset: true,
            min_lb_count: 2,
            ports: PortConfig::default(),
        }
    }
}

/// Start values of the per-kind port counters.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PortConfig {
    pub backend_start: u16,
    pub lb_start: u16,
    pub lb_health_start: u16,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            backend_start: 7001,
            lb_start: 5001,
            lb_health_start: 3201,
        }
    }
}

/// Autoscaling thresholds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AutoscaleConfig {
    /// LB probe cadence in seconds.
    pub lb_tick_secs: u64,

    /// Number of LB ticks per scaling evaluation (and rate buffer slots).
    pub evaluation_ticks: u32,

    /// Consecutive failed LB reports before the LB is replaced.
    pub lb_unhealthy_threshold: u32,

    /// Per-backend rate above which a backend is added.
    pub backend_rate_upper: f64,

    /// Per-backend rate below which a backend is removed.
    pub backend_rate_lower: f64,

    /// Per-LB rate above which a load balancer is added.
    pub lb_rate_upper: f64,

    /// Per-LB rate below which a load balancer is removed.
    pub lb_rate_lower: f64,
}

impl Default for AutoscaleConfig {
    fn default() -> Self {
        Self {
            lb_tick_secs: 2,
            evaluation_ticks: 5,
            lb_unhealthy_threshold: 2,
            backend_rate_upper: 20.0,
            backend_rate_lower: 12.0,
            lb_rate_upper: 60.0,
            lb_rate_lower: 20.0,
        }
    }
}

/// Timeouts of calls the control plane makes to instances.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub backend_timeout_secs: u64,
    pub lb_report_timeout_secs: u64,
    pub notify_timeout_secs: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            backend_timeout_secs: 3,
            lb_report_timeout_secs: 5,
            notify_timeout_secs: 5,
        }
    }
}

/// Which container runtime drives instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKind {
    Docker,
    Mock,
}

/// Container runtime settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub kind: RuntimeKind,

    /// Docker executable.
    pub docker_bin: String,

    /// Network every instance joins.
    pub network: String,

    /// Subnet used when the network has to be created.
    pub subnet: String,

    /// Image of load-balancer containers.
    pub lb_image: String,

    /// Proxy port inside a load-balancer container.
    pub lb_container_port: u16,

    /// Health/report port inside a load-balancer container.
    pub lb_health_container_port: u16,

    /// Host published ports are reached on from the orchestrator.
    pub instance_host: String,

    /// Prefix of every container name this fleet owns.
    pub name_prefix: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            kind: RuntimeKind::Docker,
            docker_bin: "docker".to_string(),
            network: "load-balancer-network".to_string(),
            subnet: "10.0.0.0/16".to_string(),
            lb_image: "load-balancer-server:latest".to_string(),
            lb_container_port: 4000,
            lb_health_container_port: 3210,
            instance_host: "localhost".to_string(),
            name_prefix: "lb".to_string(),
        }
    }
}

/// Persistence locations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Operator-owned service definitions.
    pub services_path: PathBuf,

    /// Orchestrator-owned instance records.
    pub instances_path: PathBuf,

    /// Reload services when the definitions file changes.
    pub watch: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            services_path: PathBuf::from("fleet/services.json"),
            instances_path: PathBuf::from("fleet/instances.json"),
            watch: true,
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Serve the admin API on the leader.
    pub enabled: bool,

    /// API key for `/admin` routes (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "0.0.0.0:3000".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log filter used when `RUST_LOG` is unset.
    pub log_level: String,

    /// Emit JSON log lines instead of the human-readable format.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Address a load balancer forwards to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetAddress {
    /// `http://{containerName}:{containerPort}` over the container network.
    Container,
    /// `http://{host}:{port}` via the published host port.
    Published,
}

/// Root configuration of a load-balancer process.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoadBalancerConfig {
    /// Service whose backends this process balances.
    pub service_name: String,

    /// Name of this container, for logs.
    pub container_name: String,

    /// Proxy listener.
    pub proxy_address: String,

    /// Health/report listener.
    pub health_address: String,

    /// Periodic backend-list refresh in seconds.
    pub refresh_interval_secs: u64,

    /// Request-log prune cadence in seconds.
    pub prune_interval_secs: u64,

    /// Trailing window the request rate is measured over, in seconds.
    pub rate_window_secs: u64,

    /// Request-log entries older than this are pruned, in seconds.
    pub retention_secs: u64,

    /// Upstream request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Attempts to find the service definition at startup.
    pub startup_attempts: u32,

    /// How forwarding targets are addressed.
    pub target_address: TargetAddress,

    pub store: StoreConfig,

    pub observability: ObservabilityConfig,
}

impl Default for LoadBalancerConfig {
    fn default() -> Self {
        Self {
            service_name: String::new(),
            container_name: String::new(),
            proxy_address: "0.0.0.0:4000".to_string(),
            health_address: "0.0.0.0:3210".to_string(),
            refresh_interval_secs: 5,
            prune_interval_secs: 60,
            rate_window_secs: 30,
            retention_secs: 60,
            request_timeout_secs: 30,
            startup_attempts: 10,
            target_address: TargetAddress::Container,
            store: StoreConfig {
                watch: false,
                ..StoreConfig::default()
            },
            observability: ObservabilityConfig {
                metrics_enabled: false,
                ..ObservabilityConfig::default()
            },
        }
    }
}
