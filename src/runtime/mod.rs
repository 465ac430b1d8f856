//! Container runtime interface.
//!
//! The runtime is an opaque capability: start, stop and remove named
//! containers, and make sure the shared network exists. The control plane
//! never inspects running containers; health is learned by probing.
//!
//! - `docker.rs`: shells out to the `docker` CLI
//! - `mock.rs`: records calls, for tests and dry runs

pub mod docker;
pub mod mock;

use async_trait::async_trait;
use thiserror::Error;

pub use docker::DockerCli;
pub use mock::{MockRuntime, RuntimeCall};

/// Everything needed to start one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub network: String,
    /// `(host_port, container_port)` mappings.
    pub ports: Vec<(u16, u16)>,
    pub env: Vec<(String, String)>,
}

/// Failure of a runtime operation.
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("failed to run {op}: {source}")]
    Spawn {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{op} {name} failed (exit {status:?}): {stderr}")]
    Failed {
        op: &'static str,
        name: String,
        status: Option<i32>,
        stderr: String,
    },
}

/// Container lifecycle operations.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn start_container(&self, spec: &ContainerSpec) -> Result<(), ContainerError>;

    async fn stop_container(&self, name: &str) -> Result<(), ContainerError>;

    async fn remove_container(&self, name: &str) -> Result<(), ContainerError>;

    async fn network_exists(&self, name: &str) -> Result<bool, ContainerError>;

    async fn create_network(&self, name: &str, subnet: &str) -> Result<(), ContainerError>;
}
