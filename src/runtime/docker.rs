//! Docker CLI runtime.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{ContainerError, ContainerRuntime, ContainerSpec};

/// Runtime driving containers through the `docker` executable.
pub struct DockerCli {
    bin: String,
}

impl DockerCli {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    /// Run `docker <args>`; a non-zero exit is reported with its stderr.
    async fn run(&self, op: &'static str, name: &str, args: &[String]) -> Result<(), ContainerError> {
        debug!(op, name, "docker {}", args.join(" "));
        let output = Command::new(&self.bin)
            .args(args)
            .output()
            .await
            .map_err(|source| ContainerError::Spawn { op, source })?;

        if !output.status.success() {
            return Err(ContainerError::Failed {
                op,
                name: name.to_string(),
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

/// Arguments of `docker run` for a container spec.
fn run_args(spec: &ContainerSpec) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "-d".to_string(),
        "--name".to_string(),
        spec.name.clone(),
        "--network".to_string(),
        spec.network.clone(),
    ];
    for (host, container) in &spec.ports {
        args.push("-p".to_string());
        args.push(format!("{}:{}", host, container));
    }
    for (key, value) in &spec.env {
        args.push("-e".to_string());
        args.push(format!("{}={}", key, value));
    }
    args.push(spec.image.clone());
    args
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn start_container(&self, spec: &ContainerSpec) -> Result<(), ContainerError> {
        self.run("start", &spec.name, &run_args(spec)).await
    }

    async fn stop_container(&self, name: &str) -> Result<(), ContainerError> {
        self.run("stop", name, &["stop".to_string(), name.to_string()]).await
    }

    async fn remove_container(&self, name: &str) -> Result<(), ContainerError> {
        self.run("remove", name, &["rm".to_string(), name.to_string()]).await
    }

    async fn network_exists(&self, name: &str) -> Result<bool, ContainerError> {
        let args = ["network".to_string(), "inspect".to_string(), name.to_string()];
        match self.run("inspect network", name, &args).await {
            Ok(()) => Ok(true),
            Err(ContainerError::Failed { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn create_network(&self, name: &str, subnet: &str) -> Result<(), ContainerError> {
        let args = [
            "network".to_string(),
            "create".to_string(),
            "--subnet".to_string(),
            subnet.to_string(),
            name.to_string(),
        ];
        self.run("create network", name, &args).await
    }
}
