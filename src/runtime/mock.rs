//! In-process runtime that records calls instead of running containers.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::info;

use super::{ContainerError, ContainerRuntime, ContainerSpec};

/// One recorded runtime call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    Start(ContainerSpec),
    Stop(String),
    Remove(String),
    CreateNetwork(String),
}

/// Mock runtime for testing and development.
#[derive(Debug, Default)]
pub struct MockRuntime {
    calls: Mutex<Vec<RuntimeCall>>,
    running: Mutex<HashSet<String>>,
    networks: Mutex<HashSet<String>>,
    /// Whether container starts should "fail".
    fail_starts: AtomicBool,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock runtime that fails all starts.
    pub fn failing() -> Self {
        let runtime = Self::default();
        runtime.set_fail_starts(true);
        runtime
    }

    pub fn set_fail_starts(&self, fail: bool) {
        self.fail_starts.store(fail, Ordering::SeqCst);
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.calls.lock().expect("runtime mutex poisoned").clone()
    }

    /// Names of containers started and not yet removed.
    pub fn running(&self) -> HashSet<String> {
        self.running.lock().expect("runtime mutex poisoned").clone()
    }

    fn record(&self, call: RuntimeCall) {
        self.calls.lock().expect("runtime mutex poisoned").push(call);
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn start_container(&self, spec: &ContainerSpec) -> Result<(), ContainerError> {
        self.record(RuntimeCall::Start(spec.clone()));
        if self.fail_starts.load(Ordering::SeqCst) {
            return Err(ContainerError::Failed {
                op: "start",
                name: spec.name.clone(),
                status: Some(125),
                stderr: "mock runtime configured to fail".to_string(),
            });
        }
        info!(name = %spec.name, image = %spec.image, "Mock container started");
        self.running
            .lock()
            .expect("runtime mutex poisoned")
            .insert(spec.name.clone());
        Ok(())
    }

    async fn stop_container(&self, name: &str) -> Result<(), ContainerError> {
        self.record(RuntimeCall::Stop(name.to_string()));
        Ok(())
    }

    async fn remove_container(&self, name: &str) -> Result<(), ContainerError> {
        self.record(RuntimeCall::Remove(name.to_string()));
        self.running.lock().expect("runtime mutex poisoned").remove(name);
        Ok(())
    }

    async fn network_exists(&self, name: &str) -> Result<bool, ContainerError> {
        Ok(self.networks.lock().expect("runtime mutex poisoned").contains(name))
    }

    async fn create_network(&self, name: &str, _subnet: &str) -> Result<(), ContainerError> {
        self.record(RuntimeCall::CreateNetwork(name.to_string()));
        self.networks
            .lock()
            .expect("runtime mutex poisoned")
            .insert(name.to_string());
        Ok(())
    }
}
