//! Instance provisioning and retirement.
//!
//! # Responsibilities
//! - Allocate ports and names for new backend and load-balancer instances
//! - Start and stop their containers through the runtime
//! - Keep the store's instance records in step with what was launched
//!
//! # Design Decisions
//! - Launch yields an instance record even when the container fails to
//!   start; the record then fails its probes and is replaced like any other
//!   unhealthy instance
//! - Launch yields nothing once the host port range is exhausted
//! - A record is persisted only once its container started
//! - Runtime and store failures are logged, never propagated: nothing here
//!   may abort a health tick

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::RuntimeConfig;
use crate::fleet::{
    BackendInstance, InstanceId, LbInstance, PortAllocator, Service, ServiceDefinition, ServiceId,
    ServiceStore,
};
use crate::runtime::{ContainerRuntime, ContainerSpec};

/// Creates and destroys instances for every service on this node.
pub struct InstanceManager {
    runtime: Arc<dyn ContainerRuntime>,
    store: Arc<dyn ServiceStore>,
    ports: PortAllocator,
    config: RuntimeConfig,
}

impl InstanceManager {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        store: Arc<dyn ServiceStore>,
        ports: PortAllocator,
        config: RuntimeConfig,
    ) -> Self {
        Self {
            runtime,
            store,
            ports,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn ServiceStore> {
        &self.store
    }

    pub fn ports(&self) -> &PortAllocator {
        &self.ports
    }

    /// `lb-{service}-{imageBase}-{port}`
    pub fn backend_container_name(&self, definition: &ServiceDefinition, port: u16) -> String {
        format!(
            "{}-{}-{}-{}",
            self.config.name_prefix,
            definition.name,
            definition.image_base(),
            port
        )
    }

    /// `lb-{service}-load-balancer-{port}`
    pub fn lb_container_name(&self, definition: &ServiceDefinition, port: u16) -> String {
        format!(
            "{}-{}-load-balancer-{}",
            self.config.name_prefix, definition.name, port
        )
    }

    /// Create the shared container network when it is missing.
    pub async fn ensure_network(&self) {
        let network = &self.config.network;
        match self.runtime.network_exists(network).await {
            Ok(true) => {}
            Ok(false) => {
                info!(network = %network, subnet = %self.config.subnet, "Creating container network");
                if let Err(e) = self.runtime.create_network(network, &self.config.subnet).await {
                    warn!(network = %network, error = %e, "Failed to create container network");
                }
            }
            Err(e) => warn!(network = %network, error = %e, "Failed to inspect container network"),
        }
    }

    /// Start a fresh backend for `definition` on the next free port.
    pub async fn launch_backend(&self, definition: &ServiceDefinition) -> Option<BackendInstance> {
        let Some(port) = self.ports.next_backend() else {
            error!(service = %definition.name, "Backend port range exhausted, not launching");
            return None;
        };
        let backend = BackendInstance {
            id: InstanceId::new(),
            service_id: definition.id,
            host: self.config.instance_host.clone(),
            port,
            is_healthy: false,
            unhealthy_count: 0,
            container_name: self.backend_container_name(definition, port),
        };

        let spec = ContainerSpec {
            name: backend.container_name.clone(),
            image: definition.container_image.clone(),
            network: self.config.network.clone(),
            ports: vec![(port, definition.container_port)],
            env: vec![("CONTAINER_NAME".to_string(), backend.container_name.clone())],
        };

        match self.runtime.start_container(&spec).await {
            Ok(()) => {
                info!(service = %definition.name, container = %backend.container_name, port, "Backend started");
                self.persist_backend(&backend).await;
            }
            Err(e) => {
                warn!(service = %definition.name, container = %backend.container_name, error = %e, "Failed to start backend")
            }
        }
        Some(backend)
    }

    /// Start a fresh load balancer for `definition` on the next free ports.
    pub async fn launch_load_balancer(&self, definition: &ServiceDefinition) -> Option<LbInstance> {
        let Some(ports) = self.ports.next_lb() else {
            error!(service = %definition.name, "Load balancer port range exhausted, not launching");
            return None;
        };
        let lb = LbInstance {
            id: InstanceId::new(),
            service_id: definition.id,
            port: ports.port,
            health_port: ports.health_port,
            is_healthy: false,
            unhealthy_count: 0,
            container_name: self.lb_container_name(definition, ports.port),
        };

        let spec = ContainerSpec {
            name: lb.container_name.clone(),
            image: self.config.lb_image.clone(),
            network: self.config.network.clone(),
            ports: vec![
                (lb.port, self.config.lb_container_port),
                (lb.health_port, self.config.lb_health_container_port),
            ],
            env: vec![
                ("CONTAINER_NAME".to_string(), lb.container_name.clone()),
                ("SERVICE_NAME".to_string(), definition.name.clone()),
            ],
        };

        match self.runtime.start_container(&spec).await {
            Ok(()) => {
                info!(
                    service = %definition.name,
                    container = %lb.container_name,
                    port = lb.port,
                    health_port = lb.health_port,
                    "Load balancer started"
                );
                self.persist_load_balancer(&lb).await;
            }
            Err(e) => {
                warn!(service = %definition.name, container = %lb.container_name, error = %e, "Failed to start load balancer")
            }
        }
        Some(lb)
    }

    /// Stop then remove a container, logging each failure.
    async fn destroy(&self, container: &str) {
        if let Err(e) = self.runtime.stop_container(container).await {
            warn!(container = %container, error = %e, "Failed to stop container");
        }
        if let Err(e) = self.runtime.remove_container(container).await {
            warn!(container = %container, error = %e, "Failed to remove container");
        }
    }

    pub async fn retire_backend(&self, backend: &BackendInstance) {
        self.destroy(&backend.container_name).await;
        if let Err(e) = self.store.delete_backend(backend.id).await {
            warn!(container = %backend.container_name, error = %e, "Failed to delete backend record");
        }
        info!(container = %backend.container_name, port = backend.port, "Backend retired");
    }

    pub async fn retire_load_balancer(&self, lb: &LbInstance) {
        self.destroy(&lb.container_name).await;
        if let Err(e) = self.store.delete_load_balancer(lb.id).await {
            warn!(container = %lb.container_name, error = %e, "Failed to delete load balancer record");
        }
        info!(container = %lb.container_name, port = lb.port, "Load balancer retired");
    }

    /// Tear down every given instance of a service and drop its records.
    pub async fn retire_instances(
        &self,
        service_id: ServiceId,
        backends: &[BackendInstance],
        load_balancers: &[LbInstance],
    ) {
        for lb in load_balancers {
            self.destroy(&lb.container_name).await;
        }
        for backend in backends {
            self.destroy(&backend.container_name).await;
        }
        if let Err(e) = self.store.delete_service_instances(service_id).await {
            warn!(service_id, error = %e, "Failed to delete instance records");
        }
    }

    pub async fn retire_all(&self, service: &Service) {
        info!(
            service = %service.definition.name,
            backends = service.backends.len(),
            load_balancers = service.load_balancers.len(),
            "Tearing down service instances"
        );
        self.retire_instances(service.definition.id, &service.backends, &service.load_balancers)
            .await;
    }

    pub async fn persist_backend(&self, backend: &BackendInstance) {
        if let Err(e) = self.store.save_backend(backend).await {
            warn!(container = %backend.container_name, error = %e, "Failed to save backend record");
        }
    }

    pub async fn persist_load_balancer(&self, lb: &LbInstance) {
        if let Err(e) = self.store.save_load_balancer(lb).await {
            warn!(container = %lb.container_name, error = %e, "Failed to save load balancer record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PortConfig;
    use crate::fleet::{model::fixtures, MemoryStore};
    use crate::runtime::{MockRuntime, RuntimeCall};

    fn manager(runtime: Arc<MockRuntime>, store: Arc<MemoryStore>) -> InstanceManager {
        InstanceManager::new(
            runtime,
            store,
            PortAllocator::new(&PortConfig::default()),
            RuntimeConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_launch_backend_names_and_maps_ports() {
        let runtime = Arc::new(MockRuntime::new());
        let store = Arc::new(MemoryStore::default());
        let instances = manager(runtime.clone(), store.clone());
        let def = fixtures::definition(1, "web");

        let backend = instances.launch_backend(&def).await.unwrap();
        assert_eq!(backend.port, 7001);
        assert_eq!(backend.container_name, "lb-web-demo-backend-7001");
        assert!(!backend.is_healthy);

        match &runtime.calls()[0] {
            RuntimeCall::Start(spec) => {
                assert_eq!(spec.ports, vec![(7001, 8080)]);
                assert_eq!(spec.image, "demo-backend:latest");
                assert_eq!(spec.network, "load-balancer-network");
            }
            other => panic!("unexpected call {:?}", other),
        }
        assert_eq!(store.records().backends, vec![backend]);
    }

    #[tokio::test]
    async fn test_launch_load_balancer_env() {
        let runtime = Arc::new(MockRuntime::new());
        let instances = manager(runtime.clone(), Arc::new(MemoryStore::default()));
        let lb = instances
            .launch_load_balancer(&fixtures::definition(1, "web"))
            .await
            .unwrap();
        assert_eq!((lb.port, lb.health_port), (5001, 3201));
        assert_eq!(lb.container_name, "lb-web-load-balancer-5001");

        let calls = runtime.calls();
        let RuntimeCall::Start(spec) = &calls[0] else {
            panic!("expected a start call");
        };
        assert_eq!(spec.image, "load-balancer-server:latest");
        assert_eq!(spec.ports, vec![(5001, 4000), (3201, 3210)]);
        assert!(spec.env.contains(&("SERVICE_NAME".to_string(), "web".to_string())));
    }

    #[tokio::test]
    async fn test_failed_start_is_not_persisted() {
        let runtime = Arc::new(MockRuntime::failing());
        let store = Arc::new(MemoryStore::default());
        let instances = manager(runtime, store.clone());

        let backend = instances.launch_backend(&fixtures::definition(1, "web")).await.unwrap();
        assert_eq!(backend.port, 7001);
        assert!(store.records().backends.is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_ports_launch_nothing() {
        let runtime = Arc::new(MockRuntime::new());
        let store = Arc::new(MemoryStore::default());
        let instances = InstanceManager::new(
            runtime.clone(),
            store.clone(),
            PortAllocator::new(&PortConfig {
                backend_start: 65535,
                ..PortConfig::default()
            }),
            RuntimeConfig::default(),
        );
        let def = fixtures::definition(1, "web");

        assert_eq!(instances.launch_backend(&def).await.unwrap().port, 65535);
        assert!(instances.launch_backend(&def).await.is_none());
        assert_eq!(runtime.calls().len(), 1);
        assert_eq!(store.records().backends.len(), 1);
    }

    #[tokio::test]
    async fn test_retire_stops_removes_and_deletes() {
        let runtime = Arc::new(MockRuntime::new());
        let store = Arc::new(MemoryStore::default());
        let instances = manager(runtime.clone(), store.clone());
        let backend = instances.launch_backend(&fixtures::definition(1, "web")).await.unwrap();

        instances.retire_backend(&backend).await;
        let calls = runtime.calls();
        assert_eq!(calls[1], RuntimeCall::Stop(backend.container_name.clone()));
        assert_eq!(calls[2], RuntimeCall::Remove(backend.container_name.clone()));
        assert!(store.records().backends.is_empty());
        assert!(runtime.running().is_empty());
    }

    #[tokio::test]
    async fn test_network_created_once() {
        let runtime = Arc::new(MockRuntime::new());
        let instances = manager(runtime.clone(), Arc::new(MemoryStore::default()));
        instances.ensure_network().await;
        instances.ensure_network().await;
        let creates = runtime
            .calls()
            .into_iter()
            .filter(|c| matches!(c, RuntimeCall::CreateNetwork(_)))
            .count();
        assert_eq!(creates, 1);
    }
}
