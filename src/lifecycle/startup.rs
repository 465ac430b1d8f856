//! Startup orchestration.
//!
//! # Responsibilities
//! - Join the election ring, or run as leader when the ring config is incomplete
//! - Build the control plane once leadership is held
//! - Start a load-balancer process once its service is known
//!
//! # Design Decisions
//! - Fail fast: an unreachable store at bootstrap is fatal
//! - The control plane starts at most once per process
//! - Listeners start last (traffic only when ready)

use std::io;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use crate::admin::{setup_admin_router, AdminState};
use crate::config::watcher::DefinitionsWatcher;
use crate::config::{LoadBalancerConfig, OrchestratorConfig, RuntimeKind};
use crate::election::{election_router, ElectionHandle, Elector, HttpPeer, NodeIdentity};
use crate::fleet::{JsonFileStore, PortAllocator, ServiceStore, StoreError};
use crate::health::{HttpProber, MonitorDeps};
use crate::http::FleetClient;
use crate::lifecycle::Shutdown;
use crate::load_balancer::{health_router, proxy_router, run_maintenance, BackendPool, LbState};
use crate::observability::metrics;
use crate::reconcile::{InstanceManager, ReconcileError, Reconciler};
use crate::resilience::backoff::Backoff;
use crate::runtime::{ContainerRuntime, DockerCli, MockRuntime};

const CHANGE_QUEUE: usize = 16;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to bind {address}: {source}")]
    Bind { address: String, source: io::Error },

    #[error("server on {address} failed: {source}")]
    Serve { address: String, source: io::Error },

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error("service store unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("service {0:?} not found in the store")]
    ServiceNotFound(String),

    #[error("election task stopped before leadership was decided")]
    ElectionStopped,
}

async fn bind(address: &str) -> Result<TcpListener, StartupError> {
    let listener = TcpListener::bind(address)
        .await
        .map_err(|source| StartupError::Bind {
            address: address.to_string(),
            source,
        })?;
    info!(address, "Listening");
    Ok(listener)
}

/// Serve `router` on `listener` until shutdown.
async fn serve(listener: TcpListener, router: Router, shutdown: Shutdown) -> Result<(), StartupError> {
    let address = listener
        .local_addr()
        .map(|a| a.to_string())
        .unwrap_or_default();
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.signalled())
        .await
        .map_err(|source| StartupError::Serve { address, source })
}

fn spawn_server(listener: TcpListener, router: Router, shutdown: Shutdown) {
    tokio::spawn(async move {
        if let Err(e) = serve(listener, router, shutdown).await {
            error!(error = %e, "Server stopped");
        }
    });
}

/// Join the ring. Returns the handle and the leadership receiver.
async fn join_ring(
    identity: NodeIdentity,
    config: &OrchestratorConfig,
    client: FleetClient,
    shutdown: &Shutdown,
) -> Result<(ElectionHandle, watch::Receiver<bool>), StartupError> {
    let peer = Arc::new(HttpPeer::new(client, &config.election));
    let (elector, handle, leader) = Elector::new(identity, &config.election, peer);

    let listener = bind(&format!("0.0.0.0:{}", identity.listen_port)).await?;
    spawn_server(listener, election_router(handle.clone()), shutdown.clone());
    tokio::spawn(elector.run(shutdown.subscribe()));
    Ok((handle, leader))
}

/// Run an orchestrator node until shutdown.
pub async fn run_orchestrator(config: OrchestratorConfig, shutdown: Shutdown) -> Result<(), StartupError> {
    let client = FleetClient::new();

    let election = match NodeIdentity::from_config(&config.election) {
        Some(identity) => {
            let (handle, mut leader) = join_ring(identity, &config, client.clone(), &shutdown).await?;
            info!("Waiting for leadership");
            let mut stop = shutdown.subscribe();
            tokio::select! {
                result = leader.wait_for(|is_leader| *is_leader) => {
                    result.map_err(|_| StartupError::ElectionStopped)?;
                }
                _ = stop.recv() => {
                    info!("Shut down before taking leadership");
                    return Ok(());
                }
            }
            Some(handle)
        }
        None => {
            warn!("Ring configuration incomplete, running as leader without election");
            metrics::record_leader(true);
            None
        }
    };

    run_control_plane(config, client, election, shutdown).await
}

fn container_runtime(config: &OrchestratorConfig) -> Arc<dyn ContainerRuntime> {
    match config.runtime.kind {
        RuntimeKind::Docker => Arc::new(DockerCli::new(config.runtime.docker_bin.clone())),
        RuntimeKind::Mock => {
            warn!("Using the mock container runtime; no containers will be started");
            Arc::new(MockRuntime::new())
        }
    }
}

async fn run_control_plane(
    config: OrchestratorConfig,
    client: FleetClient,
    election: Option<ElectionHandle>,
    shutdown: Shutdown,
) -> Result<(), StartupError> {
    info!("Starting control plane");

    let store: Arc<dyn ServiceStore> = Arc::new(JsonFileStore::new(&config.store));
    let instances = Arc::new(InstanceManager::new(
        container_runtime(&config),
        store,
        PortAllocator::new(&config.reconciler.ports),
        config.runtime.clone(),
    ));
    let deps = MonitorDeps {
        instances,
        prober: Arc::new(HttpProber::new(client, &config.probes, &config.runtime)),
        autoscale: config.autoscale.clone(),
        min_lb_count: config.reconciler.min_lb_count,
    };

    let mut reconciler = Reconciler::new(deps, config.reconciler.full_reset);
    reconciler.bootstrap().await?;

    let (changes_tx, changes_rx) = mpsc::channel(CHANGE_QUEUE);

    // dropping the watcher stops it
    let _watcher = if config.store.watch {
        match DefinitionsWatcher::new(&config.store.services_path, changes_tx.clone()).run() {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                warn!(error = %e, "Definitions watcher unavailable, reload via admin API only");
                None
            }
        }
    } else {
        None
    };

    if config.admin.enabled {
        let state = AdminState {
            view: reconciler.view(),
            changes: changes_tx,
            api_key: Arc::from(config.admin.api_key.as_str()),
            election,
        };
        let listener = bind(&config.admin.bind_address).await?;
        spawn_server(listener, setup_admin_router(state), shutdown.clone());
    }

    reconciler.run(changes_rx, shutdown.subscribe()).await;
    info!("Control plane stopped");
    Ok(())
}

/// Run a load-balancer process until shutdown.
pub async fn run_load_balancer(config: LoadBalancerConfig, shutdown: Shutdown) -> Result<(), StartupError> {
    let store: Arc<dyn ServiceStore> = Arc::new(JsonFileStore::new(&config.store));
    let pool = Arc::new(BackendPool::new(&config));

    let backoff = Backoff::new(config.startup_attempts, 500, 10_000);
    backoff
        .retry("service definition", |_| {
            let pool = pool.clone();
            let store = store.clone();
            async move {
                match pool.refresh(store.as_ref()).await {
                    Ok(true) => Ok(()),
                    Ok(false) => Err(StartupError::ServiceNotFound(pool.service_name().to_string())),
                    Err(e) => Err(StartupError::Store(e)),
                }
            }
        })
        .await?;

    info!(
        service = %config.service_name,
        container = %config.container_name,
        "Load balancer starting"
    );

    let state = LbState::new(pool, store);
    let proxy = bind(&config.proxy_address).await?;
    let health = bind(&config.health_address).await?;

    tokio::spawn(run_maintenance(
        state.clone(),
        Duration::from_secs(config.refresh_interval_secs),
        Duration::from_secs(config.prune_interval_secs),
        shutdown.subscribe(),
    ));

    let timeout = Duration::from_secs(config.request_timeout_secs);
    tokio::try_join!(
        serve(proxy, proxy_router(state.clone(), timeout), shutdown.clone()),
        serve(health, health_router(state), shutdown.clone()),
    )?;

    info!("Load balancer stopped");
    Ok(())
}
