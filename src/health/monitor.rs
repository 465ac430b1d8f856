//! Per-service health and scaling loop.
//!
//! # Responsibilities
//! - Probe every load balancer on the LB cadence and collect its request rate
//! - Probe every backend on the service's own cadence
//! - Replace instances whose unhealthy counter reached its threshold
//! - Feed traffic totals to the autoscaler and apply its decisions
//! - Keep pools at their floors and tell load balancers to refresh
//!
//! # Design Decisions
//! - The monitor owns its `Service` outright; nothing else mutates it while
//!   the loop runs, and `run` hands it back when cancelled
//! - Probes of one tick fan out concurrently and are joined before any
//!   aggregation or scaling
//! - Cancellation is checked first at every loop iteration (biased select);
//!   a tick already in progress completes
//! - Refresh notifications are sent at most once per sweep

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::watch;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::autoscale::{Autoscaler, PoolState, Scale, ScalingDecision};
use crate::config::AutoscaleConfig;
use crate::fleet::{Service, ServiceStatus};
use crate::health::probe::Prober;
use crate::observability::metrics;
use crate::reconcile::InstanceManager;

/// Collaborators shared by every health monitor on a node.
#[derive(Clone)]
pub struct MonitorDeps {
    pub instances: Arc<InstanceManager>,
    pub prober: Arc<dyn Prober>,
    pub autoscale: AutoscaleConfig,
    /// Floor on live load balancers per service.
    pub min_lb_count: usize,
}

/// What one load balancer contributed to an LB tick.
enum LbOutcome {
    Replaced,
    Reported(f64),
    Failed,
    /// Retired without a replacement; the record leaves the pool.
    Dropped,
}

/// What one backend contributed to a backend tick.
#[derive(PartialEq, Eq)]
enum BackendOutcome {
    /// Load balancers should re-read the backend list.
    Refresh,
    Quiet,
    Dropped,
}

/// Health loop of a single service.
pub struct HealthMonitor {
    service: Service,
    deps: MonitorDeps,
    autoscaler: Autoscaler,
    status: watch::Sender<ServiceStatus>,
    last_decision: Option<ScalingDecision>,
}

impl HealthMonitor {
    pub fn new(service: Service, deps: MonitorDeps) -> (Self, watch::Receiver<ServiceStatus>) {
        let (status, status_rx) = watch::channel(ServiceStatus::from_service(&service));
        let autoscaler = Autoscaler::new(deps.autoscale.clone());
        let monitor = Self {
            service,
            deps,
            autoscaler,
            status,
            last_decision: None,
        };
        (monitor, status_rx)
    }

    pub fn service(&self) -> &Service {
        &self.service
    }

    fn pool_state(&self) -> PoolState {
        let definition = &self.service.definition;
        PoolState {
            healthy_backends: self.service.healthy_backends(),
            healthy_load_balancers: self.service.healthy_load_balancers(),
            min_backends: definition.min,
            max_backends: definition.max,
            min_load_balancers: self.deps.min_lb_count,
            max_load_balancers: definition.max_load_balancers(),
        }
    }

    /// Provision a pool that is entirely empty.
    pub async fn provision_missing(&mut self) {
        let definition = &self.service.definition;
        if self.service.load_balancers.is_empty() {
            for _ in 0..self.deps.min_lb_count {
                let Some(lb) = self.deps.instances.launch_load_balancer(definition).await else {
                    break;
                };
                self.service.load_balancers.push(lb);
            }
        }
        if self.service.backends.is_empty() {
            for _ in 0..definition.min {
                let Some(backend) = self.deps.instances.launch_backend(definition).await else {
                    break;
                };
                self.service.backends.push(backend);
            }
        }
    }

    /// One load-balancer sweep. Returns the scaling decision on evaluation
    /// ticks.
    pub async fn lb_tick(&mut self) -> Option<ScalingDecision> {
        let threshold = self.deps.autoscale.lb_unhealthy_threshold;
        let instances = &*self.deps.instances;
        let prober = &*self.deps.prober;
        let definition = &self.service.definition;

        let outcomes = join_all(self.service.load_balancers.iter_mut().map(|lb| async move {
            if lb.unhealthy_count >= threshold {
                warn!(
                    service = %definition.name,
                    container = %lb.container_name,
                    failures = lb.unhealthy_count,
                    "Load balancer unhealthy, replacing"
                );
                instances.retire_load_balancer(lb).await;
                let Some(replacement) = instances.launch_load_balancer(definition).await else {
                    return LbOutcome::Dropped;
                };
                *lb = replacement;
                metrics::record_replacement(&definition.name, "load_balancer");
                return LbOutcome::Replaced;
            }

            match prober.lb_rate(lb).await {
                Ok(rate) => {
                    if lb.record_success() {
                        instances.persist_load_balancer(lb).await;
                    }
                    LbOutcome::Reported(rate)
                }
                Err(e) => {
                    debug!(container = %lb.container_name, error = %e, "Load balancer report failed");
                    metrics::record_probe_failure("load_balancer");
                    if lb.record_failure() {
                        instances.persist_load_balancer(lb).await;
                    }
                    LbOutcome::Failed
                }
            }
        }))
        .await;

        let total: f64 = outcomes
            .iter()
            .map(|outcome| match outcome {
                LbOutcome::Reported(rate) => *rate,
                LbOutcome::Replaced | LbOutcome::Failed | LbOutcome::Dropped => 0.0,
            })
            .sum();
        let mut kept = outcomes.iter().map(|o| !matches!(o, LbOutcome::Dropped));
        self.service
            .load_balancers
            .retain(|_| kept.next().unwrap_or(true));

        let state = self.pool_state();
        let decision = self.autoscaler.observe(total, &state);
        if let Some(decision) = decision {
            debug!(
                service = %self.service.definition.name,
                avg_backend_rate = decision.avg_backend_rate,
                avg_lb_rate = decision.avg_lb_rate,
                "Scaling evaluation"
            );
            self.apply(decision).await;
            self.last_decision = Some(decision);
        }

        while self.service.load_balancers.len() < self.deps.min_lb_count {
            let Some(lb) = self
                .deps
                .instances
                .launch_load_balancer(&self.service.definition)
                .await
            else {
                break;
            };
            self.service.load_balancers.push(lb);
        }

        self.publish();
        decision
    }

    /// One backend sweep.
    pub async fn backend_tick(&mut self) {
        let instances = &*self.deps.instances;
        let prober = &*self.deps.prober;
        let definition = &self.service.definition;

        let outcomes = join_all(self.service.backends.iter_mut().map(|backend| async move {
            if backend.unhealthy_count >= definition.unhealthy_threshold {
                warn!(
                    service = %definition.name,
                    container = %backend.container_name,
                    failures = backend.unhealthy_count,
                    "Backend unhealthy, replacing"
                );
                instances.retire_backend(backend).await;
                let Some(replacement) = instances.launch_backend(definition).await else {
                    return BackendOutcome::Dropped;
                };
                *backend = replacement;
                metrics::record_replacement(&definition.name, "backend");
                return BackendOutcome::Refresh;
            }

            match prober.check_backend(backend, &definition.health_endpoint).await {
                Ok(()) => {
                    let recovered = backend.record_success();
                    if recovered {
                        info!(container = %backend.container_name, "Backend healthy");
                        instances.persist_backend(backend).await;
                        return BackendOutcome::Refresh;
                    }
                    BackendOutcome::Quiet
                }
                Err(e) => {
                    debug!(container = %backend.container_name, error = %e, "Backend probe failed");
                    metrics::record_probe_failure("backend");
                    if backend.record_failure() {
                        warn!(container = %backend.container_name, "Backend unhealthy");
                        instances.persist_backend(backend).await;
                    }
                    BackendOutcome::Refresh
                }
            }
        }))
        .await;

        let mut kept = outcomes.iter().map(|o| *o != BackendOutcome::Dropped);
        self.service.backends.retain(|_| kept.next().unwrap_or(true));

        if outcomes.iter().any(|o| *o != BackendOutcome::Quiet) {
            self.notify_load_balancers().await;
        }

        while self.service.backends.len() < self.service.definition.min {
            let Some(backend) = self.deps.instances.launch_backend(&self.service.definition).await else {
                break;
            };
            self.service.backends.push(backend);
        }

        self.publish();
    }

    async fn apply(&mut self, decision: ScalingDecision) {
        let name = self.service.definition.name.clone();

        match decision.backends {
            Scale::Up => {
                info!(service = %name, rate = decision.avg_backend_rate, "Scaling backends up");
                if let Some(backend) = self.deps.instances.launch_backend(&self.service.definition).await {
                    self.service.backends.push(backend);
                    metrics::record_scaling_event(&name, "backend", "up");
                }
            }
            Scale::Down => {
                if let Some(backend) = self.service.backends.pop() {
                    info!(service = %name, rate = decision.avg_backend_rate, container = %backend.container_name, "Scaling backends down");
                    self.deps.instances.retire_backend(&backend).await;
                    self.notify_load_balancers().await;
                    metrics::record_scaling_event(&name, "backend", "down");
                }
            }
            Scale::Hold => {}
        }

        match decision.load_balancers {
            Scale::Up => {
                info!(service = %name, rate = decision.avg_lb_rate, "Scaling load balancers up");
                if let Some(lb) = self
                    .deps
                    .instances
                    .launch_load_balancer(&self.service.definition)
                    .await
                {
                    self.service.load_balancers.push(lb);
                    metrics::record_scaling_event(&name, "load_balancer", "up");
                }
            }
            Scale::Down => {
                if let Some(lb) = self.service.load_balancers.pop() {
                    info!(service = %name, rate = decision.avg_lb_rate, container = %lb.container_name, "Scaling load balancers down");
                    self.deps.instances.retire_load_balancer(&lb).await;
                    metrics::record_scaling_event(&name, "load_balancer", "down");
                }
            }
            Scale::Hold => {}
        }
    }

    /// Ask every healthy load balancer to re-read its backend list.
    async fn notify_load_balancers(&self) {
        let prober = &*self.deps.prober;
        let results = join_all(
            self.service
                .load_balancers
                .iter()
                .filter(|lb| lb.is_healthy)
                .map(|lb| async move { (lb, prober.notify_refresh(lb).await) }),
        )
        .await;

        for (lb, result) in results {
            if let Err(e) = result {
                warn!(container = %lb.container_name, error = %e, "Refresh notification failed");
            }
        }
    }

    fn publish(&self) {
        let mut status = ServiceStatus::from_service(&self.service);
        if let Some(decision) = &self.last_decision {
            status.avg_backend_rate = Some(decision.avg_backend_rate);
            status.avg_lb_rate = Some(decision.avg_lb_rate);
            metrics::record_rate(&status.name, "backend", decision.avg_backend_rate);
            metrics::record_rate(&status.name, "load_balancer", decision.avg_lb_rate);
        }
        metrics::record_pool_sizes(
            &status.name,
            (self.service.healthy_backends(), self.service.backends.len()),
            (self.service.healthy_load_balancers(), self.service.load_balancers.len()),
        );
        self.status.send_replace(status);
    }

    /// Run until cancelled, then hand the service back.
    pub async fn run(mut self, mut cancel: watch::Receiver<bool>) -> Service {
        let name = self.service.definition.name.clone();
        if *cancel.borrow() {
            return self.service;
        }

        info!(service = %name, "Starting health checks");
        self.provision_missing().await;
        self.publish();

        let lb_period = Duration::from_secs(self.deps.autoscale.lb_tick_secs.max(1));
        let backend_period =
            Duration::from_secs(self.service.definition.health_check_interval_secs.max(1));
        let mut lb_ticker = time::interval_at(Instant::now() + lb_period, lb_period);
        let mut backend_ticker = time::interval_at(Instant::now() + backend_period, backend_period);
        lb_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        backend_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        break;
                    }
                }
                _ = lb_ticker.tick() => {
                    self.lb_tick().await;
                }
                _ = backend_ticker.tick() => {
                    self.backend_tick().await;
                }
            }
        }

        info!(service = %name, "Health checks stopped");
        self.service
    }
}
