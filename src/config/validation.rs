//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, thresholds ordered, ports valid)
//! - Validate persisted service definitions before they are provisioned
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is a pure function: config → Result<(), Vec<ValidationError>>
//! - Missing election identity is NOT an error; it selects degraded leader mode

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::{LoadBalancerConfig, OrchestratorConfig};
use crate::fleet::ServiceDefinition;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Types that can check their own semantic validity.
pub trait Validate {
    fn validate(&self) -> Result<(), Vec<ValidationError>>;
}

#[derive(Default)]
struct Errors(Vec<ValidationError>);

impl Errors {
    fn check(&mut self, ok: bool, field: &str, message: &str) {
        if !ok {
            self.0.push(ValidationError::new(field, message));
        }
    }

    fn check_addr(&mut self, addr: &str, field: &str) {
        if addr.parse::<SocketAddr>().is_err() {
            self.0
                .push(ValidationError::new(field, format!("invalid socket address '{}'", addr)));
        }
    }

    fn finish(self) -> Result<(), Vec<ValidationError>> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(self.0)
        }
    }
}

impl Validate for OrchestratorConfig {
    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Errors::default();

        let e = &self.election;
        errors.check(e.port_step > 0, "election.port_step", "must be greater than 0");
        errors.check(e.probe_interval_ms > 0, "election.probe_interval_ms", "must be greater than 0");
        errors.check(e.missed_heartbeat_limit > 0, "election.missed_heartbeat_limit", "must be greater than 0");
        errors.check(e.peer_timeout_secs > 0, "election.peer_timeout_secs", "must be greater than 0");

        errors.check(self.reconciler.min_lb_count > 0, "reconciler.min_lb_count", "must be at least 1");

        let a = &self.autoscale;
        errors.check(a.lb_tick_secs > 0, "autoscale.lb_tick_secs", "must be greater than 0");
        errors.check(a.evaluation_ticks > 0, "autoscale.evaluation_ticks", "must be greater than 0");
        errors.check(a.lb_unhealthy_threshold > 0, "autoscale.lb_unhealthy_threshold", "must be greater than 0");
        errors.check(
            a.backend_rate_lower < a.backend_rate_upper,
            "autoscale.backend_rate_lower",
            "must be below backend_rate_upper",
        );
        errors.check(
            a.lb_rate_lower < a.lb_rate_upper,
            "autoscale.lb_rate_lower",
            "must be below lb_rate_upper",
        );

        let p = &self.probes;
        errors.check(p.backend_timeout_secs > 0, "probes.backend_timeout_secs", "must be greater than 0");
        errors.check(p.lb_report_timeout_secs > 0, "probes.lb_report_timeout_secs", "must be greater than 0");
        errors.check(p.notify_timeout_secs > 0, "probes.notify_timeout_secs", "must be greater than 0");

        errors.check(!self.runtime.network.is_empty(), "runtime.network", "must not be empty");
        errors.check(!self.runtime.lb_image.is_empty(), "runtime.lb_image", "must not be empty");

        if self.admin.enabled {
            errors.check_addr(&self.admin.bind_address, "admin.bind_address");
        }
        if self.observability.metrics_enabled {
            errors.check_addr(&self.observability.metrics_address, "observability.metrics_address");
        }

        errors.finish()
    }
}

impl Validate for LoadBalancerConfig {
    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Errors::default();
        errors.check(!self.service_name.is_empty(), "service_name", "must not be empty");
        errors.check_addr(&self.proxy_address, "proxy_address");
        errors.check_addr(&self.health_address, "health_address");
        errors.check(self.rate_window_secs > 0, "rate_window_secs", "must be greater than 0");
        errors.check(
            self.retention_secs >= self.rate_window_secs,
            "retention_secs",
            "must cover rate_window_secs",
        );
        errors.check(self.prune_interval_secs > 0, "prune_interval_secs", "must be greater than 0");
        errors.check(self.refresh_interval_secs > 0, "refresh_interval_secs", "must be greater than 0");
        errors.finish()
    }
}

impl Validate for ServiceDefinition {
    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Errors::default();
        errors.check(!self.name.is_empty(), "name", "must not be empty");
        errors.check(!self.container_image.is_empty(), "containerImageName", "must not be empty");
        errors.check(self.container_port > 0, "containerPort", "must be greater than 0");
        errors.check(self.min <= self.max, "min", "must not exceed max");
        errors.check(self.max > 0, "max", "must be greater than 0");
        errors.check(self.unhealthy_threshold > 0, "unHealthyThreshold", "must be greater than 0");
        errors.check(self.health_check_interval_secs > 0, "healthCheckInterval", "must be greater than 0");
        errors.check(self.health_endpoint.starts_with('/'), "healthEndpoint", "must start with '/'");
        errors.finish()
    }
}
