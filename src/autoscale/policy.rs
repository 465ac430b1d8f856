//! Threshold and hysteresis scaling policy.
//!
//! # Responsibilities
//! - Turn a trailing traffic average into per-instance rates
//! - Decide at most one step per pool kind per evaluation
//!
//! # Design Decisions
//! - Pure functions over counts: the monitor applies the decision
//! - Upper and lower thresholds differ, so a rate between them holds
//! - Backend and load-balancer pools are decided independently

use crate::autoscale::window::RateWindow;
use crate::config::AutoscaleConfig;

/// One scaling step for a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scale {
    Up,
    Down,
    Hold,
}

/// Pool sizes and bounds an evaluation works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolState {
    pub healthy_backends: usize,
    pub healthy_load_balancers: usize,
    pub min_backends: usize,
    pub max_backends: usize,
    pub min_load_balancers: usize,
    pub max_load_balancers: usize,
}

/// Outcome of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalingDecision {
    pub backends: Scale,
    pub load_balancers: Scale,
    pub avg_backend_rate: f64,
    pub avg_lb_rate: f64,
}

/// Rate per healthy instance. With no healthy instance any traffic is
/// unbounded load and no traffic is none.
pub fn per_instance_rate(total: f64, healthy: usize) -> f64 {
    if healthy == 0 {
        if total > 0.0 {
            f64::INFINITY
        } else {
            0.0
        }
    } else {
        total / healthy as f64
    }
}

fn step(rate: f64, upper: f64, lower: f64, healthy: usize, floor: usize, ceiling: usize) -> Scale {
    if rate > upper {
        if healthy < ceiling {
            Scale::Up
        } else {
            Scale::Hold
        }
    } else if rate < lower && healthy > floor {
        Scale::Down
    } else {
        Scale::Hold
    }
}

/// Decide the next step for both pools from the averaged traffic total.
pub fn evaluate(avg_total: f64, state: &PoolState, config: &AutoscaleConfig) -> ScalingDecision {
    let avg_backend_rate = per_instance_rate(avg_total, state.healthy_backends);
    let avg_lb_rate = per_instance_rate(avg_total, state.healthy_load_balancers);

    ScalingDecision {
        backends: step(
            avg_backend_rate,
            config.backend_rate_upper,
            config.backend_rate_lower,
            state.healthy_backends,
            state.min_backends,
            state.max_backends,
        ),
        load_balancers: step(
            avg_lb_rate,
            config.lb_rate_upper,
            config.lb_rate_lower,
            state.healthy_load_balancers,
            state.min_load_balancers,
            state.max_load_balancers,
        ),
        avg_backend_rate,
        avg_lb_rate,
    }
}

/// Per-service autoscaler: buffers LB-tick totals and evaluates every
/// `evaluation_ticks` ticks.
#[derive(Debug, Clone)]
pub struct Autoscaler {
    config: AutoscaleConfig,
    window: RateWindow,
    ticks: u64,
}

impl Autoscaler {
    pub fn new(config: AutoscaleConfig) -> Self {
        let window = RateWindow::new(config.evaluation_ticks as usize);
        Self {
            config,
            window,
            ticks: 0,
        }
    }

    /// Record one tick's total; returns a decision on evaluation ticks.
    pub fn observe(&mut self, total: f64, state: &PoolState) -> Option<ScalingDecision> {
        self.window.push(total);
        self.ticks += 1;
        if self.ticks % u64::from(self.config.evaluation_ticks.max(1)) != 0 {
            return None;
        }
        Some(evaluate(self.window.average(), state, &self.config))
    }
}
