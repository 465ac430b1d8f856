//! Self-healing container fleet orchestrator.
//!
//! # Architecture Overview
//!
//! ```text
//!   ┌──────────────────────── orchestrator node ───────────────────────┐
//!   │                                                                  │
//!   │  election ──(leader)──▶ reconcile ──▶ health monitor per service │
//!   │   ring probe,            bootstrap,     backend probes,          │
//!   │   elect/stop             reload diff    LB rate reports          │
//!   │                              │               │                   │
//!   │                              ▼               ▼                   │
//!   │                          runtime ◀──── autoscale                 │
//!   │                          (docker)      (thresholds)              │
//!   │                              │                                   │
//!   │                           fleet store (services + instances)     │
//!   └──────────────────────────────┼───────────────────────────────────┘
//!                                  │ backend list
//!   ┌──────────── load-balancer process (one per LB container) ────────┐
//!   │  load_balancer: round-robin select → forward; rate meter         │
//!   │  /lb-health (rate), /service-update (refresh)                    │
//!   └──────────────────────────────────────────────────────────────────┘
//!
//!   Cross-cutting: config, http client, observability, lifecycle,
//!   resilience (backoff), admin API
//! ```

// Core subsystems
pub mod config;
pub mod fleet;
pub mod http;
pub mod runtime;

// Control plane
pub mod autoscale;
pub mod election;
pub mod health;
pub mod reconcile;

// Data plane
pub mod load_balancer;

// Cross-cutting concerns
pub mod admin;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::{LoadBalancerConfig, OrchestratorConfig};
pub use lifecycle::Shutdown;
