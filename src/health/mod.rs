//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! LB tick (fixed cadence):
//!     → probe.rs: GET /lb-health on every LB (parallel, barrier)
//!     → replace LBs over threshold, sum reported rates
//!     → autoscale (every Nth tick) → add/remove one backend and/or LB
//!     → top up LBs to the floor
//!
//! Backend tick (per-service cadence):
//!     → probe.rs: GET <healthEndpoint> on every backend (parallel, barrier)
//!     → replace backends over threshold
//!     → probe.rs: GET /service-update on healthy LBs (once per sweep)
//!     → top up backends to min
//! ```
//!
//! # Design Decisions
//! - One monitor task per service, owning that service's record
//! - Unhealthy counters move by exactly one per failed probe
//! - A probe timeout is a failure for that tick; no same-tick retry

pub mod monitor;
pub mod probe;

pub use monitor::{HealthMonitor, MonitorDeps};
pub use probe::{HttpProber, Prober};
