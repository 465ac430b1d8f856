//! Traffic-driven autoscaling.
//!
//! # Data Flow
//! ```text
//! LB tick: sum of per-LB request rates
//!     → window.rs (trailing buffer, one slot per tick)
//!     → every Nth tick: policy.rs (average → per-instance rates → steps)
//!     → ScalingDecision applied by the service's health monitor
//! ```

pub mod policy;
pub mod window;

pub use policy::{evaluate, per_instance_rate, Autoscaler, PoolState, Scale, ScalingDecision};
pub use window::RateWindow;
