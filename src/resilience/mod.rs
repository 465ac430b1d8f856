//! Resilience patterns.
//!
//! Calls inside the control plane are never retried within a tick: a
//! failure simply counts against the instance. The one place that waits
//! and retries is process startup (a load balancer looking for its service
//! definition), which uses `backoff.rs`.

pub mod backoff;

pub use backoff::{calculate_backoff, Backoff};
