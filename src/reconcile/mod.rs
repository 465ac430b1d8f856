//! Reconciliation subsystem.
//!
//! # Data Flow
//! ```text
//! Leadership acquired
//!     → reconciler.rs bootstrap (full reset or adoption)
//!     → instances.rs (network, ports, containers, records)
//!     → one HealthMonitor task per service
//!
//! Change notification (definitions watcher, POST /admin/reload)
//!     → reconciler.rs reload: diff by (id, name)
//!     → removed: cancel monitor → await its Service → retire instances
//!     → added: spawn monitor (provisions its pools on start)
//! ```

pub mod instances;
pub mod reconciler;

pub use instances::InstanceManager;
pub use reconciler::{FleetView, ReconcileError, Reconciler};
