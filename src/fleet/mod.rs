//! Fleet state subsystem.
//!
//! # Data Flow
//! ```text
//! services.json (operator-owned definitions)
//!     + instances.json (orchestrator-owned records)
//!     → store.rs (join into Service records)
//!     → reconciler (diff by (id, name), provision)
//!     → health monitor (owns one Service exclusively)
//!
//! New instance:
//!     ports.rs (next never-used host port)
//!     → model.rs (record with fresh InstanceId)
//!     → runtime starts container → store.rs saves record
//! ```
//!
//! # Design Decisions
//! - A `Service` has exactly one writer at a time: its health loop
//! - Load balancers read the same store to learn their backends

pub mod model;
pub mod ports;
pub mod store;

pub use model::{
    BackendInstance, InstanceId, LbInstance, Service, ServiceDefinition, ServiceId, ServiceKey,
    ServiceStatus,
};
pub use ports::{LbPorts, PortAllocator};
pub use store::{JsonFileStore, MemoryStore, ServiceStore, StoreError};
