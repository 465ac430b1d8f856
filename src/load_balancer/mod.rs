//! Load balancing subsystem, run inside each load-balancer process.
//!
//! # Data Flow
//! ```text
//! Inbound request (proxy listener)
//!     → pool.rs select: round_robin.rs over the authoritative list
//!     → rate.rs appends a timestamp
//!     → backend.rs target URL → server.rs forwards (or 503 / 502)
//!
//! Orchestrator
//!     → GET /lb-health  → rate.rs requests/sec over the trailing 30s
//!     → GET /service-update → pool.rs refresh from the store
//! ```
//!
//! # Design Decisions
//! - Selection strategy sits behind `BackendSelector`
//! - Unhealthy backends are skipped, never removed, by selection

pub mod backend;
pub mod pool;
pub mod rate;
pub mod round_robin;
pub mod server;

use crate::fleet::BackendInstance;

pub use backend::Target;
pub use pool::BackendPool;
pub use rate::RequestLog;
pub use round_robin::RoundRobin;
pub use server::{health_router, proxy_router, run_maintenance, LbState};

/// Backend selection strategy.
pub trait BackendSelector: Send + Sync {
    /// Next healthy backend of `backends`, or `None` if there is none.
    fn select<'a>(&self, backends: &'a [BackendInstance]) -> Option<&'a BackendInstance>;
}
