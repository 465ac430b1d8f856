//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Orchestrator: join ring → wait for leadership → store + runtime
//!         → reconciler bootstrap → watcher + admin API → reconcile loop
//!     Load balancer: wait for service definition (backoff)
//!         → proxy + health listeners → refresh/prune maintenance
//!
//! Shutdown (shutdown.rs):
//!     Trigger → servers drain → monitors stop → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Running containers outlive the process; the next leader adopts or
//!   resets them

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::spawn_signal_handler;
pub use startup::{run_load_balancer, run_orchestrator, StartupError};
