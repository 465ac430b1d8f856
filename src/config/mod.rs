//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → loader.rs (environment overrides for node / LB identity)
//!     → validation.rs (semantic checks)
//!     → OrchestratorConfig / LoadBalancerConfig (validated, immutable)
//!
//! Service definitions file:
//!     watcher.rs detects change
//!     → change notification to the reconciler
//!     → reconciler re-reads the store and diffs
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Incomplete ring identity is legal and selects degraded leader mode

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, load_or_default, load_with_overrides, ConfigError};
pub use schema::{
    AdminConfig, AutoscaleConfig, ElectionConfig, LoadBalancerConfig, ObservabilityConfig,
    OrchestratorConfig, PortConfig, ProbeConfig, ReconcilerConfig, RuntimeConfig, RuntimeKind,
    StoreConfig, TargetAddress,
};
pub use validation::{Validate, ValidationError};
