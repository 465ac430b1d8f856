//! HTTP plumbing shared by every server and client in the fleet.
//!
//! # Data Flow
//! ```text
//! Inbound (node API, admin API, LB proxy):
//!     → request.rs (add / keep request ID)
//!     → tower-http trace + timeout layers
//!     → handler
//!
//! Outbound (peer calls, probes, LB reports, refresh notifications):
//!     → client.rs (hyper client, hard timeout)
//!     → Ok(body) | ProbeError
//! ```

pub mod client;
pub mod request;

pub use client::{FleetClient, ProbeError};
pub use request::{RequestIdExt, X_REQUEST_ID};
