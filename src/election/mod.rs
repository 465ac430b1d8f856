//! Leader election subsystem.
//!
//! # Data Flow
//! ```text
//! Every probe interval:
//!     elector.rs heartbeat → peer.rs GET neighbour /health
//!     → 3 misses: scan ring.rs successors, adopt first live node
//!     → lost neighbour was leader: start election with own port
//!
//! Incoming (api.rs):
//!     GET /elect-leader?candidateLeaderPort=P → ElectionEvent → elector.rs
//!     → ring.rs decide: forward own | forward P | become leader
//!     → leader: GET neighbour /stop-election, travels until it reaches the leader
//!
//! Leadership: watch::Receiver<bool> flips to true once → control plane starts
//! ```

pub mod api;
pub mod elector;
pub mod node;
pub mod peer;
pub mod ring;

pub use api::election_router;
pub use elector::{ElectionEvent, ElectionHandle, Elector};
pub use node::{NodeIdentity, NodeSnapshot, NodeState};
pub use peer::{HttpPeer, Peer};
pub use ring::{decide, ElectionStep, Ring};
