//! Node identity and election state.

use serde::Serialize;
use tokio::time::Instant;

use crate::config::ElectionConfig;
use crate::election::ring::Ring;

/// Ring identity of a node with a complete configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeIdentity {
    pub listen_port: u16,
    pub neighbour_port: u16,
    pub ring_size: usize,
    pub is_leader: bool,
}

impl NodeIdentity {
    /// `None` when any identity field is missing or the node's own port is
    /// not a ring slot; such a node runs in degraded leader mode.
    pub fn from_config(config: &ElectionConfig) -> Option<Self> {
        let identity = Self {
            listen_port: config.runner_port?,
            neighbour_port: config.neighbour_port?,
            ring_size: config.max_nodes?,
            is_leader: config.is_leader?,
        };
        let ring = Ring::from_config(config, identity.ring_size);
        if !ring.contains(identity.listen_port) || identity.listen_port == identity.neighbour_port {
            return None;
        }
        Some(identity)
    }
}

/// Mutable election state, owned by the election task alone.
#[derive(Debug, Clone)]
pub struct NodeState {
    pub listen_port: u16,
    pub neighbour_port: u16,
    pub is_leader: bool,
    pub is_neighbour_leader: bool,
    /// When the election this node is taking part in began.
    pub electing_since: Option<Instant>,
    pub missed_heartbeats: u32,
    /// Set once a scan found no other live node.
    pub alone: bool,
}

impl NodeState {
    pub fn new(identity: &NodeIdentity) -> Self {
        Self {
            listen_port: identity.listen_port,
            neighbour_port: identity.neighbour_port,
            is_leader: identity.is_leader,
            is_neighbour_leader: false,
            electing_since: None,
            missed_heartbeats: 0,
            alone: false,
        }
    }

    pub fn is_electing(&self) -> bool {
        self.electing_since.is_some()
    }

    pub fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            listen_port: self.listen_port,
            neighbour_port: self.neighbour_port,
            is_leader: self.is_leader,
            is_neighbour_leader: self.is_neighbour_leader,
            electing: self.is_electing(),
            missed_heartbeats: self.missed_heartbeats,
        }
    }
}

/// Point-in-time copy of `NodeState` for concurrent readers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSnapshot {
    pub listen_port: u16,
    pub neighbour_port: u16,
    pub is_leader: bool,
    pub is_neighbour_leader: bool,
    pub electing: bool,
    pub missed_heartbeats: u32,
}
