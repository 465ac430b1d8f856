//! Calls from one ring node to another.

use std::time::Duration;

use async_trait::async_trait;

use crate::config::ElectionConfig;
use crate::http::{FleetClient, ProbeError};

/// Messages a node sends to its neighbour.
#[async_trait]
pub trait Peer: Send + Sync {
    /// `GET /health`: whether the node at `port` is the leader.
    async fn health(&self, port: u16) -> Result<bool, ProbeError>;

    /// `GET /elect-leader?candidateLeaderPort=<candidate>`
    async fn elect(&self, port: u16, candidate: u16) -> Result<(), ProbeError>;

    /// `GET /stop-election`
    async fn stop_election(&self, port: u16) -> Result<(), ProbeError>;
}

/// Peer reached over HTTP.
pub struct HttpPeer {
    client: FleetClient,
    host: String,
    timeout: Duration,
}

impl HttpPeer {
    pub fn new(client: FleetClient, config: &ElectionConfig) -> Self {
        Self {
            client,
            host: config.peer_host.clone(),
            timeout: Duration::from_secs(config.peer_timeout_secs),
        }
    }

    fn url(&self, port: u16, path: &str) -> String {
        format!("http://{}:{}{}", self.host, port, path)
    }
}

#[async_trait]
impl Peer for HttpPeer {
    async fn health(&self, port: u16) -> Result<bool, ProbeError> {
        self.client.get_json(&self.url(port, "/health"), self.timeout).await
    }

    async fn elect(&self, port: u16, candidate: u16) -> Result<(), ProbeError> {
        let path = format!("/elect-leader?candidateLeaderPort={}", candidate);
        self.client
            .get_json::<serde_json::Value>(&self.url(port, &path), self.timeout)
            .await
            .map(|_| ())
    }

    async fn stop_election(&self, port: u16) -> Result<(), ProbeError> {
        self.client
            .get_json::<serde_json::Value>(&self.url(port, "/stop-election"), self.timeout)
            .await
            .map(|_| ())
    }
}
