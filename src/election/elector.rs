//! Ring-based failure detection and leader election.
//!
//! # Responsibilities
//! - Probe the neighbour's `/health` on a fixed cadence
//! - Find the next live node when the neighbour goes down
//! - Run the highest-port-wins election and announce leadership once
//!
//! # Design Decisions
//! - The election task is the only writer of `NodeState`; HTTP handlers
//!   enqueue `ElectionEvent`s and read an `ArcSwap` snapshot
//! - Every failed call to a peer counts as a missed heartbeat or a failed
//!   election step, never as a fatal error
//! - An election stuck for `election_timeout_secs` is abandoned so
//!   neighbour monitoring resumes
//! - A higher candidate is relayed only while it answers `/health`; a dead
//!   candidate is replaced by this node's own port

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::ElectionConfig;
use crate::election::node::{NodeIdentity, NodeSnapshot, NodeState};
use crate::election::peer::Peer;
use crate::election::ring::{decide, ElectionStep, Ring};
use crate::observability::metrics;

const EVENT_QUEUE: usize = 64;

/// Messages delivered to the election task by the HTTP API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElectionEvent {
    /// An elect message; `None` when the candidate port was malformed.
    Elect { candidate: Option<u16> },
    StopElection,
}

/// Cloneable access to a running election task.
#[derive(Clone)]
pub struct ElectionHandle {
    events: mpsc::Sender<ElectionEvent>,
    snapshot: Arc<ArcSwap<NodeSnapshot>>,
}

impl ElectionHandle {
    pub fn snapshot(&self) -> NodeSnapshot {
        self.snapshot.load().as_ref().clone()
    }

    pub fn is_leader(&self) -> bool {
        self.snapshot.load().is_leader
    }

    /// Queue an event for the election task. Returns false if it was dropped.
    pub fn submit(&self, event: ElectionEvent) -> bool {
        match self.events.try_send(event) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Dropping election event");
                false
            }
        }
    }
}

/// The election task.
pub struct Elector {
    state: NodeState,
    ring: Ring,
    peer: Arc<dyn Peer>,
    probe_interval: Duration,
    missed_limit: u32,
    election_timeout: Duration,
    events: mpsc::Receiver<ElectionEvent>,
    snapshot: Arc<ArcSwap<NodeSnapshot>>,
    leader: watch::Sender<bool>,
}

impl Elector {
    pub fn new(
        identity: NodeIdentity,
        config: &ElectionConfig,
        peer: Arc<dyn Peer>,
    ) -> (Self, ElectionHandle, watch::Receiver<bool>) {
        let state = NodeState::new(&identity);
        let snapshot = Arc::new(ArcSwap::from_pointee(state.snapshot()));
        let (events_tx, events) = mpsc::channel(EVENT_QUEUE);
        let (leader, leader_rx) = watch::channel(state.is_leader);

        let elector = Self {
            ring: Ring::from_config(config, identity.ring_size),
            state,
            peer,
            probe_interval: Duration::from_millis(config.probe_interval_ms),
            missed_limit: config.missed_heartbeat_limit.max(1),
            election_timeout: Duration::from_secs(config.election_timeout_secs),
            events,
            snapshot: snapshot.clone(),
            leader,
        };
        let handle = ElectionHandle {
            events: events_tx,
            snapshot,
        };
        (elector, handle, leader_rx)
    }

    pub fn state(&self) -> &NodeState {
        &self.state
    }

    #[cfg(test)]
    pub(crate) async fn next_event(&mut self) -> Option<ElectionEvent> {
        self.events.recv().await
    }

    fn publish(&self) {
        self.snapshot.store(Arc::new(self.state.snapshot()));
    }

    fn become_leader(&mut self) {
        if !self.state.is_leader {
            info!(port = self.state.listen_port, "This node is now the leader");
        }
        self.state.is_leader = true;
        self.state.electing_since = None;
        metrics::record_leader(true);
        self.leader.send_if_modified(|leader| !std::mem::replace(leader, true));
        self.publish();
    }

    /// One neighbour probe.
    pub async fn heartbeat(&mut self) {
        if let Some(started) = self.state.electing_since {
            if started.elapsed() < self.election_timeout {
                return;
            }
            warn!(port = self.state.listen_port, "Election timed out, resuming monitoring");
            self.state.electing_since = None;
        }
        if self.state.alone {
            return;
        }

        match self.peer.health(self.state.neighbour_port).await {
            Ok(neighbour_is_leader) => {
                self.state.missed_heartbeats = 0;
                self.state.is_neighbour_leader = neighbour_is_leader;
            }
            Err(e) => {
                self.state.missed_heartbeats += 1;
                debug!(
                    neighbour = self.state.neighbour_port,
                    missed = self.state.missed_heartbeats,
                    error = %e,
                    "Neighbour heartbeat missed"
                );
                if self.state.missed_heartbeats >= self.missed_limit {
                    self.neighbour_down().await;
                }
            }
        }
        self.publish();
    }

    async fn neighbour_down(&mut self) {
        let lost = self.state.neighbour_port;
        let lost_leader = self.state.is_neighbour_leader;
        warn!(neighbour = lost, was_leader = lost_leader, "Neighbour is down, scanning ring");

        for port in self.ring.successors(self.state.listen_port) {
            if port == lost {
                continue;
            }
            if let Ok(is_leader) = self.peer.health(port).await {
                info!(neighbour = port, "Adopted new neighbour");
                self.state.neighbour_port = port;
                self.state.is_neighbour_leader = is_leader;
                self.state.missed_heartbeats = 0;
                self.publish();
                if lost_leader {
                    self.start_election().await;
                }
                return;
            }
        }

        info!(port = self.state.listen_port, "No other live node on the ring");
        self.state.alone = true;
        self.state.is_neighbour_leader = false;
        self.state.missed_heartbeats = 0;
        self.become_leader();
    }

    /// Send our own port around the ring.
    pub async fn start_election(&mut self) {
        if self.state.is_leader {
            return;
        }
        info!(port = self.state.listen_port, "Starting election");
        self.state.electing_since = Some(Instant::now());
        self.publish();
        let own = self.state.listen_port;
        self.forward(own).await;
    }

    async fn forward(&mut self, candidate: u16) {
        let neighbour = self.state.neighbour_port;
        if let Err(e) = self.peer.elect(neighbour, candidate).await {
            warn!(neighbour, candidate, error = %e, "Failed to forward election");
            self.state.electing_since = None;
            self.publish();
        }
    }

    pub async fn handle(&mut self, event: ElectionEvent) {
        match event {
            ElectionEvent::Elect { candidate } => {
                if self.state.electing_since.is_none() {
                    self.state.electing_since = Some(Instant::now());
                }
                self.publish();

                let own = self.state.listen_port;
                let Some(candidate) = candidate else {
                    warn!(port = own, "Malformed election message, restarting with own port");
                    self.forward(own).await;
                    return;
                };
                match decide(candidate, own) {
                    ElectionStep::Forward(next) if next != own => {
                        if let Err(e) = self.peer.health(next).await {
                            warn!(candidate = next, error = %e, "Candidate is unreachable, restarting with own port");
                            self.forward(own).await;
                        } else {
                            self.forward(next).await;
                        }
                    }
                    ElectionStep::Forward(next) => self.forward(next).await,
                    ElectionStep::BecomeLeader => {
                        self.become_leader();
                        let neighbour = self.state.neighbour_port;
                        if let Err(e) = self.peer.stop_election(neighbour).await {
                            warn!(neighbour, error = %e, "Failed to announce end of election");
                        }
                    }
                }
            }
            ElectionEvent::StopElection => {
                self.state.electing_since = None;
                self.publish();
                if !self.state.is_leader {
                    let neighbour = self.state.neighbour_port;
                    if let Err(e) = self.peer.stop_election(neighbour).await {
                        warn!(neighbour, error = %e, "Failed to forward end of election");
                    }
                }
            }
        }
    }

    /// Run until shutdown.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            port = self.state.listen_port,
            neighbour = self.state.neighbour_port,
            ring = self.ring.len(),
            leader = self.state.is_leader,
            "Joining election ring"
        );
        if self.state.is_leader {
            self.become_leader();
        }

        let mut ticker = time::interval_at(Instant::now() + self.probe_interval, self.probe_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    info!("Election task received shutdown signal");
                    break;
                }
                event = self.events.recv() => match event {
                    Some(event) => self.handle(event).await,
                    None => break,
                },
                _ = ticker.tick() => self.heartbeat().await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::http::ProbeError;

    /// Ring where listed ports answer `/health` with their leader flag.
    #[derive(Default)]
    struct ScriptedPeer {
        alive: Mutex<HashMap<u16, bool>>,
        elects: Mutex<Vec<(u16, u16)>>,
        stops: Mutex<Vec<u16>>,
    }

    impl ScriptedPeer {
        fn with(alive: &[(u16, bool)]) -> Arc<Self> {
            let peer = Self::default();
            peer.alive.lock().unwrap().extend(alive.iter().copied());
            Arc::new(peer)
        }

        fn kill(&self, port: u16) {
            self.alive.lock().unwrap().remove(&port);
        }

        fn refused(port: u16) -> ProbeError {
            ProbeError::Connect {
                url: format!("http://localhost:{port}"),
                reason: "connection refused".into(),
            }
        }
    }

    #[async_trait]
    impl Peer for ScriptedPeer {
        async fn health(&self, port: u16) -> Result<bool, ProbeError> {
            self.alive
                .lock()
                .unwrap()
                .get(&port)
                .copied()
                .ok_or_else(|| Self::refused(port))
        }

        async fn elect(&self, port: u16, candidate: u16) -> Result<(), ProbeError> {
            if !self.alive.lock().unwrap().contains_key(&port) {
                return Err(Self::refused(port));
            }
            self.elects.lock().unwrap().push((port, candidate));
            Ok(())
        }

        async fn stop_election(&self, port: u16) -> Result<(), ProbeError> {
            self.stops.lock().unwrap().push(port);
            Ok(())
        }
    }

    fn elector(own: u16, neighbour: u16, peer: Arc<ScriptedPeer>) -> (Elector, ElectionHandle, watch::Receiver<bool>) {
        let config = ElectionConfig {
            missed_heartbeat_limit: 3,
            ..ElectionConfig::default()
        };
        let identity = NodeIdentity {
            listen_port: own,
            neighbour_port: neighbour,
            ring_size: 3,
            is_leader: false,
        };
        Elector::new(identity, &config, peer)
    }

    #[tokio::test]
    async fn test_three_misses_adopt_next_node() {
        let peer = ScriptedPeer::with(&[(3010, false)]);
        let (mut node, handle, _) = elector(3020, 3030, peer.clone());

        node.heartbeat().await;
        node.heartbeat().await;
        assert_eq!(node.state().missed_heartbeats, 2);
        assert_eq!(node.state().neighbour_port, 3030);

        node.heartbeat().await;
        assert_eq!(node.state().neighbour_port, 3010);
        assert_eq!(node.state().missed_heartbeats, 0);
        assert_eq!(handle.snapshot().neighbour_port, 3010);
        // the lost neighbour was not the leader
        assert!(peer.elects.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lost_leader_starts_election() {
        let peer = ScriptedPeer::with(&[(3010, false), (3030, true)]);
        let (mut node, _, _) = elector(3020, 3030, peer.clone());

        node.heartbeat().await;
        assert!(node.state().is_neighbour_leader);

        peer.kill(3030);
        for _ in 0..3 {
            node.heartbeat().await;
        }
        assert_eq!(node.state().neighbour_port, 3010);
        assert!(node.state().is_electing());
        assert_eq!(*peer.elects.lock().unwrap(), vec![(3010, 3020)]);
    }

    #[tokio::test]
    async fn test_electing_suspends_heartbeats() {
        let peer = ScriptedPeer::with(&[]);
        let (mut node, _, _) = elector(3020, 3030, peer);
        node.state.electing_since = Some(Instant::now());

        node.heartbeat().await;
        assert_eq!(node.state().missed_heartbeats, 0);
    }

    #[tokio::test]
    async fn test_alone_node_becomes_leader() {
        let peer = ScriptedPeer::with(&[]);
        let (mut node, handle, leader) = elector(3020, 3030, peer.clone());

        for _ in 0..3 {
            node.heartbeat().await;
        }
        assert!(node.state().alone);
        assert!(handle.is_leader());
        assert!(*leader.borrow());

        // monitoring stops
        node.heartbeat().await;
        assert_eq!(node.state().missed_heartbeats, 0);
    }

    #[tokio::test]
    async fn test_elect_messages() {
        let peer = ScriptedPeer::with(&[(3030, false)]);
        let (mut node, _, leader) = elector(3020, 3030, peer.clone());

        node.handle(ElectionEvent::Elect { candidate: Some(3010) }).await;
        node.handle(ElectionEvent::Elect { candidate: Some(3030) }).await;
        node.handle(ElectionEvent::Elect { candidate: None }).await;
        assert_eq!(
            *peer.elects.lock().unwrap(),
            vec![(3030, 3020), (3030, 3030), (3030, 3020)]
        );
        assert!(!*leader.borrow());

        node.handle(ElectionEvent::Elect { candidate: Some(3020) }).await;
        assert!(*leader.borrow());
        assert!(!node.state().is_electing());
        assert_eq!(*peer.stops.lock().unwrap(), vec![3030]);
    }

    #[tokio::test]
    async fn test_dead_candidate_is_not_relayed() {
        let peer = ScriptedPeer::with(&[(3010, false)]);
        let (mut node, _, _) = elector(3020, 3010, peer.clone());

        // 3030 started the election, then died
        node.handle(ElectionEvent::Elect { candidate: Some(3030) }).await;
        assert_eq!(*peer.elects.lock().unwrap(), vec![(3010, 3020)]);
        assert!(node.state().is_electing());

        // our own port coming back ends the election here
        node.handle(ElectionEvent::Elect { candidate: Some(3020) }).await;
        assert!(node.state().is_leader);
        assert_eq!(*peer.stops.lock().unwrap(), vec![3010]);
    }

    #[tokio::test]
    async fn test_stop_election_forwards_until_leader() {
        let peer = ScriptedPeer::with(&[(3030, false)]);
        let (mut node, _, _) = elector(3020, 3030, peer.clone());
        node.state.electing_since = Some(Instant::now());

        node.handle(ElectionEvent::StopElection).await;
        assert!(!node.state().is_electing());
        assert_eq!(*peer.stops.lock().unwrap(), vec![3030]);

        node.become_leader();
        node.handle(ElectionEvent::StopElection).await;
        assert_eq!(peer.stops.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_forward_clears_electing() {
        let peer = ScriptedPeer::with(&[]);
        let (mut node, _, _) = elector(3020, 3030, peer);

        node.start_election().await;
        assert!(!node.state().is_electing());
    }

    #[tokio::test]
    async fn test_leader_never_starts_election() {
        let peer = ScriptedPeer::with(&[(3030, false)]);
        let (mut node, _, _) = elector(3020, 3030, peer.clone());
        node.become_leader();

        node.start_election().await;
        assert!(peer.elects.lock().unwrap().is_empty());
    }
}
