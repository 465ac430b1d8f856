mod common;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::timeout;

use fleet_orchestrator::config::ElectionConfig;
use fleet_orchestrator::election::{
    election_router, ElectionEvent, ElectionHandle, Elector, HttpPeer, NodeIdentity, Peer,
};
use fleet_orchestrator::http::{FleetClient, ProbeError};
use fleet_orchestrator::lifecycle::Shutdown;

/// Ring wired in-process: calls go straight to the target's event queue.
#[derive(Clone, Default)]
struct LocalRing {
    nodes: Arc<Mutex<HashMap<u16, ElectionHandle>>>,
    down: Arc<Mutex<HashSet<u16>>>,
}

impl LocalRing {
    fn handle(&self, port: u16) -> Result<ElectionHandle, ProbeError> {
        if self.down.lock().unwrap().contains(&port) {
            return Err(ProbeError::Connect {
                url: format!("http://localhost:{port}"),
                reason: "connection refused".into(),
            });
        }
        self.nodes
            .lock()
            .unwrap()
            .get(&port)
            .cloned()
            .ok_or_else(|| ProbeError::Connect {
                url: format!("http://localhost:{port}"),
                reason: "no such node".into(),
            })
    }

    fn take_down(&self, port: u16) {
        self.down.lock().unwrap().insert(port);
    }
}

#[async_trait]
impl Peer for LocalRing {
    async fn health(&self, port: u16) -> Result<bool, ProbeError> {
        Ok(self.handle(port)?.is_leader())
    }

    async fn elect(&self, port: u16, candidate: u16) -> Result<(), ProbeError> {
        self.handle(port)?.submit(ElectionEvent::Elect {
            candidate: Some(candidate),
        });
        Ok(())
    }

    async fn stop_election(&self, port: u16) -> Result<(), ProbeError> {
        self.handle(port)?.submit(ElectionEvent::StopElection);
        Ok(())
    }
}

struct Node {
    handle: ElectionHandle,
    leader: watch::Receiver<bool>,
}

/// Start one elector per `(port, neighbour, is_leader)`.
fn start_ring(ring: &LocalRing, layout: &[(u16, u16, bool)], shutdown: &Shutdown) -> HashMap<u16, Node> {
    let config = ElectionConfig::default();
    let mut nodes = HashMap::new();
    for &(port, neighbour, is_leader) in layout {
        let identity = NodeIdentity {
            listen_port: port,
            neighbour_port: neighbour,
            ring_size: layout.len(),
            is_leader,
        };
        let (elector, handle, leader) = Elector::new(identity, &config, Arc::new(ring.clone()));
        ring.nodes.lock().unwrap().insert(port, handle.clone());
        tokio::spawn(elector.run(shutdown.subscribe()));
        nodes.insert(port, Node { handle, leader });
    }
    nodes
}

#[tokio::test]
async fn test_highest_port_wins() {
    let ring = LocalRing::default();
    let shutdown = Shutdown::new();
    let mut nodes = start_ring(
        &ring,
        &[(3010, 3020, false), (3020, 3030, false), (3030, 3010, false)],
        &shutdown,
    );

    // 3010 started an election: its neighbour receives candidate 3010
    nodes[&3020].handle.submit(ElectionEvent::Elect {
        candidate: Some(3010),
    });

    let winner = nodes.get_mut(&3030).unwrap();
    timeout(Duration::from_secs(5), winner.leader.wait_for(|l| *l))
        .await
        .expect("3030 never became leader")
        .unwrap();

    assert!(!nodes[&3010].handle.is_leader());
    assert!(!nodes[&3020].handle.is_leader());

    let settled = common::wait_until(Duration::from_secs(5), || {
        nodes.values().all(|n| !n.handle.snapshot().electing)
    })
    .await;
    assert!(settled, "stop-election did not travel around the ring");
    shutdown.trigger();
}

#[tokio::test(start_paused = true)]
async fn test_dead_leader_is_replaced() {
    let ring = LocalRing::default();
    let shutdown = Shutdown::new();
    let mut nodes = start_ring(
        &ring,
        &[(3010, 3020, false), (3020, 3030, false), (3030, 3010, true)],
        &shutdown,
    );

    // let 3020 see its neighbour as leader
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(nodes[&3020].handle.snapshot().is_neighbour_leader);

    ring.take_down(3030);

    let successor = nodes.get_mut(&3020).unwrap();
    timeout(Duration::from_secs(30), successor.leader.wait_for(|l| *l))
        .await
        .expect("no new leader elected")
        .unwrap();

    let snapshot = nodes[&3020].handle.snapshot();
    assert_eq!(snapshot.neighbour_port, 3010);
    assert_eq!(snapshot.missed_heartbeats, 0);
    assert!(!nodes[&3010].handle.is_leader());
    shutdown.trigger();
}

#[tokio::test]
async fn test_election_survives_dead_candidate() {
    let ring = LocalRing::default();
    let shutdown = Shutdown::new();
    let mut nodes = start_ring(&ring, &[(3010, 3020, false), (3020, 3010, false)], &shutdown);

    // 3030 sent its port around, then died before the message came back
    nodes[&3010].handle.submit(ElectionEvent::Elect {
        candidate: Some(3030),
    });

    let winner = nodes.get_mut(&3020).unwrap();
    timeout(Duration::from_secs(5), winner.leader.wait_for(|l| *l))
        .await
        .expect("no leader after the candidate died")
        .unwrap();
    assert!(!nodes[&3010].handle.is_leader());
    shutdown.trigger();
}

#[tokio::test]
async fn test_http_peer_against_election_api() {
    let ring = LocalRing::default();
    let shutdown = Shutdown::new();
    let nodes = start_ring(&ring, &[(3010, 3020, true), (3020, 3010, false)], &shutdown);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let router = election_router(nodes[&3010].handle.clone());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    let config = ElectionConfig {
        peer_host: "127.0.0.1".into(),
        ..ElectionConfig::default()
    };
    let peer = HttpPeer::new(FleetClient::new(), &config);

    assert!(peer.health(port).await.unwrap());
    peer.elect(port, 3020).await.unwrap();
    peer.stop_election(port).await.unwrap();

    let unused = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let closed_port = unused.local_addr().unwrap().port();
    drop(unused);
    assert!(peer.health(closed_port).await.is_err());
    shutdown.trigger();
}
