mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use common::{backend, definition, start_mock_backend};
use fleet_orchestrator::config::{LoadBalancerConfig, TargetAddress};
use fleet_orchestrator::fleet::{BackendInstance, MemoryStore, ServiceStore};
use fleet_orchestrator::load_balancer::{health_router, proxy_router, BackendPool, LbState};

struct TestLb {
    proxy: SocketAddr,
    health: SocketAddr,
    client: reqwest::Client,
}

impl TestLb {
    async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("http://{}{}", self.proxy, path))
            .send()
            .await
            .unwrap()
    }

    async fn body(&self, path: &str) -> String {
        self.get(path).await.text().await.unwrap()
    }

    async fn health(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("http://{}{}", self.health, path))
            .send()
            .await
            .unwrap()
    }
}

/// Backend record published on `addr`.
fn published(addr: SocketAddr, healthy: bool) -> BackendInstance {
    let mut b = backend(1, addr.port(), healthy);
    b.host = addr.ip().to_string();
    b
}

async fn store_with(backends: &[BackendInstance]) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new(vec![definition(1, "web")]));
    for b in backends {
        store.save_backend(b).await.unwrap();
    }
    store
}

async fn serve(router: axum::Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

async fn start_lb(store: Arc<MemoryStore>) -> TestLb {
    let config = LoadBalancerConfig {
        service_name: "web".into(),
        target_address: TargetAddress::Published,
        ..LoadBalancerConfig::default()
    };
    let pool = Arc::new(BackendPool::new(&config));
    assert!(pool.refresh(store.as_ref()).await.unwrap());

    let state = LbState::new(pool, store);
    let proxy = serve(proxy_router(state.clone(), Duration::from_secs(5))).await;
    let health = serve(health_router(state)).await;
    TestLb {
        proxy,
        health,
        client: reqwest::Client::new(),
    }
}

#[tokio::test]
async fn test_requests_rotate_across_backends() {
    let alpha = start_mock_backend("alpha").await;
    let beta = start_mock_backend("beta").await;
    let lb = start_lb(store_with(&[published(alpha, true), published(beta, true)]).await).await;

    let mut bodies = Vec::new();
    for _ in 0..4 {
        bodies.push(lb.body("/hello?x=1").await);
    }
    assert_eq!(bodies, vec!["alpha", "beta", "alpha", "beta"]);
}

#[tokio::test]
async fn test_unhealthy_backend_is_skipped() {
    let alpha = start_mock_backend("alpha").await;
    let beta = start_mock_backend("beta").await;
    let lb = start_lb(store_with(&[published(alpha, true), published(beta, false)]).await).await;

    for _ in 0..3 {
        assert_eq!(lb.body("/").await, "alpha");
    }
}

#[tokio::test]
async fn test_no_backends_returns_503() {
    let lb = start_lb(store_with(&[]).await).await;

    let res = lb.get("/anything").await;
    assert_eq!(res.status(), 503);
    assert!(res.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_unreachable_backend_returns_502() {
    let unused = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let closed = unused.local_addr().unwrap();
    drop(unused);

    let lb = start_lb(store_with(&[published(closed, true)]).await).await;
    assert_eq!(lb.get("/").await.status(), 502);
}

#[tokio::test]
async fn test_lb_health_reports_request_rate() {
    let alpha = start_mock_backend("alpha").await;
    let lb = start_lb(store_with(&[published(alpha, true)]).await).await;

    let idle: f64 = lb.health("/lb-health").await.json().await.unwrap();
    assert_eq!(idle, 0.0);

    for _ in 0..6 {
        assert_eq!(lb.get("/").await.status(), 200);
    }
    let rate: f64 = lb.health("/lb-health").await.json().await.unwrap();
    assert_eq!(rate, 6.0 / 30.0);
}

#[tokio::test]
async fn test_service_update_picks_up_new_backends() {
    let alpha = start_mock_backend("alpha").await;
    let beta = start_mock_backend("beta").await;
    let store = store_with(&[published(alpha, true)]).await;
    let lb = start_lb(store.clone()).await;

    assert_eq!(lb.body("/").await, "alpha");
    assert_eq!(lb.body("/").await, "alpha");

    store.save_backend(&published(beta, true)).await.unwrap();
    assert_eq!(lb.health("/service-update").await.status(), 200);

    let mut bodies = Vec::new();
    for _ in 0..4 {
        bodies.push(lb.body("/").await);
    }
    assert!(bodies.iter().any(|b| b == "alpha"));
    assert!(bodies.iter().any(|b| b == "beta"));
}

#[tokio::test]
async fn test_unknown_service_keeps_backend_list() {
    let alpha = start_mock_backend("alpha").await;
    let store = store_with(&[published(alpha, true)]).await;
    let lb = start_lb(store.clone()).await;

    store.set_definitions(Vec::new());
    assert_eq!(lb.health("/service-update").await.status(), 200);
    assert_eq!(lb.body("/").await, "alpha");
}
