//! HTTP servers of a load-balancer process.
//!
//! # Responsibilities
//! - Forward every inbound request to the next backend (proxy listener)
//! - Report the request rate and accept refresh hooks (health listener)
//! - Keep the backend list and request log fresh in the background
//!
//! # Design Decisions
//! - No healthy backend is a 503; any upstream failure is a 502
//! - No retries; the orchestrator replaces failing backends
//! - `x-request-id` is assigned before tracing and forwarded upstream

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::sync::broadcast;
use tokio::time::{self, Instant, MissedTickBehavior};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{debug, error, info, warn};

use crate::fleet::ServiceStore;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::http::RequestIdExt;
use crate::load_balancer::pool::BackendPool;
use crate::observability::metrics;

/// State shared by both listeners.
#[derive(Clone)]
pub struct LbState {
    pub pool: Arc<BackendPool>,
    pub store: Arc<dyn ServiceStore>,
    pub client: Client<HttpConnector, Body>,
}

impl LbState {
    pub fn new(pool: Arc<BackendPool>, store: Arc<dyn ServiceStore>) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self { pool, store, client }
    }
}

/// Catch-all forwarding router.
#[allow(deprecated)]
pub fn proxy_router(state: LbState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/{*path}", any(proxy_handler))
        .route("/", any(proxy_handler))
        .with_state(state)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(propagate_request_id_layer())
        .layer(set_request_id_layer())
}

/// Rate report and refresh hook.
pub fn health_router(state: LbState) -> Router {
    Router::new()
        .route("/lb-health", get(lb_health))
        .route("/service-update", get(service_update))
        .with_state(state)
}

async fn proxy_handler(State(state): State<LbState>, request: Request<Body>) -> Response {
    let request_id = request.request_id().to_string();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let Some(target) = state.pool.select() else {
        warn!(request_id = %request_id, service = %state.pool.service_name(), "No healthy backends");
        metrics::record_lb_request(StatusCode::SERVICE_UNAVAILABLE.as_u16());
        return (StatusCode::SERVICE_UNAVAILABLE, "No healthy backends").into_response();
    };

    debug!(
        request_id = %request_id,
        method = %method,
        path = %path,
        target = %target.container_name,
        "Proxying request"
    );

    let (mut parts, body) = request.into_parts();
    parts.uri = target.rewrite(&parts.uri);
    if let Ok(host) = HeaderValue::from_str(&target.authority()) {
        parts.headers.insert(header::HOST, host);
    }

    match state.client.request(Request::from_parts(parts, body)).await {
        Ok(response) => {
            metrics::record_lb_request(response.status().as_u16());
            let (parts, body) = response.into_parts();
            Response::from_parts(parts, Body::new(body))
        }
        Err(e) => {
            error!(request_id = %request_id, target = %target.container_name, error = %e, "Upstream error");
            metrics::record_lb_request(StatusCode::BAD_GATEWAY.as_u16());
            (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
        }
    }
}

/// Requests per second over the trailing window.
async fn lb_health(State(state): State<LbState>) -> Json<f64> {
    Json(state.pool.rate())
}

async fn service_update(State(state): State<LbState>) -> StatusCode {
    match state.pool.refresh(state.store.as_ref()).await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            error!(error = %e, "Backend refresh failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Periodic backend refresh and request-log pruning until shutdown.
pub async fn run_maintenance(
    state: LbState,
    refresh_every: Duration,
    prune_every: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut refresh = time::interval_at(Instant::now() + refresh_every, refresh_every);
    refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut prune = time::interval_at(Instant::now() + prune_every, prune_every);
    prune.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                info!("Load balancer maintenance stopped");
                break;
            }
            _ = refresh.tick() => {
                if let Err(e) = state.pool.refresh(state.store.as_ref()).await {
                    error!(error = %e, "Periodic backend refresh failed");
                }
            }
            _ = prune.tick() => {
                let dropped = state.pool.prune();
                debug!(dropped, "Pruned request log");
            }
        }
    }
}
