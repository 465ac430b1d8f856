//! HTTP surface of an orchestrator node on the election ring.

use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use crate::election::elector::{ElectionEvent, ElectionHandle};

const CANDIDATE_PARAM: &str = "candidateLeaderPort";

pub fn election_router(handle: ElectionHandle) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/elect-leader", get(elect_leader))
        .route("/stop-election", get(stop_election))
        .layer(TraceLayer::new_for_http())
        .with_state(handle)
}

/// Answers with this node's leader flag.
async fn health(State(handle): State<ElectionHandle>) -> Json<bool> {
    Json(handle.is_leader())
}

async fn elect_leader(
    State(handle): State<ElectionHandle>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    let candidate = params
        .get(CANDIDATE_PARAM)
        .and_then(|raw| raw.trim().parse::<u16>().ok());
    handle.submit(ElectionEvent::Elect { candidate });
    Json(json!({}))
}

async fn stop_election(State(handle): State<ElectionHandle>) -> Json<Value> {
    handle.submit(ElectionEvent::StopElection);
    Json(json!({}))
}
