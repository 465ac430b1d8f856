use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;
use tracing::info;

use crate::admin::AdminState;
use crate::election::NodeSnapshot;
use crate::fleet::{LbInstance, ServiceId, ServiceStatus};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub leader: bool,
    pub services: usize,
    /// Absent when the node runs without a ring.
    pub node: Option<NodeSnapshot>,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let node = state.election.as_ref().map(|e| e.snapshot());
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        leader: node.as_ref().map_or(true, |n| n.is_leader),
        services: state.view.len(),
        node,
    })
}

pub async fn get_services(State(state): State<AdminState>) -> Json<Vec<ServiceStatus>> {
    Json(state.view.statuses())
}

/// Queue a reload; notifications already pending are coalesced.
pub async fn reload(State(state): State<AdminState>) -> StatusCode {
    match state.changes.try_send(()) {
        Ok(()) | Err(TrySendError::Full(())) => {
            info!("Reload requested via admin API");
            StatusCode::ACCEPTED
        }
        Err(TrySendError::Closed(())) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

pub async fn get_load_balancers(
    State(state): State<AdminState>,
    Path(id): Path<ServiceId>,
) -> Result<Json<Vec<LbInstance>>, StatusCode> {
    state
        .view
        .get(id)
        .map(|status| Json(status.healthy_load_balancers()))
        .ok_or(StatusCode::NOT_FOUND)
}
