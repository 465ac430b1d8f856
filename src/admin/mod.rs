//! Admin API served by the leader.
//!
//! # Data Flow
//! ```text
//! GET  /admin/status    → node snapshot + running service count
//! GET  /admin/services  → FleetView statuses (one per health monitor)
//! POST /admin/reload    → change notification → reconciler reload
//! GET  /api/service/{id}/load-balancers → healthy LBs of a live service
//! ```
//!
//! `/admin` routes require `Authorization: Bearer <api_key>`.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::election::ElectionHandle;
use crate::reconcile::FleetView;

/// State injected into admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub view: FleetView,
    pub changes: mpsc::Sender<()>,
    pub api_key: Arc<str>,
    /// `None` on a node running without a ring.
    pub election: Option<ElectionHandle>,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    let admin = Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/services", get(get_services))
        .route("/admin/reload", post(reload))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware));

    Router::new()
        .merge(admin)
        .route("/api/service/{id}/load-balancers", get(get_load_balancers))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
