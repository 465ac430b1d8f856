//! Outbound HTTP client for in-fleet calls.
//!
//! # Responsibilities
//! - Issue GET requests to peers, backends and load balancers
//! - Enforce a hard timeout on every call (connect + response + body)
//! - Map every failure mode to a `ProbeError`
//!
//! # Design Decisions
//! - One pooled hyper client per process, cloned into every caller
//! - Non-2xx answers are failures; callers never inspect error bodies
//! - Response bodies are capped; health and rate answers are tiny

use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{Request, StatusCode};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::time;

/// Largest response body accepted from a probe target.
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Failure of a single outbound call. Every variant counts as one failed
/// probe for the tick it happened in.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    #[error("request to {url} failed: {reason}")]
    Connect { url: String, reason: String },

    #[error("{url} answered {status}")]
    Status { url: String, status: StatusCode },

    #[error("malformed response from {url}: {reason}")]
    Decode { url: String, reason: String },
}

/// Shared client for control-plane calls.
#[derive(Clone)]
pub struct FleetClient {
    client: Client<HttpConnector, Body>,
}

impl FleetClient {
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self { client }
    }

    /// GET `url` and return the body of a successful answer.
    pub async fn get(&self, url: &str, timeout: Duration) -> Result<Bytes, ProbeError> {
        let request = Request::builder()
            .method("GET")
            .uri(url)
            .header("user-agent", "fleet-orchestrator")
            .body(Body::empty())
            .map_err(|e| ProbeError::Connect {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let call = async {
            let response = self
                .client
                .request(request)
                .await
                .map_err(|e| ProbeError::Connect {
                    url: url.to_string(),
                    reason: e.to_string(),
                })?;

            let status = response.status();
            if !status.is_success() {
                return Err(ProbeError::Status {
                    url: url.to_string(),
                    status,
                });
            }

            axum::body::to_bytes(Body::new(response.into_body()), MAX_BODY_BYTES)
                .await
                .map_err(|e| ProbeError::Decode {
                    url: url.to_string(),
                    reason: e.to_string(),
                })
        };

        match time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::Timeout {
                url: url.to_string(),
                timeout,
            }),
        }
    }

    /// GET `url` and decode a JSON answer.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<T, ProbeError> {
        let bytes = self.get(url, timeout).await?;
        serde_json::from_slice(&bytes).map_err(|e| ProbeError::Decode {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}

impl Default for FleetClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Json, Router};
    use std::net::SocketAddr;

    async fn serve(router: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn test_get_json_decodes_body() {
        let addr = serve(Router::new().route("/lb-health", get(|| async { Json(4.5_f64) }))).await;
        let client = FleetClient::new();
        let rate: f64 = client
            .get_json(&format!("http://{}/lb-health", addr), Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(rate, 4.5);
    }

    #[tokio::test]
    async fn test_error_status_is_failure() {
        let addr = serve(Router::new()).await;
        let err = FleetClient::new()
            .get(&format!("http://{}/missing", addr), Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::Status { status, .. } if status == StatusCode::NOT_FOUND));
    }

    #[tokio::test]
    async fn test_slow_target_times_out() {
        let router = Router::new().route(
            "/health",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        );
        let addr = serve(router).await;
        let err = FleetClient::new()
            .get(&format!("http://{}/health", addr), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_refused_connection_is_connect_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let err = FleetClient::new()
            .get(&format!("http://{}/health", addr), Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::Connect { .. }));
    }
}
