//! Forwarding targets.
//!
//! # Responsibilities
//! - Resolve a backend record to the base URL requests are sent to
//! - Rewrite an inbound URI onto that base

use std::str::FromStr;

use axum::http::uri::{Authority, PathAndQuery, Scheme};
use axum::http::Uri;
use url::Url;

use crate::config::TargetAddress;
use crate::fleet::BackendInstance;

/// A backend as the proxy reaches it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub container_name: String,
    /// Pre-calculated base URL.
    pub base_url: Url,
}

impl Target {
    pub fn for_backend(
        backend: &BackendInstance,
        address: TargetAddress,
        container_port: u16,
    ) -> Result<Self, url::ParseError> {
        let base = match address {
            TargetAddress::Container => {
                format!("http://{}:{}", backend.container_name, container_port)
            }
            TargetAddress::Published => format!("http://{}:{}", backend.host, backend.port),
        };
        Ok(Self {
            container_name: backend.container_name.clone(),
            base_url: Url::parse(&base)?,
        })
    }

    /// `host:port` of the target.
    pub fn authority(&self) -> String {
        match (self.base_url.host_str(), self.base_url.port_or_known_default()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            _ => String::new(),
        }
    }

    /// Keep path and query of `uri`, point it at this target.
    pub fn rewrite(&self, uri: &Uri) -> Uri {
        let mut parts = uri.clone().into_parts();
        parts.scheme = Some(Scheme::HTTP);
        if let Ok(authority) = Authority::from_str(&self.authority()) {
            parts.authority = Some(authority);
        }
        if parts.path_and_query.is_none() {
            parts.path_and_query = Some(PathAndQuery::from_static("/"));
        }
        Uri::from_parts(parts).unwrap_or_else(|_| uri.clone())
    }
}
