//! Service discovery subsystem.
//!
//! # Data Flow
//! ```text
//! Registry (memory.rs, file.rs)
//!     → Discovery::watch(service)
//!     → Watcher::next() blocks until membership changes
//!     → load_balancer::node_set translates instances into nodes
//! ```
//!
//! # Design Decisions
//! - A watcher yields the full instance list on every change, never a diff
//! - The first `next()` returns the current membership
//! - `DiscoveryError::Canceled` is the only error that ends a watch loop

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;
use url::Url;

pub mod file;
pub mod memory;

pub use file::FileRegistry;
pub use memory::MemoryRegistry;

/// Errors reported by a registry or watcher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscoveryError {
    /// The watch was stopped on purpose or its source went away.
    #[error("watch canceled")]
    Canceled,

    /// Transient registry failure; the watch stays usable.
    #[error("registry error: {0}")]
    Registry(String),
}

/// One registered instance of a service.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct ServiceInstance {
    pub id: String,
    pub name: String,
    pub version: String,
    pub metadata: HashMap<String, String>,
    /// Endpoint URLs, e.g. `http://10.0.0.1:8000` or `grpc://10.0.0.1:9000`.
    pub endpoints: Vec<String>,
}

impl ServiceInstance {
    pub fn new(id: impl Into<String>, name: impl Into<String>, endpoints: Vec<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            endpoints,
            ..Default::default()
        }
    }
}

/// Registry capability consumed by the node-set builder.
#[async_trait]
pub trait Discovery: Send + Sync {
    /// Current instances of a service.
    async fn get_service(&self, name: &str) -> Result<Vec<ServiceInstance>, DiscoveryError>;

    /// Open a long-lived watch on a service.
    async fn watch(&self, name: &str) -> Result<Box<dyn Watcher>, DiscoveryError>;
}

/// Membership subscription for one service.
#[async_trait]
pub trait Watcher: Send {
    /// Block until the next membership change and return the full list.
    async fn next(&mut self) -> Result<Vec<ServiceInstance>, DiscoveryError>;

    /// Stop the watch. Later `next()` calls return `Canceled`.
    async fn stop(&mut self) -> Result<(), DiscoveryError>;
}

/// Pick the host:port of the first endpoint matching `scheme` and `secure`.
///
/// An endpoint is secure when its query carries `isSecure=true`. Returns
/// `Ok(None)` when no endpoint matches.
pub fn parse_endpoint(
    endpoints: &[String],
    scheme: &str,
    secure: bool,
) -> Result<Option<String>, url::ParseError> {
    for raw in endpoints {
        let url = Url::parse(raw)?;
        if url.scheme() != scheme || is_secure(&url) != secure {
            continue;
        }
        if let Some(host) = url.host_str() {
            let addr = match url.port_or_known_default() {
                Some(port) => format!("{}:{}", host, port),
                None => host.to_string(),
            };
            return Ok(Some(addr));
        }
    }
    Ok(None)
}

fn is_secure(url: &Url) -> bool {
    url.query_pairs()
        .any(|(k, v)| k == "isSecure" && v.eq_ignore_ascii_case("true"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eps(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_endpoint_matches_scheme() {
        let endpoints = eps(&["grpc://10.0.0.1:9000", "http://10.0.0.1:8000"]);
        assert_eq!(parse_endpoint(&endpoints, "http", false).unwrap(), Some("10.0.0.1:8000".into()));
        assert_eq!(parse_endpoint(&endpoints, "grpc", false).unwrap(), Some("10.0.0.1:9000".into()));
    }

    #[test]
    fn test_parse_endpoint_secure_flag() {
        let endpoints = eps(&["http://10.0.0.1:8443?isSecure=true", "http://10.0.0.1:8000"]);
        assert_eq!(parse_endpoint(&endpoints, "http", true).unwrap(), Some("10.0.0.1:8443".into()));
        assert_eq!(parse_endpoint(&endpoints, "http", false).unwrap(), Some("10.0.0.1:8000".into()));
    }

    #[test]
    fn test_parse_endpoint_no_match() {
        let endpoints = eps(&["grpc://10.0.0.1:9000"]);
        assert_eq!(parse_endpoint(&endpoints, "http", false).unwrap(), None);
    }

    #[test]
    fn test_parse_endpoint_invalid_url() {
        assert!(parse_endpoint(&eps(&["::not a url"]), "http", false).is_err());
    }
}
