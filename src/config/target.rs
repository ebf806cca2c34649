//! Backend target parsing.
//!
//! Targets look like `scheme://authority/endpoint`. A target without `://`
//! is a direct address.

use std::fmt;

use url::Url;

use crate::error::ProxyError;

/// How a backend contributes nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetScheme {
    /// One fixed node at the given address.
    Direct,
    /// Nodes resolved and refreshed from the registry.
    Discovery,
}

impl fmt::Display for TargetScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetScheme::Direct => write!(f, "direct"),
            TargetScheme::Discovery => write!(f, "discovery"),
        }
    }
}

/// A parsed backend target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub scheme: TargetScheme,
    pub authority: String,
    /// Address for `direct`, service name for `discovery`.
    pub endpoint: String,
}

impl Target {
    pub fn parse(raw: &str) -> Result<Self, ProxyError> {
        if !raw.contains("://") {
            return Self::direct(raw.trim_start_matches('/'), raw);
        }

        let url = Url::parse(raw).map_err(|e| ProxyError::Config(format!("invalid target '{}': {}", raw, e)))?;
        let scheme = match url.scheme() {
            "direct" => TargetScheme::Direct,
            "discovery" => TargetScheme::Discovery,
            other => return Err(ProxyError::Config(format!("unknown scheme: {}", other))),
        };
        let endpoint = url.path().trim_start_matches('/');
        if endpoint.is_empty() {
            return Err(missing_endpoint(raw));
        }

        Ok(Self {
            scheme,
            authority: url.host_str().unwrap_or_default().to_string(),
            endpoint: endpoint.to_string(),
        })
    }

    fn direct(endpoint: &str, raw: &str) -> Result<Self, ProxyError> {
        if endpoint.is_empty() {
            return Err(missing_endpoint(raw));
        }
        Ok(Self {
            scheme: TargetScheme::Direct,
            authority: String::new(),
            endpoint: endpoint.to_string(),
        })
    }
}

fn missing_endpoint(raw: &str) -> ProxyError {
    ProxyError::Config(format!("missing endpoint in target: {}", raw))
}
