//! HTTP node: one backend address with its own pooled transport.
//!
//! # Responsibilities
//! - Rewrite the outbound URI to this node's address
//! - Forward over a dedicated hyper-util client
//! - Bound every attempt by the derived per-attempt timeout
//!
//! Nodes always dial plain HTTP. `Protocol::Https` only decides which
//! registry endpoints are picked; TLS to the backend is not terminated here.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::uri::{Authority, PathAndQuery, Scheme};
use axum::http::{Request, Response, Uri, Version};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::str::FromStr;
use std::time::Duration;

use crate::config::Protocol;
use crate::error::ProxyError;
use crate::load_balancer::Node;

/// A single backend instance reachable over HTTP/1.1 or HTTP/2.
#[derive(Debug, Clone)]
pub struct HttpNode {
    address: String,
    protocol: Protocol,
    weight: u32,
    timeout: Duration,
    client: Client<HttpConnector, Body>,
}

impl HttpNode {
    /// Create a node. The transport is built here and never changes.
    pub fn new(address: impl Into<String>, protocol: Protocol, weight: u32, timeout: Duration) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(timeout));
        connector.set_nodelay(true);

        let mut builder = Client::builder(TokioExecutor::new());
        if protocol == Protocol::Grpc {
            // gRPC speaks HTTP/2 with prior knowledge
            builder.http2_only(true);
        }

        Self {
            address: address.into(),
            protocol,
            weight: weight.max(1),
            timeout,
            client: builder.build(connector),
        }
    }

    fn version(&self) -> Version {
        match self.protocol {
            Protocol::Grpc => Version::HTTP_2,
            _ => Version::HTTP_11,
        }
    }
}

/// Point `uri` at `address`, keeping only its path and query.
pub fn upstream_uri(uri: &Uri, scheme: Scheme, address: &str) -> Result<Uri, ProxyError> {
    let authority = Authority::from_str(address)
        .map_err(|e| ProxyError::Config(format!("invalid node address '{}': {}", address, e)))?;

    let mut parts = uri.clone().into_parts();
    parts.scheme = Some(scheme);
    parts.authority = Some(authority);
    if parts.path_and_query.is_none() {
        parts.path_and_query = Some(PathAndQuery::from_static("/"));
    }
    Uri::from_parts(parts).map_err(|e| ProxyError::InvalidRequest(e.into()))
}

#[async_trait]
impl Node for HttpNode {
    fn address(&self) -> &str {
        &self.address
    }

    fn weight(&self) -> u32 {
        self.weight
    }

    /// The timeout covers connecting and receiving the response head. The
    /// body is streamed back afterwards and is only bounded by the caller's
    /// deadline while the gateway handler is still running.
    async fn forward(&self, mut req: Request<Body>) -> Result<Response<Body>, ProxyError> {
        *req.uri_mut() = upstream_uri(req.uri(), Scheme::HTTP, &self.address)?;
        *req.version_mut() = self.version();

        match tokio::time::timeout(self.timeout, self.client.request(req)).await {
            Ok(Ok(response)) => {
                let (parts, body) = response.into_parts();
                Ok(Response::from_parts(parts, Body::new(body)))
            }
            Ok(Err(e)) => Err(ProxyError::Transport(e)),
            Err(_) => Err(ProxyError::Timeout(self.timeout)),
        }
    }
}
