//! Endpoint forwarding client.
//!
//! # Data Flow
//! ```text
//! EndpointClient::call(ctx, request)
//!     → normalize URI to origin form
//!     → attempts == 1: select → forward → done (body streamed)
//!     → attempts  > 1: buffer body once, then per attempt:
//!         check ctx → select (excluding tried addresses) → forward replayed body
//!         → done → accept response or remember it and continue
//! ```
//!
//! # Design Decisions
//! - No backoff between attempts
//! - Retryable responses are not errors; the last one is returned as-is
//! - A failed selection ends the call without consuming an attempt
//! - Node identity for exclusion is the address string

use axum::body::{Body, Bytes};
use axum::http::request::Parts;
use axum::http::uri::PathAndQuery;
use axum::http::{Request, Response, Uri};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::error::ProxyError;
use crate::load_balancer::{DoneInfo, Node, NodeFilter, NodeFilters, Selected, Selector, WatchHandle};
use crate::observability::metrics;
use crate::resilience::RetryPolicy;

pub mod context;
pub mod factory;

pub use context::CallContext;
pub use factory::ClientFactory;

/// Forwarding client for one endpoint.
///
/// Dropping the client stops its discovery watch.
pub struct EndpointClient {
    name: String,
    policy: RetryPolicy,
    selector: Arc<dyn Selector>,
    watch: Option<WatchHandle>,
}

impl fmt::Debug for EndpointClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointClient")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .field("watch", &self.watch)
            .finish()
    }
}

impl EndpointClient {
    /// A client over an already populated selector.
    pub fn with_selector(name: impl Into<String>, selector: Arc<dyn Selector>, policy: RetryPolicy) -> Self {
        Self {
            name: name.into(),
            policy,
            selector,
            watch: None,
        }
    }

    pub(crate) fn with_watch(mut self, watch: Option<WatchHandle>) -> Self {
        self.watch = watch;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Stop the discovery watch, if any. The current node set stays usable.
    pub fn close(&self) {
        if let Some(watch) = &self.watch {
            tracing::info!(endpoint = %self.name, service = %watch.service(), "Closing endpoint client");
            watch.stop();
        }
    }

    /// Forward `req` to one of the endpoint's nodes, retrying per policy.
    pub async fn call(&self, ctx: &CallContext, mut req: Request<Body>) -> Result<Response<Body>, ProxyError> {
        let path_and_query = req
            .uri()
            .path_and_query()
            .cloned()
            .unwrap_or_else(|| PathAndQuery::from_static("/"));
        *req.uri_mut() = Uri::from(path_and_query);

        if self.policy.attempts() <= 1 {
            return self.call_once(ctx, req).await;
        }
        self.call_with_retry(ctx, req).await
    }

    async fn call_once(&self, ctx: &CallContext, req: Request<Body>) -> Result<Response<Body>, ProxyError> {
        if let Some(err) = ctx.err() {
            return Err(err);
        }

        let filters = caller_filters(&req);
        let selected = self.selector.select(&filters)?;
        let address = selected.node.address().to_string();
        tracing::debug!(endpoint = %self.name, node = %address, "Forwarding single attempt");

        let result = forward(ctx, selected, req).await;
        match &result {
            Ok(_) => metrics::record_attempt(&self.name, &address, "ok"),
            Err(e) => {
                tracing::warn!(endpoint = %self.name, node = %address, error = %e, "Upstream attempt failed");
                metrics::record_attempt(&self.name, &address, e.kind());
            }
        }
        result
    }

    async fn call_with_retry(&self, ctx: &CallContext, req: Request<Body>) -> Result<Response<Body>, ProxyError> {
        let filters = caller_filters(&req);
        let (parts, body) = req.into_parts();
        let body = axum::body::to_bytes(body, self.policy.max_body_bytes())
            .await
            .map_err(ProxyError::Body)?;

        let attempts = self.policy.attempts();
        let mut tried: HashSet<String> = HashSet::new();
        let mut last = None;

        for attempt in 1..=attempts {
            if let Some(err) = ctx.err() {
                tracing::debug!(endpoint = %self.name, attempt, error = %err, "Call context done");
                return Err(err);
            }

            let mut attempt_filters = filters.clone();
            if !tried.is_empty() {
                attempt_filters.push(exclude(&tried));
            }
            let selected = self.selector.select(&attempt_filters)?;
            let address = selected.node.address().to_string();
            tried.insert(address.clone());

            if attempt > 1 {
                metrics::record_retry(&self.name);
            }
            tracing::debug!(endpoint = %self.name, node = %address, attempt, attempts, "Forwarding attempt");

            match forward(ctx, selected, replay(&parts, &body)).await {
                Ok(resp) if !self.policy.should_retry(&resp) => {
                    metrics::record_attempt(&self.name, &address, "ok");
                    return Ok(resp);
                }
                Ok(resp) => {
                    tracing::warn!(
                        endpoint = %self.name,
                        node = %address,
                        attempt,
                        status = resp.status().as_u16(),
                        "Retryable upstream response"
                    );
                    metrics::record_attempt(&self.name, &address, "retryable");
                    last = Some(Ok(resp));
                }
                Err(e) => {
                    tracing::warn!(endpoint = %self.name, node = %address, attempt, error = %e, "Upstream attempt failed");
                    metrics::record_attempt(&self.name, &address, e.kind());
                    if e.is_context_error() {
                        return Err(e);
                    }
                    last = Some(Err(e));
                }
            }
        }

        last.unwrap_or(Err(ProxyError::NoAvailableNode))
    }
}

/// Run one attempt on the selected node, racing it against the call context.
async fn forward(ctx: &CallContext, selected: Selected, req: Request<Body>) -> Result<Response<Body>, ProxyError> {
    let Selected { node, done } = selected;
    let result = tokio::select! {
        biased;
        err = ctx.done() => Err(err),
        result = node.forward(req) => result,
    };
    done.finish(DoneInfo { err: result.as_ref().err() });
    result
}

fn caller_filters(req: &Request<Body>) -> Vec<NodeFilter> {
    req.extensions()
        .get::<NodeFilters>()
        .map(|f| f.0.clone())
        .unwrap_or_default()
}

/// Filter removing every address already attempted in this call.
fn exclude(tried: &HashSet<String>) -> NodeFilter {
    let tried = tried.clone();
    Arc::new(move |node: &dyn Node| !tried.contains(node.address()))
}

/// Fresh request for one attempt, carrying the buffered body from offset 0.
fn replay(parts: &Parts, body: &Bytes) -> Request<Body> {
    let mut req = Request::new(Body::from(body.clone()));
    *req.method_mut() = parts.method.clone();
    *req.uri_mut() = parts.uri.clone();
    *req.version_mut() = parts.version;
    *req.headers_mut() = parts.headers.clone();
    *req.extensions_mut() = parts.extensions.clone();
    req
}
