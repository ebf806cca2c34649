//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Endpoint backends
//!     → node_set.rs (build nodes: static or from registry watch)
//!     → Selector::apply (replace the whole population)
//!
//! Per attempt:
//!     → Selector::select(filters)
//!         - balancer.rs (snapshot population, apply filters)
//!         - p2c.rs / round_robin.rs / weighted.rs (pick one candidate)
//!     → node.rs (forward to the picked address)
//!     → Done::finish (report outcome to the balancer)
//! ```
//!
//! # Design Decisions
//! - Node identity is its address string
//! - Populations are replaced wholesale, never diffed
//! - Filters are plain predicates combined with AND

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use std::fmt;
use std::sync::Arc;

use crate::error::ProxyError;

pub mod balancer;
pub mod node;
pub mod node_set;
pub mod p2c;
pub mod round_robin;
pub mod weighted;

pub use balancer::{Balancer, WeightedNode};
pub use node::HttpNode;
pub use node_set::{NodeSetBuilder, WatchHandle};

/// An addressable backend instance that can carry one forwarding attempt.
#[async_trait]
pub trait Node: Send + Sync + fmt::Debug {
    /// Stable identity used for exclusion and logging.
    fn address(&self) -> &str;

    /// Relative selection weight, at least 1.
    fn weight(&self) -> u32;

    /// Forward the request to this node and return the raw response.
    async fn forward(&self, req: Request<Body>) -> Result<Response<Body>, ProxyError>;
}

/// Predicate over candidate nodes. A node survives if every filter returns true.
pub type NodeFilter = Arc<dyn Fn(&dyn Node) -> bool + Send + Sync>;

/// Per-request node filters attached by upstream middleware as a request extension.
#[derive(Clone, Default)]
pub struct NodeFilters(pub Vec<NodeFilter>);

impl fmt::Debug for NodeFilters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NodeFilters").field(&self.0.len()).finish()
    }
}

/// Outcome of an attempt, reported back to the selector.
#[derive(Debug, Clone, Copy, Default)]
pub struct DoneInfo<'a> {
    pub err: Option<&'a ProxyError>,
}

/// Completion callback returned with a selected node.
///
/// Dropping it without calling [`Done::finish`] releases the selection as if
/// the attempt never completed.
pub struct Done(Option<Box<dyn FnOnce(DoneInfo<'_>) + Send>>);

impl Done {
    pub fn new(f: impl FnOnce(DoneInfo<'_>) + Send + 'static) -> Self {
        Self(Some(Box::new(f)))
    }

    pub fn noop() -> Self {
        Self(None)
    }

    pub fn finish(mut self, info: DoneInfo<'_>) {
        if let Some(f) = self.0.take() {
            f(info);
        }
    }
}

impl fmt::Debug for Done {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Done").field("pending", &self.0.is_some()).finish()
    }
}

/// A node picked by a selector, with its completion callback.
#[derive(Debug)]
pub struct Selected {
    pub node: Arc<dyn Node>,
    pub done: Done,
}

/// Load-balancing capability backing one endpoint.
pub trait Selector: Send + Sync {
    /// Pick one node among those passing every filter.
    fn select(&self, filters: &[NodeFilter]) -> Result<Selected, ProxyError>;

    /// Replace the whole node population.
    fn apply(&self, nodes: Vec<Arc<dyn Node>>);
}

/// Strategy picking one node from an already filtered candidate list.
pub trait LoadBalancer: Send + Sync + fmt::Debug {
    fn next_server(&self, candidates: &[Arc<WeightedNode>]) -> Option<Arc<WeightedNode>>;
}
