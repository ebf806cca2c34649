//! Request to endpoint lookup.
//!
//! # Responsibilities
//! - Compile one route per endpoint from its host and path prefix
//! - Pick the winning route for a request
//! - Return an explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Ordered once at startup: priority desc, prefix length desc, config order
//! - First match in that order wins

use axum::body::Body;
use axum::http::Request;

use crate::config::EndpointConfig;
use crate::routing::matcher::{AndMatcher, HostMatcher, Matcher, PathPrefixMatcher};

/// A compiled route pointing at one endpoint.
#[derive(Debug)]
pub struct Route {
    pub endpoint: String,
    pub priority: u32,
    prefix_len: usize,
    matcher: AndMatcher,
}

impl Route {
    pub fn from_endpoint(endpoint: &EndpointConfig) -> Self {
        let mut matchers: Vec<Box<dyn Matcher>> = Vec::new();
        if let Some(host) = &endpoint.host {
            matchers.push(Box::new(HostMatcher::new(host.clone())));
        }
        let prefix_len = match &endpoint.path_prefix {
            Some(prefix) => {
                matchers.push(Box::new(PathPrefixMatcher::new(prefix.clone())));
                prefix.len()
            }
            None => 0,
        };

        Self {
            endpoint: endpoint.name.clone(),
            priority: endpoint.priority,
            prefix_len,
            matcher: AndMatcher::new(matchers),
        }
    }

    pub fn matches(&self, req: &Request<Body>) -> bool {
        self.matcher.matches(req)
    }
}

/// Immutable route table.
#[derive(Debug, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn from_config(endpoints: &[EndpointConfig]) -> Self {
        let mut routes: Vec<Route> = endpoints.iter().map(Route::from_endpoint).collect();
        // Stable sort keeps config order among equals.
        routes.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| b.prefix_len.cmp(&a.prefix_len))
        });
        Self { routes }
    }

    /// The winning route, or `None` when nothing matches.
    pub fn match_request(&self, req: &Request<Body>) -> Option<&Route> {
        self.routes.iter().find(|r| r.matches(req))
    }
}
