//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the gateway handler
//! - Wire up middleware (request ID, tracing)
//! - Dispatch requests to the endpoint chosen by the routing table
//! - Bound every call by the endpoint's overall timeout
//! - Close endpoint clients on shutdown

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::client::{CallContext, ClientFactory, EndpointClient};
use crate::config::{EndpointConfig, GatewayConfig};
use crate::error::ProxyError;
use crate::http::response::strip_hop_by_hop;
use crate::lifecycle::ShutdownSignal;
use crate::observability::metrics;
use crate::routing::Router as EndpointRouter;

pub const X_REQUEST_ID: &str = "x-request-id";

/// One routable endpoint: its client and the overall per-call deadline.
#[derive(Debug, Clone)]
pub struct Upstream {
    pub client: Arc<EndpointClient>,
    pub timeout: Duration,
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<EndpointRouter>,
    pub upstreams: Arc<HashMap<String, Upstream>>,
}

/// HTTP front end dispatching to endpoint clients.
pub struct GatewayServer {
    router: Router,
    upstreams: Arc<HashMap<String, Upstream>>,
}

impl GatewayServer {
    /// Build a client for every configured endpoint.
    pub async fn build(config: &GatewayConfig, factory: &ClientFactory) -> Result<Self, ProxyError> {
        let mut clients = HashMap::with_capacity(config.endpoints.len());
        for endpoint in &config.endpoints {
            let client = factory.build(endpoint).await?;
            clients.insert(endpoint.name.clone(), client);
        }
        Ok(Self::new(&config.endpoints, clients))
    }

    /// Assemble the server from prebuilt clients, keyed by endpoint name.
    pub fn new(endpoints: &[EndpointConfig], mut clients: HashMap<String, EndpointClient>) -> Self {
        let mut upstreams = HashMap::with_capacity(endpoints.len());
        for endpoint in endpoints {
            if let Some(client) = clients.remove(&endpoint.name) {
                upstreams.insert(
                    endpoint.name.clone(),
                    Upstream {
                        client: Arc::new(client),
                        timeout: endpoint.timeout(),
                    },
                );
            } else {
                tracing::warn!(endpoint = %endpoint.name, "Endpoint has no client, requests will 502");
            }
        }

        let state = AppState {
            router: Arc::new(EndpointRouter::from_config(endpoints)),
            upstreams: Arc::new(upstreams),
        };
        let upstreams = state.upstreams.clone();

        Self {
            router: Self::build_router(state),
            upstreams,
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(gateway_handler))
            .route("/", any(gateway_handler))
            .with_state(state)
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The assembled router, for embedding or in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until `shutdown` fires, then drain and close every client.
    pub async fn run(self, listener: TcpListener, mut shutdown: ShutdownSignal) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, endpoints = self.upstreams.len(), "Gateway listening");

        axum::serve(listener, self.router.clone())
            .with_graceful_shutdown(async move { shutdown.recv().await })
            .await?;

        self.close();
        tracing::info!("Gateway stopped");
        Ok(())
    }

    /// Stop every discovery watch.
    pub fn close(&self) {
        for upstream in self.upstreams.values() {
            upstream.client.close();
        }
    }
}

/// Route the request to its endpoint and forward it.
async fn gateway_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let Some(route) = state.router.match_request(&request) else {
        tracing::warn!(request_id = %request_id, path = %request.uri().path(), "No route matched");
        metrics::record_request("none", StatusCode::NOT_FOUND.as_u16(), start);
        return (StatusCode::NOT_FOUND, "No matching route found").into_response();
    };
    let endpoint = route.endpoint.as_str();

    let Some(upstream) = state.upstreams.get(endpoint) else {
        metrics::record_request(endpoint, StatusCode::BAD_GATEWAY.as_u16(), start);
        return (StatusCode::BAD_GATEWAY, "Endpoint unavailable").into_response();
    };

    tracing::debug!(
        request_id = %request_id,
        endpoint = %endpoint,
        method = %request.method(),
        path = %request.uri().path(),
        "Forwarding request"
    );

    let ctx = CallContext::with_timeout(upstream.timeout);
    let mut response = match upstream.client.call(&ctx, request).await {
        Ok(response) => {
            let (mut parts, body) = response.into_parts();
            strip_hop_by_hop(&mut parts.headers);
            Response::from_parts(parts, body)
        }
        Err(e) => {
            tracing::error!(request_id = %request_id, endpoint = %endpoint, error = %e, "Forwarding failed");
            e.into_response()
        }
    };

    metrics::record_request(endpoint, response.status().as_u16(), start);
    if let Ok(value) = HeaderValue::from_str(endpoint) {
        response.headers_mut().insert("x-gateway-endpoint", value);
    }
    response
}
