//! Retrying, load-balanced request forwarding for an API gateway.

// Core
pub mod client;
pub mod config;
pub mod error;

// Traffic management
pub mod discovery;
pub mod load_balancer;
pub mod resilience;
pub mod routing;

// Surface and cross-cutting concerns
pub mod http;
pub mod lifecycle;
pub mod observability;

pub use client::{CallContext, ClientFactory, EndpointClient};
pub use config::GatewayConfig;
pub use error::ProxyError;
pub use http::GatewayServer;
