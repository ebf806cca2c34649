//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Service registry settings for `discovery` backends.
    pub discovery: DiscoveryConfig,

    /// Endpoint definitions.
    pub endpoints: Vec<EndpointConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Service registry configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// TOML file listing service instances, reloaded on change.
    pub registry_file: Option<String>,
}

/// Upstream protocol spoken by an endpoint's nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Http,
    Https,
    Grpc,
}

impl Protocol {
    /// Scheme and secure flag expected in registry endpoint URLs.
    /// TLS endpoints are advertised as `http://host:port?isSecure=true`.
    pub fn endpoint_scheme(&self) -> (&'static str, bool) {
        match self {
            Protocol::Http => ("http", false),
            Protocol::Https => ("http", true),
            Protocol::Grpc => ("grpc", false),
        }
    }
}

/// Node selection strategy for an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BalancerKind {
    /// Power of two choices over in-flight load.
    #[default]
    P2c,
    RoundRobin,
    WeightedRandom,
}

/// A logical upstream the gateway routes to.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointConfig {
    /// Endpoint identifier for logging/metrics.
    pub name: String,

    /// Host header to match (exact match).
    #[serde(default)]
    pub host: Option<String>,

    /// Path prefix to match.
    #[serde(default)]
    pub path_prefix: Option<String>,

    /// Route priority (higher = checked first).
    #[serde(default)]
    pub priority: u32,

    #[serde(default)]
    pub protocol: Protocol,

    #[serde(default)]
    pub balancer: BalancerKind,

    /// Overall timeout for one call, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    pub backends: Vec<BackendConfig>,

    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl EndpointConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_timeout_ms() -> u64 {
    1000
}

/// One backend target of an endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// `direct:///host:port`, `discovery:///service-name` or bare `host:port`.
    pub target: String,

    /// Relative selection weight (default: 1).
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

/// Retry configuration of an endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total number of attempts; 0 behaves as 1.
    pub attempts: u32,

    /// Per-attempt timeout in milliseconds.
    pub per_try_timeout_ms: Option<u64>,

    /// Response predicates that force another attempt.
    pub conditions: Vec<RetryConditionConfig>,

    /// Upper bound on the request body buffered for replay.
    pub max_body_bytes: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 1,
            per_try_timeout_ms: None,
            conditions: Vec::new(),
            max_body_bytes: 4 * 1024 * 1024, // 4MB
        }
    }
}

/// A retry condition as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryConditionConfig {
    /// A status code (`"503"`) or inclusive range (`"500-504"`).
    ByStatusCode(String),
    /// Header `name` whose value matches the regular expression `value`.
    ByHeader { name: String, value: String },
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
