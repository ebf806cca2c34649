//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → one EndpointConfig per endpoint client
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; endpoint clients are built from it once
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod target;
pub mod validation;

pub use schema::{
    BackendConfig, BalancerKind, DiscoveryConfig, EndpointConfig, GatewayConfig, ListenerConfig,
    ObservabilityConfig, Protocol, RetryConditionConfig, RetryConfig,
};
