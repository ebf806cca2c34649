//! Configuration validation.
//!
//! Serde handles the syntax; this pass checks the semantics and returns every
//! problem found, not just the first.

use std::collections::HashSet;
use thiserror::Error;

use crate::config::schema::{EndpointConfig, GatewayConfig};
use crate::config::target::{Target, TargetScheme};
use crate::resilience::retries::RetryCondition;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("endpoint '{endpoint}': {message}")]
pub struct ValidationError {
    pub endpoint: String,
    pub message: String,
}

impl ValidationError {
    fn new(endpoint: &str, message: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            message: message.into(),
        }
    }
}

/// Validate a loaded configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut names = HashSet::new();
    let has_registry = config.discovery.registry_file.is_some();

    for endpoint in &config.endpoints {
        if endpoint.name.is_empty() {
            errors.push(ValidationError::new("", "name must not be empty"));
        } else if !names.insert(endpoint.name.as_str()) {
            errors.push(ValidationError::new(&endpoint.name, "duplicate endpoint name"));
        }
        validate_endpoint(endpoint, has_registry, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_endpoint(endpoint: &EndpointConfig, has_registry: bool, errors: &mut Vec<ValidationError>) {
    let name = endpoint.name.as_str();

    if endpoint.timeout_ms == 0 {
        errors.push(ValidationError::new(name, "timeout_ms must be positive"));
    }
    if endpoint.backends.is_empty() {
        errors.push(ValidationError::new(name, "at least one backend is required"));
    }

    for backend in &endpoint.backends {
        if backend.weight == 0 {
            errors.push(ValidationError::new(
                name,
                format!("backend '{}' has zero weight", backend.target),
            ));
        }
        match Target::parse(&backend.target) {
            Ok(target) if target.scheme == TargetScheme::Discovery => {
                // Only one logical service per endpoint.
                if endpoint.backends.len() > 1 {
                    errors.push(ValidationError::new(
                        name,
                        "a discovery backend must be the only backend",
                    ));
                }
                if !has_registry {
                    errors.push(ValidationError::new(
                        name,
                        "discovery backend configured without a registry",
                    ));
                }
            }
            Ok(_) => {}
            Err(e) => errors.push(ValidationError::new(name, e.to_string())),
        }
    }

    if let Some(retry) = &endpoint.retry {
        for cond in &retry.conditions {
            if let Err(e) = RetryCondition::parse(cond) {
                errors.push(ValidationError::new(name, e.to_string()));
            }
        }
    }
}
