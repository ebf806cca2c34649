//! Retry policy derived from endpoint configuration.
//!
//! # Responsibilities
//! - Derive the attempt count and per-attempt timeout
//! - Resolve configured retry conditions into response predicates
//! - Judge whether a received response must be retried
//!
//! # Design Decisions
//! - Transport errors always retry; responses only when a condition matches
//! - Conditions are OR-combined
//! - No backoff between attempts; the next attempt goes to another node

use axum::http::{HeaderName, Response};
use regex::Regex;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::time::Duration;

use crate::config::{EndpointConfig, RetryConditionConfig, RetryConfig};
use crate::error::ProxyError;

/// Number of attempts for one call. Never zero.
pub fn calc_attempts(endpoint: &EndpointConfig) -> u32 {
    match &endpoint.retry {
        Some(retry) if retry.attempts > 0 => retry.attempts,
        _ => 1,
    }
}

/// Timeout applied to each attempt.
///
/// A per-try timeout only wins when it is positive and strictly below the
/// endpoint's overall timeout.
pub fn calc_timeout(endpoint: &EndpointConfig) -> Duration {
    let timeout = endpoint.timeout();
    let per_try = endpoint
        .retry
        .as_ref()
        .and_then(|r| r.per_try_timeout_ms)
        .map(Duration::from_millis);

    match per_try {
        Some(per_try) if !per_try.is_zero() && per_try < timeout => per_try,
        _ => timeout,
    }
}

/// A predicate over a received response.
#[derive(Debug, Clone)]
pub enum RetryCondition {
    /// Status code falls in one of the ranges.
    ByStatusCode(Vec<RangeInclusive<u16>>),
    /// Header is present and its value matches.
    ByHeader { name: HeaderName, value: Regex },
}

impl RetryCondition {
    pub fn parse(config: &RetryConditionConfig) -> Result<Self, ProxyError> {
        match config {
            RetryConditionConfig::ByStatusCode(codes) => {
                let ranges = codes
                    .split(',')
                    .map(|part| parse_status_range(part.trim()))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(RetryCondition::ByStatusCode(ranges))
            }
            RetryConditionConfig::ByHeader { name, value } => {
                let name = HeaderName::from_str(name).map_err(|e| {
                    ProxyError::Config(format!("invalid retry header name '{}': {}", name, e))
                })?;
                let value = Regex::new(value).map_err(|e| {
                    ProxyError::Config(format!("invalid retry header pattern '{}': {}", value, e))
                })?;
                Ok(RetryCondition::ByHeader { name, value })
            }
        }
    }

    pub fn judge<B>(&self, resp: &Response<B>) -> bool {
        match self {
            RetryCondition::ByStatusCode(ranges) => {
                let code = resp.status().as_u16();
                ranges.iter().any(|r| r.contains(&code))
            }
            RetryCondition::ByHeader { name, value } => resp
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| value.is_match(v))
                .unwrap_or(false),
        }
    }
}

fn parse_status_range(codes: &str) -> Result<RangeInclusive<u16>, ProxyError> {
    let invalid = || ProxyError::Config(format!("invalid retry status code: '{}'", codes));
    let parse = |s: &str| -> Result<u16, ProxyError> {
        let code: u16 = s.trim().parse().map_err(|_| invalid())?;
        if (100..=599).contains(&code) {
            Ok(code)
        } else {
            Err(invalid())
        }
    };

    match codes.split_once('-') {
        Some((low, high)) => {
            let (low, high) = (parse(low)?, parse(high)?);
            if low > high {
                return Err(invalid());
            }
            Ok(low..=high)
        }
        None => {
            let code = parse(codes)?;
            Ok(code..=code)
        }
    }
}

/// Everything the client needs to drive attempts for one endpoint.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    attempts: u32,
    per_try_timeout: Duration,
    conditions: Vec<RetryCondition>,
    max_body_bytes: usize,
}

impl RetryPolicy {
    pub fn from_endpoint(endpoint: &EndpointConfig) -> Result<Self, ProxyError> {
        let retry = endpoint.retry.clone().unwrap_or_default();
        let conditions = retry
            .conditions
            .iter()
            .map(RetryCondition::parse)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            attempts: calc_attempts(endpoint),
            per_try_timeout: calc_timeout(endpoint),
            conditions,
            max_body_bytes: retry.max_body_bytes,
        })
    }

    /// A policy with explicit values, bypassing configuration.
    pub fn new(attempts: u32, per_try_timeout: Duration, conditions: Vec<RetryCondition>) -> Self {
        Self {
            attempts: attempts.max(1),
            per_try_timeout,
            conditions,
            max_body_bytes: RetryConfig::default().max_body_bytes,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn per_try_timeout(&self) -> Duration {
        self.per_try_timeout
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    /// True if any condition matches the response.
    pub fn should_retry<B>(&self, resp: &Response<B>) -> bool {
        self.conditions.iter().any(|c| c.judge(resp))
    }
}
