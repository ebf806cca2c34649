//! Response handling and transformation.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers from upstream responses
//! - Map forwarding errors to HTTP status codes
//!
//! # Design Decisions
//! - Upstream bodies are streamed, never buffered here
//! - Timeouts and expired deadlines map to 504, an empty node set to 503

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::error::ProxyError;

/// Non-standard status used when the client went away first.
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

const HOP_BY_HOP: [HeaderName; 6] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::UPGRADE,
];

/// Remove connection-scoped headers before relaying a response.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }
    headers.remove("keep-alive");
}

pub fn status_for(err: &ProxyError) -> StatusCode {
    match err {
        ProxyError::NoAvailableNode => StatusCode::SERVICE_UNAVAILABLE,
        ProxyError::Timeout(_) | ProxyError::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        ProxyError::Canceled => {
            StatusCode::from_u16(CLIENT_CLOSED_REQUEST).unwrap_or(StatusCode::BAD_REQUEST)
        }
        ProxyError::Transport(_) | ProxyError::Body(_) | ProxyError::Discovery(_) => StatusCode::BAD_GATEWAY,
        ProxyError::Config(_) | ProxyError::InvalidRequest(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        let message = match &self {
            ProxyError::NoAvailableNode => "No available upstream node",
            ProxyError::Timeout(_) | ProxyError::DeadlineExceeded => "Upstream request timed out",
            ProxyError::Canceled => "Request canceled",
            ProxyError::Transport(_) | ProxyError::Body(_) | ProxyError::Discovery(_) => "Upstream request failed",
            ProxyError::Config(_) | ProxyError::InvalidRequest(_) => "Gateway misconfigured",
        };
        (status, Body::from(message)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&ProxyError::NoAvailableNode), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_for(&ProxyError::Timeout(Duration::from_secs(1))), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(status_for(&ProxyError::DeadlineExceeded), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(status_for(&ProxyError::Canceled).as_u16(), 499);
        assert_eq!(status_for(&ProxyError::Config("x".into())), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_strip_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, "close".parse().unwrap());
        headers.insert("keep-alive", "timeout=5".parse().unwrap());
        headers.insert(header::CONTENT_TYPE, "text/plain".parse().unwrap());

        strip_hop_by_hop(&mut headers);
        assert_eq!(headers.len(), 1);
        assert!(headers.contains_key(header::CONTENT_TYPE));
    }
}
