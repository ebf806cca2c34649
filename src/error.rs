//! Error definitions for the forwarding client.

use std::time::Duration;
use thiserror::Error;

use crate::discovery::DiscoveryError;

/// Errors produced while building an endpoint client or forwarding a call.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Invalid endpoint configuration. Fatal at build time.
    #[error("invalid endpoint configuration: {0}")]
    Config(String),

    /// The selector had no eligible node (empty population or all excluded).
    #[error("no available node")]
    NoAvailableNode,

    /// Connection or protocol failure reported by the transport.
    #[error("upstream transport error: {0}")]
    Transport(#[from] hyper_util::client::legacy::Error),

    /// The attempt exceeded its per-attempt timeout.
    #[error("upstream timed out after {0:?}")]
    Timeout(Duration),

    /// Reading or buffering the request body failed.
    #[error("request body error: {0}")]
    Body(#[source] axum::Error),

    /// The outbound request could not be rebuilt for the selected node.
    #[error("invalid upstream request: {0}")]
    InvalidRequest(#[from] axum::http::Error),

    /// The caller's context was canceled.
    #[error("context canceled")]
    Canceled,

    /// The caller's deadline passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    /// The registry could not be reached while opening a watch.
    #[error("discovery error: {0}")]
    Discovery(#[from] DiscoveryError),
}

impl ProxyError {
    /// True for errors raised by the caller's context rather than the upstream.
    pub fn is_context_error(&self) -> bool {
        matches!(self, ProxyError::Canceled | ProxyError::DeadlineExceeded)
    }

    /// Short label used for the `outcome` metric dimension.
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::Config(_) => "config",
            ProxyError::NoAvailableNode => "no_node",
            ProxyError::Transport(_) => "transport",
            ProxyError::Timeout(_) => "timeout",
            ProxyError::Body(_) => "body",
            ProxyError::InvalidRequest(_) => "invalid_request",
            ProxyError::Canceled => "canceled",
            ProxyError::DeadlineExceeded => "deadline",
            ProxyError::Discovery(_) => "discovery",
        }
    }
}
