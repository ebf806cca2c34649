//! Per-call cancellation and deadline.

use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::ProxyError;

/// Caller context bound to one `EndpointClient::call`.
///
/// Clones share the same cancellation token.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    /// A context that is never canceled unless asked to.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            cancel: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// The context error, if the call should stop now.
    ///
    /// Cancellation wins over an expired deadline.
    pub fn err(&self) -> Option<ProxyError> {
        if self.cancel.is_cancelled() {
            return Some(ProxyError::Canceled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ProxyError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolve with the context error once the context is done.
    pub async fn done(&self) -> ProxyError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                biased;
                _ = self.cancel.cancelled() => ProxyError::Canceled,
                _ = tokio::time::sleep_until(deadline) => ProxyError::DeadlineExceeded,
            },
            None => {
                self.cancel.cancelled().await;
                ProxyError::Canceled
            }
        }
    }
}
