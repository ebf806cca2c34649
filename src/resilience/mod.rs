//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Endpoint config
//!     → retries.rs (attempts, per-attempt timeout, response conditions)
//!     → client drives attempts against distinct nodes
//! ```
//!
//! # Design Decisions
//! - Every attempt has a deadline (the derived per-attempt timeout)
//! - Transport errors always retry; responses retry only on a matching condition
//! - No backoff: a retry goes to a different node immediately

pub mod retries;

pub use retries::{calc_attempts, calc_timeout, RetryCondition, RetryPolicy};
