//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Init logging/metrics → Build endpoint clients → Bind listener
//!
//! Shutdown (shutdown.rs):
//!     Ctrl+C → Stop accepting → Drain requests → Stop discovery watches → Exit
//! ```
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Every background task owns a `ShutdownSignal`
//! - Dropping a `Shutdown` stops its tasks, so owners tear them down implicitly

pub mod shutdown;

pub use shutdown::{wait_for_signal, Shutdown, ShutdownSignal};
