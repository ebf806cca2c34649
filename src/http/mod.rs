//! HTTP gateway surface.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, trace span)
//!     → routing (host / path prefix → endpoint)
//!     → client::EndpointClient::call (select node, forward, retry)
//!     → response.rs (strip hop-by-hop headers, map errors to status)
//!     → Send to client
//! ```

pub mod response;
pub mod server;

pub use server::{GatewayServer, X_REQUEST_ID};
