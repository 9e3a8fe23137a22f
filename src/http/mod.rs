//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, layers)
//!     → request.rs (request ID)
//!     → auth (forward auth middleware)
//!     → downstream.rs (echo or upstream forwarder)
//!     → Send to client
//! ```

pub mod downstream;
pub mod request;
pub mod server;

pub use downstream::{EchoResponse, UpstreamForwarder};
pub use request::{UuidRequestId, X_REQUEST_ID};
pub use server::{GatewayServer, ServerError};
