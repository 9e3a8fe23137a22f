//! Forward-authentication gateway library.
//!
//! Every inbound request is first checked against an external auth endpoint.
//! A non-2xx answer is relayed to the client verbatim; a 2xx answer lets the
//! request through, enriched with identity headers chosen from the auth
//! response.

pub mod auth;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use auth::{forward_auth_middleware, Decision, ForwardAuth};
pub use config::schema::GatewayConfig;
pub use http::GatewayServer;
pub use lifecycle::Shutdown;
