//! Network layer subsystem.
//!
//! # Design Decisions
//! - TLS is optional and terminated by the gateway itself
//! - Requests on TLS listeners carry the `TlsConnection` extension so the
//!   auth endpoint learns `X-Forwarded-Proto: https`

pub mod tls;
