//! Error types for the forward-auth middleware.

use thiserror::Error;

/// Failure to construct a [`ForwardAuth`](crate::auth::ForwardAuth).
#[derive(Debug, Error)]
pub enum ForwardAuthError {
    #[error("error compiling regular expression {pattern}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("unable to build auth HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Failure while consulting the auth endpoint. Each one ends the request with
/// a 500.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid auth address {address}: {source}")]
    InvalidAddress {
        address: String,
        #[source]
        source: url::ParseError,
    },

    #[error("error calling {address}: {source}")]
    Transport {
        address: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("error reading body from {address}: {source}")]
    Body {
        address: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("error reading response location header from {address}: {reason}")]
    Location { address: String, reason: String },
}
