//! Forward authentication subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request
//!     → gate.rs (run_if_headers_regex; skip straight to downstream on miss)
//!     → request.rs (copy/filter headers, set X-Forwarded-*)
//!     → GET <address> (no redirects, 30s timeout, body fully buffered)
//!     → response.rs
//!         non-2xx → relay status/headers/body to the client (terminal)
//!         2xx     → merge selected headers into the request → downstream
//! ```
//!
//! # Design Decisions
//! - One attempt per request; no retries, no caching of decisions
//! - Configuration is compiled once and shared read-only via `Arc`
//! - The sub-request future lives inside the inbound request's future, so
//!   dropping the inbound request cancels the auth call
//! - Log sink is injectable per instance (`with_dispatch`)

pub mod error;
pub mod gate;
pub mod headers;
pub mod request;
pub mod response;

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use regex::Regex;
use tracing::instrument::WithSubscriber;
use tracing::Dispatch;
use url::Url;

use crate::config::ForwardAuthConfig;
use crate::observability::metrics;

pub use error::{AuthError, ForwardAuthError};
pub use gate::Gate;
pub use headers::{canonical_key, HeaderSet, HOP_BY_HOP};
pub use request::{ConnectionContext, TlsConnection};
pub use response::AuthResponse;

use self::request::build_auth_headers;
use self::response::{apply_success, relay_failure};

/// Fixed deadline for the auth sub-request.
pub const AUTH_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of consulting the auth endpoint for one request.
#[derive(Debug)]
pub enum Decision {
    /// Gate did not match; the request continues without an auth check.
    Skipped,
    /// Auth endpoint approved; headers were merged into the request.
    Allowed,
    /// Auth endpoint rejected; this response goes back to the client.
    Denied(Response),
}

impl Decision {
    /// Label used for metrics.
    pub fn outcome(&self) -> &'static str {
        match self {
            Decision::Skipped => "skipped",
            Decision::Allowed => "allowed",
            Decision::Denied(_) => "denied",
        }
    }
}

#[derive(Clone)]
struct Inner {
    name: String,
    address: String,
    trust_forward_header: bool,
    auth_response_headers: Vec<String>,
    auth_response_headers_regex: Option<Regex>,
    auth_request_headers: Vec<String>,
    gate: Gate,
    client: reqwest::Client,
    dispatch: Option<Dispatch>,
}

/// Forward-auth middleware instance. Cheap to clone.
#[derive(Clone)]
pub struct ForwardAuth {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ForwardAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForwardAuth")
            .field("name", &self.inner.name)
            .field("address", &self.inner.address)
            .field("trust_forward_header", &self.inner.trust_forward_header)
            .finish_non_exhaustive()
    }
}

impl ForwardAuth {
    /// Compile the configuration into a middleware instance.
    ///
    /// Fails if any pattern is invalid. The auth address is not checked here;
    /// a malformed address fails each request instead.
    pub fn new(config: &ForwardAuthConfig) -> Result<Self, ForwardAuthError> {
        let auth_response_headers_regex = if config.auth_response_headers_regex.is_empty() {
            None
        } else {
            let pattern = &config.auth_response_headers_regex;
            Some(Regex::new(pattern).map_err(|source| ForwardAuthError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })?)
        };

        let gate = Gate::compile(&config.run_if_headers_regex)?;

        // The auth endpoint's redirects are relayed to the client, never followed.
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(AUTH_REQUEST_TIMEOUT)
            .build()?;

        if config.address.is_empty() {
            tracing::warn!(
                middleware = %config.name,
                "forward_auth.address is empty; every gated request will fail with 500"
            );
        }

        tracing::debug!(
            middleware = %config.name,
            address = %config.address,
            gate_rules = config.run_if_headers_regex.len(),
            "Forward auth created"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                name: config.name.clone(),
                address: config.address.clone(),
                trust_forward_header: config.trust_forward_header,
                auth_response_headers: config.auth_response_headers.clone(),
                auth_response_headers_regex,
                auth_request_headers: config.auth_request_headers.clone(),
                gate,
                client,
                dispatch: None,
            }),
        })
    }

    /// Route this instance's diagnostics to `dispatch` instead of the ambient
    /// subscriber.
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        Arc::make_mut(&mut self.inner).dispatch = Some(dispatch);
        self
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn address(&self) -> &str {
        &self.inner.address
    }

    /// Decide the fate of `req`, mutating its headers on approval.
    pub async fn authorize<B>(&self, req: &mut Request<B>) -> Result<Decision, AuthError> {
        match &self.inner.dispatch {
            Some(dispatch) => self.check(req).with_subscriber(dispatch.clone()).await,
            None => self.check(req).await,
        }
    }

    #[tracing::instrument(name = "forward_auth", skip_all, fields(middleware = %self.inner.name))]
    async fn check<B>(&self, req: &mut Request<B>) -> Result<Decision, AuthError> {
        let result = self.decide(req).await;
        if let Err(e) = &result {
            tracing::error!(error = %e, "Forward auth failed");
        }
        result
    }

    async fn decide<B>(&self, req: &mut Request<B>) -> Result<Decision, AuthError> {
        let inner = &self.inner;
        let mut inbound = HeaderSet::from_header_map(req.headers());
        if inbound.contains("Connection") {
            inbound.strip_connection_scoped();
            *req.headers_mut() = inbound.to_header_map();
        }

        if !inner.gate.should_run(&inbound) {
            return Ok(Decision::Skipped);
        }

        let url = Url::parse(&inner.address).map_err(|source| AuthError::InvalidAddress {
            address: inner.address.clone(),
            source,
        })?;

        let ctx = ConnectionContext::from_request(req);
        let headers = build_auth_headers(
            &inbound,
            &ctx,
            inner.trust_forward_header,
            &inner.auth_request_headers,
        );

        let response = inner
            .client
            .get(url.clone())
            .headers(headers.to_header_map())
            .send()
            .await
            .map_err(|source| AuthError::Transport {
                address: inner.address.clone(),
                source,
            })?;

        let status = response.status();
        let auth_headers = HeaderSet::from_header_map(response.headers());
        let body = response.bytes().await.map_err(|source| AuthError::Body {
            address: inner.address.clone(),
            source,
        })?;

        let auth = AuthResponse {
            status,
            headers: auth_headers,
            body,
        };

        if !auth.is_success() {
            tracing::debug!(address = %inner.address, status = %status, "Auth endpoint rejected request");
            return relay_failure(auth, &url).map(Decision::Denied);
        }

        apply_success(
            req,
            &auth.headers,
            &inner.auth_response_headers,
            inner.auth_response_headers_regex.as_ref(),
        );

        tracing::debug!(address = %inner.address, status = %status, "Auth endpoint approved request");
        Ok(Decision::Allowed)
    }
}

/// Axum middleware running [`ForwardAuth::authorize`] in front of `next`.
pub async fn forward_auth_middleware(
    State(auth): State<ForwardAuth>,
    mut request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();

    match auth.authorize(&mut request).await {
        Ok(Decision::Denied(response)) => {
            metrics::record_auth_decision("denied", start);
            response
        }
        Ok(decision) => {
            metrics::record_auth_decision(decision.outcome(), start);
            next.run(request).await
        }
        Err(_) => {
            metrics::record_auth_decision("error", start);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
