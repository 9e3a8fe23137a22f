//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the downstream handler
//! - Wire up middleware (timeout, tracing, request ID, forward auth)
//! - Serve plain HTTP or TLS with graceful shutdown

use std::net::SocketAddr;
use std::time::Duration;

use axum::{middleware, Extension, Router};
use axum_server::tls_rustls::RustlsConfig;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::auth::{forward_auth_middleware, ForwardAuth, TlsConnection};
use crate::config::GatewayConfig;
use crate::http::downstream::{echo_handler, upstream_handler, UpstreamForwarder};
use crate::http::request::UuidRequestId;

/// Grace period for in-flight requests after shutdown is signalled.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Error type for server setup.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid upstream address {address}: {source}")]
    InvalidUpstream {
        address: String,
        #[source]
        source: axum::http::uri::InvalidUri,
    },
}

/// HTTP server fronting the downstream service with forward auth.
pub struct GatewayServer {
    router: Router,
    config: GatewayConfig,
}

impl GatewayServer {
    /// Create a new server with the given configuration and auth middleware.
    pub fn new(config: GatewayConfig, auth: ForwardAuth) -> Result<Self, ServerError> {
        let router = Self::build_router(&config, auth)?;
        Ok(Self { router, config })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, auth: ForwardAuth) -> Result<Router, ServerError> {
        let downstream = match &config.upstream.address {
            Some(address) => {
                let upstream = UpstreamForwarder::new(address).map_err(|source| {
                    ServerError::InvalidUpstream {
                        address: address.clone(),
                        source,
                    }
                })?;
                Router::new().fallback(upstream_handler).with_state(upstream)
            }
            None => Router::new().fallback(echo_handler),
        };

        let router = downstream
            .layer(middleware::from_fn_with_state(auth, forward_auth_middleware))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
            .layer(TraceLayer::new_for_http())
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)));

        if config.listener.tls.is_some() {
            Ok(router.layer(Extension(TlsConnection)))
        } else {
            Ok(router)
        }
    }

    /// The fully layered router.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Serve plain HTTP on `listener` until shutdown is signalled.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Serve HTTPS on `addr` until shutdown is signalled.
    pub async fn run_tls(
        self,
        addr: SocketAddr,
        tls: RustlsConfig,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        tracing::info!(address = %addr, "HTTPS server starting");

        let handle = axum_server::Handle::new();
        let shutdown_handle = handle.clone();
        tokio::spawn(async move {
            let _ = shutdown.recv().await;
            shutdown_handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
        });

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(app)
            .await?;

        tracing::info!("HTTPS server stopped");
        Ok(())
    }
}
