//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::Response,
    Router,
};
use tokio::net::TcpListener;

use forward_auth::config::{ForwardAuthConfig, GatewayConfig};
use forward_auth::{ForwardAuth, GatewayServer};

/// Canned answer returned by the mock auth endpoint.
#[derive(Clone)]
pub struct MockReply {
    pub status: StatusCode,
    pub headers: Vec<(&'static str, &'static str)>,
    pub body: &'static str,
}

impl MockReply {
    pub fn ok() -> Self {
        Self {
            status: StatusCode::OK,
            headers: Vec::new(),
            body: "",
        }
    }

    pub fn status(status: StatusCode) -> Self {
        Self {
            status,
            ..Self::ok()
        }
    }

    pub fn header(mut self, name: &'static str, value: &'static str) -> Self {
        self.headers.push((name, value));
        self
    }

    pub fn body(mut self, body: &'static str) -> Self {
        self.body = body;
        self
    }
}

#[derive(Default)]
struct Recorded {
    calls: AtomicUsize,
    last_headers: Mutex<Option<HeaderMap>>,
    last_method: Mutex<Option<String>>,
}

/// Handle on a running mock auth endpoint.
#[derive(Clone)]
pub struct MockAuthServer {
    pub addr: SocketAddr,
    recorded: Arc<Recorded>,
}

impl MockAuthServer {
    /// Serve `reply` for every request on an ephemeral port.
    pub async fn start(reply: MockReply) -> Self {
        let recorded = Arc::new(Recorded::default());
        let app = Router::new()
            .fallback(mock_handler)
            .with_state((reply, recorded.clone()));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, recorded }
    }

    pub fn url(&self) -> String {
        format!("http://{}/verify", self.addr)
    }

    pub fn calls(&self) -> usize {
        self.recorded.calls.load(Ordering::SeqCst)
    }

    /// Headers of the most recent sub-request.
    pub fn last_headers(&self) -> HeaderMap {
        self.recorded
            .last_headers
            .lock()
            .unwrap()
            .clone()
            .expect("auth endpoint was never called")
    }

    pub fn last_method(&self) -> Option<String> {
        self.recorded.last_method.lock().unwrap().clone()
    }
}

async fn mock_handler(
    State((reply, recorded)): State<(MockReply, Arc<Recorded>)>,
    request: Request,
) -> Response {
    recorded.calls.fetch_add(1, Ordering::SeqCst);
    *recorded.last_headers.lock().unwrap() = Some(request.headers().clone());
    *recorded.last_method.lock().unwrap() = Some(request.method().to_string());

    let mut response = Response::new(Body::from(reply.body));
    *response.status_mut() = reply.status;
    for (name, value) in reply.headers {
        response.headers_mut().append(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
    }
    response
}

/// Build the gateway router (echo downstream) for `auth`.
pub fn gateway(auth: ForwardAuthConfig) -> Router {
    let config = GatewayConfig {
        forward_auth: auth.clone(),
        ..GatewayConfig::default()
    };
    let auth = ForwardAuth::new(&auth).unwrap();
    GatewayServer::new(config, auth).unwrap().router()
}
