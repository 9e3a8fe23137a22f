//! Downstream handlers behind the forward-auth middleware.
//!
//! # Responsibilities
//! - Echo the (possibly merged) request back as JSON when no upstream is set
//! - Otherwise forward the request to the configured upstream

use std::collections::BTreeMap;
use std::str::FromStr;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{
        uri::{Authority, InvalidUri, PathAndQuery, Scheme},
        StatusCode, Uri,
    },
    response::{IntoResponse, Response},
    Json,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use serde::{Deserialize, Serialize};

use crate::auth::{canonical_key, HOP_BY_HOP};
use crate::http::request::request_id;
use crate::observability::metrics;

/// What the echo handler saw.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EchoResponse {
    pub method: String,
    pub uri: String,
    pub headers: BTreeMap<String, Vec<String>>,
}

/// Reply with the request's method, target and headers.
pub async fn echo_handler(request: Request) -> Json<EchoResponse> {
    let mut headers: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in request.headers() {
        headers
            .entry(canonical_key(name.as_str()))
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }

    Json(EchoResponse {
        method: request.method().to_string(),
        uri: request.uri().to_string(),
        headers,
    })
}

/// Forwards requests to a single upstream server.
#[derive(Clone)]
pub struct UpstreamForwarder {
    client: Client<HttpConnector, Body>,
    authority: Authority,
}

impl UpstreamForwarder {
    pub fn new(address: &str) -> Result<Self, InvalidUri> {
        let authority = Authority::from_str(address)?;
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Ok(Self { client, authority })
    }

    pub async fn forward(&self, request: Request) -> Response {
        let request_id = request_id(&request).to_string();
        let (mut parts, body) = request.into_parts();

        for name in HOP_BY_HOP {
            parts.headers.remove(name);
        }

        let mut uri_parts = parts.uri.clone().into_parts();
        uri_parts.scheme = Some(Scheme::HTTP);
        uri_parts.authority = Some(self.authority.clone());
        if uri_parts.path_and_query.is_none() {
            uri_parts.path_and_query = Some(PathAndQuery::from_static("/"));
        }
        parts.uri = match Uri::from_parts(uri_parts) {
            Ok(uri) => uri,
            Err(e) => {
                tracing::warn!(request_id = %request_id, error = %e, "Cannot build upstream URI");
                return (StatusCode::BAD_REQUEST, "Invalid request target").into_response();
            }
        };

        match self.client.request(Request::from_parts(parts, body)).await {
            Ok(response) => relay_upstream(response),
            Err(e) => {
                tracing::error!(request_id = %request_id, upstream = %self.authority, error = %e, "Upstream error");
                metrics::record_upstream_response(StatusCode::BAD_GATEWAY.as_u16());
                (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
            }
        }
    }
}

fn relay_upstream(response: hyper::Response<hyper::body::Incoming>) -> Response {
    metrics::record_upstream_response(response.status().as_u16());
    let (parts, body) = response.into_parts();
    Response::from_parts(parts, Body::new(body))
}

pub async fn upstream_handler(
    State(upstream): State<UpstreamForwarder>,
    request: Request,
) -> Response {
    upstream.forward(request).await
}
