//! Construction of the auth sub-request headers.
//!
//! # Responsibilities
//! - Copy client headers, minus hop-by-hop and transport-managed ones
//! - Apply the optional allow-list
//! - Set the `X-Forwarded-*` family per the trust policy
//!
//! # Design Decisions
//! - Every forwarded-context header is either taken verbatim (only when
//!   trusted) or recomputed from the actual connection
//! - Trusted values are read from the inbound request, never from the
//!   filtered copy, so the allow-list cannot hide them

use std::net::SocketAddr;

use axum::extract::connect_info::{ConnectInfo, MockConnectInfo};
use axum::http::{header, uri::Scheme, HeaderValue, Method, Request, Uri};

use crate::auth::headers::{HeaderSet, HOP_BY_HOP};

pub const X_FORWARDED_FOR: &str = "X-Forwarded-For";
pub const X_FORWARDED_METHOD: &str = "X-Forwarded-Method";
pub const X_FORWARDED_PROTO: &str = "X-Forwarded-Proto";
pub const X_FORWARDED_PORT: &str = "X-Forwarded-Port";
pub const X_FORWARDED_HOST: &str = "X-Forwarded-Host";
pub const X_FORWARDED_URI: &str = "X-Forwarded-Uri";

/// Headers the HTTP client derives itself from the auth URL and the empty
/// body. Copying them would misdirect or misframe the sub-request.
const TRANSPORT_MANAGED: [&str; 2] = ["Host", "Content-Length"];

/// Request extension marking a TLS-terminated inbound connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct TlsConnection;

/// Ground truth about the inbound request, independent of its headers.
#[derive(Debug, Clone, Default)]
pub struct ConnectionContext {
    pub remote_addr: Option<SocketAddr>,
    pub tls: bool,
    pub method: Option<Method>,
    pub host: Option<HeaderValue>,
    pub request_target: String,
}

impl ConnectionContext {
    pub fn from_request<B>(req: &Request<B>) -> Self {
        let remote_addr = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr)
            .or_else(|| {
                req.extensions()
                    .get::<MockConnectInfo<SocketAddr>>()
                    .map(|MockConnectInfo(addr)| *addr)
            });

        let tls = req.extensions().get::<TlsConnection>().is_some()
            || req.uri().scheme() == Some(&Scheme::HTTPS);

        // Absolute-form targets carry the authority; otherwise use Host.
        let host = req
            .uri()
            .authority()
            .and_then(|a| HeaderValue::from_str(a.as_str()).ok())
            .or_else(|| req.headers().get(header::HOST).cloned());

        Self {
            remote_addr,
            tls,
            method: Some(req.method().clone()),
            host,
            request_target: request_target(req.uri()),
        }
    }
}

/// Path and query of `uri`, as sent on an origin-form request line.
pub fn request_target(uri: &Uri) -> String {
    let path = uri.path();
    match uri.query() {
        Some(query) => format!("{path}?{query}"),
        None => path.to_string(),
    }
}

/// Build the header set for the auth sub-request.
pub fn build_auth_headers(
    inbound: &HeaderSet,
    ctx: &ConnectionContext,
    trust_forward_header: bool,
    allowed: &[String],
) -> HeaderSet {
    let mut copied = HeaderSet::new();
    copied.copy_from(inbound);
    copied.remove_all(&HOP_BY_HOP);
    copied.remove_all(&TRANSPORT_MANAGED);

    let mut out = copied.filter_allowed(allowed);

    if let Some(addr) = ctx.remote_addr {
        let client_ip = addr.ip().to_string();
        let prior = inbound.values(X_FORWARDED_FOR);
        let value = if trust_forward_header && !prior.is_empty() {
            join_values(prior, &client_ip)
        } else {
            HeaderValue::from_str(&client_ip).ok()
        };
        if let Some(value) = value {
            out.set(X_FORWARDED_FOR, value);
        }
    }

    let method = ctx
        .method
        .as_ref()
        .and_then(|m| HeaderValue::from_str(m.as_str()).ok());
    match (trusted(inbound, X_FORWARDED_METHOD, trust_forward_header), method) {
        (Some(value), _) => out.set(X_FORWARDED_METHOD, value.clone()),
        (None, Some(method)) => out.set(X_FORWARDED_METHOD, method),
        (None, None) => {
            out.remove(X_FORWARDED_METHOD);
        }
    }

    match trusted(inbound, X_FORWARDED_PROTO, trust_forward_header) {
        Some(value) => out.set(X_FORWARDED_PROTO, value.clone()),
        None if ctx.tls => out.set(X_FORWARDED_PROTO, HeaderValue::from_static("https")),
        None => out.set(X_FORWARDED_PROTO, HeaderValue::from_static("http")),
    }

    // Never inferred.
    if let Some(value) = trusted(inbound, X_FORWARDED_PORT, trust_forward_header) {
        out.set(X_FORWARDED_PORT, value.clone());
    }

    match (trusted(inbound, X_FORWARDED_HOST, trust_forward_header), &ctx.host) {
        (Some(value), _) => out.set(X_FORWARDED_HOST, value.clone()),
        (None, Some(host)) if !host.is_empty() => out.set(X_FORWARDED_HOST, host.clone()),
        (None, _) => {
            out.remove(X_FORWARDED_HOST);
        }
    }

    let target = HeaderValue::from_str(&ctx.request_target)
        .ok()
        .filter(|v| !v.is_empty());
    match (trusted(inbound, X_FORWARDED_URI, trust_forward_header), target) {
        (Some(value), _) => out.set(X_FORWARDED_URI, value.clone()),
        (None, Some(target)) => out.set(X_FORWARDED_URI, target),
        (None, None) => {
            out.remove(X_FORWARDED_URI);
        }
    }

    out
}

/// First inbound value of `name`, only when trusted and non-empty.
fn trusted<'a>(inbound: &'a HeaderSet, name: &str, trust: bool) -> Option<&'a HeaderValue> {
    if !trust {
        return None;
    }
    inbound.get(name).filter(|v| !v.is_empty())
}

fn join_values(prior: &[HeaderValue], last: &str) -> Option<HeaderValue> {
    let mut buf = Vec::new();
    for value in prior {
        buf.extend_from_slice(value.as_bytes());
        buf.extend_from_slice(b", ");
    }
    buf.extend_from_slice(last.as_bytes());
    HeaderValue::from_bytes(&buf).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn hv(s: &'static str) -> HeaderValue {
        HeaderValue::from_static(s)
    }

    fn ctx(remote: &str) -> ConnectionContext {
        ConnectionContext {
            remote_addr: Some(remote.parse().unwrap()),
            tls: false,
            method: Some(Method::GET),
            host: Some(hv("app.example")),
            request_target: "/dashboard?tab=1".to_string(),
        }
    }

    fn inbound(pairs: &[(&str, &'static str)]) -> HeaderSet {
        let mut set = HeaderSet::new();
        for (name, value) in pairs {
            set.append(name, hv(value));
        }
        set
    }

    #[test]
    fn strips_hop_by_hop_but_keeps_proxy_authorization() {
        let headers = inbound(&[
            ("Connection", "keep-alive"),
            ("Keep-Alive", "timeout=5"),
            ("TE", "trailers"),
            ("Trailers", "X-Sum"),
            ("Transfer-Encoding", "chunked"),
            ("Upgrade", "websocket"),
            ("Proxy-Authorization", "Basic Zm9vOmJhcg=="),
            ("Cookie", "session=abc"),
        ]);

        let out = build_auth_headers(&headers, &ctx("10.0.0.1:5000"), false, &[]);
        for name in HOP_BY_HOP {
            assert!(!out.contains(name), "{name} should be stripped");
        }
        assert_eq!(out.get("Proxy-Authorization"), Some(&hv("Basic Zm9vOmJhcg==")));
        assert_eq!(out.get("Cookie"), Some(&hv("session=abc")));
    }

    #[test]
    fn host_and_content_length_are_not_copied() {
        let headers = inbound(&[("Host", "app.example"), ("Content-Length", "42")]);
        let out = build_auth_headers(&headers, &ctx("10.0.0.1:5000"), false, &[]);
        assert!(!out.contains("Host"));
        assert!(!out.contains("Content-Length"));
    }

    #[test]
    fn untrusted_headers_are_recomputed() {
        let headers = inbound(&[
            ("X-Forwarded-For", "1.2.3.4"),
            ("X-Forwarded-Method", "DELETE"),
            ("X-Forwarded-Proto", "https"),
            ("X-Forwarded-Host", "evil.example"),
            ("X-Forwarded-Uri", "/admin"),
        ]);

        let out = build_auth_headers(&headers, &ctx("9.9.9.9:4321"), false, &[]);
        assert_eq!(out.values(X_FORWARDED_FOR), &[hv("9.9.9.9")]);
        assert_eq!(out.get(X_FORWARDED_METHOD), Some(&hv("GET")));
        assert_eq!(out.get(X_FORWARDED_PROTO), Some(&hv("http")));
        assert_eq!(out.get(X_FORWARDED_HOST), Some(&hv("app.example")));
        assert_eq!(out.get(X_FORWARDED_URI), Some(&hv("/dashboard?tab=1")));
    }

    #[test]
    fn untrusted_proto_follows_tls_state() {
        let headers = inbound(&[("X-Forwarded-Proto", "http")]);
        let mut ctx = ctx("9.9.9.9:4321");
        ctx.tls = true;

        let out = build_auth_headers(&headers, &ctx, false, &[]);
        assert_eq!(out.get(X_FORWARDED_PROTO), Some(&hv("https")));
    }

    #[test]
    fn trusted_headers_pass_through() {
        let headers = inbound(&[
            ("X-Forwarded-Method", "POST"),
            ("X-Forwarded-Proto", "https"),
            ("X-Forwarded-Port", "8443"),
            ("X-Forwarded-Host", "public.example"),
            ("X-Forwarded-Uri", "/original?x=1"),
        ]);

        let out = build_auth_headers(&headers, &ctx("9.9.9.9:4321"), true, &[]);
        assert_eq!(out.get(X_FORWARDED_METHOD), Some(&hv("POST")));
        assert_eq!(out.get(X_FORWARDED_PROTO), Some(&hv("https")));
        assert_eq!(out.get(X_FORWARDED_PORT), Some(&hv("8443")));
        assert_eq!(out.get(X_FORWARDED_HOST), Some(&hv("public.example")));
        assert_eq!(out.get(X_FORWARDED_URI), Some(&hv("/original?x=1")));
    }

    #[test]
    fn trusted_forwarded_for_appends_client_ip() {
        let headers = inbound(&[("X-Forwarded-For", "1.2.3.4")]);
        let out = build_auth_headers(&headers, &ctx("9.9.9.9:4321"), true, &[]);
        assert_eq!(out.values(X_FORWARDED_FOR), &[hv("1.2.3.4, 9.9.9.9")]);
    }

    #[test]
    fn trusted_forwarded_for_joins_every_prior_value() {
        let headers = inbound(&[("X-Forwarded-For", "1.1.1.1"), ("X-Forwarded-For", "2.2.2.2")]);
        let out = build_auth_headers(&headers, &ctx("[::1]:80"), true, &[]);
        assert_eq!(out.values(X_FORWARDED_FOR), &[hv("1.1.1.1, 2.2.2.2, ::1")]);
    }

    #[test]
    fn unknown_remote_address_leaves_forwarded_for_alone() {
        let headers = inbound(&[("X-Forwarded-For", "1.2.3.4")]);
        let mut ctx = ctx("9.9.9.9:4321");
        ctx.remote_addr = None;

        let out = build_auth_headers(&headers, &ctx, false, &[]);
        assert_eq!(out.values(X_FORWARDED_FOR), &[hv("1.2.3.4")]);
    }

    #[test]
    fn allow_list_restricts_copied_headers_only() {
        let headers = inbound(&[
            ("Authorization", "Bearer t"),
            ("Cookie", "a=1"),
            ("X-Forwarded-Host", "public.example"),
        ]);
        let allowed = vec!["authorization".to_string()];

        let out = build_auth_headers(&headers, &ctx("9.9.9.9:4321"), true, &allowed);
        assert_eq!(out.get("Authorization"), Some(&hv("Bearer t")));
        assert!(!out.contains("Cookie"));
        // Forwarded context is set after filtering.
        assert_eq!(out.get(X_FORWARDED_HOST), Some(&hv("public.example")));
        assert_eq!(out.get(X_FORWARDED_PROTO), Some(&hv("http")));
    }

    #[test]
    fn missing_host_and_target_delete_headers() {
        let headers = inbound(&[("X-Forwarded-Host", "spoof"), ("X-Forwarded-Uri", "/spoof")]);
        let mut ctx = ctx("9.9.9.9:4321");
        ctx.host = None;
        ctx.request_target = String::new();

        let out = build_auth_headers(&headers, &ctx, false, &[]);
        assert!(!out.contains(X_FORWARDED_HOST));
        assert!(!out.contains(X_FORWARDED_URI));
    }

    #[test]
    fn context_from_request_reads_connection_facts() {
        let mut req = Request::builder()
            .method(Method::PUT)
            .uri("/items/7?full=true")
            .header("host", "shop.example:8080")
            .body(Body::empty())
            .unwrap();
        req.extensions_mut()
            .insert(ConnectInfo::<SocketAddr>("192.168.1.20:55000".parse().unwrap()));
        req.extensions_mut().insert(TlsConnection);

        let ctx = ConnectionContext::from_request(&req);
        assert_eq!(ctx.remote_addr.map(|a| a.ip().to_string()), Some("192.168.1.20".to_string()));
        assert!(ctx.tls);
        assert_eq!(ctx.method, Some(Method::PUT));
        assert_eq!(ctx.host, Some(hv("shop.example:8080")));
        assert_eq!(ctx.request_target, "/items/7?full=true");
    }

    #[test]
    fn absolute_form_uses_uri_authority() {
        let req = Request::builder()
            .uri("https://api.example/v1")
            .header("host", "other.example")
            .body(Body::empty())
            .unwrap();

        let ctx = ConnectionContext::from_request(&req);
        assert!(ctx.tls);
        assert_eq!(ctx.host, Some(hv("api.example")));
        assert_eq!(ctx.request_target, "/v1");
    }
}
