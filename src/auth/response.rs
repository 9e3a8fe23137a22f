//! Handling of the auth endpoint's response.
//!
//! # Data Flow
//! ```text
//! AuthResponse (fully buffered)
//!     → status outside [200, 300): relay_failure → client response (terminal)
//!     → status in [200, 300):      merge_success → original request → downstream
//! ```

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderValue, Request, Response, StatusCode};
use regex::Regex;
use url::Url;

use crate::auth::error::AuthError;
use crate::auth::headers::{HeaderSet, HOP_BY_HOP};

/// The auth endpoint's answer: status, headers and the whole body.
#[derive(Debug, Clone)]
pub struct AuthResponse {
    pub status: StatusCode,
    pub headers: HeaderSet,
    pub body: Bytes,
}

impl AuthResponse {
    /// Status in [200, 300).
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// The `Location` header resolved against the auth URL.
    ///
    /// `Ok(None)` when no location was sent.
    pub fn location(&self, auth_url: &Url) -> Result<Option<Url>, AuthError> {
        let raw = match self.headers.get("Location") {
            Some(value) if !value.is_empty() => value,
            _ => return Ok(None),
        };

        let raw = raw.to_str().map_err(|e| AuthError::Location {
            address: auth_url.to_string(),
            reason: e.to_string(),
        })?;

        auth_url
            .join(raw)
            .map(Some)
            .map_err(|e| AuthError::Location {
                address: auth_url.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Turn a rejecting auth response into the client response.
pub fn relay_failure(auth: AuthResponse, auth_url: &Url) -> Result<Response<Body>, AuthError> {
    let location = auth.location(auth_url)?;

    let mut headers = auth.headers;
    headers.remove_all(&HOP_BY_HOP);

    if let Some(location) = location {
        if !location.as_str().is_empty() {
            if let Ok(value) = HeaderValue::from_str(location.as_str()) {
                headers.set("Location", value);
            }
        }
    }

    let mut response = Response::new(Body::from(auth.body));
    *response.status_mut() = auth.status;
    *response.headers_mut() = headers.to_header_map();
    Ok(response)
}

/// Overwrite request headers with values from a successful auth response.
///
/// The exact-name list runs first; the regex pass runs after it, so the regex
/// wins for every name it matches.
pub fn merge_success(
    request: &mut HeaderSet,
    auth: &HeaderSet,
    names: &[String],
    regex: Option<&Regex>,
) {
    for name in names {
        request.remove(name);
        let values = auth.values(name);
        if !values.is_empty() {
            request.set_values(name, values.to_vec());
        }
    }

    if let Some(regex) = regex {
        request.retain(|name| !regex.is_match(name));
        for (name, values) in auth.iter() {
            if regex.is_match(name) {
                request.set_values(name, values.to_vec());
            }
        }
    }
}

/// Apply [`merge_success`] to the inbound request in place.
///
/// `Host` identifies the inbound connection and `Content-Length` frames its
/// body; both survive the merge untouched.
pub fn apply_success<B>(
    req: &mut Request<B>,
    auth: &HeaderSet,
    names: &[String],
    regex: Option<&Regex>,
) {
    let host = req.headers_mut().remove(header::HOST);
    let content_length = req.headers_mut().remove(header::CONTENT_LENGTH);

    let mut headers = HeaderSet::from_header_map(req.headers());
    merge_success(&mut headers, auth, names, regex);
    headers.remove_all(&["Host", "Content-Length"]);

    let mut map = headers.to_header_map();
    if let Some(host) = host {
        map.insert(header::HOST, host);
    }
    if let Some(content_length) = content_length {
        map.insert(header::CONTENT_LENGTH, content_length);
    }
    *req.headers_mut() = map;
}
