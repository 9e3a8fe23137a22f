//! Multi-valued, case-insensitive header collection.
//!
//! # Responsibilities
//! - Canonicalize header names (`x-auth-role` → `X-Auth-Role`)
//! - Copy, remove and allow-list filter over whole header sets
//! - Convert to and from `http::HeaderMap` at the edges
//!
//! # Design Decisions
//! - Names are stored canonicalized so regex matching sees the same spelling
//!   regardless of how the peer cased them on the wire
//! - Entry order is insertion order; value order per name is preserved
//! - Values stay as `HeaderValue` so non-UTF-8 bytes survive a round trip

use axum::http::{HeaderMap, HeaderName, HeaderValue};

/// Hop-by-hop headers stripped from the auth sub-request and from relayed
/// failure responses.
///
/// `Proxy-Authorization` is deliberately absent: it is meant for the auth
/// endpoint (RFC 7235 §4.4).
pub const HOP_BY_HOP: [&str; 6] = [
    "Connection",
    "Keep-Alive",
    "Te",
    "Trailers",
    "Transfer-Encoding",
    "Upgrade",
];

/// Returns the canonical form of a header name.
///
/// The first letter and every letter following a hyphen are upper-cased, the
/// rest lower-cased. Names containing bytes outside the HTTP token set are
/// returned unchanged.
pub fn canonical_key(name: &str) -> String {
    if !name.bytes().all(is_token_byte) {
        return name.to_string();
    }

    let mut upper = true;
    name.chars()
        .map(|c| {
            let out = if upper {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            };
            upper = c == '-';
            out
        })
        .collect()
}

fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct HeaderEntry {
    name: String,
    values: Vec<HeaderValue>,
}

/// Ordered list of values per canonicalized header name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderSet {
    entries: Vec<HeaderEntry>,
}

impl HeaderSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from an `http::HeaderMap`, keeping every value.
    pub fn from_header_map(map: &HeaderMap) -> Self {
        let mut set = Self::new();
        for (name, value) in map {
            set.append(name.as_str(), value.clone());
        }
        set
    }

    /// Convert back into an `http::HeaderMap`.
    pub fn to_header_map(&self) -> HeaderMap {
        let mut map = HeaderMap::with_capacity(self.entries.len());
        for entry in &self.entries {
            let name = match HeaderName::from_bytes(entry.name.as_bytes()) {
                Ok(name) => name,
                Err(_) => {
                    tracing::warn!(header = %entry.name, "Dropping header with invalid name");
                    continue;
                }
            };
            for value in &entry.values {
                map.append(name.clone(), value.clone());
            }
        }
        map
    }

    fn position(&self, name: &str) -> Option<usize> {
        let key = canonical_key(name);
        self.entries.iter().position(|e| e.name == key)
    }

    /// First value for `name`, if any.
    pub fn get(&self, name: &str) -> Option<&HeaderValue> {
        self.values(name).first()
    }

    /// All values for `name` in arrival order. Empty when absent.
    pub fn values(&self, name: &str) -> &[HeaderValue] {
        match self.position(name) {
            Some(i) => &self.entries[i].values,
            None => &[],
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Replace all values for `name` with a single value.
    pub fn set(&mut self, name: &str, value: HeaderValue) {
        self.set_values(name, vec![value]);
    }

    /// Replace all values for `name`. An empty list removes the header.
    pub fn set_values(&mut self, name: &str, values: Vec<HeaderValue>) {
        if values.is_empty() {
            self.remove(name);
            return;
        }
        match self.position(name) {
            Some(i) => self.entries[i].values = values,
            None => self.entries.push(HeaderEntry {
                name: canonical_key(name),
                values,
            }),
        }
    }

    /// Add a value after any existing values for `name`.
    pub fn append(&mut self, name: &str, value: HeaderValue) {
        match self.position(name) {
            Some(i) => self.entries[i].values.push(value),
            None => self.entries.push(HeaderEntry {
                name: canonical_key(name),
                values: vec![value],
            }),
        }
    }

    /// Delete `name` outright, returning its values.
    pub fn remove(&mut self, name: &str) -> Option<Vec<HeaderValue>> {
        let i = self.position(name)?;
        Some(self.entries.remove(i).values)
    }

    /// Delete every listed name.
    pub fn remove_all(&mut self, names: &[&str]) {
        for name in names {
            self.remove(name);
        }
    }

    /// Append every value of `src` onto this set.
    pub fn copy_from(&mut self, src: &HeaderSet) {
        for entry in &src.entries {
            match self.entries.iter().position(|e| e.name == entry.name) {
                Some(i) => self.entries[i].values.extend(entry.values.iter().cloned()),
                None => self.entries.push(entry.clone()),
            }
        }
    }

    /// Keep only the listed names, each with its full value list.
    ///
    /// An empty allow-list keeps everything.
    pub fn filter_allowed(&self, allowed: &[String]) -> HeaderSet {
        if allowed.is_empty() {
            return self.clone();
        }

        let mut filtered = HeaderSet::new();
        for name in allowed {
            let values = self.values(name);
            if !values.is_empty() {
                filtered.set_values(name, values.to_vec());
            }
        }
        filtered
    }

    /// Keep only headers whose canonical name satisfies `keep`.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.entries.retain(|e| keep(&e.name));
    }

    /// Delete every header named in `Connection`, then `Connection` itself.
    ///
    /// A protocol upgrade survives: when `Connection` lists `upgrade` and an
    /// `Upgrade` value is present, the result is `Connection: Upgrade` plus
    /// that value.
    pub fn strip_connection_scoped(&mut self) {
        let tokens: Vec<String> = self
            .values("Connection")
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();

        let upgrade = if tokens.iter().any(|t| t.eq_ignore_ascii_case("upgrade")) {
            self.get("Upgrade").filter(|v| !v.is_empty()).cloned()
        } else {
            None
        };

        for token in &tokens {
            self.remove(token);
        }

        match upgrade {
            Some(value) => {
                self.set("Connection", HeaderValue::from_static("Upgrade"));
                self.set("Upgrade", value);
            }
            None => {
                self.remove("Connection");
            }
        }
    }

    /// Canonical names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[HeaderValue])> {
        self.entries.iter().map(|e| (e.name.as_str(), e.values.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<&HeaderMap> for HeaderSet {
    fn from(map: &HeaderMap) -> Self {
        Self::from_header_map(map)
    }
}
