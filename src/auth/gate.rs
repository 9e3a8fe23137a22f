//! Header-pattern gate deciding whether the auth check runs.
//!
//! # Design Decisions
//! - Patterns compiled once at construction; first invalid pattern fails it
//! - Matching is substring search (`Regex::is_match`), not full-match
//! - All entries must match (AND); evaluation stops at the first miss

use std::collections::BTreeMap;

use regex::Regex;

use crate::auth::error::ForwardAuthError;
use crate::auth::headers::HeaderSet;

/// Compiled `run_if_headers_regex` predicate.
#[derive(Debug, Clone, Default)]
pub struct Gate {
    rules: Vec<(String, Regex)>,
}

impl Gate {
    /// Compile every pattern, failing on the first invalid one.
    pub fn compile(patterns: &BTreeMap<String, String>) -> Result<Self, ForwardAuthError> {
        let mut rules = Vec::with_capacity(patterns.len());
        for (header, pattern) in patterns {
            let regex = Regex::new(pattern).map_err(|source| ForwardAuthError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })?;
            rules.push((header.clone(), regex));
        }
        Ok(Self { rules })
    }

    /// True when no gating is configured.
    pub fn is_open(&self) -> bool {
        self.rules.is_empty()
    }

    /// Returns true if the auth check should run for these request headers.
    pub fn should_run(&self, headers: &HeaderSet) -> bool {
        if self.rules.is_empty() {
            return true;
        }

        for (header, regex) in &self.rules {
            let value = headers
                .get(header)
                .map(|v| String::from_utf8_lossy(v.as_bytes()))
                .unwrap_or_default();

            tracing::trace!(header = %header, value = %value, pattern = %regex, "Evaluating gate rule");

            if value.is_empty() || !regex.is_match(&value) {
                tracing::debug!(header = %header, pattern = %regex, "Gate rule did not match, skipping auth check");
                return false;
            }
        }

        true
    }
}
