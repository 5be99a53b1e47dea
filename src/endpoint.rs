//! Endpoint set: normalisation, deduplication and round-robin cursor (C1).

use crate::error::ClientError;

/// Something that can be turned into a candidate endpoint list.
///
/// Accepts a single endpoint (`&str`/`String`) or a list of them, mirroring the
/// client constructor's "string or sequence" input.
pub trait IntoEndpoints {
    fn into_endpoints(self) -> Vec<String>;
}

impl IntoEndpoints for &str {
    fn into_endpoints(self) -> Vec<String> {
        vec![self.to_string()]
    }
}

impl IntoEndpoints for String {
    fn into_endpoints(self) -> Vec<String> {
        vec![self]
    }
}

impl IntoEndpoints for Vec<String> {
    fn into_endpoints(self) -> Vec<String> {
        self
    }
}

impl IntoEndpoints for Vec<&str> {
    fn into_endpoints(self) -> Vec<String> {
        self.into_iter().map(|s| s.to_string()).collect()
    }
}

/// An ordered, deduplicated set of candidate WebSocket endpoints with a round-robin
/// cursor. Invariant: the cursor always indexes a valid endpoint.
#[derive(Debug, Clone)]
pub struct EndpointSet {
    endpoints: Vec<String>,
    cursor: usize,
}

impl EndpointSet {
    /// Normalise (trim, dedupe, scheme-filter) the given endpoints and build a set.
    ///
    /// Fails with [`ClientError::Config`] if no valid `ws://`/`wss://` endpoint remains.
    pub fn new<E: IntoEndpoints>(endpoints: E) -> Result<Self, ClientError> {
        let mut seen = Vec::new();
        for raw in endpoints.into_endpoints() {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                continue;
            }
            if !Self::is_valid_scheme(trimmed) {
                continue;
            }
            if !seen.iter().any(|e: &String| e == trimmed) {
                seen.push(trimmed.to_string());
            }
        }

        if seen.is_empty() {
            return Err(ClientError::Config(
                "No valid WebSocket endpoint(s) specified".to_string(),
            ));
        }

        Ok(Self {
            endpoints: seen,
            cursor: 0,
        })
    }

    fn is_valid_scheme(endpoint: &str) -> bool {
        endpoint.starts_with("ws://") || endpoint.starts_with("wss://")
    }

    /// Number of distinct endpoints in the set.
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// The endpoint the cursor currently points at.
    pub fn current(&self) -> &str {
        &self.endpoints[self.cursor]
    }

    /// Advance the cursor to the next endpoint, wrapping around.
    ///
    /// Returns `true` if the cursor wrapped back to the first endpoint (a "round").
    pub fn advance(&mut self) -> bool {
        if self.endpoints.len() <= 1 {
            return false;
        }
        self.cursor += 1;
        if self.cursor >= self.endpoints.len() {
            self.cursor = 0;
            true
        } else {
            false
        }
    }
}
