//! Set of server endpoints that passed validation

use std::collections::HashSet;
use std::sync::{PoisonError, RwLock};

/// Normalize an endpoint for use as a cache key: trailing slash enforced
pub fn normalize_endpoint(endpoint: &str) -> String {
    let trimmed = endpoint.trim();
    if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{}/", trimmed)
    }
}

/// Append-only set of validated endpoints, keyed by normalized form
#[derive(Debug, Default)]
pub struct ValidationCache {
    validated: RwLock<HashSet<String>>,
}

impl ValidationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an endpoint. Returns `false` if it was already present.
    pub fn insert(&self, endpoint: &str) -> bool {
        self.validated
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(normalize_endpoint(endpoint))
    }

    pub fn contains(&self, endpoint: &str) -> bool {
        self.validated
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&normalize_endpoint(endpoint))
    }

    pub fn len(&self) -> usize {
        self.validated
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.validated
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Validated endpoints, sorted
    pub fn endpoints(&self) -> Vec<String> {
        let mut endpoints: Vec<String> = self
            .validated
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect();
        endpoints.sort();
        endpoints
    }
}
