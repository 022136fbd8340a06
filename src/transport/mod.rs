//! Transport abstraction
//!
//! The binding engine never talks to the network directly. It hands a
//! [`WireRequest`] to a [`Transport`] handle and gets a [`WireResponse`] back.
//! Handles are produced by a [`TransportFactory`] from an endpoint and the
//! current [`TransportConfig`], and cached by [`TransportPool`] until the
//! configuration changes.

mod config;
mod http;
mod pool;

pub use config::{TransportConfig, TransportOptions};
pub use http::{HttpTransport, HttpTransportFactory};
pub use pool::TransportPool;

use crate::error::Result;
use async_trait::async_trait;
use reqwest::Method;
use std::sync::Arc;

/// Transport-level request, relative to the endpoint a transport is bound to.
#[derive(Debug, Clone)]
pub struct WireRequest {
    pub method: Method,
    /// Unencoded path segments below the endpoint base.
    pub path_segments: Vec<String>,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl WireRequest {
    pub fn new(method: Method, path_segments: Vec<String>) -> Self {
        Self {
            method,
            path_segments,
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// GET request for a `/`-separated relative path.
    pub fn get(path: &str) -> Self {
        Self::new(Method::GET, split_path(path))
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    /// Relative path as sent, segments joined with `/`.
    pub fn path(&self) -> String {
        self.path_segments.join("/")
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Set a header, replacing any existing value with the same name.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.into()));
    }
}

/// Transport-level response.
#[derive(Debug, Clone)]
pub struct WireResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl WireResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

fn split_path(path: &str) -> Vec<String> {
    path.trim_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// A handle able to exchange requests with one endpoint.
///
/// Implementations must report failures to reach the server as
/// [`crate::ClientError::Connection`]. Non-success HTTP statuses are not
/// failures at this layer; they come back as a normal [`WireResponse`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Endpoint base this handle was built for.
    fn endpoint(&self) -> &str;

    /// Perform exactly one request/response exchange.
    async fn send(&self, request: WireRequest) -> Result<WireResponse>;
}

/// Builds transport handles. Called again whenever the configuration changes.
pub trait TransportFactory: Send + Sync {
    fn build(&self, endpoint: &str, config: &TransportConfig) -> Result<Arc<dyn Transport>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_splits_path() {
        let req = WireRequest::get("/Patient/123/");
        assert_eq!(req.method, Method::GET);
        assert_eq!(req.path_segments, vec!["Patient", "123"]);
        assert_eq!(req.path(), "Patient/123");
    }

    #[test]
    fn test_set_header_replaces_case_insensitively() {
        let mut req = WireRequest::get("metadata").with_header("Accept", "text/plain");
        req.set_header("accept", "application/json");

        assert_eq!(req.headers.len(), 1);
        assert_eq!(req.header("ACCEPT"), Some("application/json"));
    }

    #[test]
    fn test_response_success_range() {
        assert!(WireResponse::new(200, "").is_success());
        assert!(WireResponse::new(204, "").is_success());
        assert!(!WireResponse::new(302, "").is_success());
        assert!(!WireResponse::new(404, "").is_success());
    }
}
