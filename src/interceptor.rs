//! Client interceptors
//!
//! Interceptors see every request a client sends, including the capability
//! fetch performed while validating the server on that client's behalf.
//!
//! # Authentication
//!
//! ```no_run
//! use fhir_rest_client::interceptor::BearerTokenInterceptor;
//! use std::sync::Arc;
//!
//! # fn demo(mut client: fhir_rest_client::GenericClient) {
//! client.register_interceptor(Arc::new(BearerTokenInterceptor::new("sk-...")));
//! # }
//! ```

use crate::error::{ClientError, Result};
use crate::transport::{Transport, WireRequest, WireResponse};
use base64::{engine::general_purpose, Engine as _};
use std::sync::Arc;

pub trait ClientInterceptor: Send + Sync {
    /// Called before the request is handed to the transport
    fn intercept_request(&self, _request: &mut WireRequest) {}

    /// Called with the raw response. Returning an error fails the call.
    fn intercept_response(&self, _response: &WireResponse) -> Result<()> {
        Ok(())
    }
}

/// Adds `Authorization: Bearer <token>`
pub struct BearerTokenInterceptor {
    token: String,
}

impl BearerTokenInterceptor {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl ClientInterceptor for BearerTokenInterceptor {
    fn intercept_request(&self, request: &mut WireRequest) {
        request.set_header("Authorization", format!("Bearer {}", self.token));
    }
}

/// Adds `Authorization: Basic <base64(username:password)>`
pub struct BasicAuthInterceptor {
    username: String,
    password: String,
}

impl BasicAuthInterceptor {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl ClientInterceptor for BasicAuthInterceptor {
    fn intercept_request(&self, request: &mut WireRequest) {
        let credentials = format!("{}:{}", self.username, self.password);
        let encoded = general_purpose::STANDARD.encode(credentials.as_bytes());
        request.set_header("Authorization", format!("Basic {}", encoded));
    }
}

/// Run interceptors around exactly one transport exchange and turn non-success
/// statuses into [`ClientError::Server`].
pub(crate) async fn send_intercepted(
    transport: &dyn Transport,
    interceptors: &[Arc<dyn ClientInterceptor>],
    mut request: WireRequest,
) -> Result<WireResponse> {
    for interceptor in interceptors {
        interceptor.intercept_request(&mut request);
    }

    let response = transport.send(request).await?;

    for interceptor in interceptors {
        interceptor.intercept_response(&response)?;
    }

    if !response.is_success() {
        return Err(ClientError::Server {
            status: response.status,
            body: response.body_text(),
        });
    }

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_interceptor() {
        let mut request = WireRequest::get("metadata");
        BearerTokenInterceptor::new("test-token-12345").intercept_request(&mut request);
        assert_eq!(
            request.header("authorization"),
            Some("Bearer test-token-12345")
        );
    }

    #[test]
    fn test_basic_interceptor() {
        let mut request = WireRequest::get("metadata");
        BasicAuthInterceptor::new("user", "pass").intercept_request(&mut request);
        // base64("user:pass")
        assert_eq!(request.header("Authorization"), Some("Basic dXNlcjpwYXNz"));
    }

    #[test]
    fn test_later_interceptor_wins() {
        let mut request = WireRequest::get("metadata");
        BasicAuthInterceptor::new("user", "pass").intercept_request(&mut request);
        BearerTokenInterceptor::new("t").intercept_request(&mut request);
        assert_eq!(request.headers.len(), 1);
        assert_eq!(request.header("Authorization"), Some("Bearer t"));
    }
}
