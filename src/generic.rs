//! Untyped client

use crate::codec::ResultShape;
use crate::dispatch::ClientContext;
use crate::error::{ClientError, Result};
use crate::interceptor::{send_intercepted, ClientInterceptor};
use crate::transport::WireRequest;
use crate::validation::METADATA_PATH;
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;

/// Client usable without a declared interface
///
/// Requests go through the same transport pool and validation gate as typed
/// clients.
pub struct GenericClient {
    endpoint: String,
    context: Arc<ClientContext>,
    interceptors: Vec<Arc<dyn ClientInterceptor>>,
}

impl GenericClient {
    pub(crate) fn new(endpoint: String, context: Arc<ClientContext>) -> Self {
        Self {
            endpoint,
            context,
            interceptors: Vec::new(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn register_interceptor(&mut self, interceptor: Arc<dyn ClientInterceptor>) {
        self.interceptors.push(interceptor);
    }

    /// Fetch the server's capability statement.
    ///
    /// The statement is what validation itself reads, so this call skips the
    /// validation gate.
    pub async fn fetch_capabilities(&self) -> Result<Value> {
        let transport = self.context.transports.transport_for(&self.endpoint)?;
        let request = WireRequest::get(METADATA_PATH)
            .with_header("Accept", self.context.codec.content_type());
        let response = send_intercepted(transport.as_ref(), &self.interceptors, request).await?;
        self.context.codec.decode(&response.body, &ResultShape::Json)
    }

    /// Read one resource by type and id
    pub async fn read(&self, resource_type: &str, id: &str) -> Result<Value> {
        if resource_type.trim().is_empty() || id.trim().is_empty() {
            return Err(ClientError::InvalidArguments(
                "Resource type and id must not be empty".to_string(),
            ));
        }

        let request = WireRequest::new(
            Method::GET,
            vec![resource_type.to_string(), id.to_string()],
        )
        .with_header("Accept", self.context.codec.content_type());

        self.execute(request, &ResultShape::resource(resource_type))
            .await
    }

    /// Send an arbitrary request and decode the response into `shape`
    pub async fn execute(&self, request: WireRequest, shape: &ResultShape) -> Result<Value> {
        self.context
            .exchange_and_decode(&self.endpoint, &self.interceptors, request, shape)
            .await
    }
}
