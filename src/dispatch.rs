//! Call dispatch for typed clients

use crate::binding::{Arguments, BindingTable};
use crate::codec::{Codec, ResultShape};
use crate::error::{ClientError, Result};
use crate::interceptor::{send_intercepted, ClientInterceptor};
use crate::transport::{TransportPool, WireRequest, WireResponse};
use crate::validation::CompatibilityValidator;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// State a factory shares with every client it creates
pub(crate) struct ClientContext {
    pub(crate) transports: TransportPool,
    pub(crate) validator: CompatibilityValidator,
    pub(crate) codec: Arc<dyn Codec>,
}

impl ClientContext {
    /// Validation gate followed by exactly one exchange with the server.
    ///
    /// The transport handle is looked up per call, so a configuration change
    /// on the factory takes effect for the next call of every client.
    pub(crate) async fn exchange(
        &self,
        endpoint: &str,
        interceptors: &[Arc<dyn ClientInterceptor>],
        request: WireRequest,
    ) -> Result<WireResponse> {
        let transport = self.transports.transport_for(endpoint)?;
        self.validator
            .validate_if_configured(endpoint, transport.as_ref(), interceptors, self.codec.as_ref())
            .await?;
        send_intercepted(transport.as_ref(), interceptors, request).await
    }

    pub(crate) async fn exchange_and_decode(
        &self,
        endpoint: &str,
        interceptors: &[Arc<dyn ClientInterceptor>],
        request: WireRequest,
        shape: &ResultShape,
    ) -> Result<Value> {
        let response = self.exchange(endpoint, interceptors, request).await?;
        self.codec.decode(&response.body, shape)
    }
}

/// Routes calls on one typed client through its interface's binding table
pub struct ClientDispatcher {
    table: Arc<BindingTable>,
    endpoint: String,
    context: Arc<ClientContext>,
    interceptors: Vec<Arc<dyn ClientInterceptor>>,
}

impl ClientDispatcher {
    pub(crate) fn new(table: Arc<BindingTable>, endpoint: String, context: Arc<ClientContext>) -> Self {
        Self {
            table,
            endpoint,
            context,
            interceptors: Vec::new(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn table(&self) -> &Arc<BindingTable> {
        &self.table
    }

    pub fn register_interceptor(&mut self, interceptor: Arc<dyn ClientInterceptor>) {
        self.interceptors.push(interceptor);
    }

    pub fn interceptors(&self) -> &[Arc<dyn ClientInterceptor>] {
        &self.interceptors
    }

    /// Invoke a declared operation
    ///
    /// Fails with [`ClientError::Configuration`] before touching the network
    /// if `operation` is not part of this client's interface.
    pub async fn invoke(&self, operation: &str, args: Arguments) -> Result<Value> {
        let binding = self.table.get(operation).ok_or_else(|| {
            ClientError::Configuration(format!(
                "Operation '{}' is not declared by interface {}",
                operation,
                self.table.interface_name()
            ))
        })?;

        let request = binding.build_request(&args, self.context.codec.as_ref())?;
        debug!(
            "Dispatching {}.{} as {} {}",
            self.table.interface_name(),
            operation,
            request.method,
            request.path()
        );

        self.context
            .exchange_and_decode(
                &self.endpoint,
                &self.interceptors,
                request,
                binding.result_shape(),
            )
            .await
    }
}
