//! Client factory

use crate::binding::{BindingTable, BindingTableCache, RestfulClient};
use crate::codec::{Codec, JsonCodec};
use crate::config::FactoryConfig;
use crate::dispatch::{ClientContext, ClientDispatcher};
use crate::error::{ClientError, Result};
use crate::generic::GenericClient;
use crate::interceptor::ClientInterceptor;
use crate::transport::{
    HttpTransportFactory, TransportConfig, TransportFactory, TransportPool,
};
use crate::validation::{
    normalize_endpoint, CompatibilityValidator, ValidationMode, ValidationState,
};
use crate::version::{ProtocolVersion, VersionTag};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Entry point for creating clients.
///
/// A factory is bound to one local protocol version for its whole life. It
/// owns the binding tables of every client interface it has seen, the set of
/// validated servers and the transport configuration. It is `Send + Sync` and
/// meant to be shared, e.g. behind an `Arc`.
pub struct ClientFactory {
    tables: BindingTableCache,
    context: Arc<ClientContext>,
}

/// Builder for [`ClientFactory`]
pub struct ClientFactoryBuilder {
    version: ProtocolVersion,
    transport_factory: Arc<dyn TransportFactory>,
    codec: Arc<dyn Codec>,
    transport_config: TransportConfig,
    validation_mode: ValidationMode,
}

impl ClientFactoryBuilder {
    pub fn transport_factory(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.transport_factory = factory;
        self
    }

    pub fn codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn transport_config(mut self, config: TransportConfig) -> Self {
        self.transport_config = config;
        self
    }

    pub fn validation_mode(mut self, mode: ValidationMode) -> Self {
        self.validation_mode = mode;
        self
    }

    /// Apply a loaded configuration file on top of the builder's settings
    pub fn config(mut self, config: &FactoryConfig) -> Result<Self> {
        self.transport_config.apply(&config.transport_options());
        if let Some(mode) = config.validation_mode()? {
            self.validation_mode = mode;
        }
        Ok(self)
    }

    pub fn build(self) -> ClientFactory {
        ClientFactory {
            tables: BindingTableCache::new(),
            context: Arc::new(ClientContext {
                transports: TransportPool::new(self.transport_factory, self.transport_config),
                validator: CompatibilityValidator::new(self.version, self.validation_mode),
                codec: self.codec,
            }),
        }
    }
}

impl ClientFactory {
    /// Factory with the HTTP transport, JSON codec and default settings
    pub fn new(version: ProtocolVersion) -> Self {
        Self::builder(version).build()
    }

    pub fn builder(version: ProtocolVersion) -> ClientFactoryBuilder {
        ClientFactoryBuilder {
            version,
            transport_factory: Arc::new(HttpTransportFactory),
            codec: Arc::new(JsonCodec),
            transport_config: TransportConfig::default(),
            validation_mode: ValidationMode::default(),
        }
    }

    pub fn protocol_version(&self) -> ProtocolVersion {
        self.context.validator.local_version()
    }

    /// Create a typed client for `endpoint`
    ///
    /// The binding table for `C` is built on first use and shared by every
    /// later client of the same type. Server validation, if configured, runs
    /// before the client's first call.
    pub fn new_client<C: RestfulClient>(&self, endpoint: &str) -> Result<C> {
        let table = self.tables.get_or_build::<C>()?;
        let endpoint = self.checked_endpoint(endpoint)?;
        debug!(
            "Creating {} client for {}",
            table.interface_name(),
            endpoint
        );
        Ok(C::from_dispatcher(ClientDispatcher::new(
            table,
            endpoint,
            self.context.clone(),
        )))
    }

    /// Create an untyped client for `endpoint`
    pub fn new_generic_client(&self, endpoint: &str) -> Result<GenericClient> {
        let endpoint = self.checked_endpoint(endpoint)?;
        Ok(GenericClient::new(endpoint, self.context.clone()))
    }

    /// The binding table for `C`, building it if needed
    pub fn binding_table<C: RestfulClient>(&self) -> Result<Arc<BindingTable>> {
        self.tables.get_or_build::<C>()
    }

    /// Number of distinct interfaces bound so far
    pub fn binding_table_count(&self) -> usize {
        self.tables.len()
    }

    fn checked_endpoint(&self, endpoint: &str) -> Result<String> {
        let endpoint = endpoint.trim();
        if endpoint.is_empty() {
            return Err(ClientError::Configuration(
                "Server base URL must not be empty".to_string(),
            ));
        }
        // Surfaces malformed URLs at construction rather than on first call.
        self.context.transports.transport_for(endpoint)?;
        Ok(endpoint.to_string())
    }

    pub fn transport_config(&self) -> TransportConfig {
        self.context.transports.config()
    }

    pub fn connect_timeout(&self) -> Duration {
        self.transport_config().connect_timeout()
    }

    pub fn read_timeout(&self) -> Duration {
        self.transport_config().read_timeout()
    }

    pub fn request_timeout(&self) -> Duration {
        self.transport_config().request_timeout()
    }

    pub fn set_connect_timeout(&self, timeout: Duration) {
        let ms = duration_ms(timeout);
        self.context
            .transports
            .update(|c| c.connect_timeout_ms = ms);
    }

    pub fn set_read_timeout(&self, timeout: Duration) {
        let ms = duration_ms(timeout);
        self.context.transports.update(|c| c.read_timeout_ms = ms);
    }

    pub fn set_request_timeout(&self, timeout: Duration) {
        let ms = duration_ms(timeout);
        self.context
            .transports
            .update(|c| c.request_timeout_ms = ms);
    }

    /// Route requests through an HTTP proxy, or stop doing so with `None`
    pub fn set_proxy(&self, proxy_url: Option<&str>) {
        let proxy_url = proxy_url.map(ToString::to_string);
        self.context.transports.update(|c| c.proxy_url = proxy_url);
    }

    pub fn set_proxy_credentials(&self, username: &str, password: &str) {
        let (username, password) = (username.to_string(), password.to_string());
        self.context.transports.update(|c| {
            c.proxy_username = Some(username);
            c.proxy_password = Some(password);
        });
    }

    /// Apply a loaded configuration file
    ///
    /// The validation mode is checked before anything changes, so an invalid
    /// file leaves the factory untouched.
    pub fn apply_config(&self, config: &FactoryConfig) -> Result<()> {
        let mode = config.validation_mode()?;
        let options = config.transport_options();
        if !options.is_empty() {
            self.context.transports.update(|c| c.apply(&options));
        }
        if let Some(mode) = mode {
            self.set_validation_mode(mode);
        }
        Ok(())
    }

    pub fn validation_mode(&self) -> ValidationMode {
        self.context.validator.mode()
    }

    pub fn set_validation_mode(&self, mode: ValidationMode) {
        self.context.validator.set_mode(mode);
    }

    /// Set the validation mode by name; unknown names are rejected and the
    /// current mode is kept.
    pub fn set_validation_mode_str(&self, mode: &str) -> Result<()> {
        let mode = mode.parse::<ValidationMode>()?;
        self.set_validation_mode(mode);
        Ok(())
    }

    /// Validate `endpoint` now, whatever the configured mode
    pub async fn validate_server_base(
        &self,
        endpoint: &str,
        interceptors: &[Arc<dyn ClientInterceptor>],
    ) -> Result<VersionTag> {
        let transport = self.context.transports.transport_for(endpoint)?;
        self.context
            .validator
            .validate(
                endpoint,
                transport.as_ref(),
                interceptors,
                self.context.codec.as_ref(),
            )
            .await
    }

    /// Validate `endpoint` if the configured mode calls for it
    pub async fn validate_server_base_if_configured(
        &self,
        endpoint: &str,
        interceptors: &[Arc<dyn ClientInterceptor>],
    ) -> Result<()> {
        let transport = self.context.transports.transport_for(endpoint)?;
        self.context
            .validator
            .validate_if_configured(
                endpoint,
                transport.as_ref(),
                interceptors,
                self.context.codec.as_ref(),
            )
            .await
    }

    pub fn validation_state(&self, endpoint: &str) -> ValidationState {
        self.context.validator.state(endpoint)
    }

    pub fn is_server_validated(&self, endpoint: &str) -> bool {
        self.context.validator.cache().contains(endpoint)
    }

    /// Normalized endpoints that passed validation, sorted
    pub fn validated_servers(&self) -> Vec<String> {
        self.context.validator.cache().endpoints()
    }

    pub fn clear_validated_servers(&self) {
        self.context.validator.cache().clear();
    }

    /// Normalized form used as the validation cache key
    pub fn normalize_endpoint(endpoint: &str) -> String {
        normalize_endpoint(endpoint)
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let factory = ClientFactory::new(ProtocolVersion::Dstu2);
        assert_eq!(factory.protocol_version(), ProtocolVersion::Dstu2);
        assert_eq!(factory.validation_mode(), ValidationMode::Once);
        assert_eq!(factory.connect_timeout(), Duration::from_secs(10));
        assert_eq!(factory.read_timeout(), Duration::from_secs(10));
        assert_eq!(factory.request_timeout(), Duration::from_secs(10));
        assert_eq!(factory.binding_table_count(), 0);
    }

    #[test]
    fn test_invalid_validation_mode_keeps_current() {
        let factory = ClientFactory::new(ProtocolVersion::Dstu2);
        factory.set_validation_mode(ValidationMode::Always);

        let err = factory.set_validation_mode_str("bogus").unwrap_err();
        assert!(matches!(err, ClientError::Configuration(_)));
        assert_eq!(factory.validation_mode(), ValidationMode::Always);

        factory.set_validation_mode_str("never").unwrap();
        assert_eq!(factory.validation_mode(), ValidationMode::Never);
    }

    #[test]
    fn test_empty_endpoint_rejected() {
        let factory = ClientFactory::new(ProtocolVersion::Dstu2);
        assert!(matches!(
            factory.new_generic_client("  "),
            Err(ClientError::Configuration(_))
        ));
        assert!(matches!(
            factory.new_generic_client("not a url"),
            Err(ClientError::Configuration(_))
        ));
    }

    #[test]
    fn test_setters_update_config() {
        let factory = ClientFactory::new(ProtocolVersion::Dstu2);
        factory.set_connect_timeout(Duration::from_millis(1500));
        factory.set_read_timeout(Duration::from_millis(2500));
        factory.set_request_timeout(Duration::from_millis(3500));
        factory.set_proxy(Some("http://proxy:3128"));
        factory.set_proxy_credentials("alice", "pw");

        let config = factory.transport_config();
        assert_eq!(config.connect_timeout_ms, 1500);
        assert_eq!(config.read_timeout_ms, 2500);
        assert_eq!(config.request_timeout_ms, 3500);
        assert_eq!(config.proxy_url.as_deref(), Some("http://proxy:3128"));
        assert_eq!(config.proxy_credentials(), Some(("alice", "pw")));
    }

    #[test]
    fn test_apply_config_is_all_or_nothing() {
        let factory = ClientFactory::new(ProtocolVersion::Dstu2);
        let bad = FactoryConfig {
            connect_timeout_ms: Some(1),
            validation_mode: Some("sometimes".to_string()),
            ..FactoryConfig::default()
        };
        assert!(factory.apply_config(&bad).is_err());
        assert_eq!(factory.connect_timeout(), Duration::from_secs(10));

        let good = FactoryConfig::default().with_validation_mode(ValidationMode::Never);
        factory.apply_config(&good).unwrap();
        assert_eq!(factory.validation_mode(), ValidationMode::Never);
    }

    #[test]
    fn test_builder_applies_config() {
        let config = FactoryConfig {
            read_timeout_ms: Some(99),
            validation_mode: Some("always".to_string()),
            ..FactoryConfig::default()
        };
        let factory = ClientFactory::builder(ProtocolVersion::Dstu1)
            .config(&config)
            .unwrap()
            .build();
        assert_eq!(factory.read_timeout(), Duration::from_millis(99));
        assert_eq!(factory.validation_mode(), ValidationMode::Always);
        assert_eq!(factory.protocol_version(), ProtocolVersion::Dstu1);
    }
}
