//! Server compatibility validation
//!
//! Before a client trusts a server it fetches the server's capability
//! statement from `{endpoint}/metadata`, classifies the `fhirVersion` it
//! reports and compares it with the factory's protocol version.
//!
//! Per endpoint the validator moves through
//! `Unvalidated → Validating → Validated | Rejected`. Only `Validated` is
//! remembered; a rejected endpoint is validated again on its next use.

mod cache;

pub use cache::{normalize_endpoint, ValidationCache};

use crate::codec::{Codec, ResultShape};
use crate::error::{ClientError, Result};
use crate::interceptor::{send_intercepted, ClientInterceptor};
use crate::transport::{Transport, WireRequest};
use crate::version::{ProtocolVersion, VersionTag};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// Relative path of the capability statement
pub const METADATA_PATH: &str = "metadata";

/// Capability statement field carrying the protocol version
pub const VERSION_FIELD: &str = "fhirVersion";

/// When servers are validated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// Never fetch the capability statement
    Never,
    /// Validate each endpoint once per factory
    #[default]
    Once,
    /// Validate before every call
    Always,
}

impl fmt::Display for ValidationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationMode::Never => write!(f, "never"),
            ValidationMode::Once => write!(f, "once"),
            ValidationMode::Always => write!(f, "always"),
        }
    }
}

impl FromStr for ValidationMode {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "never" => Ok(ValidationMode::Never),
            "once" => Ok(ValidationMode::Once),
            "always" => Ok(ValidationMode::Always),
            _ => Err(ClientError::Configuration(format!(
                "Invalid server validation mode: {:?}. Valid values: never, once, always",
                s
            ))),
        }
    }
}

/// Per-endpoint validation state
///
/// Only `Validated` is stored. A rejection is reported through the returned
/// error and in logs, then the endpoint falls back to `Unvalidated`, so
/// [`CompatibilityValidator::state`] never returns `Rejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationState {
    Unvalidated,
    Validating,
    Validated,
    /// Outcome of a failed validation; never returned by `state()`
    Rejected,
}

impl fmt::Display for ValidationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValidationState::Unvalidated => "unvalidated",
            ValidationState::Validating => "validating",
            ValidationState::Validated => "validated",
            ValidationState::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// Marks an endpoint as `Validating` for as long as it lives
struct InFlight<'a> {
    in_flight: &'a Mutex<HashMap<String, usize>>,
    key: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(count) = in_flight.get_mut(&self.key) {
            *count -= 1;
            if *count == 0 {
                in_flight.remove(&self.key);
            }
        }
    }
}

pub struct CompatibilityValidator {
    local: ProtocolVersion,
    mode: RwLock<ValidationMode>,
    cache: ValidationCache,
    in_flight: Mutex<HashMap<String, usize>>,
}

impl CompatibilityValidator {
    pub fn new(local: ProtocolVersion, mode: ValidationMode) -> Self {
        Self {
            local,
            mode: RwLock::new(mode),
            cache: ValidationCache::new(),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn local_version(&self) -> ProtocolVersion {
        self.local
    }

    pub fn mode(&self) -> ValidationMode {
        *self.mode.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_mode(&self, mode: ValidationMode) {
        *self.mode.write().unwrap_or_else(PoisonError::into_inner) = mode;
        debug!("Server validation mode set to {}", mode);
    }

    pub fn cache(&self) -> &ValidationCache {
        &self.cache
    }

    /// Current state of `endpoint`: `Validated`, `Validating` or `Unvalidated`
    pub fn state(&self, endpoint: &str) -> ValidationState {
        let key = normalize_endpoint(endpoint);
        if self.cache.contains(&key) {
            return ValidationState::Validated;
        }
        let in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if in_flight.contains_key(&key) {
            ValidationState::Validating
        } else {
            ValidationState::Unvalidated
        }
    }

    /// Apply the configured policy before a call to `endpoint`
    pub async fn validate_if_configured(
        &self,
        endpoint: &str,
        transport: &dyn Transport,
        interceptors: &[Arc<dyn ClientInterceptor>],
        codec: &dyn Codec,
    ) -> Result<()> {
        match self.mode() {
            ValidationMode::Never => Ok(()),
            ValidationMode::Once if self.cache.contains(endpoint) => Ok(()),
            ValidationMode::Once | ValidationMode::Always => self
                .validate(endpoint, transport, interceptors, codec)
                .await
                .map(|_| ()),
        }
    }

    /// Fetch and check the capability statement, regardless of mode
    pub async fn validate(
        &self,
        endpoint: &str,
        transport: &dyn Transport,
        interceptors: &[Arc<dyn ClientInterceptor>],
        codec: &dyn Codec,
    ) -> Result<VersionTag> {
        let base = normalize_endpoint(endpoint);
        let metadata_url = format!("{}{}", base, METADATA_PATH);
        let _in_flight = self.enter(&base);
        debug!(
            "Server {} is {}: fetching {}",
            base,
            ValidationState::Validating,
            metadata_url
        );

        let request =
            WireRequest::get(METADATA_PATH).with_header("Accept", codec.content_type());
        let response = match send_intercepted(transport, interceptors, request).await {
            Ok(response) => response,
            Err(err @ ClientError::Connection { .. }) => {
                warn!(
                    "Server {} {}: capability statement unreachable: {}",
                    base,
                    ValidationState::Rejected,
                    err
                );
                return Err(ClientError::connection_with_source(
                    format!(
                        "Failed to retrieve the server metadata statement during client \
                         initialization. URL used was {}",
                        metadata_url
                    ),
                    err,
                ));
            }
            Err(err) => {
                warn!("Server {} {}: {}", base, ValidationState::Rejected, err);
                return Err(err);
            }
        };

        let document = codec.decode(&response.body, &ResultShape::Json)?;
        let raw_version = document.get(VERSION_FIELD).and_then(Value::as_str);
        let tag = VersionTag::classify(raw_version);

        if let VersionTag::Known(remote) = tag {
            if !self.local.is_equivalent_to(remote) {
                warn!(
                    "Server {} {}: reports {} but client speaks {}",
                    base,
                    ValidationState::Rejected,
                    remote,
                    self.local
                );
                return Err(ClientError::IncompatibleServer {
                    endpoint: base,
                    local: self.local,
                    remote,
                    remote_version_string: raw_version.unwrap_or_default().to_string(),
                });
            }
        }

        if self.cache.insert(&base) {
            info!(
                "Server {} {} (reported version {:?})",
                base,
                ValidationState::Validated,
                raw_version.unwrap_or("")
            );
        }

        Ok(tag)
    }

    fn enter(&self, key: &str) -> InFlight<'_> {
        *self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.to_string())
            .or_insert(0) += 1;
        InFlight {
            in_flight: &self.in_flight,
            key: key.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;
    use crate::transport::WireResponse;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Reply {
        Version(&'static str),
        NoVersion,
        Unreachable,
        Status(u16),
    }

    struct MetadataTransport {
        reply: Reply,
        fetches: AtomicUsize,
    }

    impl MetadataTransport {
        fn new(reply: Reply) -> Self {
            Self {
                reply,
                fetches: AtomicUsize::new(0),
            }
        }

        fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for MetadataTransport {
        fn endpoint(&self) -> &str {
            "http://h/"
        }

        async fn send(&self, request: WireRequest) -> Result<WireResponse> {
            assert_eq!(request.path(), METADATA_PATH);
            self.fetches.fetch_add(1, Ordering::SeqCst);
            match self.reply {
                Reply::Version(v) => Ok(WireResponse::new(
                    200,
                    serde_json::json!({"resourceType": "Conformance", "fhirVersion": v})
                        .to_string(),
                )),
                Reply::NoVersion => Ok(WireResponse::new(200, r#"{"resourceType":"Conformance"}"#)),
                Reply::Unreachable => Err(ClientError::connection("connection refused")),
                Reply::Status(status) => Ok(WireResponse::new(status, "nope")),
            }
        }
    }

    fn validator(mode: ValidationMode) -> CompatibilityValidator {
        CompatibilityValidator::new(ProtocolVersion::Dstu2, mode)
    }

    fn run<F: std::future::Future>(f: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(f)
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("never".parse::<ValidationMode>().unwrap(), ValidationMode::Never);
        assert_eq!("ONCE".parse::<ValidationMode>().unwrap(), ValidationMode::Once);
        assert_eq!(" always ".parse::<ValidationMode>().unwrap(), ValidationMode::Always);
        assert!(matches!(
            "sometimes".parse::<ValidationMode>(),
            Err(ClientError::Configuration(_))
        ));
        assert!(matches!(
            "".parse::<ValidationMode>(),
            Err(ClientError::Configuration(_))
        ));
        assert_eq!(ValidationMode::default(), ValidationMode::Once);
    }

    #[test]
    fn test_compatible_version_is_cached() {
        let validator = validator(ValidationMode::Once);
        let transport = MetadataTransport::new(Reply::Version("0.5.0"));

        run(async {
            for _ in 0..3 {
                validator
                    .validate_if_configured("http://h", &transport, &[], &JsonCodec)
                    .await
                    .unwrap();
            }
        });

        assert_eq!(transport.fetches(), 1);
        assert_eq!(validator.state("http://h/"), ValidationState::Validated);
        assert_eq!(validator.cache().endpoints(), vec!["http://h/"]);
    }

    #[test]
    fn test_mismatched_version_is_rejected_and_not_cached() {
        let validator = validator(ValidationMode::Once);
        let transport = MetadataTransport::new(Reply::Version("0.80"));

        let err = run(validator.validate_if_configured("http://h", &transport, &[], &JsonCodec))
            .unwrap_err();

        match err {
            ClientError::IncompatibleServer {
                endpoint,
                local,
                remote,
                remote_version_string,
            } => {
                assert_eq!(endpoint, "http://h/");
                assert_eq!(local, ProtocolVersion::Dstu2);
                assert_eq!(remote, ProtocolVersion::Dstu1);
                assert_eq!(remote_version_string, "0.80");
            }
            other => panic!("expected IncompatibleServer, got {:?}", other),
        }
        assert_eq!(validator.state("http://h"), ValidationState::Unvalidated);

        // A rejection is not remembered: the next attempt fetches again.
        let _ = run(validator.validate_if_configured("http://h", &transport, &[], &JsonCodec));
        assert_eq!(transport.fetches(), 2);
    }

    #[test]
    fn test_unknown_and_missing_versions_are_accepted() {
        for reply in [Reply::Version(""), Reply::Version("9.9"), Reply::NoVersion] {
            let validator = validator(ValidationMode::Once);
            let transport = MetadataTransport::new(reply);
            let tag = run(validator.validate("http://h", &transport, &[], &JsonCodec)).unwrap();
            assert_eq!(tag, VersionTag::Unknown);
            assert!(validator.cache().contains("http://h"));
        }
    }

    #[test]
    fn test_equivalent_family_is_accepted() {
        let validator = CompatibilityValidator::new(ProtocolVersion::Dstu2Hl7Org, ValidationMode::Once);
        let transport = MetadataTransport::new(Reply::Version("0.4.0"));
        assert!(run(validator.validate("http://h", &transport, &[], &JsonCodec)).is_ok());
    }

    #[test]
    fn test_transport_failure_is_wrapped_and_not_cached() {
        let validator = validator(ValidationMode::Once);
        let transport = MetadataTransport::new(Reply::Unreachable);

        let err = run(validator.validate_if_configured("http://h", &transport, &[], &JsonCodec))
            .unwrap_err();
        assert!(matches!(err, ClientError::Connection { .. }));
        assert!(err.to_string().contains("http://h/metadata"));
        assert!(validator.cache().is_empty());

        let _ = run(validator.validate_if_configured("http://h", &transport, &[], &JsonCodec));
        assert_eq!(transport.fetches(), 2);
        assert_eq!(validator.state("http://h"), ValidationState::Unvalidated);
    }

    #[test]
    fn test_server_error_status_propagates() {
        let validator = validator(ValidationMode::Once);
        let transport = MetadataTransport::new(Reply::Status(500));
        let err = run(validator.validate("http://h", &transport, &[], &JsonCodec)).unwrap_err();
        assert!(matches!(err, ClientError::Server { status: 500, .. }));
        assert!(validator.cache().is_empty());
    }

    #[test]
    fn test_never_mode_skips_fetch() {
        let validator = validator(ValidationMode::Never);
        let transport = MetadataTransport::new(Reply::Version("0.80"));
        run(validator.validate_if_configured("http://h", &transport, &[], &JsonCodec)).unwrap();
        assert_eq!(transport.fetches(), 0);
    }

    #[test]
    fn test_always_mode_fetches_every_time() {
        let validator = validator(ValidationMode::Always);
        let transport = MetadataTransport::new(Reply::Version("0.5.0"));
        run(async {
            for _ in 0..3 {
                validator
                    .validate_if_configured("http://h", &transport, &[], &JsonCodec)
                    .await
                    .unwrap();
            }
        });
        assert_eq!(transport.fetches(), 3);
        assert_eq!(validator.cache().len(), 1);
    }

    #[test]
    fn test_in_flight_marker_is_released() {
        let validator = validator(ValidationMode::Once);
        {
            let _guard = validator.enter("http://h/");
            assert_eq!(validator.state("http://h"), ValidationState::Validating);
        }
        assert_eq!(validator.state("http://h"), ValidationState::Unvalidated);
    }
}
