//! Factory configuration file
//!
//! Settings are read from the `[client]` table of a TOML file:
//!
//! ```toml
//! [client]
//! connect_timeout_ms = 5000
//! read_timeout_ms = 20000
//! request_timeout_ms = 30000
//! proxy_url = "http://proxy.internal:3128"
//! proxy_username = "svc"
//! proxy_password = "..."
//! validation_mode = "once"
//! ```
//!
//! Every key is optional; missing keys keep the factory's current value.

use crate::error::{ClientError, Result};
use crate::transport::TransportOptions;
use crate::validation::ValidationMode;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FactoryConfig {
    pub connect_timeout_ms: Option<u64>,
    pub read_timeout_ms: Option<u64>,
    pub request_timeout_ms: Option<u64>,
    pub proxy_url: Option<String>,
    pub proxy_username: Option<String>,
    pub proxy_password: Option<String>,
    pub validation_mode: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    client: Option<toml::Value>,
}

impl FactoryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the `[client]` table of a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(contents)
            .map_err(|e| ClientError::Configuration(format!("Invalid config TOML: {}", e)))?;

        let config = match file.client {
            Some(table) => table.try_into::<FactoryConfig>().map_err(|e| {
                ClientError::Configuration(format!("Invalid [client] section: {}", e))
            })?,
            None => Self::default(),
        };

        // Reject a bad mode at load time rather than at first use.
        config.validation_mode()?;
        Ok(config)
    }

    /// Load from a file; a missing file yields defaults
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(|e| {
            ClientError::Configuration(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn with_transport(mut self, transport: TransportOptions) -> Self {
        self.connect_timeout_ms = transport.connect_timeout_ms;
        self.read_timeout_ms = transport.read_timeout_ms;
        self.request_timeout_ms = transport.request_timeout_ms;
        self.proxy_url = transport.proxy_url;
        self.proxy_username = transport.proxy_username;
        self.proxy_password = transport.proxy_password;
        self
    }

    /// Transport overrides carried by this config
    pub fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            connect_timeout_ms: self.connect_timeout_ms,
            read_timeout_ms: self.read_timeout_ms,
            request_timeout_ms: self.request_timeout_ms,
            proxy_url: self.proxy_url.clone(),
            proxy_username: self.proxy_username.clone(),
            proxy_password: self.proxy_password.clone(),
        }
    }

    pub fn with_validation_mode(mut self, mode: ValidationMode) -> Self {
        self.validation_mode = Some(mode.to_string());
        self
    }

    /// Parsed validation mode, if one is configured
    pub fn validation_mode(&self) -> Result<Option<ValidationMode>> {
        self.validation_mode
            .as_deref()
            .map(str::parse::<ValidationMode>)
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_full_section() {
        let config = FactoryConfig::from_toml_str(
            r#"
[client]
connect_timeout_ms = 5000
read_timeout_ms = 20000
proxy_url = "http://proxy:3128"
proxy_username = "svc"
proxy_password = "pw"
validation_mode = "always"
"#,
        )
        .unwrap();

        assert_eq!(config.connect_timeout_ms, Some(5000));
        assert_eq!(config.read_timeout_ms, Some(20000));
        assert_eq!(config.request_timeout_ms, None);
        assert_eq!(config.proxy_url.as_deref(), Some("http://proxy:3128"));
        assert_eq!(
            config.transport_options().proxy_username.as_deref(),
            Some("svc")
        );
        assert_eq!(
            config.validation_mode().unwrap(),
            Some(ValidationMode::Always)
        );
    }

    #[test]
    fn test_missing_section_is_default() {
        let config = FactoryConfig::from_toml_str("[other]\nkey = 1\n").unwrap();
        assert!(config.transport_options().is_empty());
        assert_eq!(config.validation_mode().unwrap(), None);
    }

    #[test]
    fn test_invalid_mode_is_configuration_error() {
        let result = FactoryConfig::from_toml_str("[client]\nvalidation_mode = \"sometimes\"\n");
        assert!(matches!(result, Err(ClientError::Configuration(_))));
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let result = FactoryConfig::from_toml_str("[client]\nconect_timeout_ms = 1\n");
        assert!(matches!(result, Err(ClientError::Configuration(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[client]\nrequest_timeout_ms = 750").unwrap();

        let config = FactoryConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.request_timeout_ms, Some(750));
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = FactoryConfig::load_from_file(&dir.path().join("absent.toml")).unwrap();
        assert!(config.transport_options().is_empty());
    }
}
