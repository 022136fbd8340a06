//! Transport configuration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Default connect timeout in milliseconds
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Default read (socket) timeout in milliseconds
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 10_000;

/// Default whole-request timeout in milliseconds
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Settings a transport handle is built from.
///
/// A timeout of `0` means no limit.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Time allowed to establish a connection
    pub connect_timeout_ms: u64,

    /// Time allowed for reading the response
    pub read_timeout_ms: u64,

    /// Time allowed for the whole exchange, connection to last body byte
    pub request_timeout_ms: u64,

    /// HTTP proxy to route requests through
    pub proxy_url: Option<String>,

    pub proxy_username: Option<String>,

    pub proxy_password: Option<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            proxy_url: None,
            proxy_username: None,
            proxy_password: None,
        }
    }
}

// Keeps the proxy password out of logs.
impl fmt::Debug for TransportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportConfig")
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("read_timeout_ms", &self.read_timeout_ms)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("proxy_url", &self.proxy_url)
            .field("proxy_username", &self.proxy_username)
            .field(
                "proxy_password",
                &self.proxy_password.as_ref().map(|_| "********"),
            )
            .finish()
    }
}

impl TransportConfig {
    /// Create configuration from transport options
    pub fn from_options(options: TransportOptions) -> Self {
        let mut config = Self::default();
        config.apply(&options);
        config
    }

    /// Overlay every option that is set
    pub fn apply(&mut self, options: &TransportOptions) {
        if let Some(ms) = options.connect_timeout_ms {
            self.connect_timeout_ms = ms;
        }

        if let Some(ms) = options.read_timeout_ms {
            self.read_timeout_ms = ms;
        }

        if let Some(ms) = options.request_timeout_ms {
            self.request_timeout_ms = ms;
        }

        if let Some(url) = &options.proxy_url {
            self.proxy_url = Some(url.clone());
        }

        if let Some(username) = &options.proxy_username {
            self.proxy_username = Some(username.clone());
        }

        if let Some(password) = &options.proxy_password {
            self.proxy_password = Some(password.clone());
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Proxy credentials, only when both parts are present
    pub fn proxy_credentials(&self) -> Option<(&str, &str)> {
        match (&self.proxy_username, &self.proxy_password) {
            (Some(user), Some(pass)) => Some((user.as_str(), pass.as_str())),
            _ => None,
        }
    }
}

/// Optional overrides applied on top of [`TransportConfig`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransportOptions {
    pub connect_timeout_ms: Option<u64>,
    pub read_timeout_ms: Option<u64>,
    pub request_timeout_ms: Option<u64>,
    pub proxy_url: Option<String>,
    pub proxy_username: Option<String>,
    pub proxy_password: Option<String>,
}

impl TransportOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_timeout_ms(mut self, ms: u64) -> Self {
        self.connect_timeout_ms = Some(ms);
        self
    }

    pub fn with_read_timeout_ms(mut self, ms: u64) -> Self {
        self.read_timeout_ms = Some(ms);
        self
    }

    pub fn with_request_timeout_ms(mut self, ms: u64) -> Self {
        self.request_timeout_ms = Some(ms);
        self
    }

    pub fn with_proxy_url(mut self, url: impl Into<String>) -> Self {
        self.proxy_url = Some(url.into());
        self
    }

    pub fn with_proxy_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.proxy_username = Some(username.into());
        self.proxy_password = Some(password.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.connect_timeout_ms.is_none()
            && self.read_timeout_ms.is_none()
            && self.request_timeout_ms.is_none()
            && self.proxy_url.is_none()
            && self.proxy_username.is_none()
            && self.proxy_password.is_none()
    }
}
