//! Client error types

use crate::version::ProtocolVersion;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    /// Invalid interface declaration, unmappable operation, invalid validation
    /// mode or an operation missing from the binding table.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Transport-level failure: unreachable host, timeout, unreadable response.
    #[error("Connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error(
        "Server at {endpoint} reports protocol version {remote_version_string:?} ({remote}), \
         which is not compatible with the client version {local}"
    )]
    IncompatibleServer {
        endpoint: String,
        local: ProtocolVersion,
        remote: ProtocolVersion,
        remote_version_string: String,
    },

    #[error("Decode error: {0}")]
    Decode(String),

    /// A request body could not be serialized.
    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// The server answered, but with a non-success status.
    #[error("Server returned HTTP {status}: {body}")]
    Server { status: u16, body: String },
}

impl ClientError {
    pub fn connection(message: impl Into<String>) -> Self {
        ClientError::Connection {
            message: message.into(),
            source: None,
        }
    }

    pub fn connection_with_source<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ClientError::Connection {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Machine-readable code, used by the CLI output envelope.
    pub fn code(&self) -> &'static str {
        match self {
            ClientError::Configuration(_) => "CONFIGURATION",
            ClientError::Connection { .. } => "CONNECTION",
            ClientError::IncompatibleServer { .. } => "INCOMPATIBLE_SERVER",
            ClientError::Decode(_) => "DECODE",
            ClientError::Encode(_) => "ENCODE",
            ClientError::InvalidArguments(_) => "INVALID_ARGUMENT",
            ClientError::Server { .. } => "SERVER_ERROR",
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            "Request timed out".to_string()
        } else if err.is_connect() {
            "Failed to connect to server".to_string()
        } else {
            "HTTP transport failure".to_string()
        };
        ClientError::connection_with_source(message, err)
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Decode(err.to_string())
    }
}
