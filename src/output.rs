//! Output formatting - deterministic JSON envelope

use crate::error::ClientError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Standard CLI output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputEnvelope {
    /// Indicates success or failure
    pub ok: bool,

    /// Output kind (validation_result, capabilities, read_result)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Server base URL (present on success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Payload data (present on success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// Error information (present on failure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,

    /// Metadata
    pub meta: Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Machine-readable error code
    pub code: String,

    /// Human-readable error message
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    /// Envelope schema version
    pub version: String,

    /// Execution duration in milliseconds when applicable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl OutputEnvelope {
    /// Create a success response
    pub fn success(kind: &str, endpoint: &str, data: Value, duration_ms: Option<u64>) -> Self {
        Self {
            ok: true,
            kind: Some(kind.to_string()),
            endpoint: Some(endpoint.to_string()),
            data: Some(data),
            error: None,
            meta: Metadata {
                version: "v1".to_string(),
                duration_ms,
            },
        }
    }

    /// Create an error response
    pub fn error(code: &str, message: &str) -> Self {
        Self {
            ok: false,
            kind: None,
            endpoint: None,
            data: None,
            error: Some(ErrorInfo {
                code: code.to_string(),
                message: message.to_string(),
            }),
            meta: Metadata {
                version: "v1".to_string(),
                duration_ms: None,
            },
        }
    }

    pub fn from_error(err: &ClientError) -> Self {
        Self::error(err.code(), &err.to_string())
    }

    /// Convert to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_envelope() {
        let envelope = OutputEnvelope::success(
            "validation_result",
            "http://fhir.example.com/",
            serde_json::json!({"status": "validated"}),
            Some(42),
        );

        assert!(envelope.ok);
        assert_eq!(envelope.kind, Some("validation_result".to_string()));
        assert_eq!(envelope.endpoint, Some("http://fhir.example.com/".to_string()));
        assert!(envelope.error.is_none());
    }

    #[test]
    fn test_error_envelope_from_client_error() {
        let err = ClientError::Configuration("bad mode".to_string());
        let envelope = OutputEnvelope::from_error(&err);

        assert!(!envelope.ok);
        assert_eq!(
            envelope.error.as_ref().map(|e| e.code.clone()),
            Some("CONFIGURATION".to_string())
        );
        assert_eq!(envelope.meta.version, "v1");

        let json = envelope.to_json().unwrap();
        assert!(json.contains("\"ok\": false"));
        assert!(!json.contains("\"data\""));
    }
}
