//! Body codec
//!
//! The resource model lives outside this crate; responses are decoded into
//! [`serde_json::Value`] according to the [`ResultShape`] an operation declares,
//! and typed wrappers convert further with `serde_json::from_value`.

use crate::error::{ClientError, Result};
use serde_json::Value;

/// JSON wire content type for resources
pub const CONTENT_TYPE_FHIR_JSON: &str = "application/json+fhir";

/// What an operation expects back from the server
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ResultShape {
    /// No body is expected; any body is ignored.
    Empty,
    /// Any well-formed document.
    #[default]
    Json,
    /// A single resource of the named type.
    Resource(String),
    /// A search/history bundle.
    Bundle,
    /// Raw text, returned as a JSON string.
    Text,
}

impl ResultShape {
    pub fn resource(resource_type: impl Into<String>) -> Self {
        ResultShape::Resource(resource_type.into())
    }

    /// Resource type the decoded document must carry, if any
    pub fn expected_resource_type(&self) -> Option<&str> {
        match self {
            ResultShape::Resource(name) => Some(name.as_str()),
            ResultShape::Bundle => Some("Bundle"),
            _ => None,
        }
    }
}

/// Encode/decode between wire bodies and values
pub trait Codec: Send + Sync {
    /// Value sent in `Accept` and, for requests with a body, `Content-Type`
    fn content_type(&self) -> &'static str;

    fn decode(&self, body: &[u8], shape: &ResultShape) -> Result<Value>;

    fn encode(&self, value: &Value) -> Result<Vec<u8>>;
}

/// JSON codec
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn content_type(&self) -> &'static str {
        CONTENT_TYPE_FHIR_JSON
    }

    fn decode(&self, body: &[u8], shape: &ResultShape) -> Result<Value> {
        match shape {
            ResultShape::Empty => Ok(Value::Null),
            ResultShape::Text => String::from_utf8(body.to_vec())
                .map(Value::String)
                .map_err(|e| ClientError::Decode(format!("Response body is not UTF-8: {}", e))),
            ResultShape::Json | ResultShape::Resource(_) | ResultShape::Bundle => {
                if body.iter().all(u8::is_ascii_whitespace) {
                    return Err(ClientError::Decode("Response body is empty".to_string()));
                }

                let value: Value = serde_json::from_slice(body)?;

                if let Some(expected) = shape.expected_resource_type() {
                    let actual = value
                        .get("resourceType")
                        .and_then(|v| v.as_str())
                        .ok_or_else(|| {
                            ClientError::Decode(format!(
                                "Expected a {} resource but the response has no resourceType",
                                expected
                            ))
                        })?;
                    if actual != expected {
                        return Err(ClientError::Decode(format!(
                            "Expected a {} resource but got {}",
                            expected, actual
                        )));
                    }
                }

                Ok(value)
            }
        }
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(encode_error)
    }
}

fn encode_error(err: serde_json::Error) -> ClientError {
    ClientError::Encode(format!("Failed to encode request body: {}", err))
}
