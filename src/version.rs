//! Protocol versions and classification of server-reported version strings

use crate::error::ClientError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Protocol releases this client knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolVersion {
    Dstu1,
    Dstu2,
    /// DSTU2 as packaged by the HL7 reference structures. Same wire family as
    /// [`ProtocolVersion::Dstu2`].
    Dstu2Hl7Org,
}

impl ProtocolVersion {
    /// Whether two versions speak the same wire protocol family.
    pub fn is_equivalent_to(&self, other: ProtocolVersion) -> bool {
        self.family() == other.family()
    }

    fn family(&self) -> ProtocolVersion {
        match self {
            ProtocolVersion::Dstu1 => ProtocolVersion::Dstu1,
            ProtocolVersion::Dstu2 | ProtocolVersion::Dstu2Hl7Org => ProtocolVersion::Dstu2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolVersion::Dstu1 => "DSTU1",
            ProtocolVersion::Dstu2 => "DSTU2",
            ProtocolVersion::Dstu2Hl7Org => "DSTU2_HL7ORG",
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolVersion {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dstu1" => Ok(ProtocolVersion::Dstu1),
            "dstu2" => Ok(ProtocolVersion::Dstu2),
            "dstu2_hl7org" => Ok(ProtocolVersion::Dstu2Hl7Org),
            other => Err(ClientError::Configuration(format!(
                "Unknown protocol version '{}'. Expected one of: dstu1, dstu2, dstu2_hl7org",
                other
            ))),
        }
    }
}

/// Result of classifying a version string reported by a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionTag {
    Known(ProtocolVersion),
    /// Blank or unrecognized. Accepted leniently by the validator.
    Unknown,
}

/// Ordered prefix rules. First match wins, so order matters: do not sort.
const VERSION_PREFIX_RULES: &[(&str, ProtocolVersion)] = &[
    ("0.80", ProtocolVersion::Dstu1),
    ("0.0.8", ProtocolVersion::Dstu1),
    ("0.4", ProtocolVersion::Dstu2),
    ("0.5", ProtocolVersion::Dstu2),
];

impl VersionTag {
    /// Classify a raw version string from a capability document.
    pub fn classify(raw: Option<&str>) -> VersionTag {
        let raw = match raw {
            Some(s) if !s.trim().is_empty() => s,
            _ => return VersionTag::Unknown,
        };

        for (prefix, version) in VERSION_PREFIX_RULES {
            if raw.starts_with(prefix) {
                return VersionTag::Known(*version);
            }
        }

        debug!(
            "Server capability statement indicates unknown protocol version: {}",
            raw
        );
        VersionTag::Unknown
    }

    pub fn version(&self) -> Option<ProtocolVersion> {
        match self {
            VersionTag::Known(v) => Some(*v),
            VersionTag::Unknown => None,
        }
    }
}
