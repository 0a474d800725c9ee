//! Content hashes as reported by the remote service.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw digest bytes of a note body or resource body.
///
/// The remote computes these; the engine only compares them. Locally the
/// hash is persisted in its lowercase hex form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(pub Vec<u8>);

/// Error returned when a hex string is not a valid hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashParseError(pub String);

impl fmt::Display for HashParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid content hash: {}", self.0)
    }
}

impl std::error::Error for HashParseError {}

impl ContentHash {
    /// Wraps raw digest bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Parses a hex string.
    pub fn from_hex(value: &str) -> Result<Self, HashParseError> {
        hex::decode(value.trim())
            .map(Self)
            .map_err(|e| HashParseError(format!("{value:?}: {e}")))
    }

    /// Lowercase hex form, as stored on local documents and attachments.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns true when no digest is present.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
