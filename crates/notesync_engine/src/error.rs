//! Error types for the sync engine.

use notesync_content::TranscodeError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// A remote call did not answer within the request timeout.
    #[error("operation timed out")]
    Timeout,

    /// The remote refused a note create or update.
    #[error("remote rejected note {guid}: {reason}")]
    Rejected {
        /// Guid of the note, empty for a create.
        guid: String,
        /// Reason given by the remote.
        reason: String,
    },

    /// A remote or local entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The local store failed.
    #[error("local store error: {0}")]
    Store(String),

    /// Remote data is inconsistent (hash mismatch, orphaned record).
    #[error("integrity error: {0}")]
    Integrity(String),

    /// The engine is not configured for this account.
    #[error("configuration error: {0}")]
    Config(String),

    /// File system error from a persistent store.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Persisted state could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// Content could not be transcoded.
    #[error("transcode error: {0}")]
    Transcode(#[from] TranscodeError),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried on a later tick.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Timeout => true,
            _ => false,
        }
    }
}
