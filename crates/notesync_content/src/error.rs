//! Error types for content handling.

use thiserror::Error;

/// Result type for content operations.
pub type TranscodeResult<T> = Result<T, TranscodeError>;

/// Structural problems found in a wire-format document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranscodeError {
    /// The outer document element is missing.
    #[error("missing en-note wrapper")]
    MissingWrapper,

    /// A closing tag does not match the innermost open element.
    #[error("unexpected closing tag </{tag}> at byte {offset}")]
    UnexpectedClose {
        /// Tag name.
        tag: String,
        /// Byte offset in the document body.
        offset: usize,
    },

    /// An element was never closed.
    #[error("unclosed element <{tag}>")]
    Unclosed {
        /// Tag name.
        tag: String,
    },

    /// Comments are not representable in the wire format.
    #[error("comment at byte {offset}")]
    Comment {
        /// Byte offset in the document body.
        offset: usize,
    },
}
