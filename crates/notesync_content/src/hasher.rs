//! Content hashing compatible with the remote service.

use md5::{Digest, Md5};
use notesync_protocol::ContentHash;

/// Computes the digest the remote service uses for note and resource bodies.
///
/// The engine never recomputes a note's `content_hash`; it uses this to
/// verify downloaded resource bodies and to stand in for the remote in
/// tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentHasher;

impl ContentHasher {
    /// Digest of `bytes`.
    pub fn digest(bytes: &[u8]) -> ContentHash {
        ContentHash::new(Md5::digest(bytes).to_vec())
    }

    /// Lowercase hex digest of `bytes`.
    pub fn hex(bytes: &[u8]) -> String {
        Self::digest(bytes).to_hex()
    }

    /// Returns true if `bytes` hash to `expected`.
    pub fn matches(bytes: &[u8], expected: &ContentHash) -> bool {
        Self::digest(bytes) == *expected
    }
}
