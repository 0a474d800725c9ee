//! Bidirectional transcoder between the wire format and local HTML.
//!
//! `to_local` and `to_wire` are near-inverses. Each pass is exposed on its
//! own; the composite functions only fix their order.

mod local;
mod wire;

use crate::options::TranscodeOptions;

pub use local::{highlight_to_local, links_to_local, media_to_local, strip_wrapper, todo_to_local};
pub use wire::{
    highlight_to_wire, links_to_wire, media_to_wire, normalize_blocks, sanitize, todo_to_wire,
    validate_wire, wrap_document,
};

/// A synced attachment that a media marker can point at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMedia {
    /// Local URL of the attachment.
    pub url: String,
    /// File name shown for non-image media.
    pub file_name: String,
}

/// Looks up already-synced attachments by content hash.
pub trait MediaResolver {
    /// Resolves a lowercase hex content hash to a local attachment.
    fn resolve(&self, hash_hex: &str) -> Option<ResolvedMedia>;
}

impl<F> MediaResolver for F
where
    F: Fn(&str) -> Option<ResolvedMedia>,
{
    fn resolve(&self, hash_hex: &str) -> Option<ResolvedMedia> {
        self(hash_hex)
    }
}

/// Resolver with no attachments; every marker renders as pending.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMedia;

impl MediaResolver for NoMedia {
    fn resolve(&self, _hash_hex: &str) -> Option<ResolvedMedia> {
        None
    }
}

/// Converts a wire-format document into local editable HTML.
pub fn to_local(wire: &str, media: &dyn MediaResolver, options: &TranscodeOptions) -> String {
    let html = strip_wrapper(wire);
    let html = media_to_local(&html, media);
    let html = todo_to_local(&html);
    let html = highlight_to_local(&html, options);
    links_to_local(&html, options)
}

/// Converts local HTML back into a complete wire-format document.
pub fn to_wire(html: &str, options: &TranscodeOptions) -> String {
    let body = media_to_wire(html);
    let body = todo_to_wire(&body);
    let body = highlight_to_wire(&body, options);
    let body = links_to_wire(&body);
    let body = sanitize(&body);
    let body = normalize_blocks(&body);
    wrap_document(&body)
}
