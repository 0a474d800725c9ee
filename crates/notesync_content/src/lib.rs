//! # notesync content
//!
//! Pure content handling for the notesync engine: no I/O, no state.
//!
//! This crate provides:
//! - `ContentHasher`, the digest the remote uses for note and resource bodies
//! - `to_local` / `to_wire`, the bidirectional transcoder between the remote
//!   wire format and locally editable HTML
//! - Each transcoding pass as its own function, so they can be tested and
//!   reused independently
//!
//! ## Round trip
//!
//! For bodies made only of plain text, media markers, todo markers and
//! cross-note links, `to_wire(&to_local(x, ..), ..)` is equivalent to `x`
//! up to attribute order.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod error;
mod hasher;
mod markup;
mod options;
mod transcoder;

pub use error::{TranscodeError, TranscodeResult};
pub use hasher::ContentHasher;
pub use options::TranscodeOptions;
pub use transcoder::{
    highlight_to_local, highlight_to_wire, links_to_local, links_to_wire, media_to_local,
    media_to_wire, normalize_blocks, sanitize, strip_wrapper, to_local, to_wire, todo_to_local,
    todo_to_wire, validate_wire, wrap_document, MediaResolver, NoMedia, ResolvedMedia,
};
