//! # notesync protocol
//!
//! Data model of the remote note service consumed by the notesync engine.
//!
//! This crate provides:
//! - Remote entities (`RemoteNote`, `RemoteResource`, `RemoteNotebook`, `RemoteTag`)
//! - Incremental sync messages (`SyncState`, `SyncChunkFilter`, `SyncChunk`)
//! - Content hashes as exchanged with the remote
//! - Typed taxonomy bindings and the cached taxonomy index
//!
//! This is a pure data crate with no I/O operations. Transport to the
//! remote service is delegated to a client library behind the engine's
//! `RemoteSyncClient` trait.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod binding;
mod entities;
mod hash;
mod messages;
mod taxonomy;

pub use binding::{Binding, BindingKind};
pub use entities::{NoteAttributes, NoteSpec, RemoteNote, RemoteNotebook, RemoteResource, RemoteTag};
pub use hash::{ContentHash, HashParseError};
pub use messages::{NoteFetch, SyncChunk, SyncChunkFilter, SyncState, Usn};
pub use taxonomy::{NotebookEntry, TagEntry, TaxonomyIndex};
