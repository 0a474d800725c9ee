//! Incremental sync request and response shapes.

use crate::entities::{RemoteNote, RemoteNotebook, RemoteResource, RemoteTag};
use serde::{Deserialize, Serialize};

/// Update sequence number: a position in the account's change history.
pub type Usn = i32;

/// Response of `GetSyncState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncState {
    /// Remote clock, epoch millis.
    pub current_time: i64,
    /// Highest USN assigned in the account (global mutation counter).
    pub update_count: Usn,
    /// History before this time (epoch millis) can no longer be diffed.
    pub full_sync_before: i64,
}

/// Which record kinds a filtered sync chunk should contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncChunkFilter {
    /// Include notes.
    pub include_notes: bool,
    /// Include notebooks.
    pub include_notebooks: bool,
    /// Include tags.
    pub include_tags: bool,
    /// Include note attributes such as the source URL.
    pub include_note_attributes: bool,
    /// Include note resources (metadata only).
    pub include_note_resources: bool,
    /// Include hard-expunge records.
    pub include_expunged: bool,
}

impl SyncChunkFilter {
    /// Filter used for incremental pulls: everything except expunge records.
    pub fn incremental() -> Self {
        Self {
            include_notes: true,
            include_notebooks: true,
            include_tags: true,
            include_note_attributes: true,
            include_note_resources: true,
            include_expunged: false,
        }
    }
}

/// One page of changes returned by `GetFilteredSyncChunk`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncChunk {
    /// Highest USN of any record in this chunk; absent for an empty chunk.
    pub chunk_high_usn: Option<Usn>,
    /// Changed notebooks.
    pub notebooks: Vec<RemoteNotebook>,
    /// Changed tags.
    pub tags: Vec<RemoteTag>,
    /// Changed notes, without content.
    pub notes: Vec<RemoteNote>,
    /// Changed resources, without body bytes.
    pub resources: Vec<RemoteResource>,
}

impl SyncChunk {
    /// Returns true when the chunk carries no records.
    pub fn is_empty(&self) -> bool {
        self.notebooks.is_empty()
            && self.tags.is_empty()
            && self.notes.is_empty()
            && self.resources.is_empty()
    }

    /// Total number of records in the chunk.
    pub fn len(&self) -> usize {
        self.notebooks.len() + self.tags.len() + self.notes.len() + self.resources.len()
    }

    /// Resources in this chunk that belong to the given note, in chunk order.
    pub fn resources_for<'a>(
        &'a self,
        note_guid: &'a str,
    ) -> impl Iterator<Item = &'a RemoteResource> + 'a {
        self.resources
            .iter()
            .filter(move |r| r.note_guid == note_guid)
    }

    /// Returns true when more pages remain after a pull that started at `usn`.
    pub fn has_more_after(&self, usn: Usn) -> bool {
        self.chunk_high_usn.is_some_and(|high| high > usn)
    }
}

/// Options of a single-note fetch (`GetNote`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NoteFetch {
    /// Include the note body.
    pub with_content: bool,
    /// Include resource body bytes.
    pub with_resources_data: bool,
    /// Include resource recognition data.
    pub with_resources_recognition: bool,
    /// Include resource alternate data.
    pub with_resources_alternate_data: bool,
}

impl NoteFetch {
    /// Fetches the body only.
    pub fn content_only() -> Self {
        Self {
            with_content: true,
            ..Self::default()
        }
    }
}
