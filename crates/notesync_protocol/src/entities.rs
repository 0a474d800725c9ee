//! Remote entities carried in sync chunks.

use crate::binding::Binding;
use crate::hash::ContentHash;
use serde::{Deserialize, Serialize};

/// Optional attributes of a remote note.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NoteAttributes {
    /// URL the note was clipped from.
    pub source_url: Option<String>,
}

/// A note as returned by the remote service.
///
/// `content_hash` is computed by the remote over `content`; the engine
/// never recomputes it and only compares it with the last applied value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RemoteNote {
    /// Stable remote identifier.
    pub guid: String,
    /// Note title.
    pub title: String,
    /// Body in the wire rich-text format. Empty when fetched without content.
    pub content: String,
    /// Remote digest of `content`.
    pub content_hash: ContentHash,
    /// Notebook the note lives in.
    pub notebook_guid: String,
    /// Tags attached to the note, in remote order.
    pub tag_guids: Vec<String>,
    /// Creation time, epoch millis.
    pub created: i64,
    /// Last update time, epoch millis.
    pub updated: i64,
    /// Whether the note sits in the remote trash.
    pub deleted: bool,
    /// Optional attributes.
    pub attributes: NoteAttributes,
}

impl RemoteNote {
    /// Returns the note's notebook and tags as typed bindings.
    pub fn bindings(&self) -> Vec<Binding> {
        Binding::from_remote(&self.notebook_guid, &self.tag_guids)
    }

    /// Returns the clip source URL, if any.
    pub fn source_url(&self) -> Option<&str> {
        self.attributes.source_url.as_deref()
    }
}

/// A binary resource (image, audio, attachment) owned by exactly one note.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RemoteResource {
    /// Stable remote identifier.
    pub guid: String,
    /// Owning note.
    pub note_guid: String,
    /// MIME type of the body.
    pub mime: String,
    /// Remote digest of the body bytes. Media markers reference this value.
    pub body_hash: ContentHash,
    /// Original file name, when the remote knows it.
    pub file_name: Option<String>,
    /// Whether the resource was removed from its note.
    pub deleted: bool,
    /// Body bytes, only populated when explicitly requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<u8>>,
}

impl RemoteResource {
    /// Returns true for audio resources, which get a transcription request.
    pub fn is_audio(&self) -> bool {
        self.mime.starts_with("audio/")
    }
}

/// A remote notebook.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RemoteNotebook {
    /// Stable remote identifier.
    pub guid: String,
    /// Display name.
    pub name: String,
    /// Stack the notebook is grouped under.
    pub stack: Option<String>,
}

/// A remote tag.
///
/// The remote API offers no lookup of a tag by guid, so names and parents
/// are only ever learned from sync chunks.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RemoteTag {
    /// Stable remote identifier.
    pub guid: String,
    /// Display name.
    pub name: String,
    /// Parent tag, if the tag is nested.
    pub parent_guid: Option<String>,
}

/// Payload of an outbound note create or update.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NoteSpec {
    /// Remote guid; `None` for a create.
    pub guid: Option<String>,
    /// Note title.
    pub title: String,
    /// Body in the wire format.
    pub content: String,
    /// Target notebook.
    pub notebook_guid: String,
    /// Tags, in order.
    pub tag_guids: Vec<String>,
    /// Clip source URL.
    pub source_url: Option<String>,
}
