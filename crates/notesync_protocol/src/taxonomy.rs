//! Cached notebook and tag names, per account.
//!
//! The remote API cannot look a tag up by guid, so the index is the only
//! way a tag guid becomes a name. It is merged from every chunk and never
//! replaced wholesale.

use crate::entities::{RemoteNotebook, RemoteTag};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Cached notebook metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NotebookEntry {
    /// Display name.
    pub name: String,
    /// Stack the notebook is grouped under.
    pub stack: Option<String>,
}

/// Cached tag metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TagEntry {
    /// Display name.
    pub name: String,
    /// Parent tag guid.
    pub parent_guid: Option<String>,
}

/// Notebook and tag names learned from sync chunks.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaxonomyIndex {
    /// Notebooks by guid.
    #[serde(default)]
    pub notebooks: BTreeMap<String, NotebookEntry>,
    /// Tags by guid.
    #[serde(default)]
    pub tags: BTreeMap<String, TagEntry>,
}

impl TaxonomyIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges notebooks into the index. Returns the guids whose entry changed.
    pub fn merge_notebooks<'a>(
        &mut self,
        notebooks: impl IntoIterator<Item = &'a RemoteNotebook>,
    ) -> Vec<String> {
        let mut changed = Vec::new();
        for notebook in notebooks {
            let entry = NotebookEntry {
                name: notebook.name.clone(),
                stack: notebook.stack.clone(),
            };
            if self.notebooks.get(&notebook.guid) != Some(&entry) {
                self.notebooks.insert(notebook.guid.clone(), entry);
                changed.push(notebook.guid.clone());
            }
        }
        changed
    }

    /// Merges tags into the index. Returns the guids whose entry changed.
    pub fn merge_tags<'a>(&mut self, tags: impl IntoIterator<Item = &'a RemoteTag>) -> Vec<String> {
        let mut changed = Vec::new();
        for tag in tags {
            let entry = TagEntry {
                name: tag.name.clone(),
                parent_guid: tag.parent_guid.clone(),
            };
            if self.tags.get(&tag.guid) != Some(&entry) {
                self.tags.insert(tag.guid.clone(), entry);
                changed.push(tag.guid.clone());
            }
        }
        changed
    }

    /// Cached notebook name.
    pub fn notebook_name(&self, guid: &str) -> Option<&str> {
        self.notebooks.get(guid).map(|e| e.name.as_str())
    }

    /// Cached tag name.
    pub fn tag_name(&self, guid: &str) -> Option<&str> {
        self.tags.get(guid).map(|e| e.name.as_str())
    }

    /// Cached parent of a tag.
    pub fn tag_parent(&self, guid: &str) -> Option<&str> {
        self.tags.get(guid).and_then(|e| e.parent_guid.as_deref())
    }

    /// Returns true when nothing has been cached yet.
    pub fn is_empty(&self) -> bool {
        self.notebooks.is_empty() && self.tags.is_empty()
    }
}
