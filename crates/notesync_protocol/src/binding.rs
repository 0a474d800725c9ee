//! Typed taxonomy bindings.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of local taxonomy term a remote guid maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BindingKind {
    /// The note's notebook.
    Notebook,
    /// One of the note's tags.
    Tag,
}

impl fmt::Display for BindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingKind::Notebook => f.write_str("notebook"),
            BindingKind::Tag => f.write_str("tag"),
        }
    }
}

/// A document's membership in a notebook or tag, keyed by remote guid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Binding {
    /// Notebook or tag.
    pub kind: BindingKind,
    /// Remote guid of the notebook or tag.
    pub guid: String,
}

impl Binding {
    /// Creates a notebook binding.
    pub fn notebook(guid: impl Into<String>) -> Self {
        Self {
            kind: BindingKind::Notebook,
            guid: guid.into(),
        }
    }

    /// Creates a tag binding.
    pub fn tag(guid: impl Into<String>) -> Self {
        Self {
            kind: BindingKind::Tag,
            guid: guid.into(),
        }
    }

    /// Builds the combined binding list of a remote note.
    ///
    /// The remote note shape lists the notebook first and tags after it;
    /// this is the only place list position decides the binding kind.
    /// Empty guids are dropped.
    pub fn from_remote(notebook_guid: &str, tag_guids: &[String]) -> Vec<Binding> {
        let mut bindings = Vec::with_capacity(tag_guids.len() + 1);
        if !notebook_guid.is_empty() {
            bindings.push(Binding::notebook(notebook_guid));
        }
        for guid in tag_guids.iter().filter(|g| !g.is_empty()) {
            let binding = Binding::tag(guid.as_str());
            if !bindings.contains(&binding) {
                bindings.push(binding);
            }
        }
        bindings
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.guid)
    }
}
