//! Local content store interface.
//!
//! The engine never owns documents; it drives a [`LocalStore`] supplied by
//! the embedding application. All remote-keyed records are found through
//! their persisted remote guid.

use crate::error::{SyncError, SyncResult};
use notesync_protocol::{Binding, BindingKind};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;

/// Local document id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(pub u64);

/// Local attachment id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttachmentId(pub u64);

/// Local taxonomy term id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TermId(pub u64);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "doc#{}", self.0)
    }
}

/// A local document as seen by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalDocument {
    /// Local id.
    pub id: DocumentId,
    /// Title.
    pub title: String,
    /// Editable HTML body.
    pub content_html: String,
    /// Remote note guid, unset until the first push or pull.
    pub remote_guid: Option<String>,
    /// Hex content hash of the last applied or pushed remote body.
    pub remote_content_hash_hex: Option<String>,
    /// Last-modified time, epoch millis.
    pub updated: i64,
    /// Source URL attribute.
    pub source_url: Option<String>,
    /// Taxonomy bindings: the notebook first, then tags.
    pub bindings: Vec<Binding>,
    /// Soft-deleted.
    pub deleted: bool,
}

/// Fields of a document to create.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewDocument {
    /// Title.
    pub title: String,
    /// Editable HTML body.
    pub content_html: String,
    /// Remote note guid.
    pub remote_guid: Option<String>,
    /// Hex content hash of the body.
    pub content_hash_hex: Option<String>,
    /// Last-modified time, epoch millis.
    pub updated: i64,
    /// Source URL attribute.
    pub source_url: Option<String>,
}

/// Partial document update. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentPatch {
    /// New title.
    pub title: Option<String>,
    /// New body.
    pub content_html: Option<String>,
    /// Remote guid binding.
    pub remote_guid: Option<String>,
    /// New content hash.
    pub content_hash_hex: Option<String>,
    /// New last-modified time.
    pub updated: Option<i64>,
    /// New source URL; `Some(None)` clears it.
    pub source_url: Option<Option<String>>,
    /// Soft-delete flag.
    pub deleted: Option<bool>,
}

impl DocumentPatch {
    /// Returns true when the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Returns true when the patch rewrites the body.
    pub fn rewrites_content(&self) -> bool {
        self.content_html.is_some()
    }
}

/// A local attachment created from a remote resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalAttachment {
    /// Local id.
    pub id: AttachmentId,
    /// Owning document.
    pub document: DocumentId,
    /// Remote resource guid.
    pub resource_guid: String,
    /// Hex body hash of the resource.
    pub content_hash_hex: String,
    /// Mime type.
    pub mime: String,
    /// File name.
    pub file_name: String,
    /// URL the local HTML links to.
    pub url: String,
}

/// An attachment to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAttachment {
    /// Owning document.
    pub document: DocumentId,
    /// Remote resource guid.
    pub resource_guid: String,
    /// Body bytes.
    pub bytes: Vec<u8>,
    /// Mime type.
    pub mime: String,
    /// File name.
    pub file_name: String,
    /// Hex body hash.
    pub content_hash_hex: String,
}

/// A local notebook or tag record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalTerm {
    /// Local id.
    pub id: TermId,
    /// Notebook or tag.
    pub kind: BindingKind,
    /// Remote guid.
    pub guid: String,
    /// Display name.
    pub name: String,
    /// Parent term, tags only.
    pub parent: Option<TermId>,
}

/// A term to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTerm {
    /// Notebook or tag.
    pub kind: BindingKind,
    /// Remote guid.
    pub guid: String,
    /// Display name.
    pub name: String,
    /// Parent term.
    pub parent: Option<TermId>,
}

/// Local content store consumed by the engine.
pub trait LocalStore: Send + Sync {
    /// Finds a document, deleted or not, by remote note guid.
    fn find_document_by_remote_guid(&self, guid: &str) -> SyncResult<Option<LocalDocument>>;

    /// Loads a document by id.
    fn document(&self, id: DocumentId) -> SyncResult<Option<LocalDocument>>;

    /// Creates a document.
    fn create_document(&self, document: NewDocument) -> SyncResult<DocumentId>;

    /// Applies a partial update.
    fn update_document(&self, id: DocumentId, patch: DocumentPatch) -> SyncResult<()>;

    /// Soft-deletes a document.
    fn soft_delete_document(&self, id: DocumentId) -> SyncResult<()>;

    /// Stores resource bytes as an attachment of a document.
    fn attach_resource(&self, attachment: NewAttachment) -> SyncResult<LocalAttachment>;

    /// Finds an attachment by hex body hash.
    fn find_attachment_by_content_hash(&self, hash_hex: &str) -> SyncResult<Option<LocalAttachment>>;

    /// Finds an attachment by remote resource guid.
    fn find_attachment_by_resource_guid(&self, guid: &str) -> SyncResult<Option<LocalAttachment>>;

    /// Lists a document's attachments.
    fn attachments_for_document(&self, id: DocumentId) -> SyncResult<Vec<LocalAttachment>>;

    /// Deletes an attachment.
    fn delete_attachment(&self, id: AttachmentId) -> SyncResult<()>;

    /// Finds a taxonomy term by kind and remote guid.
    fn find_term(&self, kind: BindingKind, guid: &str) -> SyncResult<Option<LocalTerm>>;

    /// Creates a taxonomy term.
    fn create_term(&self, term: NewTerm) -> SyncResult<LocalTerm>;

    /// Renames a taxonomy term.
    fn rename_term(&self, id: TermId, name: &str) -> SyncResult<()>;

    /// Binds a document to a term. Binding twice is a no-op.
    fn bind_term(&self, document: DocumentId, term: TermId) -> SyncResult<()>;

    /// Removes a document's binding to a term.
    fn unbind_term(&self, document: DocumentId, term: TermId) -> SyncResult<()>;
}

#[derive(Debug, Clone)]
struct StoredDocument {
    title: String,
    content_html: String,
    remote_guid: Option<String>,
    content_hash_hex: Option<String>,
    updated: i64,
    source_url: Option<String>,
    terms: Vec<TermId>,
    deleted: bool,
}

#[derive(Debug, Default)]
struct MemoryState {
    next_id: u64,
    documents: BTreeMap<DocumentId, StoredDocument>,
    attachments: BTreeMap<AttachmentId, (LocalAttachment, Vec<u8>)>,
    terms: BTreeMap<TermId, LocalTerm>,
    content_writes: u64,
}

impl MemoryState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn to_local(&self, id: DocumentId, doc: &StoredDocument) -> LocalDocument {
        let mut bindings: Vec<Binding> = doc
            .terms
            .iter()
            .filter_map(|t| self.terms.get(t))
            .map(|t| Binding {
                kind: t.kind,
                guid: t.guid.clone(),
            })
            .collect();
        // Notebook first, tags in binding order.
        bindings.sort_by_key(|b| b.kind != BindingKind::Notebook);
        LocalDocument {
            id,
            title: doc.title.clone(),
            content_html: doc.content_html.clone(),
            remote_guid: doc.remote_guid.clone(),
            remote_content_hash_hex: doc.content_hash_hex.clone(),
            updated: doc.updated,
            source_url: doc.source_url.clone(),
            bindings,
            deleted: doc.deleted,
        }
    }

    fn document_mut(&mut self, id: DocumentId) -> SyncResult<&mut StoredDocument> {
        self.documents
            .get_mut(&id)
            .ok_or_else(|| SyncError::NotFound(id.to_string()))
    }
}

/// An in-memory local store for testing.
#[derive(Debug, Default)]
pub struct MemoryLocalStore {
    state: RwLock<MemoryState>,
}

impl MemoryLocalStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of body writes (creates with content and content updates).
    pub fn content_writes(&self) -> u64 {
        self.state.read().content_writes
    }

    /// All documents, including soft-deleted ones.
    pub fn documents(&self) -> Vec<LocalDocument> {
        let state = self.state.read();
        state
            .documents
            .iter()
            .map(|(id, doc)| state.to_local(*id, doc))
            .collect()
    }

    /// All attachments.
    pub fn attachments(&self) -> Vec<LocalAttachment> {
        self.state
            .read()
            .attachments
            .values()
            .map(|(a, _)| a.clone())
            .collect()
    }

    /// Stored bytes of an attachment.
    pub fn attachment_bytes(&self, id: AttachmentId) -> Option<Vec<u8>> {
        self.state.read().attachments.get(&id).map(|(_, b)| b.clone())
    }

    /// All taxonomy terms.
    pub fn terms(&self) -> Vec<LocalTerm> {
        self.state.read().terms.values().cloned().collect()
    }

    /// Simulates a local edit of a document body.
    pub fn edit_content(&self, id: DocumentId, html: impl Into<String>) -> SyncResult<()> {
        let mut state = self.state.write();
        state.document_mut(id)?.content_html = html.into();
        Ok(())
    }
}

impl LocalStore for MemoryLocalStore {
    fn find_document_by_remote_guid(&self, guid: &str) -> SyncResult<Option<LocalDocument>> {
        let state = self.state.read();
        Ok(state
            .documents
            .iter()
            .find(|(_, d)| d.remote_guid.as_deref() == Some(guid))
            .map(|(id, d)| state.to_local(*id, d)))
    }

    fn document(&self, id: DocumentId) -> SyncResult<Option<LocalDocument>> {
        let state = self.state.read();
        Ok(state.documents.get(&id).map(|d| state.to_local(id, d)))
    }

    fn create_document(&self, document: NewDocument) -> SyncResult<DocumentId> {
        let mut state = self.state.write();
        let id = DocumentId(state.next_id());
        if !document.content_html.is_empty() {
            state.content_writes += 1;
        }
        state.documents.insert(
            id,
            StoredDocument {
                title: document.title,
                content_html: document.content_html,
                remote_guid: document.remote_guid,
                content_hash_hex: document.content_hash_hex,
                updated: document.updated,
                source_url: document.source_url,
                terms: Vec::new(),
                deleted: false,
            },
        );
        Ok(id)
    }

    fn update_document(&self, id: DocumentId, patch: DocumentPatch) -> SyncResult<()> {
        let mut state = self.state.write();
        let rewrites = patch.rewrites_content();
        let doc = state.document_mut(id)?;
        if let Some(title) = patch.title {
            doc.title = title;
        }
        if let Some(html) = patch.content_html {
            doc.content_html = html;
        }
        if let Some(guid) = patch.remote_guid {
            doc.remote_guid = Some(guid);
        }
        if let Some(hash) = patch.content_hash_hex {
            doc.content_hash_hex = Some(hash);
        }
        if let Some(updated) = patch.updated {
            doc.updated = updated;
        }
        if let Some(url) = patch.source_url {
            doc.source_url = url;
        }
        if let Some(deleted) = patch.deleted {
            doc.deleted = deleted;
        }
        if rewrites {
            state.content_writes += 1;
        }
        Ok(())
    }

    fn soft_delete_document(&self, id: DocumentId) -> SyncResult<()> {
        let mut state = self.state.write();
        state.document_mut(id)?.deleted = true;
        Ok(())
    }

    fn attach_resource(&self, attachment: NewAttachment) -> SyncResult<LocalAttachment> {
        let mut state = self.state.write();
        if !state.documents.contains_key(&attachment.document) {
            return Err(SyncError::NotFound(attachment.document.to_string()));
        }
        let id = AttachmentId(state.next_id());
        let local = LocalAttachment {
            id,
            document: attachment.document,
            resource_guid: attachment.resource_guid,
            content_hash_hex: attachment.content_hash_hex,
            mime: attachment.mime,
            url: format!("/attachments/{}/{}", id.0, attachment.file_name),
            file_name: attachment.file_name,
        };
        state
            .attachments
            .insert(id, (local.clone(), attachment.bytes));
        Ok(local)
    }

    fn find_attachment_by_content_hash(&self, hash_hex: &str) -> SyncResult<Option<LocalAttachment>> {
        Ok(self
            .state
            .read()
            .attachments
            .values()
            .find(|(a, _)| a.content_hash_hex.eq_ignore_ascii_case(hash_hex))
            .map(|(a, _)| a.clone()))
    }

    fn find_attachment_by_resource_guid(&self, guid: &str) -> SyncResult<Option<LocalAttachment>> {
        Ok(self
            .state
            .read()
            .attachments
            .values()
            .find(|(a, _)| a.resource_guid == guid)
            .map(|(a, _)| a.clone()))
    }

    fn attachments_for_document(&self, id: DocumentId) -> SyncResult<Vec<LocalAttachment>> {
        Ok(self
            .state
            .read()
            .attachments
            .values()
            .filter(|(a, _)| a.document == id)
            .map(|(a, _)| a.clone())
            .collect())
    }

    fn delete_attachment(&self, id: AttachmentId) -> SyncResult<()> {
        self.state.write().attachments.remove(&id);
        Ok(())
    }

    fn find_term(&self, kind: BindingKind, guid: &str) -> SyncResult<Option<LocalTerm>> {
        Ok(self
            .state
            .read()
            .terms
            .values()
            .find(|t| t.kind == kind && t.guid == guid)
            .cloned())
    }

    fn create_term(&self, term: NewTerm) -> SyncResult<LocalTerm> {
        let mut state = self.state.write();
        if state
            .terms
            .values()
            .any(|t| t.kind == term.kind && t.guid == term.guid)
        {
            return Err(SyncError::Store(format!(
                "duplicate {} term {}",
                term.kind, term.guid
            )));
        }
        let id = TermId(state.next_id());
        let local = LocalTerm {
            id,
            kind: term.kind,
            guid: term.guid,
            name: term.name,
            parent: term.parent,
        };
        state.terms.insert(id, local.clone());
        Ok(local)
    }

    fn rename_term(&self, id: TermId, name: &str) -> SyncResult<()> {
        let mut state = self.state.write();
        let term = state
            .terms
            .get_mut(&id)
            .ok_or_else(|| SyncError::NotFound(format!("term#{}", id.0)))?;
        term.name = name.to_string();
        Ok(())
    }

    fn bind_term(&self, document: DocumentId, term: TermId) -> SyncResult<()> {
        let mut state = self.state.write();
        let doc = state.document_mut(document)?;
        if !doc.terms.contains(&term) {
            doc.terms.push(term);
        }
        Ok(())
    }

    fn unbind_term(&self, document: DocumentId, term: TermId) -> SyncResult<()> {
        let mut state = self.state.write();
        state.document_mut(document)?.terms.retain(|t| *t != term);
        Ok(())
    }
}
