//! Local-to-remote push path.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::remote::RemoteSyncClient;
use crate::store::{DocumentId, DocumentPatch, LocalDocument, LocalStore};
use crate::suppression::PushSuppression;
use notesync_content::{to_wire, validate_wire};
use notesync_protocol::{BindingKind, NoteSpec};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of handling a "document saved" event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// The save came from inbound sync and was ignored.
    Suppressed,
    /// Nothing was pushed.
    Skipped(String),
    /// A remote note was created.
    Created {
        /// Guid assigned by the remote.
        guid: String,
    },
    /// The remote note was updated.
    Updated {
        /// Remote guid.
        guid: String,
    },
    /// The content was refused, locally or by the remote.
    Rejected {
        /// Why.
        reason: String,
    },
}

/// Pushes locally saved documents to the remote.
///
/// After a successful push the returned guid and content hash are recorded
/// on the document, so the next inbound pass sees the note as unchanged and
/// does not rewrite the body that was just pushed.
pub struct OutboundSync {
    config: SyncConfig,
    remote: Arc<dyn RemoteSyncClient>,
    store: Arc<dyn LocalStore>,
    suppression: PushSuppression,
}

impl OutboundSync {
    /// Creates a push path sharing `suppression` with the inbound side.
    pub fn new(
        config: SyncConfig,
        remote: Arc<dyn RemoteSyncClient>,
        store: Arc<dyn LocalStore>,
        suppression: PushSuppression,
    ) -> Self {
        Self {
            config,
            remote,
            store,
            suppression,
        }
    }

    /// Handles a "document saved" event.
    pub fn on_document_saved(&self, id: DocumentId) -> SyncResult<PushOutcome> {
        let account = &self.config.account;
        if self.suppression.is_suppressed(account) {
            debug!(account = %account, document = %id, "push suppressed during inbound sync");
            return Ok(PushOutcome::Suppressed);
        }

        let document = self
            .store
            .document(id)?
            .ok_or_else(|| SyncError::NotFound(id.to_string()))?;
        if document.deleted {
            return Ok(PushOutcome::Skipped("document is deleted".into()));
        }
        let Some(notebook_guid) = self.target_notebook(&document) else {
            debug!(account = %account, document = %id, "document outside synced notebooks");
            return Ok(PushOutcome::Skipped("notebook not synced".into()));
        };

        let content = to_wire(&document.content_html, &self.config.transcode);
        if let Err(e) = validate_wire(&content) {
            warn!(account = %account, document = %id, error = %e, content = %content, "refusing to push invalid content");
            return Ok(PushOutcome::Rejected {
                reason: e.to_string(),
            });
        }

        let spec = NoteSpec {
            guid: document.remote_guid.clone(),
            title: document.title.clone(),
            content,
            notebook_guid,
            tag_guids: document
                .bindings
                .iter()
                .filter(|b| b.kind == BindingKind::Tag)
                .map(|b| b.guid.clone())
                .collect(),
            source_url: document.source_url.clone(),
        };

        let pushed = match &spec.guid {
            Some(_) => self.remote.update_note(&spec),
            None => self.remote.create_note(&spec),
        };
        let note = match pushed {
            Ok(note) => note,
            Err(SyncError::Rejected { reason, .. }) => {
                warn!(
                    account = %account,
                    document = %id,
                    reason = %reason,
                    content = %spec.content,
                    "remote rejected note"
                );
                return Ok(PushOutcome::Rejected { reason });
            }
            Err(e) => return Err(e),
        };

        {
            // Recording the push is itself a save.
            let _guard = self.suppression.suppress(account);
            self.store.update_document(
                id,
                DocumentPatch {
                    remote_guid: document.remote_guid.is_none().then(|| note.guid.clone()),
                    content_hash_hex: Some(note.content_hash.to_hex()),
                    updated: (note.updated > document.updated).then_some(note.updated),
                    ..DocumentPatch::default()
                },
            )?;
        }

        info!(account = %account, document = %id, guid = %note.guid, "pushed note");
        Ok(if document.remote_guid.is_some() {
            PushOutcome::Updated { guid: note.guid }
        } else {
            PushOutcome::Created { guid: note.guid }
        })
    }

    /// Notebook to push into: the bound one if synced, else the first
    /// synced notebook for documents without one.
    fn target_notebook(&self, document: &LocalDocument) -> Option<String> {
        match document.bindings.iter().find(|b| b.kind == BindingKind::Notebook) {
            Some(binding) if self.config.is_in_scope(&binding.guid) => Some(binding.guid.clone()),
            Some(_) => None,
            None => self.config.synced_notebooks.first().cloned(),
        }
    }
}
