//! Applies sync chunks to the local store.
//!
//! Every operation is idempotent per note and per resource, so a chunk may
//! be applied again after a failed tick. Failures are isolated: a
//! non-retryable error on one entity is recorded in the [`ApplyReport`] and
//! the rest of the chunk is still applied. Retryable errors abort the chunk
//! so the cursor is not advanced past it.

use crate::config::SyncConfig;
use crate::effects::{NoSideEffects, SideEffects};
use crate::error::{SyncError, SyncResult};
use crate::reconciler::NotebookTagReconciler;
use crate::remote::RemoteSyncClient;
use crate::store::{DocumentPatch, LocalDocument, LocalStore, NewAttachment, NewDocument};
use crate::suppression::PushSuppression;
use notesync_content::{to_local, ContentHasher, MediaResolver, ResolvedMedia};
use notesync_protocol::{
    BindingKind, NoteFetch, RemoteNote, RemoteResource, SyncChunk, TaxonomyIndex,
};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Kind of entity an [`ApplyFailure`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    /// A note.
    Note,
    /// A resource.
    Resource,
    /// A notebook.
    Notebook,
    /// A tag.
    Tag,
}

impl From<BindingKind> for EntityKind {
    fn from(kind: BindingKind) -> Self {
        match kind {
            BindingKind::Notebook => EntityKind::Notebook,
            BindingKind::Tag => EntityKind::Tag,
        }
    }
}

/// An entity that could not be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyFailure {
    /// Entity kind.
    pub kind: EntityKind,
    /// Remote guid.
    pub guid: String,
    /// Error message.
    pub reason: String,
}

/// Outcome of applying one chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Local documents created.
    pub notes_created: u64,
    /// Existing documents whose fields changed.
    pub notes_updated: u64,
    /// Documents soft-deleted.
    pub notes_deleted: u64,
    /// Notes ignored (out of scope or unknown deletions).
    pub notes_skipped: u64,
    /// Document bodies rewritten.
    pub content_rewrites: u64,
    /// Attachments created.
    pub resources_attached: u64,
    /// Attachments removed.
    pub resources_deleted: u64,
    /// Resources already present or without a tracked note.
    pub resources_skipped: u64,
    /// Local terms renamed from newly observed names.
    pub terms_renamed: u64,
    /// Isolated failures.
    pub failures: Vec<ApplyFailure>,
}

impl ApplyReport {
    /// Notes that changed local state.
    pub fn notes_applied(&self) -> u64 {
        self.notes_created + self.notes_updated + self.notes_deleted
    }

    /// Adds another report's counters to this one.
    pub fn absorb(&mut self, other: ApplyReport) {
        self.notes_created += other.notes_created;
        self.notes_updated += other.notes_updated;
        self.notes_deleted += other.notes_deleted;
        self.notes_skipped += other.notes_skipped;
        self.content_rewrites += other.content_rewrites;
        self.resources_attached += other.resources_attached;
        self.resources_deleted += other.resources_deleted;
        self.resources_skipped += other.resources_skipped;
        self.terms_renamed += other.terms_renamed;
        self.failures.extend(other.failures);
    }
}

/// Resolves media markers against attachments already in the store.
struct StoreMedia<'a> {
    store: &'a dyn LocalStore,
}

impl MediaResolver for StoreMedia<'_> {
    fn resolve(&self, hash_hex: &str) -> Option<ResolvedMedia> {
        match self.store.find_attachment_by_content_hash(hash_hex) {
            Ok(found) => found.map(|a| ResolvedMedia {
                url: a.url,
                file_name: a.file_name,
            }),
            Err(e) => {
                warn!(hash = hash_hex, error = %e, "attachment lookup failed, rendering as pending");
                None
            }
        }
    }
}

/// Applies one chunk's notebooks, tags, notes and resources.
pub struct ChangeApplier<'a> {
    config: &'a SyncConfig,
    store: &'a dyn LocalStore,
    remote: &'a dyn RemoteSyncClient,
    suppression: &'a PushSuppression,
    effects: &'a dyn SideEffects,
}

impl<'a> ChangeApplier<'a> {
    /// Creates an applier for the configured account.
    pub fn new(
        config: &'a SyncConfig,
        store: &'a dyn LocalStore,
        remote: &'a dyn RemoteSyncClient,
        suppression: &'a PushSuppression,
    ) -> Self {
        Self {
            config,
            store,
            remote,
            suppression,
            effects: &NoSideEffects,
        }
    }

    /// Sets the receiver of side effects.
    pub fn with_side_effects(mut self, effects: &'a dyn SideEffects) -> Self {
        self.effects = effects;
        self
    }

    /// Applies `chunk`, merging its notebooks and tags into `index`.
    ///
    /// Pushes for the account are suppressed for the whole call.
    pub fn apply(&self, chunk: &SyncChunk, index: &mut TaxonomyIndex) -> SyncResult<ApplyReport> {
        let _guard = self.suppression.suppress(&self.config.account);
        let mut report = ApplyReport::default();

        self.merge_taxonomy(chunk, index, &mut report)?;

        let mut handled: HashSet<&str> = HashSet::new();
        for note in &chunk.notes {
            match self.apply_note(note, chunk, index, &mut report) {
                Ok(()) => handled.extend(chunk.resources_for(&note.guid).map(|r| r.guid.as_str())),
                Err(e) => self.isolate(e, EntityKind::Note, &note.guid, &mut report)?,
            }
        }

        for resource in &chunk.resources {
            if handled.contains(resource.guid.as_str()) {
                continue;
            }
            if let Err(e) = self.apply_detached_resource(resource, &mut report) {
                self.isolate(e, EntityKind::Resource, &resource.guid, &mut report)?;
            }
        }

        info!(
            account = %self.config.account,
            created = report.notes_created,
            updated = report.notes_updated,
            deleted = report.notes_deleted,
            rewrites = report.content_rewrites,
            attached = report.resources_attached,
            failures = report.failures.len(),
            "applied chunk"
        );
        Ok(report)
    }

    fn isolate(
        &self,
        error: SyncError,
        kind: EntityKind,
        guid: &str,
        report: &mut ApplyReport,
    ) -> SyncResult<()> {
        if error.is_retryable() {
            return Err(error);
        }
        warn!(account = %self.config.account, ?kind, guid, error = %error, "skipping entity");
        report.failures.push(ApplyFailure {
            kind,
            guid: guid.to_string(),
            reason: error.to_string(),
        });
        Ok(())
    }

    /// Merges chunk notebooks and tags into the cache and renames local
    /// terms created earlier under a placeholder or stale name.
    fn merge_taxonomy(
        &self,
        chunk: &SyncChunk,
        index: &mut TaxonomyIndex,
        report: &mut ApplyReport,
    ) -> SyncResult<()> {
        let notebooks = index.merge_notebooks(&chunk.notebooks);
        let tags = index.merge_tags(&chunk.tags);

        let changed = notebooks
            .into_iter()
            .map(|g| (BindingKind::Notebook, g))
            .chain(tags.into_iter().map(|g| (BindingKind::Tag, g)));
        for (kind, guid) in changed {
            let name = match kind {
                BindingKind::Notebook => index.notebook_name(&guid),
                BindingKind::Tag => index.tag_name(&guid),
            };
            let Some(name) = name else { continue };
            match self.rename_if_stale(kind, &guid, name) {
                Ok(true) => report.terms_renamed += 1,
                Ok(false) => {}
                Err(e) => self.isolate(e, kind.into(), &guid, report)?,
            }
        }
        Ok(())
    }

    fn rename_if_stale(&self, kind: BindingKind, guid: &str, name: &str) -> SyncResult<bool> {
        match self.store.find_term(kind, guid)? {
            Some(term) if term.name != name => {
                debug!(%kind, guid, from = %term.name, to = name, "renaming term");
                self.store.rename_term(term.id, name)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn apply_note(
        &self,
        note: &RemoteNote,
        chunk: &SyncChunk,
        index: &TaxonomyIndex,
        report: &mut ApplyReport,
    ) -> SyncResult<()> {
        let existing = self.store.find_document_by_remote_guid(&note.guid)?;

        if note.deleted {
            match existing {
                Some(document) => self.delete_document(&document, report)?,
                None => {
                    debug!(guid = %note.guid, "deleted note was never synced");
                    report.notes_skipped += 1;
                }
            }
            return Ok(());
        }

        let (document, created) = match existing {
            Some(document) => (document, false),
            None if !self.config.is_in_scope(&note.notebook_guid) => {
                debug!(guid = %note.guid, notebook = %note.notebook_guid, "note outside synced notebooks");
                report.notes_skipped += 1;
                report.resources_skipped += chunk.resources_for(&note.guid).count() as u64;
                return Ok(());
            }
            None => (self.create_document(note)?, true),
        };
        if created {
            report.notes_created += 1;
        }

        // Resources first, so markers in the body resolve on this pass.
        let mut attached = 0usize;
        for resource in chunk.resources_for(&note.guid) {
            match self.apply_resource(resource, &document, report) {
                Ok(true) => attached += 1,
                Ok(false) => {}
                Err(e) => self.isolate(e, EntityKind::Resource, &resource.guid, report)?,
            }
        }

        let hash_hex = note.content_hash.to_hex();
        let changed = document.remote_content_hash_hex.as_deref() != Some(hash_hex.as_str());

        let mut patch = DocumentPatch::default();
        if changed || attached > 0 {
            let content = self.fetch_content(note)?;
            patch.content_html = Some(self.render(&content));
            patch.content_hash_hex = Some(hash_hex);
        } else {
            debug!(guid = %note.guid, "content unchanged");
        }
        if document.title != note.title {
            patch.title = Some(note.title.clone());
        }
        if document.remote_guid.is_none() {
            patch.remote_guid = Some(note.guid.clone());
        }
        if note.updated > document.updated {
            patch.updated = Some(note.updated);
        }
        if document.source_url.as_deref() != note.source_url() {
            patch.source_url = Some(note.source_url().map(str::to_string));
        }
        if document.deleted {
            patch.deleted = Some(false);
        }

        if patch.rewrites_content() {
            report.content_rewrites += 1;
        }
        if !patch.is_empty() {
            self.store.update_document(document.id, patch)?;
            if !created {
                report.notes_updated += 1;
            }
        }

        NotebookTagReconciler::new(self.store, self.remote).reconcile(
            document.id,
            &document.bindings,
            &note.bindings(),
            index,
        )?;
        Ok(())
    }

    fn create_document(&self, note: &RemoteNote) -> SyncResult<LocalDocument> {
        let id = self.store.create_document(NewDocument {
            title: note.title.clone(),
            content_html: String::new(),
            remote_guid: Some(note.guid.clone()),
            content_hash_hex: None,
            updated: note.updated,
            source_url: note.source_url().map(str::to_string),
        })?;
        debug!(guid = %note.guid, document = %id, "created document");
        self.store
            .document(id)?
            .ok_or_else(|| SyncError::Store(format!("created {id} is missing")))
    }

    fn delete_document(&self, document: &LocalDocument, report: &mut ApplyReport) -> SyncResult<()> {
        for attachment in self.store.attachments_for_document(document.id)? {
            self.store.delete_attachment(attachment.id)?;
            report.resources_deleted += 1;
        }
        if !document.deleted {
            self.store.soft_delete_document(document.id)?;
            report.notes_deleted += 1;
            debug!(document = %document.id, "deleted document");
        }
        Ok(())
    }

    fn fetch_content(&self, note: &RemoteNote) -> SyncResult<String> {
        if !note.content.is_empty() {
            return Ok(note.content.clone());
        }
        Ok(self.remote.get_note(&note.guid, NoteFetch::content_only())?.content)
    }

    fn render(&self, wire: &str) -> String {
        to_local(wire, &StoreMedia { store: self.store }, &self.config.transcode)
    }

    /// Applies one resource of a tracked document. Returns true when a new
    /// attachment was created.
    fn apply_resource(
        &self,
        resource: &RemoteResource,
        document: &LocalDocument,
        report: &mut ApplyReport,
    ) -> SyncResult<bool> {
        let existing = self.store.find_attachment_by_resource_guid(&resource.guid)?;
        if resource.deleted {
            if let Some(attachment) = existing {
                self.store.delete_attachment(attachment.id)?;
                report.resources_deleted += 1;
            }
            return Ok(false);
        }
        if existing.is_some() {
            report.resources_skipped += 1;
            return Ok(false);
        }

        let bytes = match &resource.data {
            Some(data) => data.clone(),
            None => self.remote.get_resource_data(&resource.guid)?,
        };
        if !resource.body_hash.is_empty() && !ContentHasher::matches(&bytes, &resource.body_hash) {
            return Err(SyncError::Integrity(format!(
                "resource {} body does not match hash {}",
                resource.guid, resource.body_hash
            )));
        }

        let attachment = self.store.attach_resource(NewAttachment {
            document: document.id,
            resource_guid: resource.guid.clone(),
            bytes,
            mime: resource.mime.clone(),
            file_name: resource_file_name(resource),
            content_hash_hex: resource.body_hash.to_hex(),
        })?;
        debug!(guid = %resource.guid, document = %document.id, url = %attachment.url, "attached resource");

        if resource.is_audio() {
            self.effects
                .transcription_requested(document.id, &attachment, &resource.mime);
        }
        report.resources_attached += 1;
        Ok(true)
    }

    /// Applies a resource whose note is not part of this chunk.
    fn apply_detached_resource(
        &self,
        resource: &RemoteResource,
        report: &mut ApplyReport,
    ) -> SyncResult<()> {
        let document = match self.store.find_document_by_remote_guid(&resource.note_guid)? {
            Some(document) if !document.deleted => document,
            _ => {
                debug!(guid = %resource.guid, note = %resource.note_guid, "resource without tracked note");
                report.resources_skipped += 1;
                return Ok(());
            }
        };
        if self.apply_resource(resource, &document, report)? {
            self.relink(&document, report)?;
        }
        Ok(())
    }

    /// Re-renders a document so pending media markers pick up new attachments.
    fn relink(&self, document: &LocalDocument, report: &mut ApplyReport) -> SyncResult<()> {
        let Some(guid) = document.remote_guid.as_deref() else {
            return Ok(());
        };
        let note = self.remote.get_note(guid, NoteFetch::content_only())?;
        self.store.update_document(
            document.id,
            DocumentPatch {
                content_html: Some(self.render(&note.content)),
                content_hash_hex: Some(note.content_hash.to_hex()),
                ..DocumentPatch::default()
            },
        )?;
        report.content_rewrites += 1;
        Ok(())
    }
}

/// File name of a resource: its own, or `guid.ext` from the mime type.
pub fn resource_file_name(resource: &RemoteResource) -> String {
    match resource.file_name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => format!("{}.{}", resource.guid, extension_for(&resource.mime)),
    }
}

fn extension_for(mime: &str) -> &'static str {
    match mime.to_ascii_lowercase().as_str() {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "application/pdf" => "pdf",
        "audio/wav" | "audio/x-wav" => "wav",
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/amr" => "amr",
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" => "m4a",
        "video/mp4" => "mp4",
        "text/plain" => "txt",
        _ => "bin",
    }
}
