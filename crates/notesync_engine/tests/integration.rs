//! Integration tests for inbound sync, outbound push and their interplay.

use notesync_content::{wrap_document, ContentHasher};
use notesync_engine::{
    AccountId, AttachmentId, BindingDiff, DocumentId, DocumentPatch, FileCursorStore,
    LocalAttachment, LocalDocument, LocalStore, LocalTerm, MemoryCursorStore, MemoryLocalStore,
    MemoryScheduler, MockRemote, NewAttachment, NewDocument, NewTerm, NoOpReason, OutboundSync,
    PushOutcome, PushSuppression, RecordingSideEffects, RemoteSyncClient, SyncConfig, SyncCursor,
    SyncCursorStore, SyncError, SyncOrchestrator, SyncResult, TermId, TickOutcome,
};
use notesync_protocol::{
    Binding, BindingKind, NoteFetch, NoteSpec, RemoteNote, RemoteNotebook, RemoteResource,
    SyncChunk, SyncChunkFilter, SyncState, Usn,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

/// A remote whose resource downloads time out a given number of times.
struct FlakyRemote {
    inner: Arc<MockRemote>,
    download_failures: AtomicUsize,
}

impl RemoteSyncClient for FlakyRemote {
    fn get_sync_state(&self) -> SyncResult<SyncState> {
        self.inner.get_sync_state()
    }

    fn get_filtered_sync_chunk(
        &self,
        usn: Usn,
        max_entries: i32,
        filter: &SyncChunkFilter,
    ) -> SyncResult<SyncChunk> {
        self.inner.get_filtered_sync_chunk(usn, max_entries, filter)
    }

    fn get_note(&self, guid: &str, fetch: NoteFetch) -> SyncResult<RemoteNote> {
        self.inner.get_note(guid, fetch)
    }

    fn create_note(&self, note: &NoteSpec) -> SyncResult<RemoteNote> {
        self.inner.create_note(note)
    }

    fn update_note(&self, note: &NoteSpec) -> SyncResult<RemoteNote> {
        self.inner.update_note(note)
    }

    fn get_notebook(&self, guid: &str) -> SyncResult<RemoteNotebook> {
        self.inner.get_notebook(guid)
    }

    fn get_resource_data(&self, guid: &str) -> SyncResult<Vec<u8>> {
        let left = self.download_failures.load(Ordering::SeqCst);
        if left > 0 {
            self.download_failures.store(left - 1, Ordering::SeqCst);
            return Err(SyncError::Timeout);
        }
        self.inner.get_resource_data(guid)
    }

    fn get_resource(&self, guid: &str, with_data: bool) -> SyncResult<RemoteResource> {
        self.inner.get_resource(guid, with_data)
    }
}

/// A store that fires the "document saved" event on every document write,
/// the way the host application does.
struct EventedStore {
    inner: MemoryLocalStore,
    outbound: OnceLock<Arc<OutboundSync>>,
    outcomes: Mutex<Vec<PushOutcome>>,
}

impl EventedStore {
    fn saved(&self, id: DocumentId) {
        if let Some(outbound) = self.outbound.get() {
            if let Ok(outcome) = outbound.on_document_saved(id) {
                self.outcomes.lock().push(outcome);
            }
        }
    }

    fn take_outcomes(&self) -> Vec<PushOutcome> {
        std::mem::take(&mut *self.outcomes.lock())
    }
}

impl LocalStore for EventedStore {
    fn find_document_by_remote_guid(&self, guid: &str) -> SyncResult<Option<LocalDocument>> {
        self.inner.find_document_by_remote_guid(guid)
    }

    fn document(&self, id: DocumentId) -> SyncResult<Option<LocalDocument>> {
        self.inner.document(id)
    }

    fn create_document(&self, document: NewDocument) -> SyncResult<DocumentId> {
        let id = self.inner.create_document(document)?;
        self.saved(id);
        Ok(id)
    }

    fn update_document(&self, id: DocumentId, patch: DocumentPatch) -> SyncResult<()> {
        self.inner.update_document(id, patch)?;
        self.saved(id);
        Ok(())
    }

    fn soft_delete_document(&self, id: DocumentId) -> SyncResult<()> {
        self.inner.soft_delete_document(id)
    }

    fn attach_resource(&self, attachment: NewAttachment) -> SyncResult<LocalAttachment> {
        self.inner.attach_resource(attachment)
    }

    fn find_attachment_by_content_hash(&self, hash_hex: &str) -> SyncResult<Option<LocalAttachment>> {
        self.inner.find_attachment_by_content_hash(hash_hex)
    }

    fn find_attachment_by_resource_guid(&self, guid: &str) -> SyncResult<Option<LocalAttachment>> {
        self.inner.find_attachment_by_resource_guid(guid)
    }

    fn attachments_for_document(&self, id: DocumentId) -> SyncResult<Vec<LocalAttachment>> {
        self.inner.attachments_for_document(id)
    }

    fn delete_attachment(&self, id: AttachmentId) -> SyncResult<()> {
        self.inner.delete_attachment(id)
    }

    fn find_term(&self, kind: BindingKind, guid: &str) -> SyncResult<Option<LocalTerm>> {
        self.inner.find_term(kind, guid)
    }

    fn create_term(&self, term: NewTerm) -> SyncResult<LocalTerm> {
        self.inner.create_term(term)
    }

    fn rename_term(&self, id: TermId, name: &str) -> SyncResult<()> {
        self.inner.rename_term(id, name)
    }

    fn bind_term(&self, document: DocumentId, term: TermId) -> SyncResult<()> {
        self.inner.bind_term(document, term)
    }

    fn unbind_term(&self, document: DocumentId, term: TermId) -> SyncResult<()> {
        self.inner.unbind_term(document, term)
    }
}

struct Setup {
    remote: Arc<MockRemote>,
    store: Arc<MemoryLocalStore>,
    cursors: Arc<MemoryCursorStore>,
    scheduler: Arc<MemoryScheduler>,
    orchestrator: SyncOrchestrator,
}

fn config() -> SyncConfig {
    SyncConfig::new("alice").with_synced_notebooks(["NB1"])
}

fn setup(config: SyncConfig) -> Setup {
    let remote = Arc::new(MockRemote::new());
    let store = Arc::new(MemoryLocalStore::new());
    let cursors = Arc::new(MemoryCursorStore::new());
    let scheduler = Arc::new(MemoryScheduler::new());
    let orchestrator = SyncOrchestrator::new(
        config,
        remote.clone(),
        store.clone(),
        cursors.clone(),
        scheduler.clone(),
    );
    Setup {
        remote,
        store,
        cursors,
        scheduler,
        orchestrator,
    }
}

fn note(guid: &str, notebook: &str, body: &str) -> RemoteNote {
    RemoteNote {
        guid: guid.into(),
        title: format!("Note {guid}"),
        content: wrap_document(body),
        notebook_guid: notebook.into(),
        ..RemoteNote::default()
    }
}

fn doc(store: &dyn LocalStore, guid: &str) -> LocalDocument {
    store.find_document_by_remote_guid(guid).unwrap().unwrap()
}

/// Runs ticks and queued continuations until the pass completes.
fn sync_to_completion(s: &Setup) -> usize {
    let mut ticks = 1;
    let mut outcome = s.orchestrator.tick().unwrap();
    while let TickOutcome::Continued { .. } = outcome {
        let (_, payload) = s.scheduler.pop_next().unwrap();
        outcome = s.orchestrator.handle_continuation(&payload).unwrap();
        ticks += 1;
    }
    assert!(
        matches!(outcome, TickOutcome::Completed { .. } | TickOutcome::NoOp(_)),
        "pass ended with {outcome:?}"
    );
    ticks
}

#[test]
fn first_sync_creates_bound_document() {
    let s = setup(config());
    s.remote.put_notebook("NB1", "Inbox");
    s.remote.put_note(note("N1", "NB1", "<div>Hello <b>world</b></div>"));

    let outcome = s.orchestrator.tick().unwrap();
    assert!(matches!(outcome, TickOutcome::Completed { usn: 2, .. }));

    let d = doc(s.store.as_ref(), "N1");
    assert_eq!(d.content_html, "<div>Hello <b>world</b></div>");
    assert_eq!(
        d.remote_content_hash_hex,
        Some(s.remote.note("N1").unwrap().content_hash.to_hex())
    );
    assert_eq!(d.bindings, vec![Binding::notebook("NB1")]);
    let notebook = s.store.find_term(BindingKind::Notebook, "NB1").unwrap().unwrap();
    assert_eq!(notebook.name, "Inbox");

    // Nothing changed remotely: the next tick does not fetch anything.
    let writes = s.store.content_writes();
    assert_eq!(
        s.orchestrator.tick().unwrap(),
        TickOutcome::NoOp(NoOpReason::Unchanged)
    );
    assert_eq!(s.store.content_writes(), writes);
    assert_eq!(s.remote.chunk_requests(), 1);
}

#[test]
fn new_resource_resolves_in_the_same_pass() {
    let s = setup(config());
    s.remote.put_note(note("N1", "NB1", "<div>before</div>"));
    s.orchestrator.tick().unwrap();

    let image = b"\x89PNG fake";
    let rh = ContentHasher::hex(image);
    s.remote.put_resource("R1", "N1", "image/png", image, Some("photo.png"));
    s.remote.put_note(note(
        "N1",
        "NB1",
        &format!(r#"<div>after</div><en-media hash="{rh}" type="image/png"/>"#),
    ));

    s.orchestrator.tick().unwrap();
    let attachments = s.store.attachments();
    assert_eq!(attachments.len(), 1);
    assert_eq!(attachments[0].resource_guid, "R1");
    assert_eq!(s.store.attachment_bytes(attachments[0].id), Some(image.to_vec()));

    let html = doc(s.store.as_ref(), "N1").content_html;
    assert!(html.contains(&format!(r#"src="{}""#, attachments[0].url)));
    assert!(html.contains(&format!(r#"data-en-hash="{rh}""#)));
    assert!(!html.contains("en-media-pending"));
}

#[test]
fn reapplying_after_a_lost_cursor_is_idempotent() {
    let s = setup(config());
    s.remote.put_notebook("NB1", "Inbox");
    s.remote.put_resource("R1", "N1", "application/pdf", b"%PDF", None);
    s.remote.put_note(note("N1", "NB1", "<div>x</div>"));
    s.orchestrator.tick().unwrap();
    let documents = s.store.documents();
    let attachments = s.store.attachments();
    let writes = s.store.content_writes();

    // As if the process died before the cursor was advanced.
    let account = s.orchestrator.config().account.clone();
    s.cursors.save_cursor(&account, &SyncCursor::initial()).unwrap();
    s.orchestrator.tick().unwrap();

    assert_eq!(s.store.documents(), documents);
    assert_eq!(s.store.attachments(), attachments);
    assert_eq!(s.store.content_writes(), writes);
    assert_eq!(s.store.terms().len(), 1);
}

#[test]
fn metadata_changes_apply_without_content_rewrite() {
    let s = setup(config());
    s.remote.put_note(note("N1", "NB1", "<div>same</div>"));
    s.orchestrator.tick().unwrap();
    let writes = s.store.content_writes();

    let mut retitled = note("N1", "NB1", "<div>same</div>");
    retitled.title = "Renamed".into();
    retitled.tag_guids = vec!["T1".into()];
    s.remote.put_tag("T1", "reading", None);
    s.remote.put_note(retitled);
    s.orchestrator.tick().unwrap();

    let d = doc(s.store.as_ref(), "N1");
    assert_eq!(d.title, "Renamed");
    assert_eq!(d.bindings, vec![Binding::notebook("NB1"), Binding::tag("T1")]);
    assert_eq!(s.store.content_writes(), writes);
}

#[test]
fn deleting_a_note_cascades() {
    let s = setup(config());
    s.remote.put_resource("R1", "N1", "image/png", b"one", None);
    s.remote.put_resource("R2", "N1", "image/png", b"two", None);
    s.remote.put_note(note("N1", "NB1", "<div>x</div>"));
    s.orchestrator.tick().unwrap();
    assert_eq!(s.store.attachments().len(), 2);

    s.remote.delete_note("N1").unwrap();
    s.orchestrator.tick().unwrap();
    assert!(doc(s.store.as_ref(), "N1").deleted);
    assert!(s.store.attachments().is_empty());

    // A deleted note that was never synced leaves no trace.
    s.remote.put_note(note("N2", "NB1", "<div>y</div>"));
    s.remote.delete_note("N2").unwrap();
    s.orchestrator.tick().unwrap();
    assert!(s.store.find_document_by_remote_guid("N2").unwrap().is_none());
}

#[test]
fn scope_only_gates_creation() {
    let s = setup(config());
    s.remote.put_note(note("N1", "NB1", "<div>in</div>"));
    s.remote.put_note(note("N2", "NB2", "<div>out</div>"));
    s.orchestrator.tick().unwrap();
    assert!(s.store.find_document_by_remote_guid("N2").unwrap().is_none());

    // A tracked note moved to an unsynced notebook keeps syncing.
    s.remote.put_note(note("N1", "NB2", "<div>moved</div>"));
    s.orchestrator.tick().unwrap();
    let d = doc(s.store.as_ref(), "N1");
    assert_eq!(d.content_html, "<div>moved</div>");
    assert_eq!(d.bindings, vec![Binding::notebook("NB2")]);
}

#[test]
fn paged_pass_continues_until_complete() {
    let s = setup(config().with_chunk_size(2));
    for i in 0..5 {
        s.remote.put_note(note(&format!("N{i}"), "NB1", "<div>page</div>"));
    }
    let job = s.orchestrator.config().periodic_job_key();

    let first = s.orchestrator.tick().unwrap();
    assert!(matches!(first, TickOutcome::Continued { next_usn: 2, .. }));
    assert!(s.scheduler.is_paused(&job));
    assert_eq!(s.scheduler.pending().len(), 1);

    let (_, payload) = s.scheduler.pop_next().unwrap();
    let mut outcome = s.orchestrator.handle_continuation(&payload).unwrap();
    while let TickOutcome::Continued { .. } = outcome {
        let (_, payload) = s.scheduler.pop_next().unwrap();
        outcome = s.orchestrator.handle_continuation(&payload).unwrap();
    }
    assert!(matches!(outcome, TickOutcome::Completed { usn: 5, .. }));
    assert!(!s.scheduler.is_paused(&job));
    assert_eq!(s.store.documents().len(), 5);
    assert_eq!(s.remote.chunk_requests(), 3);
}

#[test]
fn timed_out_download_retries_the_whole_chunk() {
    let mock = Arc::new(MockRemote::new());
    let remote = Arc::new(FlakyRemote {
        inner: mock.clone(),
        download_failures: AtomicUsize::new(1),
    });
    let store = Arc::new(MemoryLocalStore::new());
    let cursors = Arc::new(MemoryCursorStore::new());
    let orchestrator = SyncOrchestrator::new(
        config(),
        remote,
        store.clone(),
        cursors.clone(),
        Arc::new(MemoryScheduler::new()),
    );

    let bytes = b"gif";
    mock.put_note(note(
        "N1",
        "NB1",
        &format!(r#"<en-media type="image/gif" hash="{}"/>"#, ContentHasher::hex(bytes)),
    ));
    mock.put_resource("R1", "N1", "image/gif", bytes, None);

    assert_eq!(orchestrator.tick().unwrap(), TickOutcome::Stalled);
    let cursor = cursors.load_cursor(&"alice".into()).unwrap();
    assert_eq!(cursor.usn, 0);
    assert!(!cursor.pass_complete);

    let outcome = orchestrator.tick().unwrap();
    assert!(matches!(outcome, TickOutcome::Completed { usn: 2, .. }));
    assert_eq!(store.documents().len(), 1);
    assert_eq!(store.attachments().len(), 1);
    assert!(doc(store.as_ref(), "N1").content_html.contains("<img"));
}

#[test]
fn inbound_writes_never_push() {
    let remote = Arc::new(MockRemote::new());
    let store = Arc::new(EventedStore {
        inner: MemoryLocalStore::new(),
        outbound: OnceLock::new(),
        outcomes: Mutex::new(Vec::new()),
    });
    let suppression = PushSuppression::new();
    let outbound = Arc::new(OutboundSync::new(
        config(),
        remote.clone(),
        store.clone(),
        suppression.clone(),
    ));
    assert!(store.outbound.set(outbound).is_ok());
    let orchestrator = SyncOrchestrator::new(
        config(),
        remote.clone(),
        store.clone(),
        Arc::new(MemoryCursorStore::new()),
        Arc::new(MemoryScheduler::new()),
    )
    .with_suppression(suppression);

    remote.put_notebook("NB1", "Inbox");
    remote.put_note(note("N1", "NB1", "<div>remote</div>"));
    let before = remote.update_count();
    orchestrator.tick().unwrap();

    let outcomes = store.take_outcomes();
    assert!(!outcomes.is_empty());
    assert!(outcomes.iter().all(|o| *o == PushOutcome::Suppressed));
    assert_eq!(remote.update_count(), before);

    // A user edit goes out once, and the echo does not come back in.
    let id = doc(store.as_ref(), "N1").id;
    store
        .update_document(
            id,
            DocumentPatch {
                content_html: Some("<div>local edit</div>".into()),
                ..DocumentPatch::default()
            },
        )
        .unwrap();
    let outcomes = store.take_outcomes();
    let (pushed, echoed): (Vec<_>, Vec<_>) = outcomes
        .into_iter()
        .partition(|o| *o != PushOutcome::Suppressed);
    assert_eq!(pushed, vec![PushOutcome::Updated { guid: "N1".into() }]);
    assert!(!echoed.is_empty());
    assert_eq!(remote.update_count(), before + 1);

    orchestrator.tick().unwrap();
    assert_eq!(doc(store.as_ref(), "N1").content_html, "<div>local edit</div>");
    assert_eq!(remote.update_count(), before + 1);
    assert_eq!(
        orchestrator.tick().unwrap(),
        TickOutcome::NoOp(NoOpReason::Unchanged)
    );
}

#[test]
fn pushed_note_is_not_rewritten_by_the_next_pull() {
    let s = setup(config());
    s.remote.put_notebook("NB1", "Inbox");
    s.orchestrator.tick().unwrap();

    let id = s
        .store
        .create_document(NewDocument {
            title: "Local".into(),
            content_html: r#"<p>draft <span class="en-todo">x</span></p>"#.into(),
            ..NewDocument::default()
        })
        .unwrap();
    let outbound = OutboundSync::new(
        config(),
        s.remote.clone(),
        s.store.clone(),
        s.orchestrator.suppression().clone(),
    );
    let PushOutcome::Created { guid } = outbound.on_document_saved(id).unwrap() else {
        panic!("expected a create");
    };
    let wire = s.remote.note(&guid).unwrap().content;
    assert!(wire.contains(r#"<en-todo checked="true""#));
    assert!(wire.contains("<div>draft"));

    let writes = s.store.content_writes();
    s.orchestrator.tick().unwrap();
    let d = s.store.document(id).unwrap().unwrap();
    assert_eq!(d.content_html, r#"<p>draft <span class="en-todo">x</span></p>"#);
    assert_eq!(s.store.content_writes(), writes);
    assert_eq!(d.bindings, vec![Binding::notebook("NB1")]);
    assert_eq!(s.store.documents().len(), 1);
}

#[test]
fn rejected_push_is_reported() {
    let s = setup(config());
    s.remote.reject_content_containing("<table");
    let id = s
        .store
        .create_document(NewDocument {
            content_html: "<table><tr><td>x</td></tr></table>".into(),
            ..NewDocument::default()
        })
        .unwrap();
    let outbound = OutboundSync::new(
        config(),
        s.remote.clone(),
        s.store.clone(),
        PushSuppression::new(),
    );
    assert!(matches!(
        outbound.on_document_saved(id).unwrap(),
        PushOutcome::Rejected { .. }
    ));
    assert_eq!(s.remote.update_count(), 0);
}

#[test]
fn audio_resources_request_transcription() {
    let effects = Arc::new(RecordingSideEffects::new());
    let remote = Arc::new(MockRemote::new());
    let store = Arc::new(MemoryLocalStore::new());
    let orchestrator = SyncOrchestrator::new(
        config(),
        remote.clone(),
        store.clone(),
        Arc::new(MemoryCursorStore::new()),
        Arc::new(MemoryScheduler::new()),
    )
    .with_side_effects(effects.clone());

    remote.put_resource("R1", "N1", "audio/amr", b"#!AMR", None);
    remote.put_resource("R2", "N1", "image/jpeg", b"jpeg", None);
    remote.put_note(note("N1", "NB1", "<div>voice memo</div>"));
    orchestrator.tick().unwrap();

    let requests = effects.transcriptions();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].attachment.resource_guid, "R1");
    assert_eq!(requests[0].attachment.file_name, "R1.amr");
    assert_eq!(requests[0].document, doc(store.as_ref(), "N1").id);
}

#[test]
fn placeholder_tag_names_self_correct() {
    let s = setup(config());
    let mut tagged = note("N1", "NB1", "<div>x</div>");
    tagged.tag_guids = vec!["T9".into()];
    s.remote.put_note(tagged);
    s.orchestrator.tick().unwrap();
    let tag = s.store.find_term(BindingKind::Tag, "T9").unwrap().unwrap();
    assert_eq!(tag.name, "T9");

    s.remote.put_tag("T9", "someday", None);
    s.orchestrator.tick().unwrap();
    let tag = s.store.find_term(BindingKind::Tag, "T9").unwrap().unwrap();
    assert_eq!(tag.name, "someday");
    assert_eq!(s.store.terms().len(), 2);
}

#[test]
fn accounts_do_not_share_state() {
    let dir = tempfile::tempdir().unwrap();
    let cursors = Arc::new(FileCursorStore::open(dir.path()).unwrap());
    let suppression = PushSuppression::new();
    let store = Arc::new(MemoryLocalStore::new());

    let alice_remote = Arc::new(MockRemote::new());
    let bob_remote = Arc::new(MockRemote::new());
    let alice = SyncOrchestrator::new(
        config(),
        alice_remote.clone(),
        store.clone(),
        cursors.clone(),
        Arc::new(MemoryScheduler::new()),
    )
    .with_suppression(suppression.clone());
    let bob = SyncOrchestrator::new(
        SyncConfig::new("bob").with_synced_notebooks(["NB1"]),
        bob_remote.clone(),
        store.clone(),
        cursors.clone(),
        Arc::new(MemoryScheduler::new()),
    )
    .with_suppression(suppression.clone());

    alice_remote.put_tag("T1", "alice-tag", None);
    alice_remote.put_note(note("A1", "NB1", "<div>a</div>"));
    alice.tick().unwrap();

    let alice_id = AccountId::new("alice");
    let bob_id = AccountId::new("bob");
    assert_eq!(cursors.load_cursor(&alice_id).unwrap().usn, 2);
    assert_eq!(cursors.load_cursor(&bob_id).unwrap(), SyncCursor::initial());
    assert_eq!(
        cursors.load_taxonomy(&alice_id).unwrap().tag_name("T1"),
        Some("alice-tag")
    );
    assert!(cursors.load_taxonomy(&bob_id).unwrap().is_empty());

    bob_remote.put_note(note("B1", "NB1", "<div>b</div>"));
    bob.tick().unwrap();
    assert_eq!(cursors.load_cursor(&bob_id).unwrap().usn, 1);
    assert_eq!(cursors.load_cursor(&alice_id).unwrap().usn, 2);

    let _guard = suppression.suppress(&alice_id);
    assert!(suppression.is_suppressed(&alice_id));
    assert!(!suppression.is_suppressed(&bob_id));
}

#[test]
fn binding_diff_is_minimal() {
    let local = [Binding::notebook("NB1"), Binding::tag("A"), Binding::tag("B")];
    let remote = [Binding::notebook("NB1"), Binding::tag("B"), Binding::tag("C")];
    let diff = notesync_engine::NotebookTagReconciler::diff(&local, &remote);
    assert_eq!(
        diff,
        BindingDiff {
            remove: vec![Binding::tag("A")],
            add: vec![Binding::tag("C")],
        }
    );
}

#[test]
fn full_pass_helper_counts_ticks() {
    let s = setup(config().with_chunk_size(1));
    s.remote.put_note(note("N1", "NB1", "<div>1</div>"));
    s.remote.put_note(note("N2", "NB1", "<div>2</div>"));
    assert_eq!(sync_to_completion(&s), 2);
    assert_eq!(sync_to_completion(&s), 1);
}
