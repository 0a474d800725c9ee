//! Remote note service interface.

use crate::error::{SyncError, SyncResult};
use notesync_content::{validate_wire, ContentHasher};
use notesync_protocol::{
    NoteAttributes, NoteFetch, NoteSpec, RemoteNote, RemoteNotebook, RemoteResource, RemoteTag,
    SyncChunk, SyncChunkFilter, SyncState, Usn,
};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Blocking client for the remote note API.
///
/// Implementations own transport concerns (authentication, request timeout,
/// retries inside a single call). A call that does not complete in time
/// returns [`SyncError::Timeout`]; unreachable hosts return a retryable
/// transport error.
pub trait RemoteSyncClient: Send + Sync {
    /// Fetches the account's sync state.
    fn get_sync_state(&self) -> SyncResult<SyncState>;

    /// Fetches up to `max_entries` changes with a USN above `usn`.
    fn get_filtered_sync_chunk(
        &self,
        usn: Usn,
        max_entries: i32,
        filter: &SyncChunkFilter,
    ) -> SyncResult<SyncChunk>;

    /// Fetches a single note.
    fn get_note(&self, guid: &str, fetch: NoteFetch) -> SyncResult<RemoteNote>;

    /// Creates a note.
    fn create_note(&self, note: &NoteSpec) -> SyncResult<RemoteNote>;

    /// Updates a note.
    fn update_note(&self, note: &NoteSpec) -> SyncResult<RemoteNote>;

    /// Fetches a notebook.
    fn get_notebook(&self, guid: &str) -> SyncResult<RemoteNotebook>;

    /// Fetches a resource's body bytes.
    fn get_resource_data(&self, guid: &str) -> SyncResult<Vec<u8>>;

    /// Fetches a resource, optionally with its body bytes.
    fn get_resource(&self, guid: &str, with_data: bool) -> SyncResult<RemoteResource>;
}

#[derive(Debug, Clone)]
enum Record {
    Notebook(RemoteNotebook),
    Tag(RemoteTag),
    Note(RemoteNote),
    Resource(RemoteResource),
}

impl Record {
    fn guid(&self) -> &str {
        match self {
            Record::Notebook(n) => &n.guid,
            Record::Tag(t) => &t.guid,
            Record::Note(n) => &n.guid,
            Record::Resource(r) => &r.guid,
        }
    }

    fn included(&self, filter: &SyncChunkFilter) -> bool {
        match self {
            Record::Notebook(_) => filter.include_notebooks,
            Record::Tag(_) => filter.include_tags,
            Record::Note(_) => filter.include_notes,
            Record::Resource(_) => filter.include_note_resources,
        }
    }
}

#[derive(Debug, Default)]
struct Account {
    update_count: Usn,
    current_time: i64,
    full_sync_before: i64,
    next_guid: u64,
    // Latest version of every record, keyed by the USN it was written at.
    records: BTreeMap<Usn, Record>,
}

impl Account {
    fn bump(&mut self) -> Usn {
        self.update_count += 1;
        self.current_time += 1_000;
        self.update_count
    }

    fn upsert(&mut self, record: Record) -> Usn {
        let guid = record.guid().to_string();
        self.records.retain(|_, r| r.guid() != guid);
        let usn = self.bump();
        self.records.insert(usn, record);
        usn
    }

    fn find(&self, guid: &str) -> Option<&Record> {
        self.records.values().find(|r| r.guid() == guid)
    }

    fn note(&self, guid: &str) -> Option<&RemoteNote> {
        match self.find(guid) {
            Some(Record::Note(note)) => Some(note),
            _ => None,
        }
    }

    fn resource(&self, guid: &str) -> Option<&RemoteResource> {
        match self.find(guid) {
            Some(Record::Resource(resource)) => Some(resource),
            _ => None,
        }
    }
}

/// An in-memory remote account for testing.
///
/// Every mutation advances the account's update count, which doubles as
/// the USN of the written record. Notes are hashed with [`ContentHasher`]
/// as the remote would.
#[derive(Debug)]
pub struct MockRemote {
    account: RwLock<Account>,
    online: AtomicBool,
    rejected_marker: RwLock<Option<String>>,
    chunk_requests: AtomicUsize,
    note_fetches: AtomicUsize,
}

impl Default for MockRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRemote {
    /// Creates an empty, reachable account.
    pub fn new() -> Self {
        Self {
            account: RwLock::new(Account {
                current_time: 1_700_000_000_000,
                ..Account::default()
            }),
            online: AtomicBool::new(true),
            rejected_marker: RwLock::new(None),
            chunk_requests: AtomicUsize::new(0),
            note_fetches: AtomicUsize::new(0),
        }
    }

    /// Sets whether calls reach the account.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Makes create/update reject bodies containing `marker`.
    pub fn reject_content_containing(&self, marker: impl Into<String>) {
        *self.rejected_marker.write() = Some(marker.into());
    }

    /// Sets the point before which incremental history is gone.
    pub fn set_full_sync_before(&self, time: i64) {
        self.account.write().full_sync_before = time;
    }

    /// Current update count.
    pub fn update_count(&self) -> Usn {
        self.account.read().update_count
    }

    /// Number of chunk requests served.
    pub fn chunk_requests(&self) -> usize {
        self.chunk_requests.load(Ordering::SeqCst)
    }

    /// Number of single-note fetches served.
    pub fn note_fetches(&self) -> usize {
        self.note_fetches.load(Ordering::SeqCst)
    }

    /// Writes a notebook.
    pub fn put_notebook(&self, guid: &str, name: &str) -> Usn {
        self.account.write().upsert(Record::Notebook(RemoteNotebook {
            guid: guid.into(),
            name: name.into(),
            stack: None,
        }))
    }

    /// Writes a tag.
    pub fn put_tag(&self, guid: &str, name: &str, parent_guid: Option<&str>) -> Usn {
        self.account.write().upsert(Record::Tag(RemoteTag {
            guid: guid.into(),
            name: name.into(),
            parent_guid: parent_guid.map(Into::into),
        }))
    }

    /// Writes a note, computing its content hash and timestamps.
    pub fn put_note(&self, mut note: RemoteNote) -> Usn {
        let mut account = self.account.write();
        note.content_hash = ContentHasher::digest(note.content.as_bytes());
        let now = account.current_time + 1_000;
        if note.created == 0 {
            note.created = now;
        }
        note.updated = now;
        account.upsert(Record::Note(note))
    }

    /// Writes a resource, computing its body hash.
    pub fn put_resource(
        &self,
        guid: &str,
        note_guid: &str,
        mime: &str,
        data: &[u8],
        file_name: Option<&str>,
    ) -> Usn {
        self.account.write().upsert(Record::Resource(RemoteResource {
            guid: guid.into(),
            note_guid: note_guid.into(),
            mime: mime.into(),
            body_hash: ContentHasher::digest(data),
            file_name: file_name.map(Into::into),
            deleted: false,
            data: Some(data.to_vec()),
        }))
    }

    /// Writes a resource whose advertised hash does not match its body.
    pub fn put_corrupt_resource(&self, guid: &str, note_guid: &str, mime: &str, data: &[u8]) -> Usn {
        self.account.write().upsert(Record::Resource(RemoteResource {
            guid: guid.into(),
            note_guid: note_guid.into(),
            mime: mime.into(),
            body_hash: ContentHasher::digest(b"something else"),
            file_name: None,
            deleted: false,
            data: Some(data.to_vec()),
        }))
    }

    /// Moves a note to the trash.
    pub fn delete_note(&self, guid: &str) -> SyncResult<Usn> {
        let mut account = self.account.write();
        let mut note = account
            .note(guid)
            .cloned()
            .ok_or_else(|| SyncError::NotFound(guid.to_string()))?;
        note.deleted = true;
        Ok(account.upsert(Record::Note(note)))
    }

    /// Marks a resource deleted.
    pub fn delete_resource(&self, guid: &str) -> SyncResult<Usn> {
        let mut account = self.account.write();
        let mut resource = account
            .resource(guid)
            .cloned()
            .ok_or_else(|| SyncError::NotFound(guid.to_string()))?;
        resource.deleted = true;
        Ok(account.upsert(Record::Resource(resource)))
    }

    /// Latest version of a note.
    pub fn note(&self, guid: &str) -> Option<RemoteNote> {
        self.account.read().note(guid).cloned()
    }

    fn check_online(&self) -> SyncResult<()> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SyncError::transport_retryable("remote unreachable"))
        }
    }

    fn check_content(&self, note: &NoteSpec) -> SyncResult<()> {
        let rejected = |reason: String| SyncError::Rejected {
            guid: note.guid.clone().unwrap_or_default(),
            reason,
        };
        validate_wire(&note.content).map_err(|e| rejected(e.to_string()))?;
        if let Some(marker) = self.rejected_marker.read().as_deref() {
            if note.content.contains(marker) {
                return Err(rejected(format!("content contains {marker:?}")));
            }
        }
        Ok(())
    }

    fn store_note(&self, guid: String, spec: &NoteSpec) -> RemoteNote {
        let mut account = self.account.write();
        let created = account.note(&guid).map_or(0, |n| n.created);
        let now = account.current_time + 1_000;
        let note = RemoteNote {
            guid,
            title: spec.title.clone(),
            content: spec.content.clone(),
            content_hash: ContentHasher::digest(spec.content.as_bytes()),
            notebook_guid: spec.notebook_guid.clone(),
            tag_guids: spec.tag_guids.clone(),
            created: if created == 0 { now } else { created },
            updated: now,
            deleted: false,
            attributes: NoteAttributes {
                source_url: spec.source_url.clone(),
            },
        };
        account.upsert(Record::Note(note.clone()));
        note
    }
}

impl RemoteSyncClient for MockRemote {
    fn get_sync_state(&self) -> SyncResult<SyncState> {
        self.check_online()?;
        let account = self.account.read();
        Ok(SyncState {
            current_time: account.current_time,
            update_count: account.update_count,
            full_sync_before: account.full_sync_before,
        })
    }

    fn get_filtered_sync_chunk(
        &self,
        usn: Usn,
        max_entries: i32,
        filter: &SyncChunkFilter,
    ) -> SyncResult<SyncChunk> {
        self.check_online()?;
        self.chunk_requests.fetch_add(1, Ordering::SeqCst);
        let account = self.account.read();
        let limit = usize::try_from(max_entries.max(1)).unwrap_or(1);

        let mut chunk = SyncChunk::default();
        for (record_usn, record) in account
            .records
            .range(usn.saturating_add(1)..)
            .filter(|(_, r)| r.included(filter))
            .take(limit)
        {
            chunk.chunk_high_usn = Some(*record_usn);
            match record.clone() {
                Record::Notebook(notebook) => chunk.notebooks.push(notebook),
                Record::Tag(tag) => chunk.tags.push(tag),
                Record::Note(mut note) => {
                    note.content.clear();
                    if !filter.include_note_attributes {
                        note.attributes = Default::default();
                    }
                    chunk.notes.push(note);
                }
                Record::Resource(mut resource) => {
                    resource.data = None;
                    chunk.resources.push(resource);
                }
            }
        }
        Ok(chunk)
    }

    fn get_note(&self, guid: &str, fetch: NoteFetch) -> SyncResult<RemoteNote> {
        self.check_online()?;
        self.note_fetches.fetch_add(1, Ordering::SeqCst);
        let mut note = self
            .note(guid)
            .ok_or_else(|| SyncError::NotFound(guid.to_string()))?;
        if !fetch.with_content {
            note.content.clear();
        }
        Ok(note)
    }

    fn create_note(&self, note: &NoteSpec) -> SyncResult<RemoteNote> {
        self.check_online()?;
        self.check_content(note)?;
        let guid = {
            let mut account = self.account.write();
            account.next_guid += 1;
            format!("note-{:04}", account.next_guid)
        };
        Ok(self.store_note(guid, note))
    }

    fn update_note(&self, note: &NoteSpec) -> SyncResult<RemoteNote> {
        self.check_online()?;
        let guid = note
            .guid
            .clone()
            .ok_or_else(|| SyncError::NotFound("note without guid".into()))?;
        if self.note(&guid).is_none() {
            return Err(SyncError::NotFound(guid));
        }
        self.check_content(note)?;
        Ok(self.store_note(guid, note))
    }

    fn get_notebook(&self, guid: &str) -> SyncResult<RemoteNotebook> {
        self.check_online()?;
        match self.account.read().find(guid) {
            Some(Record::Notebook(notebook)) => Ok(notebook.clone()),
            _ => Err(SyncError::NotFound(guid.to_string())),
        }
    }

    fn get_resource_data(&self, guid: &str) -> SyncResult<Vec<u8>> {
        self.check_online()?;
        self.account
            .read()
            .resource(guid)
            .and_then(|r| r.data.clone())
            .ok_or_else(|| SyncError::NotFound(guid.to_string()))
    }

    fn get_resource(&self, guid: &str, with_data: bool) -> SyncResult<RemoteResource> {
        self.check_online()?;
        let mut resource = self
            .account
            .read()
            .resource(guid)
            .cloned()
            .ok_or_else(|| SyncError::NotFound(guid.to_string()))?;
        if !with_data {
            resource.data = None;
        }
        Ok(resource)
    }
}
