//! Per-account sync position and taxonomy cache.

use crate::account::AccountId;
use crate::error::SyncResult;
use notesync_protocol::{TaxonomyIndex, Usn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Incremental sync position of one account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncCursor {
    /// Highest USN applied.
    pub usn: Usn,
    /// Remote clock at the start of the last tick, epoch millis.
    pub last_sync_time: i64,
    /// Remote update count observed at the start of the last tick.
    pub last_update_count: Usn,
    /// True once the last page of the pass started at `last_update_count`
    /// has been applied.
    #[serde(default)]
    pub pass_complete: bool,
}

impl SyncCursor {
    /// Cursor of an account that has never synced.
    pub fn initial() -> Self {
        Self::default()
    }
}

/// Persistent storage for cursors and taxonomy caches, keyed by account.
pub trait SyncCursorStore: Send + Sync {
    /// Loads the cursor, or [`SyncCursor::initial`] if none was saved.
    fn load_cursor(&self, account: &AccountId) -> SyncResult<SyncCursor>;

    /// Saves the cursor.
    fn save_cursor(&self, account: &AccountId, cursor: &SyncCursor) -> SyncResult<()>;

    /// Loads the taxonomy cache, empty if none was saved.
    fn load_taxonomy(&self, account: &AccountId) -> SyncResult<TaxonomyIndex>;

    /// Saves the taxonomy cache.
    fn save_taxonomy(&self, account: &AccountId, index: &TaxonomyIndex) -> SyncResult<()>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct AccountState {
    #[serde(default)]
    cursor: SyncCursor,
    #[serde(default)]
    taxonomy: TaxonomyIndex,
}

/// An in-memory cursor store for testing.
#[derive(Debug, Default)]
pub struct MemoryCursorStore {
    accounts: RwLock<HashMap<AccountId, AccountState>>,
}

impl MemoryCursorStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SyncCursorStore for MemoryCursorStore {
    fn load_cursor(&self, account: &AccountId) -> SyncResult<SyncCursor> {
        Ok(self
            .accounts
            .read()
            .get(account)
            .map(|s| s.cursor)
            .unwrap_or_else(SyncCursor::initial))
    }

    fn save_cursor(&self, account: &AccountId, cursor: &SyncCursor) -> SyncResult<()> {
        self.accounts
            .write()
            .entry(account.clone())
            .or_default()
            .cursor = *cursor;
        Ok(())
    }

    fn load_taxonomy(&self, account: &AccountId) -> SyncResult<TaxonomyIndex> {
        Ok(self
            .accounts
            .read()
            .get(account)
            .map(|s| s.taxonomy.clone())
            .unwrap_or_default())
    }

    fn save_taxonomy(&self, account: &AccountId, index: &TaxonomyIndex) -> SyncResult<()> {
        self.accounts
            .write()
            .entry(account.clone())
            .or_default()
            .taxonomy = index.clone();
        Ok(())
    }
}

/// Cursor store keeping one JSON document per account in a directory.
///
/// Files are replaced through a temporary file and a rename, so a crash
/// leaves either the old or the new state.
#[derive(Debug)]
pub struct FileCursorStore {
    dir: PathBuf,
    lock: RwLock<()>,
}

impl FileCursorStore {
    /// Opens a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl AsRef<Path>) -> SyncResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            lock: RwLock::new(()),
        })
    }

    /// Path of an account's state file.
    ///
    /// ASCII letters, digits, `-` and `.` are kept; every other byte,
    /// `_` included, is written as `_xx`, so distinct accounts never share
    /// a file.
    pub fn path_for(&self, account: &AccountId) -> PathBuf {
        let mut name = String::with_capacity(account.as_str().len());
        for byte in account.as_str().bytes() {
            if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.') {
                name.push(char::from(byte));
            } else {
                name.push('_');
                name.push_str(&hex::encode([byte]));
            }
        }
        self.dir.join(format!("{name}.json"))
    }

    fn read(&self, account: &AccountId) -> SyncResult<AccountState> {
        let path = self.path_for(account);
        if !path.exists() {
            return Ok(AccountState::default());
        }
        let bytes = fs::read(&path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn write(&self, account: &AccountId, state: &AccountState) -> SyncResult<()> {
        let path = self.path_for(account);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(state)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn modify(&self, account: &AccountId, f: impl FnOnce(&mut AccountState)) -> SyncResult<()> {
        let _guard = self.lock.write();
        let mut state = self.read(account)?;
        f(&mut state);
        self.write(account, &state)
    }
}

impl SyncCursorStore for FileCursorStore {
    fn load_cursor(&self, account: &AccountId) -> SyncResult<SyncCursor> {
        let _guard = self.lock.read();
        Ok(self.read(account)?.cursor)
    }

    fn save_cursor(&self, account: &AccountId, cursor: &SyncCursor) -> SyncResult<()> {
        self.modify(account, |state| state.cursor = *cursor)
    }

    fn load_taxonomy(&self, account: &AccountId) -> SyncResult<TaxonomyIndex> {
        let _guard = self.lock.read();
        Ok(self.read(account)?.taxonomy)
    }

    fn save_taxonomy(&self, account: &AccountId, index: &TaxonomyIndex) -> SyncResult<()> {
        self.modify(account, |state| state.taxonomy = index.clone())
    }
}
