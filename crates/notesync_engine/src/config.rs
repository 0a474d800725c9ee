//! Configuration for the sync engine.

use crate::account::AccountId;
use crate::error::{SyncError, SyncResult};
use notesync_content::TranscodeOptions;
use std::time::Duration;

/// Configuration for one account's sync.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Remote account this configuration belongs to.
    pub account: AccountId,
    /// Remote notebooks configured for two-way sync.
    pub synced_notebooks: Vec<String>,
    /// Maximum number of entries requested per chunk.
    pub chunk_size: i32,
    /// Delay before the continuation of a paged pass runs.
    pub continuation_delay: Duration,
    /// Name of the periodic trigger paused while a pass is paging.
    pub periodic_job: String,
    /// Timeout handed to remote client implementations.
    pub request_timeout: Duration,
    /// Transcoder settings.
    pub transcode: TranscodeOptions,
}

impl SyncConfig {
    /// Creates a configuration with defaults and no synced notebooks.
    pub fn new(account: impl Into<AccountId>) -> Self {
        Self {
            account: account.into(),
            synced_notebooks: Vec::new(),
            chunk_size: 100,
            continuation_delay: Duration::from_secs(60),
            periodic_job: "notesync-periodic".into(),
            request_timeout: Duration::from_secs(30),
            transcode: TranscodeOptions::default(),
        }
    }

    /// Sets the notebook allow-list.
    pub fn with_synced_notebooks<I, S>(mut self, notebooks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.synced_notebooks = notebooks.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the chunk size.
    pub fn with_chunk_size(mut self, size: i32) -> Self {
        self.chunk_size = size;
        self
    }

    /// Sets the continuation delay.
    pub fn with_continuation_delay(mut self, delay: Duration) -> Self {
        self.continuation_delay = delay;
        self
    }

    /// Sets the periodic job name.
    pub fn with_periodic_job(mut self, job: impl Into<String>) -> Self {
        self.periodic_job = job.into();
        self
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the transcoder options.
    pub fn with_transcode(mut self, options: TranscodeOptions) -> Self {
        self.transcode = options;
        self
    }

    /// Returns true if notes of this notebook may be created locally.
    pub fn is_in_scope(&self, notebook_guid: &str) -> bool {
        self.synced_notebooks.iter().any(|g| g == notebook_guid)
    }

    /// Name of this account's periodic trigger.
    pub fn periodic_job_key(&self) -> String {
        format!("{}:{}", self.periodic_job, self.account)
    }

    /// Checks that the configuration can drive a sync.
    pub fn validate(&self) -> SyncResult<()> {
        if self.account.is_empty() {
            return Err(SyncError::Config("no account configured".into()));
        }
        if self.synced_notebooks.is_empty() {
            return Err(SyncError::Config(format!(
                "no synced notebooks configured for {}",
                self.account
            )));
        }
        if self.chunk_size <= 0 {
            return Err(SyncError::Config(format!(
                "chunk size must be positive, got {}",
                self.chunk_size
            )));
        }
        Ok(())
    }
}
