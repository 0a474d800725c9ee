//! Scheduling collaborator.

use crate::account::AccountId;
use crate::error::SyncResult;
use notesync_protocol::Usn;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Payload of a one-shot continuation of a paged pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Continuation {
    /// Account whose pass continues.
    pub account: AccountId,
    /// USN the next chunk starts from.
    pub usn: Usn,
}

impl Continuation {
    /// Encodes the payload for a job queue.
    pub fn to_json(&self) -> SyncResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes a payload read from a job queue.
    pub fn from_json(payload: &str) -> SyncResult<Self> {
        Ok(serde_json::from_str(payload)?)
    }
}

/// Job scheduler driving sync ticks.
pub trait Scheduler: Send + Sync {
    /// Runs a continuation once after `delay`.
    fn schedule_one_shot(&self, delay: Duration, payload: Continuation) -> SyncResult<()>;

    /// Pauses a periodic job.
    fn unschedule_periodic(&self, job: &str) -> SyncResult<()>;

    /// Resumes a paused periodic job. Resuming a running job is a no-op.
    fn resume_periodic(&self, job: &str) -> SyncResult<()>;
}

/// An in-memory scheduler for testing.
#[derive(Debug, Default)]
pub struct MemoryScheduler {
    one_shots: Mutex<Vec<(Duration, Continuation)>>,
    paused: Mutex<BTreeSet<String>>,
}

impl MemoryScheduler {
    /// Creates a scheduler with nothing queued.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queued one-shot jobs.
    pub fn pending(&self) -> Vec<(Duration, Continuation)> {
        self.one_shots.lock().clone()
    }

    /// Removes and returns the oldest queued one-shot job.
    pub fn pop_next(&self) -> Option<(Duration, Continuation)> {
        let mut queue = self.one_shots.lock();
        (!queue.is_empty()).then(|| queue.remove(0))
    }

    /// Returns true while the periodic job is paused.
    pub fn is_paused(&self, job: &str) -> bool {
        self.paused.lock().contains(job)
    }
}

impl Scheduler for MemoryScheduler {
    fn schedule_one_shot(&self, delay: Duration, payload: Continuation) -> SyncResult<()> {
        self.one_shots.lock().push((delay, payload));
        Ok(())
    }

    fn unschedule_periodic(&self, job: &str) -> SyncResult<()> {
        self.paused.lock().insert(job.to_string());
        Ok(())
    }

    fn resume_periodic(&self, job: &str) -> SyncResult<()> {
        self.paused.lock().remove(job);
        Ok(())
    }
}
