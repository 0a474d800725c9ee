//! Sync orchestrator state machine.

use crate::applier::{ApplyReport, ChangeApplier};
use crate::config::SyncConfig;
use crate::cursor::{SyncCursor, SyncCursorStore};
use crate::effects::{NoSideEffects, SideEffects};
use crate::error::{SyncError, SyncResult};
use crate::remote::RemoteSyncClient;
use crate::scheduler::{Continuation, Scheduler};
use crate::store::LocalStore;
use crate::suppression::PushSuppression;
use notesync_protocol::{SyncChunkFilter, Usn};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Phase of the orchestrator within a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// No tick has run, or the last one stalled.
    Idle,
    /// Reading the remote sync state.
    CheckState,
    /// Nothing to do this tick.
    NoOp,
    /// Remote history was truncated; restarting from USN 0.
    ResetCursor,
    /// Fetching a chunk.
    FetchChunk,
    /// Applying a chunk.
    ApplyChunk,
    /// More pages remain; a continuation was scheduled.
    ScheduleNextChunk,
    /// The pass is complete.
    Done,
}

impl SyncPhase {
    /// Returns true for phases a tick ends in.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SyncPhase::Idle | SyncPhase::NoOp | SyncPhase::ScheduleNextChunk | SyncPhase::Done
        )
    }
}

/// Why a tick did nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoOpReason {
    /// The remote has not changed since the last completed pass.
    Unchanged,
    /// The account is not configured for sync.
    Config(String),
    /// Another tick for this account is running.
    InFlight,
}

/// Result of one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing was fetched.
    NoOp(NoOpReason),
    /// The remote was unreachable; the next trigger retries from the same USN.
    Stalled,
    /// A chunk was applied and a continuation scheduled.
    Continued {
        /// USN the continuation starts from.
        next_usn: Usn,
        /// What the chunk changed.
        report: ApplyReport,
    },
    /// The last page was applied.
    Completed {
        /// USN reached.
        usn: Usn,
        /// What the chunk changed.
        report: ApplyReport,
    },
}

/// Statistics about sync ticks.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Ticks started.
    pub ticks: u64,
    /// Ticks that did nothing.
    pub noops: u64,
    /// Chunks applied.
    pub chunks_applied: u64,
    /// Notes created, updated or deleted locally.
    pub notes_applied: u64,
    /// Continuations scheduled.
    pub continuations: u64,
    /// Passes that reached the last page.
    pub completed_passes: u64,
    /// Cursor resets caused by truncated remote history.
    pub full_resets: u64,
    /// Ticks aborted by retryable errors.
    pub stalls: u64,
    /// Last error message.
    pub last_error: Option<String>,
    /// When the last pass completed.
    pub last_completed: Option<Instant>,
}

struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Drives incremental sync ticks for one account.
///
/// A tick reads the remote sync state, decides between a no-op, an
/// incremental pull and a full resync, applies at most one chunk and then
/// either schedules a one-shot continuation (pausing the periodic job) or
/// completes the pass (resuming it). The cursor only advances after a chunk
/// has been applied.
pub struct SyncOrchestrator {
    config: SyncConfig,
    remote: Arc<dyn RemoteSyncClient>,
    store: Arc<dyn LocalStore>,
    cursors: Arc<dyn SyncCursorStore>,
    scheduler: Arc<dyn Scheduler>,
    effects: Arc<dyn SideEffects>,
    suppression: PushSuppression,
    phase: RwLock<SyncPhase>,
    stats: RwLock<SyncStats>,
    running: AtomicBool,
}

impl SyncOrchestrator {
    /// Creates an orchestrator.
    pub fn new(
        config: SyncConfig,
        remote: Arc<dyn RemoteSyncClient>,
        store: Arc<dyn LocalStore>,
        cursors: Arc<dyn SyncCursorStore>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        Self {
            config,
            remote,
            store,
            cursors,
            scheduler,
            effects: Arc::new(NoSideEffects),
            suppression: PushSuppression::new(),
            phase: RwLock::new(SyncPhase::Idle),
            stats: RwLock::new(SyncStats::default()),
            running: AtomicBool::new(false),
        }
    }

    /// Sets the receiver of side effects.
    pub fn with_side_effects(mut self, effects: Arc<dyn SideEffects>) -> Self {
        self.effects = effects;
        self
    }

    /// Shares a push-suppression registry with the outbound path.
    pub fn with_suppression(mut self, suppression: PushSuppression) -> Self {
        self.suppression = suppression;
        self
    }

    /// Gets the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Gets the push-suppression registry.
    pub fn suppression(&self) -> &PushSuppression {
        &self.suppression
    }

    /// Gets the current phase.
    pub fn phase(&self) -> SyncPhase {
        *self.phase.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    fn set_phase(&self, phase: SyncPhase) {
        *self.phase.write() = phase;
    }

    /// Runs one tick.
    ///
    /// Retryable failures end the tick as [`TickOutcome::Stalled`]; other
    /// failures are returned. Either way the periodic job is resumed.
    pub fn tick(&self) -> SyncResult<TickOutcome> {
        let Some(_running) = InFlight::acquire(&self.running) else {
            debug!(account = %self.config.account, "tick already in flight");
            self.stats.write().noops += 1;
            return Ok(TickOutcome::NoOp(NoOpReason::InFlight));
        };
        self.stats.write().ticks += 1;

        match self.run() {
            Ok(outcome) => Ok(outcome),
            Err(e) => self.abort(e),
        }
    }

    /// Runs the tick a scheduled continuation asked for.
    ///
    /// The persisted cursor is authoritative; the payload's USN is only
    /// compared for diagnostics.
    pub fn handle_continuation(&self, payload: &Continuation) -> SyncResult<TickOutcome> {
        if payload.account != self.config.account {
            return Err(SyncError::Config(format!(
                "continuation for {} delivered to {}",
                payload.account, self.config.account
            )));
        }
        let cursor = self.cursors.load_cursor(&self.config.account)?;
        if cursor.usn != payload.usn {
            debug!(
                account = %self.config.account,
                payload_usn = payload.usn,
                usn = cursor.usn,
                "continuation usn differs from cursor"
            );
        }
        self.tick()
    }

    fn run(&self) -> SyncResult<TickOutcome> {
        let account = &self.config.account;
        self.set_phase(SyncPhase::CheckState);

        if let Err(e) = self.config.validate() {
            warn!(account = %account, error = %e, "account not configured for sync");
            return Ok(self.noop(NoOpReason::Config(e.to_string())));
        }

        let mut cursor = self.cursors.load_cursor(account)?;
        let state = self.remote.get_sync_state()?;
        debug!(
            account = %account,
            usn = cursor.usn,
            update_count = state.update_count,
            last_update_count = cursor.last_update_count,
            "remote sync state"
        );

        if state.update_count == cursor.usn
            || (state.update_count == cursor.last_update_count && cursor.pass_complete)
        {
            if !cursor.pass_complete {
                cursor.pass_complete = true;
                cursor.last_sync_time = state.current_time;
                cursor.last_update_count = state.update_count;
                self.cursors.save_cursor(account, &cursor)?;
            }
            self.scheduler.resume_periodic(&self.config.periodic_job_key())?;
            info!(account = %account, usn = cursor.usn, "nothing changed since last sync");
            return Ok(self.noop(NoOpReason::Unchanged));
        }

        if state.full_sync_before > cursor.last_sync_time {
            self.set_phase(SyncPhase::ResetCursor);
            info!(
                account = %account,
                usn = cursor.usn,
                full_sync_before = state.full_sync_before,
                last_sync_time = cursor.last_sync_time,
                "remote history truncated, starting full resync"
            );
            cursor.usn = 0;
            self.stats.write().full_resets += 1;
        }

        // Persisted before applying so a crash mid-chunk is not mistaken
        // for an unchanged remote.
        cursor.last_sync_time = state.current_time;
        cursor.last_update_count = state.update_count;
        cursor.pass_complete = false;
        self.cursors.save_cursor(account, &cursor)?;

        self.set_phase(SyncPhase::FetchChunk);
        let start_usn = cursor.usn;
        let chunk = self.remote.get_filtered_sync_chunk(
            start_usn,
            self.config.chunk_size,
            &SyncChunkFilter::incremental(),
        )?;
        // A page can carry no records of the filtered kinds and still move
        // the high-water mark; the cursor follows it either way.
        let report = if chunk.is_empty() {
            debug!(
                account = %account,
                usn = start_usn,
                chunk_high_usn = ?chunk.chunk_high_usn,
                "no records in chunk"
            );
            ApplyReport::default()
        } else {
            self.set_phase(SyncPhase::ApplyChunk);
            let mut taxonomy = self.cursors.load_taxonomy(account)?;
            let report = ChangeApplier::new(
                &self.config,
                self.store.as_ref(),
                self.remote.as_ref(),
                &self.suppression,
            )
            .with_side_effects(self.effects.as_ref())
            .apply(&chunk, &mut taxonomy)?;
            self.cursors.save_taxonomy(account, &taxonomy)?;
            let mut stats = self.stats.write();
            stats.chunks_applied += 1;
            stats.notes_applied += report.notes_applied();
            report
        };

        let high = chunk.chunk_high_usn.unwrap_or(start_usn);
        cursor.usn = cursor.usn.max(high);

        if chunk.has_more_after(start_usn) && high < state.update_count {
            self.set_phase(SyncPhase::ScheduleNextChunk);
            self.scheduler
                .unschedule_periodic(&self.config.periodic_job_key())?;
            self.cursors.save_cursor(account, &cursor)?;
            self.scheduler.schedule_one_shot(
                self.config.continuation_delay,
                Continuation {
                    account: account.clone(),
                    usn: cursor.usn,
                },
            )?;
            self.stats.write().continuations += 1;
            info!(
                account = %account,
                chunk_high_usn = high,
                update_count = state.update_count,
                records = chunk.len(),
                "more pages remain, continuation scheduled"
            );
            return Ok(TickOutcome::Continued {
                next_usn: cursor.usn,
                report,
            });
        }

        self.complete(cursor, report)
    }

    fn complete(&self, mut cursor: SyncCursor, report: ApplyReport) -> SyncResult<TickOutcome> {
        cursor.pass_complete = true;
        self.cursors.save_cursor(&self.config.account, &cursor)?;
        self.scheduler
            .resume_periodic(&self.config.periodic_job_key())?;
        self.set_phase(SyncPhase::Done);
        {
            let mut stats = self.stats.write();
            stats.completed_passes += 1;
            stats.last_completed = Some(Instant::now());
            stats.last_error = None;
        }
        info!(
            account = %self.config.account,
            usn = cursor.usn,
            notes = report.notes_applied(),
            failures = report.failures.len(),
            "sync pass complete"
        );
        Ok(TickOutcome::Completed {
            usn: cursor.usn,
            report,
        })
    }

    fn noop(&self, reason: NoOpReason) -> TickOutcome {
        self.set_phase(SyncPhase::NoOp);
        self.stats.write().noops += 1;
        TickOutcome::NoOp(reason)
    }

    fn abort(&self, error: SyncError) -> SyncResult<TickOutcome> {
        self.set_phase(SyncPhase::Idle);
        {
            let mut stats = self.stats.write();
            stats.last_error = Some(error.to_string());
            if error.is_retryable() {
                stats.stalls += 1;
            }
        }
        if let Err(e) = self
            .scheduler
            .resume_periodic(&self.config.periodic_job_key())
        {
            warn!(account = %self.config.account, error = %e, "could not resume periodic sync");
        }

        if error.is_retryable() {
            warn!(account = %self.config.account, error = %error, "sync tick stalled");
            Ok(TickOutcome::Stalled)
        } else {
            error!(account = %self.config.account, error = %error, "sync tick failed");
            Err(error)
        }
    }
}
