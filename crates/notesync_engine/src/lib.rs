//! # notesync engine
//!
//! Incremental sync between a remote note service and a local content store.
//!
//! This crate provides:
//! - Sync orchestrator state machine (check state → reset → fetch → apply → continue)
//! - Per-account cursors and taxonomy caches
//! - Idempotent chunk application with per-entity failure isolation
//! - Notebook and tag reconciliation
//! - The local-to-remote push path and its suppression during inbound sync
//! - In-memory collaborators for testing
//!
//! ## Architecture
//!
//! One tick applies at most one chunk. Passes longer than a chunk pause the
//! periodic trigger and continue through one-shot jobs, so at most one tick
//! per account is in flight:
//! 1. Read the remote sync state and decide between a no-op, an incremental
//!    pull and a full resync
//! 2. Fetch one chunk starting at the cursor's USN
//! 3. Apply it (resources before content so media markers resolve)
//! 4. Advance the cursor and schedule the next page, or finish the pass
//!
//! ## Key Invariants
//!
//! - The cursor only advances after a chunk has been applied
//! - Re-applying a chunk is a no-op on document content
//! - Local records are looked up by remote guid before they are created
//! - Cursor, taxonomy cache and push suppression are keyed per account
//! - Local writes made by inbound sync never trigger a push

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod account;
mod applier;
mod config;
mod cursor;
mod effects;
mod error;
mod outbound;
mod reconciler;
mod remote;
mod scheduler;
mod state;
mod store;
mod suppression;

pub use account::AccountId;
pub use applier::{resource_file_name, ApplyFailure, ApplyReport, ChangeApplier, EntityKind};
pub use config::SyncConfig;
pub use cursor::{FileCursorStore, MemoryCursorStore, SyncCursor, SyncCursorStore};
pub use effects::{NoSideEffects, RecordingSideEffects, SideEffects, TranscriptionRequest};
pub use error::{SyncError, SyncResult};
pub use outbound::{OutboundSync, PushOutcome};
pub use reconciler::{BindingDiff, NotebookTagReconciler};
pub use remote::{MockRemote, RemoteSyncClient};
pub use scheduler::{Continuation, MemoryScheduler, Scheduler};
pub use state::{NoOpReason, SyncOrchestrator, SyncPhase, SyncStats, TickOutcome};
pub use store::{
    AttachmentId, DocumentId, DocumentPatch, LocalAttachment, LocalDocument, LocalStore,
    LocalTerm, MemoryLocalStore, NewAttachment, NewDocument, NewTerm, TermId,
};
pub use suppression::{PushSuppression, SuppressionGuard};
