//! Side effects handed to external collaborators.

use crate::store::{DocumentId, LocalAttachment};
use parking_lot::Mutex;

/// Receives follow-up work the engine does not do itself.
pub trait SideEffects: Send + Sync {
    /// An audio resource was attached and should be transcribed.
    fn transcription_requested(&self, document: DocumentId, attachment: &LocalAttachment, mime: &str);
}

/// Ignores every side effect.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSideEffects;

impl SideEffects for NoSideEffects {
    fn transcription_requested(&self, _document: DocumentId, _attachment: &LocalAttachment, _mime: &str) {}
}

/// A recorded transcription request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptionRequest {
    /// Owning document.
    pub document: DocumentId,
    /// Attachment to transcribe.
    pub attachment: LocalAttachment,
    /// Audio mime type.
    pub mime: String,
}

/// Records side effects for assertions in tests.
#[derive(Debug, Default)]
pub struct RecordingSideEffects {
    transcriptions: Mutex<Vec<TranscriptionRequest>>,
}

impl RecordingSideEffects {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Transcription requests received so far.
    pub fn transcriptions(&self) -> Vec<TranscriptionRequest> {
        self.transcriptions.lock().clone()
    }
}

impl SideEffects for RecordingSideEffects {
    fn transcription_requested(&self, document: DocumentId, attachment: &LocalAttachment, mime: &str) {
        self.transcriptions.lock().push(TranscriptionRequest {
            document,
            attachment: attachment.clone(),
            mime: mime.to_string(),
        });
    }
}
