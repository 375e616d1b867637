//! Error types for the edital-flow library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`EditalError`]: the requested *operation* cannot proceed (bad input
//!   file, a run is already active, the backend answered with garbage).
//!   Returned as `Err(EditalError)` from public entry points and from the
//!   service traits in [`crate::services`].
//!
//! * [`TaskError`]: a single file or a single question failed while the rest
//!   of the workflow carries on. Stored on the owning
//!   [`crate::task::FileTask`] or rendered into the transcript, never
//!   propagated past the call that produced it.
//!
//! Nothing here is fatal to the process: every failure in a run degrades to
//! a visible status or message while the workflow still reaches its terminal
//! stage.

use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by the edital-flow library.
///
/// Per-file and per-question failures use [`TaskError`] instead.
#[derive(Debug, Error)]
pub enum EditalError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// The payload was read, but it is not a PDF.
    #[error("'{name}' is not a PDF (first bytes: {magic:?})")]
    NotAPdf { name: String, magic: Vec<u8> },

    // ── Run-state errors ──────────────────────────────────────────────────
    /// `start()` was called while a run is between stages 1 and 3.
    #[error("A processing run is already in progress (stage {stage})")]
    RunInProgress { stage: u8 },

    /// A file cannot be removed while a run is active.
    #[error("Cannot remove '{name}' while a processing run is active")]
    RemovalDuringRun { name: String },

    /// No file with this name is registered.
    #[error("No file named '{name}' in the current run")]
    UnknownFile { name: String },

    /// `start()` was called with an empty file list.
    #[error("No files to process. Add at least one PDF first.")]
    NoFiles,

    /// The automated analysis needs a run that reached stage 4.
    #[error("Analysis needs a finished run (current stage {stage})")]
    RunNotFinished { stage: u8 },

    /// The automated analysis sequencer is already running.
    #[error("Automated analysis is already running")]
    AnalysisInProgress,

    /// No completed file carries the artifact needed for this operation.
    #[error("No processed document available: {0}")]
    NoProcessedDocument(String),

    // ── Service errors ────────────────────────────────────────────────────
    /// The request never produced a response (connect error, timeout, …).
    #[error("{service} request failed: {reason}")]
    ServiceRequest {
        service: &'static str,
        reason: String,
    },

    /// The service answered with a non-success HTTP status.
    #[error("{service} returned HTTP {status}: {body}")]
    ServiceStatus {
        service: &'static str,
        status: u16,
        body: String,
    },

    /// The response body could not be decoded.
    #[error("{service} returned an unreadable response: {reason}")]
    InvalidResponse {
        service: &'static str,
        reason: String,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single file or question.
///
/// The workflow continues past it; only the owning entity records it.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum TaskError {
    /// The extraction service failed or reported `success: false`.
    #[error("{file}: extraction failed: {detail}")]
    ExtractionFailed { file: String, detail: String },

    /// The enrichment request for an extracted artifact failed.
    #[error("{file}: enrichment failed: {detail}")]
    EnrichmentFailed { file: String, detail: String },

    /// The chat service could not answer one automated question.
    #[error("question '{question}' failed: {detail}")]
    QuestionFailed { question: String, detail: String },
}

impl TaskError {
    /// The underlying failure message without the entity prefix.
    pub fn detail(&self) -> &str {
        match self {
            TaskError::ExtractionFailed { detail, .. }
            | TaskError::EnrichmentFailed { detail, .. }
            | TaskError::QuestionFailed { detail, .. } => detail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_status_display() {
        let e = EditalError::ServiceStatus {
            service: "extraction",
            status: 500,
            body: "boom".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("extraction"), "got: {msg}");
        assert!(msg.contains("500"), "got: {msg}");
    }

    #[test]
    fn run_in_progress_display() {
        let e = EditalError::RunInProgress { stage: 2 };
        assert!(e.to_string().contains("stage 2"));
    }

    #[test]
    fn task_error_detail_strips_prefix() {
        let e = TaskError::ExtractionFailed {
            file: "a.pdf".into(),
            detail: "HTTP 502".into(),
        };
        assert_eq!(e.detail(), "HTTP 502");
        assert!(e.to_string().starts_with("a.pdf"));
    }

    #[test]
    fn task_error_serialises() {
        let e = TaskError::EnrichmentFailed {
            file: "b.pdf".into(),
            detail: "timeout".into(),
        };
        let json = serde_json::to_string(&e).unwrap();
        let back: TaskError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
    }
}
