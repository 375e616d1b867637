//! Per-file workflow records.
//!
//! A [`FileTask`] is created when a PDF is accepted into a run and is then
//! mutated in place, first by the extraction loop and later by the enrichment
//! dispatcher. All mutation goes through [`crate::state::RunState::apply`],
//! which enforces the forward-only status lifecycle.

use crate::error::TaskError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Lifecycle of one file within a run.
///
/// Transitions only move forward: `Waiting → Processing → {Completed | Error}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    #[default]
    Waiting,
    Processing,
    Completed,
    Error,
}

impl FileStatus {
    /// `true` once the file reached `Completed` or `Error`.
    pub fn is_terminal(self) -> bool {
        matches!(self, FileStatus::Completed | FileStatus::Error)
    }

    /// Whether `self → next` is a legal forward transition.
    pub fn can_transition_to(self, next: FileStatus) -> bool {
        matches!(
            (self, next),
            (FileStatus::Waiting, FileStatus::Processing)
                | (FileStatus::Processing, FileStatus::Completed)
                | (FileStatus::Processing, FileStatus::Error)
        )
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FileStatus::Waiting => "waiting",
            FileStatus::Processing => "processing",
            FileStatus::Completed => "completed",
            FileStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// One submitted document and everything the workflow learned about it.
#[derive(Debug, Clone, Serialize)]
pub struct FileTask {
    /// File name, unique within a run.
    pub name: String,

    /// Raw PDF bytes. Shared so snapshots stay cheap.
    #[serde(skip)]
    pub payload: Arc<[u8]>,

    pub status: FileStatus,

    /// Item count reported by the extraction service.
    pub extracted_table_count: u64,

    /// Seconds from run start until this file's extraction response arrived.
    pub elapsed_processing_secs: f64,

    /// Tabular artifact produced by the extraction service.
    pub extraction_artifact_path: Option<String>,

    /// Artifact produced by the enrichment service.
    pub enriched_artifact_path: Option<String>,

    pub matched_count: Option<u64>,
    pub total_description_count: Option<u64>,

    /// Binds this document to chat/analysis queries.
    pub content_reference_id: Option<String>,

    /// Municipality detected by the extraction backend, when reported.
    pub municipality: Option<String>,

    pub last_error: Option<TaskError>,
}

impl FileTask {
    /// A freshly accepted file in `Waiting` state.
    pub fn new(name: impl Into<String>, payload: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            payload: payload.into(),
            status: FileStatus::Waiting,
            extracted_table_count: 0,
            elapsed_processing_secs: 0.0,
            extraction_artifact_path: None,
            enriched_artifact_path: None,
            matched_count: None,
            total_description_count: None,
            content_reference_id: None,
            municipality: None,
            last_error: None,
        }
    }

    /// Clear everything a previous run wrote, keeping identity and payload.
    pub(crate) fn reset_results(&mut self) {
        *self = FileTask::new(std::mem::take(&mut self.name), Arc::clone(&self.payload));
    }

    /// Eligible for enrichment: completed with a non-empty artifact path.
    pub fn is_enrichable(&self) -> bool {
        self.status == FileStatus::Completed
            && self
                .extraction_artifact_path
                .as_deref()
                .is_some_and(|p| !p.is_empty())
    }

    /// The content reference id, if this file can back chat queries.
    pub fn chat_reference(&self) -> Option<&str> {
        if self.status != FileStatus::Completed {
            return None;
        }
        self.content_reference_id
            .as_deref()
            .filter(|id| !id.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_only_moves_forward() {
        use FileStatus::*;
        assert!(Waiting.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Error));
        assert!(!Completed.can_transition_to(Processing));
        assert!(!Error.can_transition_to(Completed));
        assert!(!Waiting.can_transition_to(Completed));
    }

    #[test]
    fn reset_keeps_identity() {
        let mut t = FileTask::new("a.pdf", b"%PDF-1.4".to_vec());
        t.status = FileStatus::Completed;
        t.extracted_table_count = 9;
        t.content_reference_id = Some("abc".into());
        t.reset_results();
        assert_eq!(t.name, "a.pdf");
        assert_eq!(&*t.payload, b"%PDF-1.4");
        assert_eq!(t.status, FileStatus::Waiting);
        assert_eq!(t.extracted_table_count, 0);
        assert!(t.content_reference_id.is_none());
    }

    #[test]
    fn enrichable_requires_non_empty_path() {
        let mut t = FileTask::new("a.pdf", Vec::<u8>::new());
        t.status = FileStatus::Completed;
        assert!(!t.is_enrichable());
        t.extraction_artifact_path = Some(String::new());
        assert!(!t.is_enrichable());
        t.extraction_artifact_path = Some("results/a.csv".into());
        assert!(t.is_enrichable());
        t.status = FileStatus::Error;
        assert!(!t.is_enrichable());
    }

    #[test]
    fn chat_reference_requires_completed() {
        let mut t = FileTask::new("a.pdf", Vec::<u8>::new());
        t.content_reference_id = Some("cid".into());
        assert_eq!(t.chat_reference(), None);
        t.status = FileStatus::Completed;
        assert_eq!(t.chat_reference(), Some("cid"));
    }
}
