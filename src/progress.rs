//! Progress-callback trait for workflow events.
//!
//! Inject an [`Arc<dyn WorkflowProgressCallback>`] via
//! [`crate::config::WorkflowConfigBuilder::progress_callback`] to observe a
//! run as it happens: stage transitions, per-file results, enrichment
//! resolutions and every transcript entry.
//!
//! Events fire only for state changes that actually happened. An idempotent
//! `advance` to a stage already reached, or a fallback timer that lost the
//! race against the normal path, emits nothing.
//!
//! # Example
//!
//! ```rust
//! use edital_flow::{WorkflowProgressCallback, WorkflowConfig, WorkflowStage};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct StageCounter(AtomicUsize);
//!
//! impl WorkflowProgressCallback for StageCounter {
//!     fn on_stage_change(&self, _stage: WorkflowStage, status_text: &str) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{status_text}");
//!     }
//! }
//!
//! let config = WorkflowConfig::builder()
//!     .progress_callback(Arc::new(StageCounter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use crate::state::{ProcessingSummary, WorkflowStage};
use crate::transcript::ConversationEntry;
use std::sync::Arc;

/// Called by the workflow as a run progresses.
///
/// Implementations must be `Send + Sync`: enrichment responses and the
/// fallback timer complete on whichever runtime worker picks them up. All
/// methods default to no-ops.
pub trait WorkflowProgressCallback: Send + Sync {
    /// The workflow entered `stage`.
    fn on_stage_change(&self, stage: WorkflowStage, status_text: &str) {
        let _ = (stage, status_text);
    }

    /// The extraction request for file `index` (0-based) is about to be sent.
    fn on_file_start(&self, index: usize, total: usize, name: &str) {
        let _ = (index, total, name);
    }

    /// File `index` extracted successfully with `item_count` items.
    fn on_file_complete(&self, index: usize, total: usize, name: &str, item_count: u64) {
        let _ = (index, total, name, item_count);
    }

    /// File `index` failed extraction. The loop continues.
    fn on_file_error(&self, index: usize, total: usize, name: &str, error: &str) {
        let _ = (index, total, name, error);
    }

    /// One enrichment request resolved (`error` is `None` on success).
    ///
    /// `resolved` counts both outcomes and reaches `expected` exactly once.
    fn on_enrichment_resolved(
        &self,
        name: &str,
        resolved: usize,
        expected: usize,
        error: Option<&str>,
    ) {
        let _ = (name, resolved, expected, error);
    }

    /// A transcript entry was appended.
    fn on_message(&self, entry: &ConversationEntry) {
        let _ = entry;
    }

    /// Stage 4 was reached and the summary rebuilt.
    fn on_run_complete(&self, summary: &[ProcessingSummary]) {
        let _ = summary;
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl WorkflowProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::WorkflowConfig`].
pub type ProgressCallback = Arc<dyn WorkflowProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        stages: Mutex<Vec<WorkflowStage>>,
        file_errors: AtomicUsize,
        messages: AtomicUsize,
    }

    impl WorkflowProgressCallback for Recorder {
        fn on_stage_change(&self, stage: WorkflowStage, _status_text: &str) {
            self.stages.lock().unwrap().push(stage);
        }

        fn on_file_error(&self, _index: usize, _total: usize, _name: &str, _error: &str) {
            self.file_errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_message(&self, _entry: &ConversationEntry) {
            self.messages.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_stage_change(WorkflowStage::Extracting, "Extraindo tabelas...");
        cb.on_file_start(0, 2, "a.pdf");
        cb.on_file_complete(0, 2, "a.pdf", 3);
        cb.on_file_error(1, 2, "b.pdf", "HTTP 500");
        cb.on_enrichment_resolved("a.pdf", 1, 1, None);
        cb.on_message(&ConversationEntry::system("ok"));
        cb.on_run_complete(&[]);
    }

    #[test]
    fn recorder_receives_only_overridden_events() {
        let rec = Recorder::default();
        rec.on_stage_change(WorkflowStage::Uploading, "Em andamento...");
        rec.on_stage_change(WorkflowStage::Extracting, "Extraindo tabelas...");
        rec.on_file_complete(0, 1, "a.pdf", 5);
        rec.on_file_error(0, 1, "a.pdf", "boom");
        rec.on_message(&ConversationEntry::user("pergunta"));

        assert_eq!(
            *rec.stages.lock().unwrap(),
            vec![WorkflowStage::Uploading, WorkflowStage::Extracting]
        );
        assert_eq!(rec.file_errors.load(Ordering::SeqCst), 1);
        assert_eq!(rec.messages.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_stage_change(WorkflowStage::Finalizing, "Finalizando...");
    }
}
