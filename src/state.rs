//! Run state and its single mutation entry point.
//!
//! Every change to the file list, stage counter, aggregates and transcript is
//! expressed as an [`Action`] and applied by [`RunState::apply`]. The
//! coordinator holds the state behind one lock and never awaits while holding
//! it, so each action is an atomic read-modify-write no matter which
//! asynchronous completion (extraction loop, enrichment request, fallback
//! timer) issued it.
//!
//! ```text
//! Idle(0) ──start──▶ Uploading(1) ─▶ Extracting(2) ─▶ Enriching(3) ─▶ Finalizing(4)
//!    ▲                                                                    │
//!    └──────────────────────── start (new run) ◀──────────────────────────┘
//! ```

use crate::error::{EditalError, TaskError};
use crate::services::{EnrichmentResponse, ExtractionResponse};
use crate::task::{FileStatus, FileTask};
use crate::transcript::{ConversationEntry, Transcript};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::time::Instant;

// ── Stage ────────────────────────────────────────────────────────────────

/// Position of the workflow. Monotonic within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum WorkflowStage {
    #[default]
    Idle = 0,
    Uploading = 1,
    Extracting = 2,
    Enriching = 3,
    Finalizing = 4,
}

impl WorkflowStage {
    pub fn number(self) -> u8 {
        self as u8
    }

    /// Human-facing status line shown when the stage is entered.
    pub fn status_text(self) -> &'static str {
        match self {
            WorkflowStage::Idle => "Aguardando arquivos",
            WorkflowStage::Uploading => "Em andamento...",
            WorkflowStage::Extracting => "Extraindo tabelas...",
            WorkflowStage::Enriching => "Processando RAG...",
            WorkflowStage::Finalizing => "Finalizando...",
        }
    }

    /// Stages 1–3: a run is in flight and the file list is frozen.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            WorkflowStage::Uploading | WorkflowStage::Extracting | WorkflowStage::Enriching
        )
    }
}

impl fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkflowStage::Idle => "idle",
            WorkflowStage::Uploading => "uploading",
            WorkflowStage::Extracting => "extracting",
            WorkflowStage::Enriching => "enriching",
            WorkflowStage::Finalizing => "finalizing",
        };
        write!(f, "{} ({})", self.number(), s)
    }
}

// ── Actions ──────────────────────────────────────────────────────────────

/// Every state mutation the workflow can perform.
#[derive(Debug, Clone)]
pub enum Action {
    /// Accept a file into the pending list. Duplicate names are ignored.
    AddFile(FileTask),
    /// Drop a file by name. Rejected while a run is active.
    RemoveFile(String),
    /// Begin a new run: stage 1, every file `Processing`, aggregates cleared.
    Start { at: Instant },
    /// Move to `stage` if it is ahead of the current one.
    Advance { stage: WorkflowStage, at: Instant },
    /// An extraction request for file `index` was sent at `at`.
    ExtractionRequested { index: usize, at: Instant },
    /// The extraction service answered with `success: true` at `at`.
    ExtractionSucceeded {
        index: usize,
        response: ExtractionResponse,
        at: Instant,
    },
    /// The extraction call failed or reported failure at `at`.
    ExtractionFailed {
        index: usize,
        error: TaskError,
        at: Instant,
    },
    /// One enrichment request resolved successfully.
    EnrichmentSucceeded {
        index: usize,
        response: EnrichmentResponse,
    },
    /// One enrichment request failed. The file stays `Completed`.
    EnrichmentFailed { index: usize, error: TaskError },
    /// Append to the transcript.
    Append(ConversationEntry),
}

// ── Derived views ────────────────────────────────────────────────────────

/// One row of the results table, rebuilt wholesale when stage 4 is reached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingSummary {
    pub file_name: String,
    pub table_count: u64,
    pub status: FileStatus,
    pub elapsed_secs: f64,
    pub extraction_artifact_path: Option<String>,
    pub enriched_artifact_path: Option<String>,
    pub matched_count: Option<u64>,
    pub total_description_count: Option<u64>,
}

impl ProcessingSummary {
    fn from_task(task: &FileTask) -> Self {
        Self {
            file_name: task.name.clone(),
            table_count: task.extracted_table_count,
            status: task.status,
            elapsed_secs: task.elapsed_processing_secs,
            extraction_artifact_path: task.extraction_artifact_path.clone(),
            enriched_artifact_path: task.enriched_artifact_path.clone(),
            matched_count: task.matched_count,
            total_description_count: task.total_description_count,
        }
    }

    /// Share of descriptions recognised in the catalog, as a percentage.
    pub fn recognition_rate_percent(&self) -> Option<f64> {
        match (self.matched_count, self.total_description_count) {
            (Some(matched), Some(total)) if total > 0 => {
                Some(matched as f64 / total as f64 * 100.0)
            }
            _ => None,
        }
    }
}

/// Headline numbers for a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardStats {
    pub total_files: usize,
    pub tables_extracted: u64,
    /// Run start to stage 4, in seconds; 0 until the run finishes.
    pub processing_secs: f64,
    /// Completed files over all files, rounded to an integer percentage.
    pub success_rate_percent: u32,
    /// Σ matched / Σ descriptions, rounded to one decimal.
    pub recognition_rate_percent: f64,
}

// ── State container ──────────────────────────────────────────────────────

/// All in-memory state of the workflow.
#[derive(Debug, Clone, Default)]
pub struct RunState {
    stage: WorkflowStage,
    files: Vec<FileTask>,
    tables_extracted: u64,
    summary: Vec<ProcessingSummary>,
    transcript: Transcript,
    started_at: Option<Instant>,
    finished_at: Option<Instant>,
    /// Last extraction request or response of the current run.
    last_activity: Option<Instant>,
    extraction_in_flight: Option<usize>,
    final_stats: Option<DashboardStats>,
}

impl RunState {
    pub fn stage(&self) -> WorkflowStage {
        self.stage
    }

    pub fn files(&self) -> &[FileTask] {
        &self.files
    }

    pub fn tables_extracted(&self) -> u64 {
        self.tables_extracted
    }

    pub fn summary(&self) -> &[ProcessingSummary] {
        &self.summary
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// When the current (or last) run started.
    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    /// Instant from which the run counts as idle, or `None` while an
    /// extraction request is outstanding.
    pub fn idle_since(&self) -> Option<Instant> {
        match self.extraction_in_flight {
            Some(_) => None,
            None => self.last_activity.or(self.started_at),
        }
    }

    /// Stats frozen when stage 4 was reached. Consistent with [`Self::summary`].
    pub fn final_stats(&self) -> Option<&DashboardStats> {
        self.final_stats.as_ref()
    }

    /// First completed file that can back chat queries.
    pub fn chat_reference(&self) -> Option<&str> {
        self.files.iter().find_map(FileTask::chat_reference)
    }

    /// First completed file, used for table viewing.
    pub fn first_completed(&self) -> Option<&FileTask> {
        self.files
            .iter()
            .find(|f| f.status == FileStatus::Completed)
    }

    /// Indices of files eligible for enrichment.
    pub fn enrichable_indices(&self) -> Vec<usize> {
        self.files
            .iter()
            .enumerate()
            .filter(|(_, f)| f.is_enrichable())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn completed_count(&self) -> usize {
        self.files
            .iter()
            .filter(|f| f.status == FileStatus::Completed)
            .count()
    }

    pub fn dashboard(&self) -> DashboardStats {
        let total_files = self.files.len();
        let processing_secs = match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => end.saturating_duration_since(start).as_secs_f64(),
            _ => 0.0,
        };
        let success_rate_percent = if total_files > 0 {
            (self.completed_count() as f64 / total_files as f64 * 100.0).round() as u32
        } else {
            0
        };
        let matched: u64 = self.files.iter().filter_map(|f| f.matched_count).sum();
        let descriptions: u64 = self
            .files
            .iter()
            .filter_map(|f| f.total_description_count)
            .sum();
        let recognition_rate_percent = if descriptions > 0 {
            (matched as f64 / descriptions as f64 * 1000.0).round() / 10.0
        } else {
            0.0
        };

        DashboardStats {
            total_files,
            tables_extracted: self.tables_extracted,
            processing_secs,
            success_rate_percent,
            recognition_rate_percent,
        }
    }

    /// Apply one action.
    ///
    /// Returns `Ok(true)` when state changed, `Ok(false)` for a no-op (an
    /// advance to a stage already reached, a duplicate file, a late result
    /// for a file that already left `Processing`), and `Err` when the action
    /// is not allowed in the current state.
    pub fn apply(&mut self, action: Action) -> Result<bool, EditalError> {
        match action {
            Action::AddFile(task) => {
                if self.stage.is_active() {
                    return Err(EditalError::RunInProgress {
                        stage: self.stage.number(),
                    });
                }
                if self.files.iter().any(|f| f.name == task.name) {
                    return Ok(false);
                }
                self.files.push(task);
                Ok(true)
            }

            Action::RemoveFile(name) => {
                if self.stage.is_active() {
                    return Err(EditalError::RemovalDuringRun { name });
                }
                let pos = self
                    .files
                    .iter()
                    .position(|f| f.name == name)
                    .ok_or(EditalError::UnknownFile { name })?;
                self.files.remove(pos);
                Ok(true)
            }

            Action::Start { at } => {
                if self.stage.is_active() {
                    return Err(EditalError::RunInProgress {
                        stage: self.stage.number(),
                    });
                }
                if self.files.is_empty() {
                    return Err(EditalError::NoFiles);
                }
                self.stage = WorkflowStage::Uploading;
                self.tables_extracted = 0;
                self.summary.clear();
                self.started_at = Some(at);
                self.finished_at = None;
                self.last_activity = Some(at);
                self.extraction_in_flight = None;
                self.final_stats = None;
                for file in &mut self.files {
                    file.reset_results();
                    file.status = FileStatus::Processing;
                }
                Ok(true)
            }

            Action::Advance { stage, at } => {
                if stage <= self.stage {
                    return Ok(false);
                }
                self.stage = stage;
                if stage == WorkflowStage::Finalizing {
                    self.finished_at = Some(at);
                    self.summary = self.files.iter().map(ProcessingSummary::from_task).collect();
                    self.final_stats = Some(self.dashboard());
                }
                Ok(true)
            }

            Action::ExtractionRequested { index, at } => {
                self.file_mut(index)?;
                self.extraction_in_flight = Some(index);
                self.last_activity = Some(at);
                Ok(true)
            }

            Action::ExtractionSucceeded { index, response, at } => {
                let elapsed_secs = self.resolve_extraction(index, at);
                let Some(file) = self.transition(index, FileStatus::Completed)? else {
                    return Ok(false);
                };
                let items = response.item_count.unwrap_or(0);
                file.extracted_table_count = items;
                file.elapsed_processing_secs = elapsed_secs;
                file.extraction_artifact_path = response.output_path;
                file.content_reference_id = response.content_id;
                file.municipality = response.municipality;
                file.enriched_artifact_path = response.enhanced_file_path;
                file.matched_count = response.matched_count;
                file.total_description_count = response.total_descriptions;
                self.tables_extracted += items;
                Ok(true)
            }

            Action::ExtractionFailed { index, error, at } => {
                let elapsed_secs = self.resolve_extraction(index, at);
                let Some(file) = self.transition(index, FileStatus::Error)? else {
                    return Ok(false);
                };
                file.elapsed_processing_secs = elapsed_secs;
                file.last_error = Some(error);
                Ok(true)
            }

            Action::EnrichmentSucceeded { index, response } => {
                let file = self.file_mut(index)?;
                if file.status != FileStatus::Completed {
                    return Ok(false);
                }
                file.enriched_artifact_path = response.enhanced_file_path;
                file.matched_count = response.matched_count;
                file.total_description_count = response.total_descriptions;
                Ok(true)
            }

            Action::EnrichmentFailed { index, error } => {
                let file = self.file_mut(index)?;
                if file.status != FileStatus::Completed {
                    return Ok(false);
                }
                file.last_error = Some(error);
                Ok(true)
            }

            Action::Append(entry) => {
                self.transcript.push(entry);
                Ok(true)
            }
        }
    }

    /// Clear the in-flight marker for `index` and return seconds since run start.
    fn resolve_extraction(&mut self, index: usize, at: Instant) -> f64 {
        if self.extraction_in_flight == Some(index) {
            self.extraction_in_flight = None;
        }
        self.last_activity = Some(at);
        match self.started_at {
            Some(start) => at.saturating_duration_since(start).as_secs_f64(),
            None => 0.0,
        }
    }

    fn file_mut(&mut self, index: usize) -> Result<&mut FileTask, EditalError> {
        let len = self.files.len();
        self.files
            .get_mut(index)
            .ok_or_else(|| EditalError::Internal(format!("file index {index} out of range ({len})")))
    }

    /// Move a file to `next` if that is a legal forward step.
    fn transition(
        &mut self,
        index: usize,
        next: FileStatus,
    ) -> Result<Option<&mut FileTask>, EditalError> {
        let file = self.file_mut(index)?;
        if !file.status.can_transition_to(next) {
            return Ok(None);
        }
        file.status = next;
        Ok(Some(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn pdf(name: &str) -> FileTask {
        FileTask::new(name, b"%PDF-1.7".to_vec())
    }

    fn ok_response(items: u64, path: &str) -> ExtractionResponse {
        ExtractionResponse {
            success: true,
            item_count: Some(items),
            output_path: Some(path.to_string()),
            content_id: Some(format!("cid-{path}")),
            ..Default::default()
        }
    }

    /// `secs` after the run started.
    fn after(s: &RunState, secs: f64) -> Instant {
        s.started_at().unwrap() + Duration::from_secs_f64(secs)
    }

    fn started(names: &[&str]) -> RunState {
        let mut s = RunState::default();
        for n in names {
            s.apply(Action::AddFile(pdf(n))).unwrap();
        }
        s.apply(Action::Start { at: Instant::now() }).unwrap();
        s
    }

    #[test]
    fn duplicate_file_is_ignored() {
        let mut s = RunState::default();
        assert!(s.apply(Action::AddFile(pdf("a.pdf"))).unwrap());
        assert!(!s.apply(Action::AddFile(pdf("a.pdf"))).unwrap());
        assert_eq!(s.files().len(), 1);
    }

    #[test]
    fn start_marks_every_file_processing() {
        let s = started(&["a.pdf", "b.pdf"]);
        assert_eq!(s.stage(), WorkflowStage::Uploading);
        assert!(s.files().iter().all(|f| f.status == FileStatus::Processing));
    }

    #[test]
    fn start_without_files_fails() {
        let mut s = RunState::default();
        assert!(matches!(
            s.apply(Action::Start { at: Instant::now() }),
            Err(EditalError::NoFiles)
        ));
    }

    #[test]
    fn start_while_active_fails() {
        let mut s = started(&["a.pdf"]);
        assert!(matches!(
            s.apply(Action::Start { at: Instant::now() }),
            Err(EditalError::RunInProgress { stage: 1 })
        ));
    }

    #[test]
    fn advance_is_idempotent() {
        let mut s = started(&["a.pdf"]);
        let at = Instant::now();
        assert!(s.apply(Action::Advance { stage: WorkflowStage::Enriching, at }).unwrap());
        assert!(!s.apply(Action::Advance { stage: WorkflowStage::Extracting, at }).unwrap());
        assert!(!s.apply(Action::Advance { stage: WorkflowStage::Enriching, at }).unwrap());
        assert_eq!(s.stage(), WorkflowStage::Enriching);
    }

    #[test]
    fn removal_blocked_during_run() {
        let mut s = started(&["a.pdf"]);
        assert!(matches!(
            s.apply(Action::RemoveFile("a.pdf".into())),
            Err(EditalError::RemovalDuringRun { .. })
        ));
    }

    #[test]
    fn removal_allowed_before_start() {
        let mut s = RunState::default();
        s.apply(Action::AddFile(pdf("a.pdf"))).unwrap();
        assert!(s.apply(Action::RemoveFile("a.pdf".into())).unwrap());
        assert!(matches!(
            s.apply(Action::RemoveFile("a.pdf".into())),
            Err(EditalError::UnknownFile { .. })
        ));
    }

    #[test]
    fn late_result_does_not_reverse_status() {
        let mut s = started(&["a.pdf"]);
        s.apply(Action::ExtractionSucceeded {
            index: 0,
            response: ok_response(5, "a.csv"),
            at: after(&s, 1.0),
        })
        .unwrap();
        let changed = s
            .apply(Action::ExtractionFailed {
                index: 0,
                error: TaskError::ExtractionFailed {
                    file: "a.pdf".into(),
                    detail: "late".into(),
                },
                at: after(&s, 2.0),
            })
            .unwrap();
        assert!(!changed);
        assert_eq!(s.files()[0].status, FileStatus::Completed);
        assert!(s.files()[0].last_error.is_none());
    }

    #[test]
    fn tables_counter_sums_completed_items() {
        let mut s = started(&["a.pdf", "b.pdf", "c.pdf"]);
        s.apply(Action::ExtractionSucceeded {
            index: 0,
            response: ok_response(5, "a.csv"),
            at: after(&s, 1.0),
        })
        .unwrap();
        s.apply(Action::ExtractionFailed {
            index: 1,
            error: TaskError::ExtractionFailed {
                file: "b.pdf".into(),
                detail: "HTTP 500".into(),
            },
            at: after(&s, 1.5),
        })
        .unwrap();
        s.apply(Action::ExtractionSucceeded {
            index: 2,
            response: ok_response(7, "c.csv"),
            at: after(&s, 2.0),
        })
        .unwrap();
        assert_eq!(s.tables_extracted(), 12);

        s.apply(Action::Advance {
            stage: WorkflowStage::Finalizing,
            at: Instant::now(),
        })
        .unwrap();
        let stats = s.dashboard();
        assert_eq!(stats.success_rate_percent, 67);
        assert_eq!(s.summary().len(), 3);
        assert_eq!(
            s.summary()
                .iter()
                .filter(|r| r.status == FileStatus::Error)
                .count(),
            1
        );
    }

    #[test]
    fn new_run_resets_aggregates_but_keeps_transcript() {
        let mut s = started(&["a.pdf"]);
        s.apply(Action::ExtractionSucceeded {
            index: 0,
            response: ok_response(4, "a.csv"),
            at: after(&s, 1.0),
        })
        .unwrap();
        s.apply(Action::Append(ConversationEntry::assistant("olá")))
            .unwrap();
        s.apply(Action::Advance {
            stage: WorkflowStage::Finalizing,
            at: Instant::now(),
        })
        .unwrap();
        assert_eq!(s.summary().len(), 1);

        s.apply(Action::Start { at: Instant::now() }).unwrap();
        assert_eq!(s.tables_extracted(), 0);
        assert!(s.summary().is_empty());
        assert_eq!(s.transcript().len(), 1);
        assert_eq!(s.files()[0].extracted_table_count, 0);
    }

    #[test]
    fn enrichment_failure_keeps_file_completed() {
        let mut s = started(&["a.pdf"]);
        s.apply(Action::ExtractionSucceeded {
            index: 0,
            response: ok_response(3, "a.csv"),
            at: after(&s, 1.0),
        })
        .unwrap();
        s.apply(Action::EnrichmentFailed {
            index: 0,
            error: TaskError::EnrichmentFailed {
                file: "a.pdf".into(),
                detail: "HTTP 503".into(),
            },
        })
        .unwrap();
        assert_eq!(s.files()[0].status, FileStatus::Completed);
        assert!(s.files()[0].last_error.is_some());
    }

    #[test]
    fn recognition_rate_rounds_to_one_decimal() {
        let mut s = started(&["a.pdf", "b.pdf"]);
        for (i, name) in ["a.csv", "b.csv"].iter().enumerate() {
            s.apply(Action::ExtractionSucceeded {
                index: i,
                response: ok_response(1, name),
                at: after(&s, 0.5),
            })
            .unwrap();
        }
        s.apply(Action::EnrichmentSucceeded {
            index: 0,
            response: EnrichmentResponse {
                enhanced_file_path: Some("a_enh.csv".into()),
                matched_count: Some(1),
                total_descriptions: Some(3),
            },
        })
        .unwrap();
        assert_eq!(s.dashboard().recognition_rate_percent, 33.3);
    }

    #[test]
    fn summary_recognition_rate_needs_descriptions() {
        let mut row = ProcessingSummary {
            file_name: "a.pdf".into(),
            table_count: 1,
            status: FileStatus::Completed,
            elapsed_secs: 1.0,
            extraction_artifact_path: None,
            enriched_artifact_path: None,
            matched_count: Some(0),
            total_description_count: Some(0),
        };
        assert_eq!(row.recognition_rate_percent(), None);
        row.matched_count = Some(3);
        row.total_description_count = Some(4);
        assert_eq!(row.recognition_rate_percent(), Some(75.0));
    }

    #[test]
    fn enrichment_failure_ignored_for_failed_extraction() {
        let mut s = started(&["a.pdf"]);
        s.apply(Action::ExtractionFailed {
            index: 0,
            error: TaskError::ExtractionFailed {
                file: "a.pdf".into(),
                detail: "HTTP 500".into(),
            },
            at: after(&s, 1.0),
        })
        .unwrap();
        let changed = s
            .apply(Action::EnrichmentFailed {
                index: 0,
                error: TaskError::EnrichmentFailed {
                    file: "a.pdf".into(),
                    detail: "HTTP 503".into(),
                },
            })
            .unwrap();
        assert!(!changed);
        assert!(matches!(
            s.files()[0].last_error,
            Some(TaskError::ExtractionFailed { .. })
        ));
    }

    #[test]
    fn idle_clock_pauses_while_extraction_is_outstanding() {
        let mut s = started(&["a.pdf"]);
        assert_eq!(s.idle_since(), s.started_at());

        let sent = after(&s, 0.5);
        s.apply(Action::ExtractionRequested { index: 0, at: sent })
            .unwrap();
        assert_eq!(s.idle_since(), None);

        let answered = after(&s, 12.0);
        s.apply(Action::ExtractionSucceeded {
            index: 0,
            response: ok_response(5, "a.csv"),
            at: answered,
        })
        .unwrap();
        assert_eq!(s.idle_since(), Some(answered));
        assert_eq!(s.files()[0].elapsed_processing_secs, 12.0);
    }

    #[test]
    fn final_stats_are_frozen_with_the_summary() {
        let mut s = started(&["a.pdf", "b.pdf"]);
        s.apply(Action::ExtractionSucceeded {
            index: 0,
            response: ok_response(5, "a.csv"),
            at: after(&s, 1.0),
        })
        .unwrap();
        assert!(s.final_stats().is_none());
        s.apply(Action::Advance {
            stage: WorkflowStage::Finalizing,
            at: after(&s, 2.0),
        })
        .unwrap();

        s.apply(Action::ExtractionSucceeded {
            index: 1,
            response: ok_response(7, "b.csv"),
            at: after(&s, 3.0),
        })
        .unwrap();

        let frozen = s.final_stats().unwrap();
        assert_eq!(frozen.tables_extracted, 5);
        assert_eq!(frozen.success_rate_percent, 50);
        assert_eq!(frozen.processing_secs, 2.0);
        assert_eq!(s.summary()[1].status, FileStatus::Processing);
        assert_eq!(s.dashboard().tables_extracted, 12);

        s.apply(Action::Start { at: Instant::now() }).unwrap();
        assert!(s.final_stats().is_none());
    }
}
