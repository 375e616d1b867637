//! The workflow coordinator.
//!
//! [`Workflow`] owns the run state and sequences a run:
//!
//! ```text
//! start ─▶ extraction loop ─▶ enrichment dispatcher ─▶ finalize ─▶ analysis
//!   │          (sequential)        (racing, quorum)       (stage 4)   (optional)
//!   └─ fallback watchdog (10 s idle): forces enrichment if stage 3 was never reached
//! ```
//!
//! All mutation goes through [`Workflow::dispatch`], which applies one
//! [`Action`] under the state lock and then emits progress events for
//! changes that actually happened. The lock is never held across an
//! `.await`, so the extraction loop, enrichment completions and the fallback
//! timer interleave safely.
//!
//! The fallback timer's guard is the same atomic check-and-set used by the
//! normal path (`advance(Enriching)`), so exactly one of them wins and
//! dispatches enrichment.

use crate::config::WorkflowConfig;
use crate::error::EditalError;
use crate::pipeline::analysis::{self, AnalysisReport};
use crate::pipeline::{enrich, extract, input};
use crate::progress::ProgressCallback;
use crate::questions;
use crate::services::Services;
use crate::state::{Action, DashboardStats, ProcessingSummary, RunState, WorkflowStage};
use crate::table::RecordTable;
use crate::task::FileTask;
use crate::transcript::{ConversationEntry, EntryMetadata};
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Which artifact of a completed file to load as a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// Table written by the extraction service.
    #[default]
    Extraction,
    /// Table written by the enrichment service.
    Enriched,
}

/// Outcome of [`Workflow::run`].
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub summary: Vec<ProcessingSummary>,
    pub stats: DashboardStats,
    /// `None` when automated analysis is disabled or could not start.
    pub analysis: Option<AnalysisReport>,
}

/// Handle to an armed fallback timer.
#[derive(Debug)]
pub struct FallbackTimer {
    handle: JoinHandle<bool>,
}

impl FallbackTimer {
    /// Stop the timer. Has no effect if its action already started.
    pub fn cancel(self) {
        self.handle.abort();
    }

    /// Wait for the timer. `true` if it won the guard and ran its action.
    pub async fn join(self) -> bool {
        self.handle.await.unwrap_or(false)
    }
}

/// Progress side effect of an action, captured before it is applied.
enum Effect {
    Stage(WorkflowStage),
    Message(ConversationEntry),
    None,
}

impl Effect {
    fn of(action: &Action) -> Self {
        match action {
            Action::Start { .. } => Effect::Stage(WorkflowStage::Uploading),
            Action::Advance { stage, .. } => Effect::Stage(*stage),
            Action::Append(entry) => Effect::Message(entry.clone()),
            _ => Effect::None,
        }
    }
}

struct Inner {
    state: Mutex<RunState>,
    config: WorkflowConfig,
    services: Services,
    analysis_running: AtomicBool,
}

/// Coordinates upload, extraction, enrichment and analysis for a set of PDFs.
///
/// Cheap to clone; clones share the same run.
#[derive(Clone)]
pub struct Workflow {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("stage", &self.stage())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl Workflow {
    pub fn new(config: WorkflowConfig, services: Services) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(RunState::default()),
                config,
                services,
                analysis_running: AtomicBool::new(false),
            }),
        }
    }

    /// A workflow talking to the HTTP backend at `config.base_url`.
    pub fn with_http_backend(config: WorkflowConfig) -> Result<Self, EditalError> {
        let services = Services::http(&config)?;
        Ok(Self::new(config, services))
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.inner.config
    }

    pub(crate) fn services(&self) -> &Services {
        &self.inner.services
    }

    pub(crate) fn progress(&self) -> Option<&ProgressCallback> {
        self.inner.config.progress_callback.as_ref()
    }

    pub(crate) fn analysis_flag(&self) -> &AtomicBool {
        &self.inner.analysis_running
    }

    fn lock_state(&self) -> MutexGuard<'_, RunState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` against the current state without cloning it.
    pub(crate) fn read<T>(&self, f: impl FnOnce(&RunState) -> T) -> T {
        f(&self.lock_state())
    }

    /// A copy of the whole run state.
    pub fn snapshot(&self) -> RunState {
        self.lock_state().clone()
    }

    pub fn stage(&self) -> WorkflowStage {
        self.read(RunState::stage)
    }

    // ── Mutation ─────────────────────────────────────────────────────────

    /// Apply one action and emit its progress events if state changed.
    pub(crate) fn dispatch(&self, action: Action) -> Result<bool, EditalError> {
        let effect = Effect::of(&action);
        let (changed, summary) = {
            let mut state = self.lock_state();
            let changed = state.apply(action)?;
            let finished = changed
                && matches!(effect, Effect::Stage(WorkflowStage::Finalizing));
            (changed, finished.then(|| state.summary().to_vec()))
        };
        if changed {
            self.emit(effect, summary);
        }
        Ok(changed)
    }

    fn emit(&self, effect: Effect, summary: Option<Vec<ProcessingSummary>>) {
        match effect {
            Effect::Stage(stage) => {
                info!("Stage {}: {}", stage, stage.status_text());
                if let Some(cb) = self.progress() {
                    cb.on_stage_change(stage, stage.status_text());
                }
            }
            Effect::Message(entry) => {
                debug!("[{}] {}", entry.role, entry.text);
                if let Some(cb) = self.progress() {
                    cb.on_message(&entry);
                }
            }
            Effect::None => {}
        }
        if let Some(rows) = summary {
            if let Some(cb) = self.progress() {
                cb.on_run_complete(&rows);
            }
        }
    }

    /// Append a transcript entry.
    pub(crate) fn append(&self, entry: ConversationEntry) {
        if let Err(e) = self.dispatch(Action::Append(entry)) {
            warn!("Failed to append transcript entry: {}", e);
        }
    }

    /// Accept a file into the pending list. `Ok(false)` for a duplicate name.
    pub fn add_file(&self, task: FileTask) -> Result<bool, EditalError> {
        let name = task.name.clone();
        let added = self.dispatch(Action::AddFile(task))?;
        if added {
            debug!("Added file: {}", name);
        } else {
            info!("Ignoring duplicate file: {}", name);
        }
        Ok(added)
    }

    /// Resolve a local path or URL and add it.
    pub async fn add_input(&self, source: &str) -> Result<bool, EditalError> {
        let task = input::resolve_input(source, self.config().download_timeout_secs).await?;
        self.add_file(task)
    }

    /// Accept an in-memory upload (e.g. a file received over HTTP).
    pub fn add_upload(&self, name: impl Into<String>, bytes: Vec<u8>) -> Result<bool, EditalError> {
        self.add_file(input::accept_upload(name, bytes)?)
    }

    /// Drop a pending file. Fails while a run is active.
    pub fn remove_file(&self, name: &str) -> Result<(), EditalError> {
        self.dispatch(Action::RemoveFile(name.to_string()))?;
        Ok(())
    }

    /// Begin a run: stage 1, all files `Processing`, aggregates reset.
    pub fn start(&self) -> Result<(), EditalError> {
        self.dispatch(Action::Start { at: Instant::now() })?;
        Ok(())
    }

    /// Move to `stage` if it is ahead of the current one.
    ///
    /// Returns `true` only for the call that actually moved the stage, which
    /// makes it usable as an atomic check-and-set guard.
    pub fn advance(&self, stage: WorkflowStage) -> bool {
        matches!(
            self.dispatch(Action::Advance {
                stage,
                at: Instant::now(),
            }),
            Ok(true)
        )
    }

    /// Enter stage 4 and rebuild the summary. Idempotent.
    pub fn finalize(&self) -> bool {
        self.advance(WorkflowStage::Finalizing)
    }

    /// Schedule `action` to run once the run has been idle for `delay` and
    /// the stage is still below `predicate`.
    ///
    /// Idle means no extraction request outstanding and no request or
    /// response within the last `delay`. Each check that finds activity
    /// pushes the deadline back, so a loop that is slow but progressing is
    /// never overtaken. The timer never fires earlier than `delay` after
    /// arming. The stage move to `predicate` is the same check-and-set the
    /// normal path uses, so the normal path and the timer can never both
    /// proceed.
    pub fn arm_fallback<F, Fut>(
        &self,
        delay: Duration,
        predicate: WorkflowStage,
        action: F,
    ) -> FallbackTimer
    where
        F: FnOnce(Workflow) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let workflow = self.clone();
        let armed_at = Instant::now();
        let handle = tokio::spawn(async move {
            let mut deadline = armed_at + delay;
            loop {
                tokio::time::sleep_until(deadline).await;
                let (stage, idle_since) = workflow.read(|s| (s.stage(), s.idle_since()));
                if stage >= predicate {
                    break;
                }
                match idle_since {
                    None => deadline = Instant::now() + delay,
                    Some(since) if since.max(armed_at) + delay > Instant::now() => {
                        deadline = since.max(armed_at) + delay;
                    }
                    Some(_) => break,
                }
            }
            if workflow.advance(predicate) {
                warn!(
                    "Stage {} not reached after {:?} without progress; fallback taking over",
                    predicate, delay
                );
                action(workflow).await;
                true
            } else {
                debug!("Fallback for stage {} superseded", predicate);
                false
            }
        });
        FallbackTimer { handle }
    }

    // ── Runs ─────────────────────────────────────────────────────────────

    /// Process every pending file end to end.
    ///
    /// Per-file and per-question failures never fail the run; they are
    /// recorded on the file or in the transcript. `Err` means the run could
    /// not start at all.
    pub async fn run(&self) -> Result<RunReport, EditalError> {
        self.start()?;
        let total = self.read(|s| s.files().len());
        info!("Starting run with {} file(s)", total);

        let fallback = self.arm_fallback(
            self.config().fallback_delay(),
            WorkflowStage::Enriching,
            |workflow| async move { enrich::dispatch(&workflow).await },
        );

        extract::run_extraction(self).await;

        if self.advance(WorkflowStage::Enriching) {
            fallback.cancel();
            enrich::dispatch(self).await;
        } else {
            fallback.join().await;
        }
        // Both enrichment paths finalize; this covers a fallback that panicked.
        self.finalize();

        let analysis = if self.config().auto_analysis {
            tokio::time::sleep(self.config().analysis_delay()).await;
            match analysis::run_analysis(self).await {
                Ok(report) => Some(report),
                Err(e) => {
                    warn!("Automated analysis skipped: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let (summary, stats) = self.read(|s| {
            let stats = s.final_stats().cloned().unwrap_or_else(|| s.dashboard());
            (s.summary().to_vec(), stats)
        });
        info!(
            "Run finished: {} file(s), {} tables, {}% success in {:.1}s",
            stats.total_files, stats.tables_extracted, stats.success_rate_percent, stats.processing_secs
        );
        Ok(RunReport {
            summary,
            stats,
            analysis,
        })
    }

    /// Run the automated analysis now. Requires stage 4.
    pub async fn analyze(&self) -> Result<AnalysisReport, EditalError> {
        analysis::run_analysis(self).await
    }

    /// Ask a follow-up question about the processed document.
    ///
    /// The question and the reply (answer or explanation) are appended to the
    /// transcript; the reply is also returned. Blank questions are ignored.
    pub async fn ask(&self, question: &str) -> Option<ConversationEntry> {
        let question = question.trim();
        if question.is_empty() {
            return None;
        }
        self.append(ConversationEntry::user(question));

        let Some(content_id) = self.read(|s| s.chat_reference().map(str::to_string)) else {
            let reply = ConversationEntry::system(questions::NO_DOCUMENT_FOR_QUERY);
            self.append(reply.clone());
            return Some(reply);
        };

        let reply = match self.services().chat.chat(&content_id, question).await {
            Ok(response) => {
                let metadata = EntryMetadata::from_response(
                    response.context_count,
                    response.similarity_scores.clone(),
                );
                ConversationEntry::assistant(response.text()).with_metadata(metadata)
            }
            Err(e) => {
                warn!("Follow-up question failed: {}", e);
                ConversationEntry::system(questions::message_failed(&e.to_string()))
            }
        };
        self.append(reply.clone());
        Some(reply)
    }

    /// Fetch and parse an artifact of the first completed file.
    pub async fn load_table(&self, kind: ArtifactKind) -> Result<RecordTable, EditalError> {
        let path = self.read(|s| {
            let file = s.first_completed()?;
            let path = match kind {
                ArtifactKind::Extraction => file.extraction_artifact_path.as_deref(),
                ArtifactKind::Enriched => file.enriched_artifact_path.as_deref(),
            };
            path.filter(|p| !p.is_empty()).map(str::to_string)
        });
        let path = path.ok_or_else(|| {
            EditalError::NoProcessedDocument(format!(
                "no completed file has {} artifact",
                match kind {
                    ArtifactKind::Extraction => "an extraction",
                    ArtifactKind::Enriched => "an enriched",
                }
            ))
        })?;

        debug!("Loading {:?} artifact: {}", kind, path);
        let text = self.services().artifacts.fetch_artifact(&path).await?;
        Ok(RecordTable::parse(&text, &self.config().column_synonyms))
    }
}
