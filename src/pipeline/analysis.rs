//! Automated analysis sequencer.
//!
//! Walks [`QUESTION_CATALOG`] against the chat service once a run has
//! finalized, writing everything into the transcript:
//!
//! ```text
//! system     Iniciando análise detalhada do edital...
//! assistant  Vou analisar o edital em detalhes, ...
//! assistant  ## Informações Básicas
//! user       Qual é o objeto da licitação ...?
//! assistant  <answer>                       (pause)
//! ...
//! assistant  Análise do edital concluída. ...
//! ```
//!
//! Questions go out strictly one at a time. A failed question becomes a
//! system entry and the sequence continues. Only one analysis may run at a
//! time per workflow.

use crate::error::{EditalError, TaskError};
use crate::questions::{self, QUESTION_CATALOG};
use crate::state::WorkflowStage;
use crate::transcript::{ConversationEntry, EntryMetadata};
use crate::workflow::Workflow;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

/// What one analysis pass did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalysisReport {
    /// Document the questions were asked about; `None` if there was none.
    pub content_id: Option<String>,
    pub answered: usize,
    pub failures: Vec<TaskError>,
}

impl AnalysisReport {
    pub fn asked(&self) -> usize {
        self.answered + self.failures.len()
    }
}

/// Holds the single-run flag and clears it on drop.
struct RunningGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> RunningGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, EditalError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| EditalError::AnalysisInProgress)?;
        Ok(Self { flag })
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Ask every catalog question about the first completed document.
pub async fn run_analysis(workflow: &Workflow) -> Result<AnalysisReport, EditalError> {
    let stage = workflow.stage();
    if stage != WorkflowStage::Finalizing {
        return Err(EditalError::RunNotFinished {
            stage: stage.number(),
        });
    }
    let _running = RunningGuard::acquire(workflow.analysis_flag())?;

    let Some(content_id) = workflow.read(|s| s.chat_reference().map(str::to_string)) else {
        info!("No processed document; analysis skipped");
        workflow.append(ConversationEntry::system(questions::NO_PROCESSED_FILES));
        return Ok(AnalysisReport::default());
    };

    info!(
        "Starting analysis of {} ({} questions)",
        content_id,
        questions::question_count()
    );
    workflow.append(ConversationEntry::system(questions::ANALYSIS_STARTED));
    workflow.append(ConversationEntry::assistant(questions::ANALYSIS_INTRO));

    let chat = workflow.services().chat.clone();
    let pacing = workflow.config().question_pacing();
    let mut report = AnalysisReport {
        content_id: Some(content_id.clone()),
        ..Default::default()
    };

    for group in QUESTION_CATALOG {
        workflow.append(ConversationEntry::assistant(group.heading()));

        for question in group.questions {
            workflow.append(ConversationEntry::user(*question));

            match chat.chat(&content_id, question).await {
                Ok(response) => {
                    let metadata = EntryMetadata::from_response(
                        response.context_count,
                        response.similarity_scores.clone(),
                    );
                    workflow.append(
                        ConversationEntry::assistant(response.text()).with_metadata(metadata),
                    );
                    report.answered += 1;
                }
                Err(e) => {
                    let failure = TaskError::QuestionFailed {
                        question: question.to_string(),
                        detail: e.to_string(),
                    };
                    warn!("{}", failure);
                    workflow.append(ConversationEntry::system(questions::question_failed(question)));
                    report.failures.push(failure);
                }
            }

            tokio::time::sleep(pacing).await;
        }
    }

    workflow.append(ConversationEntry::assistant(questions::ANALYSIS_DONE));
    info!(
        "Analysis finished: {}/{} answered",
        report.answered,
        report.asked()
    );
    Ok(report)
}
