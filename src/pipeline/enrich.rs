//! Enrichment dispatcher.
//!
//! Runs once per run, after extraction (or when the fallback timer forces
//! it). Three outcomes:
//!
//! * no completed file: finalize immediately;
//! * completed files, none with an artifact path: wait the simulated delay,
//!   then finalize;
//! * otherwise: one enrichment request per eligible file, all in flight
//!   together. Responses arrive in any order. A [`Quorum`] counts them,
//!   successes and failures alike, and the run finalizes when it is met.

use crate::error::TaskError;
use crate::services::EnrichmentRequest;
use crate::state::Action;
use crate::workflow::Workflow;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Completion barrier over a fixed number of independently resolving tasks.
///
/// [`Quorum::record`] returns `true` exactly once: on the call that brings
/// the resolved count to the expected count. Calls beyond that are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quorum {
    expected: usize,
    resolved: usize,
}

impl Quorum {
    pub fn new(expected: usize) -> Self {
        Self {
            expected,
            resolved: 0,
        }
    }

    /// Count one resolution. `true` when this one completes the quorum.
    pub fn record(&mut self) -> bool {
        if self.resolved >= self.expected {
            return false;
        }
        self.resolved += 1;
        self.resolved == self.expected
    }

    pub fn resolved(&self) -> usize {
        self.resolved
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    pub fn is_met(&self) -> bool {
        self.resolved >= self.expected
    }
}

/// Enrich every eligible file, then finalize the run.
pub async fn dispatch(workflow: &Workflow) {
    let (completed, eligible) = workflow.read(|s| {
        let eligible: Vec<(usize, String, String)> = s
            .enrichable_indices()
            .into_iter()
            .filter_map(|i| {
                let file = &s.files()[i];
                let path = file.extraction_artifact_path.clone()?;
                Some((i, file.name.clone(), path))
            })
            .collect();
        (s.completed_count(), eligible)
    });
    let config = workflow.config();

    if completed == 0 {
        info!("No completed files; skipping enrichment");
        workflow.finalize();
        return;
    }

    if eligible.is_empty() {
        info!(
            "No extraction artifacts to enrich; finalizing in {:?}",
            config.simulated_enrichment()
        );
        tokio::time::sleep(config.simulated_enrichment()).await;
        workflow.finalize();
        return;
    }

    let mut quorum = Quorum::new(eligible.len());
    info!("Enriching {} file(s)", quorum.expected());

    let service = Arc::clone(&workflow.services().enrichment);
    let mut responses = stream::iter(eligible.into_iter().map(|(index, name, path)| {
        let service = Arc::clone(&service);
        let request = EnrichmentRequest {
            file_path: path,
            description_column: config.description_column.clone(),
            similarity_threshold: config.similarity_threshold.clone(),
        };
        async move { (index, name, service.enrich(request).await) }
    }))
    .buffer_unordered(config.enrichment_concurrency);

    while let Some((index, name, result)) = responses.next().await {
        let error = match result {
            Ok(response) => {
                debug!(
                    "{}: matched {:?}/{:?}",
                    name, response.matched_count, response.total_descriptions
                );
                if let Err(e) = workflow.dispatch(Action::EnrichmentSucceeded { index, response }) {
                    warn!("{}: could not record enrichment: {}", name, e);
                }
                None
            }
            Err(e) => {
                let detail = e.to_string();
                warn!("{}: enrichment failed: {}", name, detail);
                let error = TaskError::EnrichmentFailed {
                    file: name.clone(),
                    detail: detail.clone(),
                };
                if let Err(e) = workflow.dispatch(Action::EnrichmentFailed { index, error }) {
                    warn!("{}: could not record enrichment failure: {}", name, e);
                }
                Some(detail)
            }
        };

        let complete = quorum.record();
        if let Some(cb) = workflow.progress() {
            cb.on_enrichment_resolved(&name, quorum.resolved(), quorum.expected(), error.as_deref());
        }
        if complete {
            info!("All {} enrichment request(s) resolved", quorum.expected());
            workflow.finalize();
        }
    }
}
