//! Sequential extraction loop.
//!
//! Files go to the extraction service strictly one at a time, in list order,
//! with a fixed pause between two files. Each response updates its file
//! before the next request is sent. A failure marks that file `Error` and
//! the loop moves on. Every request and response is recorded as run
//! activity, which is what the fallback watchdog watches.

use crate::error::TaskError;
use crate::services::{ExtractionRequest, ExtractionResponse};
use crate::state::{Action, WorkflowStage};
use crate::workflow::Workflow;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info, warn};

/// Send every file of the current run to the extraction service.
pub async fn run_extraction(workflow: &Workflow) {
    let (files, run_start): (Vec<(String, Arc<[u8]>)>, Instant) = workflow.read(|s| {
        let files = s
            .files()
            .iter()
            .map(|f| (f.name.clone(), Arc::clone(&f.payload)))
            .collect();
        (files, s.started_at().unwrap_or_else(Instant::now))
    });
    let total = files.len();
    let config = workflow.config();

    workflow.advance(WorkflowStage::Extracting);

    for (index, (name, payload)) in files.into_iter().enumerate() {
        if index > 0 {
            tokio::time::sleep(config.file_pacing()).await;
        }
        info!("Extracting file {}/{}: {}", index + 1, total, name);
        if let Some(cb) = workflow.progress() {
            cb.on_file_start(index, total, &name);
        }

        let request = ExtractionRequest {
            file_name: name.clone(),
            payload,
            format: config.extraction_format.clone(),
            debug: config.extraction_debug,
        };
        if let Err(e) = workflow.dispatch(Action::ExtractionRequested {
            index,
            at: Instant::now(),
        }) {
            warn!("{}: could not record extraction request: {}", name, e);
        }
        let result = workflow.services().extraction.extract(request).await;
        let at = Instant::now();

        match result {
            Ok(response) if response.success => {
                record_success(workflow, index, total, &name, response, at, run_start)
            }
            Ok(response) => {
                let detail = response
                    .error
                    .filter(|e| !e.is_empty())
                    .unwrap_or_else(|| "extraction service reported failure".to_string());
                record_failure(workflow, index, total, &name, detail, at);
            }
            Err(e) => record_failure(workflow, index, total, &name, e.to_string(), at),
        }
    }
}

fn record_success(
    workflow: &Workflow,
    index: usize,
    total: usize,
    name: &str,
    response: ExtractionResponse,
    at: Instant,
    run_start: Instant,
) {
    let items = response.item_count.unwrap_or(0);
    match workflow.dispatch(Action::ExtractionSucceeded {
        index,
        response,
        at,
    }) {
        Ok(true) => {
            info!(
                "{}: {} item(s) extracted at {:.1}s",
                name,
                items,
                at.saturating_duration_since(run_start).as_secs_f64()
            );
            if let Some(cb) = workflow.progress() {
                cb.on_file_complete(index, total, name, items);
            }
        }
        Ok(false) => warn!("{}: late extraction result ignored", name),
        Err(e) => warn!("{}: could not record extraction result: {}", name, e),
    }
}

fn record_failure(
    workflow: &Workflow,
    index: usize,
    total: usize,
    name: &str,
    detail: String,
    at: Instant,
) {
    warn!("{}: extraction failed: {}", name, detail);
    let error = TaskError::ExtractionFailed {
        file: name.to_string(),
        detail: detail.clone(),
    };
    match workflow.dispatch(Action::ExtractionFailed {
        index,
        error,
        at,
    }) {
        Ok(true) => {
            if let Some(cb) = workflow.progress() {
                cb.on_file_error(index, total, name, &detail);
            }
        }
        Ok(false) => warn!("{}: late extraction failure ignored", name),
        Err(e) => warn!("{}: could not record extraction failure: {}", name, e),
    }
}
