//! # edital-flow
//!
//! Drive procurement-notice PDFs (editais) through a document-processing
//! backend: table extraction, catalog enrichment and an automated question
//! sequence that summarizes the document.
//!
//! ## Workflow Overview
//!
//! ```text
//! PDFs
//!  │
//!  ├─ 1. Upload    accept PDFs (path, URL or bytes), no duplicate names
//!  ├─ 2. Extract   one file at a time → item count + tabular artifact
//!  ├─ 3. Enrich    all artifacts at once → matched / total descriptions
//!  ├─ 4. Finalize  summary rows + dashboard statistics
//!  └─ 5. Analyze   18 fixed questions in 4 groups → transcript
//! ```
//!
//! Per-file and per-question failures never abort a run: they are recorded
//! on the file or written into the transcript, and the run still reaches
//! stage 4. A fallback timer forces enrichment if extraction never hands
//! over.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edital_flow::{Workflow, WorkflowConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = WorkflowConfig::builder()
//!         .base_url("http://localhost:7070")
//!         .build()?;
//!     let workflow = Workflow::with_http_backend(config)?;
//!     workflow.add_input("edital.pdf").await?;
//!
//!     let report = workflow.run().await?;
//!     eprintln!("{} tables, {}% success",
//!         report.stats.tables_extracted,
//!         report.stats.success_rate_percent);
//!
//!     for entry in workflow.snapshot().transcript().entries() {
//!         println!("[{}] {}", entry.role, entry.text);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Tabular artifacts
//!
//! [`RecordTable::parse`] turns an extraction or enrichment artifact into
//! typed [`ParsedRecord`]s, recognising headers by synonym and falling back
//! to a positional layout:
//!
//! ```rust
//! use edital_flow::{ColumnSynonyms, RecordTable};
//!
//! let csv = "ITEM,DESCRIÇÃO,QTD,UN,VALOR_UNITARIO,VALOR_TOTAL\n\
//!            1,\"Caneta, azul\",10,UN,\"1,50\",\"15,00\"\n";
//! let table = RecordTable::parse(csv, &ColumnSynonyms::default());
//! assert_eq!(table.records[0].description, "Caneta, azul");
//! assert_eq!(table.grand_total_brl(), "R$ 15,00");
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `edital` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! ```toml
//! edital-flow = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod questions;
pub mod services;
pub mod state;
pub mod table;
pub mod task;
pub mod transcript;
pub mod workflow;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{WorkflowConfig, WorkflowConfigBuilder, DEFAULT_BASE_URL};
pub use error::{EditalError, TaskError};
pub use pipeline::analysis::AnalysisReport;
pub use pipeline::enrich::Quorum;
pub use progress::{NoopProgressCallback, ProgressCallback, WorkflowProgressCallback};
pub use questions::{QuestionGroup, QUESTION_CATALOG};
pub use services::{
    ArtifactService, ChatResponse, ChatService, EnrichmentRequest, EnrichmentResponse,
    EnrichmentService, ExtractionRequest, ExtractionResponse, ExtractionService, HttpBackend,
    Services,
};
pub use state::{Action, DashboardStats, ProcessingSummary, RunState, WorkflowStage};
pub use table::{
    format_brl, normalize_money, ColumnMapping, ColumnSynonyms, MappingKind, ParsedRecord,
    RecordColumn, RecordTable, SortDirection,
};
pub use task::{FileStatus, FileTask};
pub use transcript::{ConversationEntry, EntryMetadata, Role, Transcript};
pub use workflow::{ArtifactKind, FallbackTimer, RunReport, Workflow};
