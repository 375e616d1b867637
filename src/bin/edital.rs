//! CLI binary for edital-flow.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `WorkflowConfig`, runs the workflow and prints the results.

use anyhow::{Context, Result};
use clap::Parser;
use edital_flow::{
    ArtifactKind, ColumnSynonyms, ConversationEntry, DashboardStats, FileStatus, ParsedRecord,
    ProcessingSummary, ProgressCallback, RecordColumn, RecordTable, Role, SortDirection, Workflow,
    WorkflowConfig, WorkflowProgressCallback, WorkflowStage, DEFAULT_BASE_URL,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

/// Cut `s` to at most `max` characters, marking the cut with an ellipsis.
fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max.saturating_sub(1)) {
        Some((cut, _)) if s.chars().count() > max => format!("{}\u{2026}", &s[..cut]),
        _ => s.to_string(),
    }
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar over the extraction loop plus one
/// log line per file and per enrichment response.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Per-file wall-clock start times for elapsed reporting.
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading inputs…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    /// Switch to the counter style once the file count is known.
    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, index: usize) -> f64 {
        self.start_times
            .lock()
            .unwrap()
            .remove(&index)
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl WorkflowProgressCallback for CliProgressCallback {
    fn on_stage_change(&self, stage: WorkflowStage, status_text: &str) {
        self.bar.set_prefix(status_text.to_string());
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Stage {stage}"))
        ));
    }

    fn on_file_start(&self, index: usize, total: usize, name: &str) {
        if index == 0 {
            self.activate_bar(total);
        }
        self.start_times
            .lock()
            .unwrap()
            .insert(index, Instant::now());
        self.bar.set_message(name.to_string());
    }

    fn on_file_complete(&self, index: usize, total: usize, name: &str, item_count: u64) {
        let elapsed = self.elapsed_secs(index);
        self.bar.println(format!(
            "  {} {:>3}/{:<3} {}  {}  {}",
            green("✓"),
            index + 1,
            total,
            truncate(name, 40),
            dim(&format!("{item_count:>5} tables")),
            dim(&format!("{elapsed:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_file_error(&self, index: usize, total: usize, name: &str, error: &str) {
        let elapsed = self.elapsed_secs(index);
        self.errors.fetch_add(1, Ordering::SeqCst);
        self.bar.println(format!(
            "  {} {:>3}/{:<3} {}  {}  {}",
            red("✗"),
            index + 1,
            total,
            truncate(name, 40),
            red(&truncate(error, 80)),
            dim(&format!("{elapsed:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_enrichment_resolved(
        &self,
        name: &str,
        resolved: usize,
        expected: usize,
        error: Option<&str>,
    ) {
        let mark = match error {
            None => green("✓"),
            Some(_) => red("✗"),
        };
        let detail = error.map(|e| red(&truncate(e, 80))).unwrap_or_default();
        self.bar.println(format!(
            "  {} enrich {}/{}  {}  {}",
            mark,
            resolved,
            expected,
            truncate(name, 40),
            detail
        ));
    }

    fn on_message(&self, entry: &ConversationEntry) {
        if entry.role == Role::User {
            self.bar.set_message(truncate(&entry.text, 60));
        }
    }

    fn on_run_complete(&self, summary: &[ProcessingSummary]) {
        let failed = self.errors.load(Ordering::SeqCst);
        let ok = summary.len().saturating_sub(failed);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        self.bar.set_style(spinner_style);
        self.bar.set_message("");
        self.bar.println(format!(
            "{} {}/{} files processed{}",
            if failed == 0 { green("✔") } else { cyan("⚠") },
            bold(&ok.to_string()),
            summary.len(),
            if failed > 0 {
                format!("  ({} failed)", red(&failed.to_string()))
            } else {
                String::new()
            }
        ));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Process two notices against a local backend
  edital edital-01.pdf edital-02.pdf

  # Download a notice and skip the automated analysis
  edital --no-analysis https://example.org/edital.pdf

  # Ask follow-up questions once the run finishes
  edital edital.pdf --ask "Qual é o prazo de entrega?" --ask "Há exigência de amostra?"

  # Show the enriched table, filtered and sorted by total value
  edital edital.pdf --table enriched --search caneta --sort total --desc

  # Parse a local artifact without a backend
  edital --parse-only results/edital.csv --sort description

  # Machine-readable output
  edital --json edital.pdf > run.json

ENVIRONMENT VARIABLES:
  EDITAL_BASE_URL          Backend base URL (default http://localhost:7070)
  EDITAL_FORMAT            Extraction format tag (default generico)
  EDITAL_DESCRIPTION_COLUMN
                           Column matched against the catalog (default DESCRIÇÃO)
  EDITAL_SIMILARITY        Catalog similarity threshold (default 0.5)
  RUST_LOG                 Overrides the log filter set by --verbose/--quiet
"#;

/// Run procurement notices through extraction, enrichment and automated Q&A.
#[derive(Parser, Debug)]
#[command(
    name = "edital",
    version,
    about = "Run procurement-notice PDFs through extraction, enrichment and automated Q&A",
    long_about = "Send procurement-notice PDFs (local files or URLs) to a document-processing \
backend: extract their item tables one file at a time, enrich the results against the product \
catalog, then ask a fixed sequence of questions about the first processed document.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF paths or HTTP/HTTPS URLs.
    inputs: Vec<String>,

    /// Backend base URL.
    #[arg(long, env = "EDITAL_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Extraction format tag sent as `formato`.
    #[arg(long, env = "EDITAL_FORMAT", default_value = "generico")]
    format: String,

    /// Ask the extraction service for debug output.
    #[arg(long, env = "EDITAL_EXTRACTION_DEBUG")]
    extraction_debug: bool,

    /// Column matched against the product catalog during enrichment.
    #[arg(long, env = "EDITAL_DESCRIPTION_COLUMN", default_value = "DESCRIÇÃO")]
    description_column: String,

    /// Catalog similarity threshold (decimal string).
    #[arg(long, env = "EDITAL_SIMILARITY", default_value = "0.5")]
    similarity_threshold: String,

    /// Maximum enrichment requests in flight (at least 1).
    #[arg(long, env = "EDITAL_ENRICHMENT_CONCURRENCY", default_value_t = 16)]
    enrichment_concurrency: usize,

    /// Pause between two extraction requests, in milliseconds.
    #[arg(long, env = "EDITAL_FILE_PACING_MS", default_value_t = 500)]
    file_pacing_ms: u64,

    /// Force enrichment if extraction makes no progress for this long.
    #[arg(long, env = "EDITAL_FALLBACK_DELAY_MS", default_value_t = 10_000)]
    fallback_delay_ms: u64,

    /// Pause between two automated questions, in milliseconds.
    #[arg(long, env = "EDITAL_QUESTION_PACING_MS", default_value_t = 800)]
    question_pacing_ms: u64,

    /// Skip the automated question sequence.
    #[arg(long, env = "EDITAL_NO_ANALYSIS")]
    no_analysis: bool,

    /// Follow-up question to ask after the run (repeatable).
    #[arg(long = "ask", value_name = "QUESTION")]
    questions: Vec<String>,

    /// Print the first completed file's table.
    #[arg(long, value_enum, env = "EDITAL_TABLE")]
    table: Option<TableArg>,

    /// Parse a local tabular artifact and print it; no backend needed.
    #[arg(long, value_name = "CSV", conflicts_with_all = ["inputs", "table"])]
    parse_only: Option<PathBuf>,

    /// Only show table rows whose description or item id matches.
    #[arg(long)]
    search: Option<String>,

    /// Sort table rows by column: item, description, quantity, unit, price, total, product, similarity.
    #[arg(long, value_parser = parse_column)]
    sort: Option<RecordColumn>,

    /// Sort descending.
    #[arg(long, requires = "sort")]
    desc: bool,

    /// Output structured JSON instead of text.
    #[arg(long, env = "EDITAL_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "EDITAL_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "EDITAL_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and results.
    #[arg(short, long, env = "EDITAL_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds for URL inputs.
    #[arg(long, env = "EDITAL_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Backend request timeout in seconds.
    #[arg(long, env = "EDITAL_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum TableArg {
    Extraction,
    Enriched,
}

impl From<TableArg> for ArtifactKind {
    fn from(v: TableArg) -> Self {
        match v {
            TableArg::Extraction => ArtifactKind::Extraction,
            TableArg::Enriched => ArtifactKind::Enriched,
        }
    }
}

fn parse_column(s: &str) -> std::result::Result<RecordColumn, String> {
    RecordColumn::from_name(s).ok_or_else(|| format!("unknown column '{s}'"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Library INFO logs are noise while the progress bar is drawing.
    let show_progress =
        !cli.quiet && !cli.no_progress && !cli.json && cli.parse_only.is_none();
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let sort = cli.sort.map(|column| {
        let direction = if cli.desc {
            SortDirection::Descending
        } else {
            SortDirection::default()
        };
        (column, direction)
    });

    // ── Parse-only mode ──────────────────────────────────────────────────
    if let Some(ref path) = cli.parse_only {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {:?}", path))?;
        let table = RecordTable::parse(&text, &ColumnSynonyms::default());
        let search = cli.search.as_deref().unwrap_or("");
        if cli.json {
            let rows = table.view(search, sort);
            let json = serde_json::json!({
                "mapping": table.mapping,
                "records": rows,
                "skipped": table.skipped,
                "grand_total": table.grand_total(),
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&json).context("Failed to serialise table")?
            );
        } else {
            print_table(&table, search, sort);
        }
        return Ok(());
    }

    if cli.inputs.is_empty() {
        anyhow::bail!("No input files given. Pass at least one PDF path or URL.");
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress = show_progress.then(CliProgressCallback::new);
    let config = build_config(
        &cli,
        progress
            .clone()
            .map(|cb| cb as Arc<dyn WorkflowProgressCallback>),
    )?;

    let workflow = Workflow::with_http_backend(config).context("Failed to create backend client")?;

    for input in &cli.inputs {
        let added = workflow
            .add_input(input)
            .await
            .with_context(|| format!("Failed to load '{}'", input))?;
        if !added && !cli.quiet {
            eprintln!("{} {} already added, skipping", cyan("⚠"), input);
        }
    }

    // ── Run ──────────────────────────────────────────────────────────────
    let report = workflow.run().await.context("Processing run failed")?;

    for question in &cli.questions {
        workflow.ask(question).await;
    }

    let table = match cli.table {
        Some(kind) => Some(
            workflow
                .load_table(kind.into())
                .await
                .context("Failed to load table")?,
        ),
        None => None,
    };

    if let Some(cb) = progress {
        cb.finish();
    }

    let state = workflow.snapshot();
    let search = cli.search.as_deref().unwrap_or("");

    if cli.json {
        let table_json = table.as_ref().map(|t| {
            serde_json::json!({
                "mapping": t.mapping,
                "records": t.view(search, sort),
                "skipped": t.skipped,
                "grand_total": t.grand_total(),
            })
        });
        let json = serde_json::json!({
            "files": state.files(),
            "summary": report.summary,
            "stats": report.stats,
            "analysis": report.analysis,
            "transcript": state.transcript(),
            "table": table_json,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&json).context("Failed to serialise output")?
        );
        return Ok(());
    }

    print_transcript(state.transcript().entries());
    print_summary(&report.summary);
    print_stats(&report.stats);
    if let Some(ref table) = table {
        println!();
        print_table(table, search, sort);
    }

    Ok(())
}

/// Map CLI args to `WorkflowConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<WorkflowConfig> {
    let mut builder = WorkflowConfig::builder()
        .base_url(cli.base_url.clone())
        .request_timeout_secs(cli.api_timeout)
        .download_timeout_secs(cli.download_timeout)
        .extraction_format(cli.format.clone())
        .extraction_debug(cli.extraction_debug)
        .description_column(cli.description_column.clone())
        .similarity_threshold(cli.similarity_threshold.clone())
        .enrichment_concurrency(cli.enrichment_concurrency)
        .file_pacing_ms(cli.file_pacing_ms)
        .fallback_delay_ms(cli.fallback_delay_ms)
        .question_pacing_ms(cli.question_pacing_ms)
        .auto_analysis(!cli.no_analysis);

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

// ── Text output ──────────────────────────────────────────────────────────────

fn print_transcript(entries: &[ConversationEntry]) {
    for entry in entries {
        match entry.role {
            Role::User => println!("{} {}", bold("›"), bold(&entry.text)),
            Role::Assistant => {
                println!("{}", entry.text);
                if let Some(ref meta) = entry.metadata {
                    let mut parts = Vec::new();
                    if let Some(count) = meta.context_count {
                        parts.push(format!("{count} excerpts"));
                    }
                    if let Some(top) = meta.top_relevance_percent() {
                        parts.push(format!("top relevance {top:.1}%"));
                    }
                    println!("{}", dim(&format!("  ({})", parts.join(", "))));
                }
            }
            Role::System => println!("{}", dim(&entry.text)),
        }
        println!();
    }
}

fn print_summary(rows: &[ProcessingSummary]) {
    println!(
        "{}",
        bold(&format!(
            "{:<40} {:<10} {:>7} {:>8} {:>12}",
            "File", "Status", "Tables", "Time", "Recognition"
        ))
    );
    for row in rows {
        let padded = format!("{:<10}", row.status.to_string());
        let status = match row.status {
            FileStatus::Completed => green(&padded),
            FileStatus::Error => red(&padded),
            _ => padded,
        };
        let recognition = row
            .recognition_rate_percent()
            .map(|p| format!("{p:.1}%"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<40} {} {:>7} {:>7.1}s {:>12}",
            truncate(&row.file_name, 40),
            status,
            row.table_count,
            row.elapsed_secs,
            recognition
        );
    }
}

fn print_stats(stats: &DashboardStats) {
    println!();
    println!(
        "Files: {}   Tables: {}   Time: {:.1}s   Success: {}%   Recognition: {:.1}%",
        bold(&stats.total_files.to_string()),
        bold(&stats.tables_extracted.to_string()),
        stats.processing_secs,
        stats.success_rate_percent,
        stats.recognition_rate_percent,
    );
}

fn print_table(table: &RecordTable, search: &str, sort: Option<(RecordColumn, SortDirection)>) {
    let rows = table.view(search, sort);
    println!(
        "{}",
        bold(&format!(
            "{:<8} {:<48} {:>10} {:<6} {:>14} {:>16}",
            "Item", "Description", "Qty", "Unit", "Unit value", "Total"
        ))
    );
    for record in &rows {
        print_record(record);
    }
    println!(
        "{}",
        dim(&format!(
            "{} of {} rows ({} skipped)   grand total {}",
            rows.len(),
            table.len(),
            table.skipped.len(),
            table.grand_total_brl()
        ))
    );
}

fn print_record(record: &ParsedRecord) {
    println!(
        "{:<8} {:<48} {:>10} {:<6} {:>14} {:>16}",
        truncate(&record.item_id, 8),
        truncate(&record.description, 48),
        record.quantity,
        truncate(&record.unit, 6),
        edital_flow::format_brl(record.unit_value),
        edital_flow::format_brl(record.total_value),
    );
    if let Some(ref product) = record.base_product {
        let similarity = record
            .similarity
            .map(|s| format!(" ({:.0}%)", s * 100.0))
            .unwrap_or_default();
        println!("{}", dim(&format!("         ↳ {product}{similarity}")));
    }
}
