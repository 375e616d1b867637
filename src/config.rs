//! Configuration for a workflow run.
//!
//! Every timing constant, wire-level fixed value and toggle lives in
//! [`WorkflowConfig`], built via [`WorkflowConfigBuilder`]. The defaults match
//! the production backend, so most callers only set the base URL.

use crate::error::EditalError;
use crate::progress::ProgressCallback;
use crate::table::ColumnSynonyms;
use std::fmt;
use std::time::Duration;

/// Default backend address.
pub const DEFAULT_BASE_URL: &str = "http://localhost:7070";

/// Configuration for a [`crate::Workflow`].
///
/// # Example
/// ```rust
/// use edital_flow::WorkflowConfig;
///
/// let config = WorkflowConfig::builder()
///     .base_url("http://backend:7070")
///     .file_pacing_ms(250)
///     .auto_analysis(false)
///     .build()
///     .unwrap();
/// assert_eq!(config.base_url, "http://backend:7070");
/// ```
#[derive(Clone)]
pub struct WorkflowConfig {
    /// Backend root, without trailing slash. Default: `http://localhost:7070`.
    pub base_url: String,

    /// Per-request timeout for every backend call, in seconds. Default: 120.
    pub request_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// `formato` field sent with every extraction request. Default: `generico`.
    pub extraction_format: String,

    /// `debug` field sent with every extraction request. Default: false.
    pub extraction_debug: bool,

    /// Pause between two files of the extraction loop. Default: 500 ms.
    pub file_pacing_ms: u64,

    /// Idle time after which the fallback timer forces enrichment if it has
    /// not started. Must exceed `file_pacing_ms`. Default: 10 000 ms.
    pub fallback_delay_ms: u64,

    /// Wait used when completed files exist but none has an artifact path.
    /// Default: 3 000 ms.
    pub simulated_enrichment_ms: u64,

    /// Column of the extraction artifact holding item descriptions.
    /// Default: `DESCRIÇÃO`.
    pub description_column: String,

    /// Similarity threshold sent to the enrichment service, verbatim.
    /// Default: `"0.5"`.
    pub similarity_threshold: String,

    /// Maximum enrichment requests in flight at once. Default: 16.
    pub enrichment_concurrency: usize,

    /// Delay between reaching stage 4 and the first analysis question.
    /// Default: 1 500 ms.
    pub analysis_delay_ms: u64,

    /// Pause after each analysis question. Default: 800 ms.
    pub question_pacing_ms: u64,

    /// Run the automated analysis after a run finalizes. Default: true.
    pub auto_analysis: bool,

    /// Header synonyms used when parsing tabular artifacts.
    pub column_synonyms: ColumnSynonyms,

    /// Optional per-event callback. Default: none.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: 120,
            download_timeout_secs: 120,
            extraction_format: "generico".to_string(),
            extraction_debug: false,
            file_pacing_ms: 500,
            fallback_delay_ms: 10_000,
            simulated_enrichment_ms: 3_000,
            description_column: "DESCRIÇÃO".to_string(),
            similarity_threshold: "0.5".to_string(),
            enrichment_concurrency: 16,
            analysis_delay_ms: 1_500,
            question_pacing_ms: 800,
            auto_analysis: true,
            column_synonyms: ColumnSynonyms::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for WorkflowConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowConfig")
            .field("base_url", &self.base_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("extraction_format", &self.extraction_format)
            .field("extraction_debug", &self.extraction_debug)
            .field("file_pacing_ms", &self.file_pacing_ms)
            .field("fallback_delay_ms", &self.fallback_delay_ms)
            .field("simulated_enrichment_ms", &self.simulated_enrichment_ms)
            .field("description_column", &self.description_column)
            .field("similarity_threshold", &self.similarity_threshold)
            .field("enrichment_concurrency", &self.enrichment_concurrency)
            .field("analysis_delay_ms", &self.analysis_delay_ms)
            .field("question_pacing_ms", &self.question_pacing_ms)
            .field("auto_analysis", &self.auto_analysis)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn WorkflowProgressCallback>"),
            )
            .finish()
    }
}

impl WorkflowConfig {
    /// Create a new builder for `WorkflowConfig`.
    pub fn builder() -> WorkflowConfigBuilder {
        WorkflowConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn file_pacing(&self) -> Duration {
        Duration::from_millis(self.file_pacing_ms)
    }

    pub fn fallback_delay(&self) -> Duration {
        Duration::from_millis(self.fallback_delay_ms)
    }

    pub fn simulated_enrichment(&self) -> Duration {
        Duration::from_millis(self.simulated_enrichment_ms)
    }

    pub fn analysis_delay(&self) -> Duration {
        Duration::from_millis(self.analysis_delay_ms)
    }

    pub fn question_pacing(&self) -> Duration {
        Duration::from_millis(self.question_pacing_ms)
    }
}

/// Builder for [`WorkflowConfig`].
pub struct WorkflowConfigBuilder {
    config: WorkflowConfig,
}

impl fmt::Debug for WorkflowConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl WorkflowConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs.max(1);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs.max(1);
        self
    }

    pub fn extraction_format(mut self, tag: impl Into<String>) -> Self {
        self.config.extraction_format = tag.into();
        self
    }

    pub fn extraction_debug(mut self, v: bool) -> Self {
        self.config.extraction_debug = v;
        self
    }

    pub fn file_pacing_ms(mut self, ms: u64) -> Self {
        self.config.file_pacing_ms = ms;
        self
    }

    pub fn fallback_delay_ms(mut self, ms: u64) -> Self {
        self.config.fallback_delay_ms = ms;
        self
    }

    pub fn simulated_enrichment_ms(mut self, ms: u64) -> Self {
        self.config.simulated_enrichment_ms = ms;
        self
    }

    pub fn description_column(mut self, column: impl Into<String>) -> Self {
        self.config.description_column = column.into();
        self
    }

    pub fn similarity_threshold(mut self, threshold: impl Into<String>) -> Self {
        self.config.similarity_threshold = threshold.into();
        self
    }

    pub fn enrichment_concurrency(mut self, n: usize) -> Self {
        self.config.enrichment_concurrency = n;
        self
    }

    pub fn analysis_delay_ms(mut self, ms: u64) -> Self {
        self.config.analysis_delay_ms = ms;
        self
    }

    pub fn question_pacing_ms(mut self, ms: u64) -> Self {
        self.config.question_pacing_ms = ms;
        self
    }

    pub fn auto_analysis(mut self, v: bool) -> Self {
        self.config.auto_analysis = v;
        self
    }

    pub fn column_synonyms(mut self, synonyms: ColumnSynonyms) -> Self {
        self.config.column_synonyms = synonyms;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<WorkflowConfig, EditalError> {
        let c = &self.config;
        if !(c.base_url.starts_with("http://") || c.base_url.starts_with("https://")) {
            return Err(EditalError::InvalidConfig(format!(
                "base URL must start with http:// or https://, got '{}'",
                c.base_url
            )));
        }
        if c.description_column.trim().is_empty() {
            return Err(EditalError::InvalidConfig(
                "description column must not be empty".into(),
            ));
        }
        if c.similarity_threshold.trim().parse::<f64>().is_err() {
            return Err(EditalError::InvalidConfig(format!(
                "similarity threshold must be numeric, got '{}'",
                c.similarity_threshold
            )));
        }
        if c.enrichment_concurrency == 0 {
            return Err(EditalError::InvalidConfig(
                "enrichment concurrency must be ≥ 1".into(),
            ));
        }
        if c.file_pacing_ms >= c.fallback_delay_ms {
            return Err(EditalError::InvalidConfig(format!(
                "file pacing ({} ms) must be shorter than the fallback delay ({} ms)",
                c.file_pacing_ms, c.fallback_delay_ms
            )));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_backend_contract() {
        let c = WorkflowConfig::default();
        assert_eq!(c.base_url, "http://localhost:7070");
        assert_eq!(c.extraction_format, "generico");
        assert!(!c.extraction_debug);
        assert_eq!(c.description_column, "DESCRIÇÃO");
        assert_eq!(c.similarity_threshold, "0.5");
        assert_eq!(c.file_pacing(), Duration::from_millis(500));
        assert_eq!(c.fallback_delay(), Duration::from_secs(10));
        assert_eq!(c.simulated_enrichment(), Duration::from_secs(3));
        assert_eq!(c.question_pacing(), Duration::from_millis(800));
        assert!(c.auto_analysis);
    }

    #[test]
    fn builder_trims_trailing_slash() {
        let c = WorkflowConfig::builder()
            .base_url("http://example.org:7070/")
            .build()
            .unwrap();
        assert_eq!(c.base_url, "http://example.org:7070");
    }

    #[test]
    fn builder_rejects_non_http_url() {
        let err = WorkflowConfig::builder()
            .base_url("ftp://example.org")
            .build()
            .unwrap_err();
        assert!(matches!(err, EditalError::InvalidConfig(_)));
    }

    #[test]
    fn builder_rejects_non_numeric_threshold() {
        let err = WorkflowConfig::builder()
            .similarity_threshold("high")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("similarity threshold"));
    }

    #[test]
    fn builder_rejects_zero_concurrency() {
        let err = WorkflowConfig::builder()
            .enrichment_concurrency(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, EditalError::InvalidConfig(_)));
    }

    #[test]
    fn builder_rejects_pacing_longer_than_fallback() {
        let err = WorkflowConfig::builder()
            .file_pacing_ms(10_000)
            .fallback_delay_ms(10_000)
            .build()
            .unwrap_err();
        assert!(matches!(err, EditalError::InvalidConfig(ref m) if m.contains("pacing")));
    }
}
