//! External collaborators and the HTTP backend that implements them.
//!
//! The workflow talks to four services through narrow async traits so tests
//! can substitute in-process fakes:
//!
//! | Trait | Endpoint | Encoding |
//! |-------|----------|----------|
//! | [`ExtractionService`] | `POST /api/extractor/process` | multipart `file`, `formato`, `debug` |
//! | [`EnrichmentService`] | `POST /api/completion/process` | form `file_path`, `description_column`, `similarity_threshold` |
//! | [`ChatService`]       | `POST /api/chat` | multipart `content_id`, `query` |
//! | [`ArtifactService`]   | `GET /api/file?path=…` | raw text body |
//!
//! Every non-2xx status is a service failure. Trait methods return
//! `Err(EditalError)`; the pipeline stages turn those into per-file or
//! per-question [`crate::error::TaskError`]s.

use crate::config::WorkflowConfig;
use crate::error::EditalError;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

// ── Requests / responses ─────────────────────────────────────────────────

/// One document sent for table extraction.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub file_name: String,
    pub payload: Arc<[u8]>,
    /// `formato` field.
    pub format: String,
    pub debug: bool,
}

/// Body of a successful extraction call.
///
/// Only `success`, `item_count` and `output_path` drive the workflow; the
/// other fields are recorded when the backend reports them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub content_id: Option<String>,
    #[serde(default, rename = "municipio")]
    pub municipality: Option<String>,
    #[serde(default)]
    pub item_count: Option<u64>,
    #[serde(default)]
    pub output_path: Option<String>,
    #[serde(default)]
    pub enhanced_file_path: Option<String>,
    #[serde(default)]
    pub matched_count: Option<u64>,
    #[serde(default)]
    pub total_descriptions: Option<u64>,
    #[serde(default)]
    pub completed_steps: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Form body of an enrichment call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichmentRequest {
    pub file_path: String,
    pub description_column: String,
    pub similarity_threshold: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentResponse {
    #[serde(default)]
    pub enhanced_file_path: Option<String>,
    #[serde(default)]
    pub matched_count: Option<u64>,
    #[serde(default)]
    pub total_descriptions: Option<u64>,
}

/// Answer from the chat service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Usually a string. Anything else is shown as its JSON text.
    #[serde(default)]
    pub response: serde_json::Value,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub context_count: Option<u32>,
    #[serde(default)]
    pub similarity_scores: Vec<f64>,
}

impl ChatResponse {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            response: serde_json::Value::String(text.into()),
            ..Default::default()
        }
    }

    /// The answer as display text.
    pub fn text(&self) -> String {
        match &self.response {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

// ── Traits ───────────────────────────────────────────────────────────────

#[async_trait]
pub trait ExtractionService: Send + Sync {
    async fn extract(&self, request: ExtractionRequest) -> Result<ExtractionResponse, EditalError>;
}

#[async_trait]
pub trait EnrichmentService: Send + Sync {
    async fn enrich(&self, request: EnrichmentRequest) -> Result<EnrichmentResponse, EditalError>;
}

#[async_trait]
pub trait ChatService: Send + Sync {
    async fn chat(&self, content_id: &str, query: &str) -> Result<ChatResponse, EditalError>;
}

#[async_trait]
pub trait ArtifactService: Send + Sync {
    /// Raw text content of an artifact produced by the backend.
    async fn fetch_artifact(&self, path: &str) -> Result<String, EditalError>;
}

/// The four collaborators a [`crate::Workflow`] needs.
#[derive(Clone)]
pub struct Services {
    pub extraction: Arc<dyn ExtractionService>,
    pub enrichment: Arc<dyn EnrichmentService>,
    pub chat: Arc<dyn ChatService>,
    pub artifacts: Arc<dyn ArtifactService>,
}

impl Services {
    /// All four services backed by the HTTP backend at `config.base_url`.
    pub fn http(config: &WorkflowConfig) -> Result<Self, EditalError> {
        Ok(Self::from_backend(Arc::new(HttpBackend::new(config)?)))
    }

    /// All four services backed by one value implementing every trait.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: ExtractionService + EnrichmentService + ChatService + ArtifactService + 'static,
    {
        Self {
            extraction: backend.clone(),
            enrichment: backend.clone(),
            chat: backend.clone(),
            artifacts: backend,
        }
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Services { .. }")
    }
}

// ── HTTP backend ─────────────────────────────────────────────────────────

/// reqwest client for the document-processing backend.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(config: &WorkflowConfig) -> Result<Self, EditalError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| EditalError::Internal(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn request_failed(service: &'static str) -> impl FnOnce(reqwest::Error) -> EditalError {
    move |e| EditalError::ServiceRequest {
        service,
        reason: if e.is_timeout() {
            format!("timed out: {}", e)
        } else {
            e.to_string()
        },
    }
}

fn decode_failed(service: &'static str) -> impl FnOnce(reqwest::Error) -> EditalError {
    move |e| EditalError::InvalidResponse {
        service,
        reason: e.to_string(),
    }
}

/// Pass 2xx responses through; turn anything else into `ServiceStatus`.
async fn ensure_success(service: &'static str, response: Response) -> Result<Response, EditalError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(EditalError::ServiceStatus {
        service,
        status: status.as_u16(),
        body: error_detail(&body),
    })
}

/// Pull a readable message out of an error body.
///
/// The backend answers failures with `{"detail": "..."}`; other JSON shapes
/// may use `error`. Plain-text bodies are truncated.
pub fn error_detail(body: &str) -> String {
    const MAX: usize = 300;
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["detail", "error", "message"] {
            match map.get(key) {
                Some(serde_json::Value::String(s)) => return s.clone(),
                Some(v) if !v.is_null() => return v.to_string(),
                _ => {}
            }
        }
    }
    let trimmed = body.trim();
    match trimmed.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{}…", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

#[async_trait]
impl ExtractionService for HttpBackend {
    async fn extract(&self, request: ExtractionRequest) -> Result<ExtractionResponse, EditalError> {
        const SERVICE: &str = "extraction";
        debug!(
            "POST /api/extractor/process file={} bytes={}",
            request.file_name,
            request.payload.len()
        );

        let part = Part::bytes(request.payload.to_vec())
            .file_name(request.file_name.clone())
            .mime_str("application/pdf")
            .map_err(request_failed(SERVICE))?;
        let form = Form::new()
            .part("file", part)
            .text("formato", request.format)
            .text("debug", request.debug.to_string());

        let response = self
            .client
            .post(self.url("/api/extractor/process"))
            .multipart(form)
            .send()
            .await
            .map_err(request_failed(SERVICE))?;

        ensure_success(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(decode_failed(SERVICE))
    }
}

#[async_trait]
impl EnrichmentService for HttpBackend {
    async fn enrich(&self, request: EnrichmentRequest) -> Result<EnrichmentResponse, EditalError> {
        const SERVICE: &str = "enrichment";
        debug!("POST /api/completion/process file_path={}", request.file_path);

        let response = self
            .client
            .post(self.url("/api/completion/process"))
            .form(&request)
            .send()
            .await
            .map_err(request_failed(SERVICE))?;

        ensure_success(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(decode_failed(SERVICE))
    }
}

#[async_trait]
impl ChatService for HttpBackend {
    async fn chat(&self, content_id: &str, query: &str) -> Result<ChatResponse, EditalError> {
        const SERVICE: &str = "chat";
        debug!("POST /api/chat content_id={}", content_id);

        let form = Form::new()
            .text("content_id", content_id.to_string())
            .text("query", query.to_string());

        let response = self
            .client
            .post(self.url("/api/chat"))
            .multipart(form)
            .send()
            .await
            .map_err(request_failed(SERVICE))?;

        ensure_success(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(decode_failed(SERVICE))
    }
}

#[async_trait]
impl ArtifactService for HttpBackend {
    async fn fetch_artifact(&self, path: &str) -> Result<String, EditalError> {
        const SERVICE: &str = "artifact";
        debug!("GET /api/file path={}", path);

        let response = self
            .client
            .get(self.url("/api/file"))
            .query(&[("path", path)])
            .send()
            .await
            .map_err(request_failed(SERVICE))?;

        ensure_success(SERVICE, response)
            .await?
            .text()
            .await
            .map_err(decode_failed(SERVICE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_response_reads_backend_fields() {
        let json = r#"{
            "success": true,
            "session_id": "s1",
            "content_id": "c1",
            "municipio": "Campinas",
            "item_count": 42,
            "output_path": "results/a.csv",
            "enhanced_file_path": null,
            "matched_count": 30,
            "total_descriptions": 42,
            "completed_steps": ["pdf_upload", "table_extraction"]
        }"#;
        let r: ExtractionResponse = serde_json::from_str(json).unwrap();
        assert!(r.success);
        assert_eq!(r.municipality.as_deref(), Some("Campinas"));
        assert_eq!(r.item_count, Some(42));
        assert_eq!(r.enhanced_file_path, None);
        assert_eq!(r.completed_steps.len(), 2);
    }

    #[test]
    fn extraction_response_tolerates_sparse_body() {
        let r: ExtractionResponse = serde_json::from_str(r#"{"success": false}"#).unwrap();
        assert!(!r.success);
        assert_eq!(r.item_count, None);
    }

    #[test]
    fn chat_text_renders_non_string_as_json() {
        let s: ChatResponse = serde_json::from_str(r#"{"response": "ok"}"#).unwrap();
        assert_eq!(s.text(), "ok");

        let o: ChatResponse =
            serde_json::from_str(r#"{"response": {"valor": 10}, "context_count": 3}"#).unwrap();
        assert_eq!(o.text(), r#"{"valor":10}"#);
        assert_eq!(o.context_count, Some(3));
        assert!(o.similarity_scores.is_empty());

        let n: ChatResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(n.text(), "");
    }

    #[test]
    fn enrichment_request_encodes_as_form() {
        let req = EnrichmentRequest {
            file_path: "results/a.csv".into(),
            description_column: "DESCRIÇÃO".into(),
            similarity_threshold: "0.5".into(),
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["description_column"], "DESCRIÇÃO");
        assert_eq!(v["similarity_threshold"], "0.5");
    }

    #[test]
    fn error_detail_prefers_detail_field() {
        assert_eq!(error_detail(r#"{"detail": "Arquivo inválido"}"#), "Arquivo inválido");
        assert_eq!(error_detail(r#"{"error": "boom"}"#), "boom");
        assert_eq!(error_detail("  Bad Gateway \n"), "Bad Gateway");
    }

    #[test]
    fn error_detail_truncates_long_text() {
        let long = "x".repeat(1000);
        let d = error_detail(&long);
        assert!(d.chars().count() <= 301);
        assert!(d.ends_with('…'));
    }

    #[test]
    fn http_backend_builds_urls() {
        let config = WorkflowConfig::builder()
            .base_url("http://backend:7070/")
            .build()
            .unwrap();
        let backend = HttpBackend::new(&config).unwrap();
        assert_eq!(backend.url("/api/chat"), "http://backend:7070/api/chat");
    }
}
