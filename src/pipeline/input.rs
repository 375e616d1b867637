//! File intake: turn a path, URL or in-memory upload into a [`FileTask`].
//!
//! Only PDF payloads are accepted. The `%PDF` magic is checked here so the
//! extraction service never receives something it cannot open, and so the
//! caller gets a precise error instead of a per-file extraction failure.

use crate::error::EditalError;
use crate::task::FileTask;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const PDF_MAGIC: &[u8] = b"%PDF";

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Accept an in-memory upload.
pub fn accept_upload(name: impl Into<String>, bytes: Vec<u8>) -> Result<FileTask, EditalError> {
    let name = name.into();
    ensure_pdf(&name, &bytes)?;
    Ok(FileTask::new(name, bytes))
}

/// Resolve a local path or an HTTP(S) URL into a pending file.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<FileTask, EditalError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        read_local(Path::new(input)).await
    }
}

fn ensure_pdf(name: &str, bytes: &[u8]) -> Result<(), EditalError> {
    if bytes.starts_with(PDF_MAGIC) {
        return Ok(());
    }
    Err(EditalError::NotAPdf {
        name: name.to_string(),
        magic: bytes.iter().take(PDF_MAGIC.len()).copied().collect(),
    })
}

async fn read_local(path: &Path) -> Result<FileTask, EditalError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(EditalError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(EditalError::FileNotFound {
                path: PathBuf::from(path),
            });
        }
    };

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    ensure_pdf(&name, &bytes)?;
    debug!("Read local PDF: {} ({} bytes)", path.display(), bytes.len());
    Ok(FileTask::new(name, bytes))
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<FileTask, EditalError> {
    info!("Downloading PDF from: {}", url);
    let failed = |reason: String| EditalError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            failed(format!("timed out after {}s", timeout_secs))
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
    let name = filename_from_url(url);
    ensure_pdf(&name, &bytes)?;

    info!("Downloaded {} ({} bytes)", name, bytes.len());
    Ok(FileTask::new(name, bytes.to_vec()))
}

/// Last path segment of the URL if it looks like a file name.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }
    "downloaded.pdf".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/edital.pdf"));
        assert!(is_url("http://example.com/edital.pdf"));
        assert!(!is_url("/tmp/edital.pdf"));
        assert!(!is_url("edital.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn filename_from_url_path() {
        assert_eq!(
            filename_from_url("https://prefeitura.gov.br/editais/pe-12-2024.pdf?v=2"),
            "pe-12-2024.pdf"
        );
        assert_eq!(filename_from_url("https://example.com/download"), "downloaded.pdf");
    }

    #[test]
    fn upload_rejects_non_pdf() {
        let err = accept_upload("planilha.xlsx", b"PK\x03\x04rest".to_vec()).unwrap_err();
        match err {
            EditalError::NotAPdf { name, magic } => {
                assert_eq!(name, "planilha.xlsx");
                assert_eq!(magic, b"PK\x03\x04".to_vec());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn upload_accepts_pdf() {
        let task = accept_upload("edital.pdf", b"%PDF-1.7\n...".to_vec()).unwrap();
        assert_eq!(task.name, "edital.pdf");
        assert_eq!(task.payload.len(), 12);
    }

    #[tokio::test]
    async fn local_file_is_read_and_named() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pregao.pdf");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"%PDF-1.4 body")
            .unwrap();

        let task = resolve_input(path.to_str().unwrap(), 5).await.unwrap();
        assert_eq!(task.name, "pregao.pdf");
        assert_eq!(&*task.payload, b"%PDF-1.4 body");
    }

    #[tokio::test]
    async fn missing_local_file() {
        let err = resolve_input("/definitely/not/here.pdf", 5).await.unwrap_err();
        assert!(matches!(err, EditalError::FileNotFound { .. }));
    }
}
