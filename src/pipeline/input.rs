//! Input resolution: turn a user-supplied path or URL into a [`PdfSource`].
//!
//! Local files are validated (existence, permissions, `%PDF` magic) but not
//! read; pdfium opens them itself. URL inputs are downloaded into memory and
//! handed to pdfium as a byte buffer, so nothing is written to disk and
//! nothing has to be cleaned up afterwards.

use crate::error::Pdf2ScanError;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// Where pdfium should read the document from.
#[derive(Debug)]
pub enum PdfSource {
    /// A local file.
    Path(PathBuf),
    /// An in-memory document. `origin` is used in error messages only.
    Bytes { origin: PathBuf, data: Vec<u8> },
}

impl PdfSource {
    /// Wrap an in-memory buffer, checking it starts with `%PDF`.
    pub fn from_bytes(origin: impl Into<PathBuf>, data: Vec<u8>) -> Result<Self, Pdf2ScanError> {
        let origin = origin.into();
        check_magic(&data, &origin)?;
        Ok(PdfSource::Bytes { origin, data })
    }

    /// The path or pseudo-path used when reporting errors.
    pub fn origin(&self) -> &Path {
        match self {
            PdfSource::Path(p) => p,
            PdfSource::Bytes { origin, .. } => origin,
        }
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to something pdfium can open.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<PdfSource, Pdf2ScanError> {
    if input.trim().is_empty() {
        return Err(Pdf2ScanError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input)
    }
}

fn check_magic(bytes: &[u8], origin: &Path) -> Result<(), Pdf2ScanError> {
    if bytes.starts_with(PDF_MAGIC) {
        return Ok(());
    }
    let mut magic = [0u8; 4];
    let n = bytes.len().min(4);
    magic[..n].copy_from_slice(&bytes[..n]);
    Err(Pdf2ScanError::NotAPdf {
        path: origin.to_path_buf(),
        magic,
    })
}

/// Resolve a local file path, validating existence and PDF magic bytes.
fn resolve_local(path_str: &str) -> Result<PdfSource, Pdf2ScanError> {
    let path = PathBuf::from(path_str);

    if !path.exists() {
        return Err(Pdf2ScanError::FileNotFound { path });
    }
    if path.is_dir() {
        return Err(Pdf2ScanError::InvalidInput {
            input: path_str.to_string(),
        });
    }

    let mut file = match std::fs::File::open(&path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(Pdf2ScanError::PermissionDenied { path });
        }
        Err(_) => return Err(Pdf2ScanError::FileNotFound { path }),
    };

    let mut head = Vec::with_capacity(4);
    file.by_ref()
        .take(4)
        .read_to_end(&mut head)
        .map_err(|e| Pdf2ScanError::CorruptPdf {
            path: path.clone(),
            detail: e.to_string(),
        })?;
    check_magic(&head, &path)?;

    debug!("Resolved local PDF: {}", path.display());
    Ok(PdfSource::Path(path))
}

/// Download a URL into memory.
async fn download_url(url: &str, timeout_secs: u64) -> Result<PdfSource, Pdf2ScanError> {
    info!("Downloading PDF from: {}", url);

    let failed = |reason: String| Pdf2ScanError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            Pdf2ScanError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let bytes = response.bytes().await.map_err(|e| {
        if e.is_timeout() {
            Pdf2ScanError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;

    info!("Downloaded {} bytes", bytes.len());
    PdfSource::from_bytes(url, bytes.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = resolve_local("/definitely/not/here.pdf").unwrap_err();
        assert!(matches!(err, Pdf2ScanError::FileNotFound { .. }));
    }

    #[test]
    fn non_pdf_file_is_rejected_with_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.pdf");
        std::fs::write(&path, b"hello world").unwrap();
        match resolve_local(path.to_str().unwrap()).unwrap_err() {
            Pdf2ScanError::NotAPdf { magic, .. } => assert_eq!(&magic, b"hell"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn short_and_empty_files_are_not_pdfs() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.pdf");
        std::fs::write(&empty, b"").unwrap();
        assert!(matches!(
            resolve_local(empty.to_str().unwrap()).unwrap_err(),
            Pdf2ScanError::NotAPdf { magic: [0, 0, 0, 0], .. }
        ));
    }

    #[test]
    fn pdf_header_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ok.pdf");
        std::fs::write(&path, b"%PDF-1.7\n").unwrap();
        let source = resolve_local(path.to_str().unwrap()).unwrap();
        assert_eq!(source.origin(), path.as_path());
    }

    #[test]
    fn directory_is_invalid_input() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_local(dir.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, Pdf2ScanError::InvalidInput { .. }));
    }

    #[test]
    fn bytes_source_checks_magic() {
        assert!(PdfSource::from_bytes("<memory>", b"%PDF-1.4 ...".to_vec()).is_ok());
        assert!(matches!(
            PdfSource::from_bytes("<memory>", b"PK\x03\x04".to_vec()).unwrap_err(),
            Pdf2ScanError::NotAPdf { .. }
        ));
    }

    #[tokio::test]
    async fn blank_input_is_invalid() {
        let err = resolve_input("   ", 5).await.unwrap_err();
        assert!(matches!(err, Pdf2ScanError::InvalidInput { .. }));
    }
}
