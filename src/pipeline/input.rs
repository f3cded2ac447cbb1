//! Input resolution: normalise a user-supplied path or URL to a local file.
//!
//! The text extractor wants a file-system path, so URL inputs are streamed
//! into a `TempDir` whose lifetime is tied to [`ResolvedInput`] — cleanup
//! happens on drop even if the run panics. Both paths funnel their first
//! bytes through the same `%PDF` magic check, so callers get a load error
//! here instead of a confusing parse failure three stages later.

use crate::error::FlashcardError;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

const PDF_MAGIC: [u8; 4] = *b"%PDF";

/// The resolved input — either a local path or a downloaded temp file.
#[derive(Debug)]
pub enum ResolvedInput {
    /// Input was already a local file.
    Local(PathBuf),
    /// Input was a URL; PDF downloaded to a temp directory.
    /// The `TempDir` is kept alive until processing completes.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    /// Path to the PDF regardless of how it was resolved.
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Downloaded { path, .. } => path,
        }
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to a local PDF file path.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, FlashcardError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input)
    }
}

/// Validate the first bytes of a payload against the `%PDF` marker.
///
/// A payload too short to hold the marker is rejected the same way: it
/// cannot be a PDF either.
fn check_pdf_magic(path: &Path, prefix: &[u8]) -> Result<(), FlashcardError> {
    if prefix.len() >= PDF_MAGIC.len() && prefix[..PDF_MAGIC.len()] == PDF_MAGIC {
        return Ok(());
    }
    let mut magic = [0u8; 4];
    for (slot, byte) in magic.iter_mut().zip(prefix) {
        *slot = *byte;
    }
    Err(FlashcardError::NotAPdf {
        path: path.to_path_buf(),
        magic,
    })
}

/// Validate a local file: readability and PDF magic bytes.
fn resolve_local(path_str: &str) -> Result<ResolvedInput, FlashcardError> {
    let path = PathBuf::from(path_str);

    let mut file = std::fs::File::open(&path).map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => FlashcardError::PermissionDenied {
            path: path.clone(),
        },
        std::io::ErrorKind::NotFound => FlashcardError::FileNotFound { path: path.clone() },
        _ => FlashcardError::Internal(format!("Failed to open '{}': {e}", path.display())),
    })?;

    let prefix = read_prefix(&mut file)
        .map_err(|e| FlashcardError::Internal(format!("Failed to read '{}': {e}", path.display())))?;
    check_pdf_magic(&path, &prefix)?;

    debug!("Resolved local PDF: {}", path.display());
    Ok(ResolvedInput::Local(path))
}

/// Read up to the first four bytes of `reader`.
fn read_prefix(reader: &mut impl std::io::Read) -> std::io::Result<Vec<u8>> {
    use std::io::Read;
    let mut prefix = Vec::with_capacity(PDF_MAGIC.len());
    reader
        .take(PDF_MAGIC.len() as u64)
        .read_to_end(&mut prefix)?;
    Ok(prefix)
}

/// Download a URL to a temporary directory and return the path.
async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, FlashcardError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| download_error(url, timeout_secs, e))?;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| download_error(url, timeout_secs, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(FlashcardError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {status}"),
        });
    }

    let temp_dir = TempDir::new()
        .map_err(|e| FlashcardError::Internal(format!("Failed to create temp dir: {e}")))?;
    let file_path = temp_dir.path().join(filename_from_url(url));
    stream_body_to_file(url, timeout_secs, response, &file_path).await?;

    info!("Downloaded to: {}", file_path.display());
    Ok(ResolvedInput::Downloaded {
        path: file_path,
        _temp_dir: temp_dir,
    })
}

/// Stream the response body to `file_path` chunk by chunk, checking the PDF
/// magic as soon as the first bytes arrive so a bad payload aborts without
/// buffering the whole download in memory.
async fn stream_body_to_file(
    url: &str,
    timeout_secs: u64,
    response: reqwest::Response,
    file_path: &Path,
) -> Result<(), FlashcardError> {
    let write_failed =
        |e: std::io::Error| FlashcardError::Internal(format!("Failed to write temp file: {e}"));

    let mut file = tokio::fs::File::create(file_path).await.map_err(write_failed)?;
    let mut stream = response.bytes_stream();
    let mut prefix: Vec<u8> = Vec::with_capacity(PDF_MAGIC.len());

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| download_error(url, timeout_secs, e))?;
        if prefix.len() < PDF_MAGIC.len() {
            let take = (PDF_MAGIC.len() - prefix.len()).min(chunk.len());
            prefix.extend_from_slice(&chunk[..take]);
            if prefix.len() == PDF_MAGIC.len() {
                check_pdf_magic(file_path, &prefix)?;
            }
        }
        file.write_all(&chunk).await.map_err(write_failed)?;
    }

    // Body ended before four bytes arrived; still not a PDF.
    if prefix.len() < PDF_MAGIC.len() {
        check_pdf_magic(file_path, &prefix)?;
    }
    file.flush().await.map_err(write_failed)
}

fn download_error(url: &str, timeout_secs: u64, e: reqwest::Error) -> FlashcardError {
    if e.is_timeout() {
        FlashcardError::DownloadTimeout {
            url: url.to_string(),
            secs: timeout_secs,
        }
    } else {
        FlashcardError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        }
    }
}

/// Pick a filename from the last URL path segment, defaulting otherwise.
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
    fn url_detection() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
    }

    #[test]
    fn filename_extraction() {
        assert_eq!(
            filename_from_url("https://example.com/papers/intro.pdf"),
            "intro.pdf"
        );
        assert_eq!(filename_from_url("https://example.com/"), "downloaded.pdf");
    }

    #[test]
    fn magic_check_requires_all_four_bytes() {
        let path = Path::new("x.pdf");
        assert!(check_pdf_magic(path, b"%PDF-1.7 rest").is_ok());
        assert!(check_pdf_magic(path, b"%PDF").is_ok());
        assert!(check_pdf_magic(path, b"%PD").is_err());
        assert!(check_pdf_magic(path, b"").is_err());
        assert!(check_pdf_magic(path, b"<html>").is_err());
    }

    #[tokio::test]
    async fn missing_file_is_a_load_error() {
        let err = resolve_input("/does/not/exist.pdf", 5).await.unwrap_err();
        assert!(matches!(err, FlashcardError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn non_pdf_magic_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.pdf");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(b"not a pdf at all").unwrap();

        let err = resolve_input(path.to_str().unwrap(), 5).await.unwrap_err();
        assert!(matches!(err, FlashcardError::NotAPdf { .. }));
    }

    #[tokio::test]
    async fn truncated_file_rejected_as_not_pdf() {
        // Shorter than the magic marker itself; must fail the same check,
        // not slip through to the extractor.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stub.pdf");
        std::fs::write(&path, b"%P").unwrap();

        let err = resolve_input(path.to_str().unwrap(), 5).await.unwrap_err();
        assert!(matches!(err, FlashcardError::NotAPdf { .. }));
    }

    #[tokio::test]
    async fn empty_file_rejected_as_not_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.pdf");
        std::fs::write(&path, b"").unwrap();

        let err = resolve_input(path.to_str().unwrap(), 5).await.unwrap_err();
        assert!(matches!(err, FlashcardError::NotAPdf { .. }));
    }

    #[tokio::test]
    async fn valid_magic_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ok.pdf");
        std::fs::write(&path, b"%PDF-1.7 rest of file").unwrap();

        let resolved = resolve_input(path.to_str().unwrap(), 5).await.unwrap();
        assert_eq!(resolved.path(), path);
    }
}
