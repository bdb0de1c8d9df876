//! Input resolution: classify a user-supplied source as a local file or URL.
//!
//! URLs are never downloaded here: the OCR service fetches them itself, so
//! they are passed through untouched. Local paths are checked for existence,
//! read permission and the PDF magic bytes (`%PDF`) so callers get a
//! meaningful error before any PDF parsing or network traffic happens.

use crate::error::PagewiseError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A resolved document source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// A validated local PDF.
    Local(PathBuf),
    /// An HTTP/HTTPS URL handed to the service as a reference.
    Url(String),
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// `true` for URLs the service should treat as an image rather than a document.
pub fn is_image_url(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    let path = lower.split(['?', '#']).next().unwrap_or_default();
    [".png", ".jpg", ".jpeg", ".avif"]
        .iter()
        .any(|ext| path.ends_with(ext))
}

/// Resolve the input string to a [`Source`].
pub fn resolve_source(input: &str) -> Result<Source, PagewiseError> {
    if is_url(input) {
        Ok(Source::Url(input.to_string()))
    } else {
        resolve_local(Path::new(input)).map(Source::Local)
    }
}

/// Validate a local file path: existence, readability and PDF magic bytes.
pub fn resolve_local(path: &Path) -> Result<PathBuf, PagewiseError> {
    let path = path.to_path_buf();

    if !path.exists() {
        return Err(PagewiseError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            match f.read_exact(&mut magic) {
                Ok(()) if &magic == b"%PDF" => {}
                // Shorter than four bytes, or the wrong four bytes.
                Ok(()) | Err(_) => return Err(PagewiseError::NotAPdf { path, magic }),
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(PagewiseError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(PagewiseError::FileNotFound { path });
        }
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(path)
}
