//! Error types for the pagewise-ocr library.
//!
//! There is a single fatal error type, [`PagewiseError`]. The durable pipeline
//! never needs per-page soft failures: a page either reaches the output
//! artifact in full or it is absent, and the next invocation redoes it.
//!
//! Variants fall into a small taxonomy that callers can branch on:
//!
//! * **Not found**: [`PagewiseError::FileNotFound`], [`PagewiseError::PermissionDenied`]
//! * **Invalid format**: [`PagewiseError::NotAPdf`], [`PagewiseError::CorruptPdf`],
//!   [`PagewiseError::Encrypted`]
//! * **Invalid argument / range**: [`PagewiseError::InvalidArgument`],
//!   [`PagewiseError::PageRange`], [`PagewiseError::InvalidConfig`]
//! * **Rendering**: [`PagewiseError::RendererUnavailable`], [`PagewiseError::RenderFailed`]
//! * **Service**: [`PagewiseError::Service`], [`PagewiseError::ApiTimeout`].
//!   These are the only retryable variants: re-running the same invocation
//!   resumes from the last durably written page.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pagewise-ocr library.
#[derive(Debug, Error)]
pub enum PagewiseError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt, or the page tree is empty.
    #[error("PDF '{path}' is corrupt: {detail}\nTry repairing with: qpdf input.pdf output.pdf")]
    CorruptPdf { path: PathBuf, detail: String },

    /// Encrypted PDFs cannot be split or page-extracted.
    #[error("PDF '{path}' is encrypted; pages cannot be extracted.\nDecrypt it first, e.g. qpdf --decrypt input.pdf output.pdf")]
    Encrypted { path: PathBuf },

    /// Requested page range is invalid for the document.
    #[error("Invalid page range {start}-{end} (document has {total} pages)")]
    PageRange {
        start: usize,
        end: usize,
        total: usize,
    },

    /// A caller-supplied argument is out of its domain (e.g. chunk size 0).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // ── Rendering errors ──────────────────────────────────────────────────
    /// The pdfium library could not be loaded.
    #[error("PDF renderer unavailable: {0}\nInstall libpdfium or point PDFIUM_LIB_PATH at it.")]
    RendererUnavailable(String),

    /// pdfium failed to rasterise or the image could not be encoded.
    #[error("Failed to render page {page}: {detail}")]
    RenderFailed { page: usize, detail: String },

    // ── Remote service errors ─────────────────────────────────────────────
    /// The remote OCR service failed (non-2xx, transport error, bad body,
    /// or the signed-URL race did not resolve within the retry budget).
    #[error("OCR service error{}: {message}", status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Service {
        status: Option<u16>,
        message: String,
    },

    /// A remote OCR call did not finish within the per-call timeout.
    #[error("OCR call for page {page} timed out after {secs}s")]
    ApiTimeout { page: usize, secs: u64 },

    /// No API key was supplied and none was found in the environment.
    #[error("{var} environment variable is required.\nSet it in your shell or in a .env file.")]
    MissingApiKey { var: &'static str },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create, write or rename the output Markdown file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Any other file-system failure (temp dirs, chunk files, reads).
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Job errors ────────────────────────────────────────────────────────
    /// No job is registered under the given id.
    #[error("Unknown job '{id}'")]
    JobNotFound { id: String },

    /// A job with this id is already registered.
    #[error("Job '{id}' already exists")]
    DuplicateJob { id: String },

    /// Only finished jobs can be removed from a store.
    #[error("Job '{id}' is still {state}")]
    JobActive { id: String, state: &'static str },

    /// A job was asked to move between two states that are not adjacent.
    #[error("Job '{id}' cannot move from {from} to {to}")]
    InvalidJobTransition {
        id: String,
        from: &'static str,
        to: &'static str,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PagewiseError {
    /// `true` when re-running the same invocation may succeed.
    ///
    /// Only remote-service failures qualify; everything else is a caller or
    /// input problem that a retry cannot fix.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Service { .. } | Self::ApiTimeout { .. })
    }

    /// A service error without an HTTP status, for custom [`OcrClient`](crate::OcrClient)
    /// implementations.
    pub fn service(message: impl Into<String>) -> Self {
        Self::Service {
            status: None,
            message: message.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_display_with_status() {
        let e = PagewiseError::Service {
            status: Some(503),
            message: "upstream overloaded".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("HTTP 503"), "got: {msg}");
        assert!(msg.contains("upstream overloaded"));
    }

    #[test]
    fn service_display_without_status() {
        let e = PagewiseError::service("connection reset");
        assert_eq!(e.to_string(), "OCR service error: connection reset");
    }

    #[test]
    fn page_range_display() {
        let e = PagewiseError::PageRange {
            start: 5,
            end: 3,
            total: 10,
        };
        assert!(e.to_string().contains("5-3"));
        assert!(e.to_string().contains("10 pages"));
    }

    #[test]
    fn only_service_failures_are_retryable() {
        assert!(PagewiseError::service("x").is_retryable());
        assert!(PagewiseError::ApiTimeout { page: 2, secs: 30 }.is_retryable());
        assert!(!PagewiseError::FileNotFound {
            path: "a.pdf".into()
        }
        .is_retryable());
        assert!(!PagewiseError::Encrypted {
            path: "a.pdf".into()
        }
        .is_retryable());
    }
}
