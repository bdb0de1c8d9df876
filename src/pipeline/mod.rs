//! Pipeline stages for page-level OCR.
//!
//! Each submodule implements exactly one step. The coordinator in
//! [`crate::split_ocr`] strings them together; the one-shot helpers in
//! [`crate::ocr`] reuse the same stages without the ledger.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ inspect ──▶ ledger scan ──▶ split ──▶ client ──▶ postprocess ──▶ ledger append
//! (path)    (lopdf)     (markers)       (1-page    (remote)   (hygiene)       (O_APPEND +
//!                                        chunks)                               .pending)
//! ```
//!
//! 1. [`input`]  : validate the local path (existence, permission, `%PDF`)
//!    or pass a URL through untouched
//! 2. [`inspect`]: page count, size and encryption flag; parsing runs in
//!    `spawn_blocking`
//! 3. [`ledger`] : recover the completed-page set from the output artifact
//! 4. [`split`]  : materialise only the pages that are still missing
//! 5. [`postprocess`]: make page text safe to store next to page markers
//! 6. [`ledger`] : append each page in ascending order; a crash mid-append
//!    is rolled back on the next run
//!
//! [`render`] sits outside the OCR flow: it rasterises pages to image files
//! with pdfium for callers that want pictures instead of text.

pub mod input;
pub mod inspect;
pub mod ledger;
pub mod postprocess;
pub mod render;
pub mod split;

#[cfg(test)]
pub(crate) mod testing;

use crate::error::PagewiseError;

/// Run blocking PDF work on the blocking pool.
pub(crate) async fn run_blocking<T, F>(what: &'static str, f: F) -> Result<T, PagewiseError>
where
    F: FnOnce() -> Result<T, PagewiseError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PagewiseError::Internal(format!("{what} task panicked: {e}")))?
}
