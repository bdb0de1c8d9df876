//! Progress-callback trait for per-page OCR events.
//!
//! Inject an [`Arc<dyn OcrProgressCallback>`] via
//! [`crate::config::OcrConfigBuilder::progress_callback`] to receive events as
//! the pipeline works through a document. Callers can forward them to a
//! terminal progress bar, a channel or a job record without the library
//! knowing how the host application communicates.
//!
//! # Example
//!
//! ```rust
//! use pagewise_ocr::{OcrProgressCallback, OcrConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct SavedCounter {
//!     saved: AtomicUsize,
//! }
//!
//! impl OcrProgressCallback for SavedCounter {
//!     fn on_page_saved(&self, page_num: usize, total_pages: usize) {
//!         let done = self.saved.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("page {page_num}/{total_pages} durable ({done} this run)");
//!     }
//! }
//!
//! let config = OcrConfig::builder()
//!     .progress_callback(Arc::new(SavedCounter { saved: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline as it processes each page.
///
/// Implementations must be `Send + Sync`. `on_page_start` and
/// `on_page_complete` may fire in any order across pages because remote calls
/// run concurrently; `on_page_saved` always fires in ascending page order.
/// All methods default to no-ops.
pub trait OcrProgressCallback: Send + Sync {
    /// Called once after the output artifact has been scanned.
    ///
    /// # Arguments
    /// * `total_pages`: pages in the document
    /// * `remaining`  : pages this run will process
    fn on_run_start(&self, total_pages: usize, remaining: usize) {
        let _ = (total_pages, remaining);
    }

    /// Called just before the remote call for a page is issued.
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when the remote call for a page returns successfully.
    fn on_page_complete(&self, page_num: usize, total_pages: usize, markdown_len: usize) {
        let _ = (page_num, total_pages, markdown_len);
    }

    /// Called once a page has been durably appended to the artifact.
    fn on_page_saved(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when the remote call for a page fails or times out.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once when every page of the run has been saved.
    fn on_run_complete(&self, total_pages: usize, pages_processed: usize) {
        let _ = (total_pages, pages_processed);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl OcrProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::OcrConfig`].
pub type ProgressCallback = Arc<dyn OcrProgressCallback>;
