//! # pagewise-ocr
//!
//! Durable, resumable, page-by-page OCR of PDF documents against a remote
//! Document-AI service.
//!
//! ## Why this crate?
//!
//! Sending a 600-page PDF to an OCR service in one request fails in all the
//! usual ways: the document exceeds the service's size or page ceiling, the
//! request times out, or a transient error throws away minutes of work.
//! This crate splits the document into single pages, keeps a bounded number
//! of requests in flight, and appends every page to one Markdown file under
//! a `<!-- Page N -->` marker. The file is the progress record: running the
//! same command again only sends the pages that are still missing.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input    validate the local file (existence, permission, %PDF)
//!  ├─ 2. Inspect  page count, size, encryption (lopdf, spawn_blocking)
//!  ├─ 3. Ledger   read complete page markers back from the output file
//!  ├─ 4. Split    materialise only the missing pages as 1-page PDFs
//!  ├─ 5. OCR      ≤ N concurrent calls through the OcrClient trait
//!  ├─ 6. Reorder  buffer out-of-order pages until the lowest one arrives
//!  └─ 7. Append   sanitise, then journalled O_APPEND write per page
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pagewise_ocr::{split_and_ocr, MistralClient, OcrConfig};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads MISTRAL_API_KEY
//!     let client = Arc::new(MistralClient::from_env()?);
//!     let config = OcrConfig::builder().concurrency(8).build()?;
//!     let summary = split_and_ocr(
//!         Path::new("contract.pdf"),
//!         Path::new("contract.md"),
//!         &config,
//!         client,
//!     )
//!     .await?;
//!     eprintln!("{}/{} pages", summary.pages_processed, summary.total_pages);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pagewise` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pagewise-ocr = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod client;
pub mod config;
pub mod error;
pub mod jobs;
pub mod ocr;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod split_ocr;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use client::{MistralClient, OcrClient};
pub use config::{ClientConfig, OcrConfig, OcrConfigBuilder, OcrOptions, ServiceLimits, TableFormat};
pub use error::PagewiseError;
pub use jobs::{Job, JobRunner, JobState, JobStore, MemoryJobStore};
pub use ocr::{ocr_batch, ocr_document, ocr_pages};
pub use output::{Chunk, ImageInfo, OcrPage, OcrResult, SplitOcrSummary, SplitResult, TableInfo};
pub use pipeline::inspect::{inspect_document, DocumentInfo};
pub use pipeline::render::{render_pages, ImageFormat, RenderOptions};
pub use pipeline::split::{extract_pages, split_document, split_single_pages, SplitOptions};
pub use progress::{NoopProgressCallback, OcrProgressCallback, ProgressCallback};
pub use split_ocr::split_and_ocr;
