//! Document inspection: page count, byte size and encryption flag.
//!
//! Parsing a PDF is CPU-bound and touches the file system, so the public
//! entry point runs on the blocking pool via `spawn_blocking`. The blocking
//! loader is shared with [`super::split`] so both stages classify broken and
//! encrypted input identically.

use crate::config::ServiceLimits;
use crate::error::PagewiseError;
use crate::pipeline::input::resolve_local;
use lopdf::Document;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// What the pipeline needs to know about a source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub page_count: usize,
    pub is_encrypted: bool,
    /// The document exceeds the service's size or page ceiling.
    pub needs_splitting: bool,
    /// Chunks of `default_chunk_size` pages needed to fit the ceilings.
    pub recommended_chunks: usize,
}

impl DocumentInfo {
    /// Size in MiB, for display.
    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / (1024.0 * 1024.0)
    }

    /// Fail with [`PagewiseError::Encrypted`] when pages cannot be extracted.
    pub fn ensure_processable(&self) -> Result<(), PagewiseError> {
        if self.is_encrypted {
            return Err(PagewiseError::Encrypted {
                path: self.path.clone(),
            });
        }
        Ok(())
    }
}

/// Inspect a PDF without extracting any pages.
pub async fn inspect_document(
    path: &Path,
    limits: &ServiceLimits,
) -> Result<DocumentInfo, PagewiseError> {
    let path = path.to_path_buf();
    let limits = *limits;

    super::run_blocking("Inspect", move || inspect_blocking(&path, &limits)).await
}

/// Blocking implementation of [`inspect_document`].
pub fn inspect_blocking(path: &Path, limits: &ServiceLimits) -> Result<DocumentInfo, PagewiseError> {
    let loaded = LoadedPdf::open(path)?;
    let page_count = loaded.page_count();

    let needs_splitting =
        loaded.size_bytes > limits.max_file_bytes || page_count > limits.max_pages;
    let recommended_chunks = if needs_splitting {
        page_count.div_ceil(limits.default_chunk_size.max(1))
    } else {
        1
    };

    info!(
        "Inspected {}: {} pages, {} bytes{}",
        path.display(),
        page_count,
        loaded.size_bytes,
        if loaded.is_encrypted { ", encrypted" } else { "" }
    );

    Ok(DocumentInfo {
        path: path.to_path_buf(),
        size_bytes: loaded.size_bytes,
        page_count,
        is_encrypted: loaded.is_encrypted,
        needs_splitting,
        recommended_chunks,
    })
}

/// A parsed PDF plus the facts gathered while loading it.
pub(crate) struct LoadedPdf {
    pub document: Document,
    pub size_bytes: u64,
    pub is_encrypted: bool,
}

impl LoadedPdf {
    /// Read and parse `path`.
    ///
    /// Encryption is detected from the raw bytes as well as from the parsed
    /// trailer, because the parser may transparently decrypt documents that
    /// use an empty user password.
    pub fn open(path: &Path) -> Result<Self, PagewiseError> {
        let path = resolve_local(path)?;
        let bytes = std::fs::read(&path).map_err(|e| PagewiseError::io(&path, e))?;
        let size_bytes = bytes.len() as u64;
        let raw_encrypted = has_encrypt_entry(&bytes);

        let document = match Document::load_mem(&bytes) {
            Ok(doc) => doc,
            Err(_) if raw_encrypted => return Err(PagewiseError::Encrypted { path }),
            Err(e) => {
                return Err(PagewiseError::CorruptPdf {
                    path,
                    detail: e.to_string(),
                })
            }
        };

        let is_encrypted = raw_encrypted || document.is_encrypted();
        debug!(
            "Loaded {} ({} objects, encrypted={})",
            path.display(),
            document.objects.len(),
            is_encrypted
        );

        Ok(Self {
            document,
            size_bytes,
            is_encrypted,
        })
    }

    pub fn page_count(&self) -> usize {
        self.document.get_pages().len()
    }
}

fn has_encrypt_entry(bytes: &[u8]) -> bool {
    const KEY: &[u8] = b"/Encrypt";
    bytes.windows(KEY.len()).any(|w| w == KEY)
}
