//! Result types shared by the splitter, the OCR client and the pipeline.
//!
//! Response payloads from the OCR service are modelled with explicit
//! optional fields and `#[serde(default)]`, so a service that omits images,
//! tables or headers deserializes to empty collections / `None` rather than
//! failing.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A contiguous page range of a document materialised as its own PDF.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// 1-based position of the chunk in its split.
    pub chunk_number: usize,
    /// First page covered, 1-indexed.
    pub start_page: usize,
    /// Last page covered, 1-indexed, inclusive.
    pub end_page: usize,
    pub page_count: usize,
    pub path: PathBuf,
    pub size_bytes: u64,
}

impl Chunk {
    /// Offset that turns a chunk-local 0-based page index into a
    /// document-global 0-based index.
    pub fn page_offset(&self) -> usize {
        self.start_page - 1
    }
}

/// Outcome of [`crate::pipeline::split::split_document`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitResult {
    pub original_path: PathBuf,
    pub original_page_count: usize,
    pub chunks: Vec<Chunk>,
    pub output_directory: PathBuf,
}

/// An image region detected on a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub id: String,
    #[serde(default)]
    pub top_left_x: i64,
    #[serde(default)]
    pub top_left_y: i64,
    #[serde(default)]
    pub bottom_right_x: i64,
    #[serde(default)]
    pub bottom_right_y: i64,
    /// Present only when images were requested.
    #[serde(default)]
    pub image_base64: Option<String>,
}

/// A table extracted separately from the page markdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    pub id: String,
    #[serde(default)]
    pub content: String,
}

/// OCR output for a single page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrPage {
    /// 0-based page index. Chunk-local when returned by a client; callers
    /// remap it to the source document.
    pub index: usize,
    #[serde(default)]
    pub markdown: String,
    #[serde(default)]
    pub images: Vec<ImageInfo>,
    #[serde(default)]
    pub tables: Vec<TableInfo>,
    #[serde(default)]
    pub hyperlinks: Vec<String>,
    #[serde(default)]
    pub header: Option<String>,
    #[serde(default)]
    pub footer: Option<String>,
}

/// OCR output for a whole document (or one chunk of it).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrResult {
    pub pages: Vec<OcrPage>,
    pub model: String,
    /// Numeric usage counters reported by the service (pages processed,
    /// document bytes, ...). Summed when chunk results are merged.
    #[serde(default)]
    pub usage_info: BTreeMap<String, u64>,
}

impl OcrResult {
    /// Number of pages in this result.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// All page markdown joined with 1-based `--- Page N ---` headings.
    pub fn full_text(&self) -> String {
        self.pages
            .iter()
            .map(|p| format!("--- Page {} ---\n{}", p.index + 1, p.markdown))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Markdown of all pages concatenated without headings.
    pub fn markdown(&self) -> String {
        self.pages
            .iter()
            .map(|p| p.markdown.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Shift every page index by `offset`.
    pub fn offset_pages(&mut self, offset: usize) {
        for page in &mut self.pages {
            page.index += offset;
        }
    }

    /// Append `other`'s pages and add its usage counters to ours.
    pub fn merge(&mut self, other: OcrResult) {
        if self.model.is_empty() {
            self.model = other.model;
        }
        self.pages.extend(other.pages);
        for (key, value) in other.usage_info {
            *self.usage_info.entry(key).or_insert(0) += value;
        }
    }

    pub(crate) fn sort_pages(&mut self) {
        self.pages.sort_by_key(|p| p.index);
    }
}

/// Summary of one [`crate::split_ocr::split_and_ocr`] invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitOcrSummary {
    pub source_file: PathBuf,
    pub output_file: PathBuf,
    pub total_pages: usize,
    /// Pages OCR'd and appended by this invocation.
    pub pages_processed: usize,
    /// Highest page already present before this run, or 0 for a fresh run.
    pub resumed_from: usize,
}
