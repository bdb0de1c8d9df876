//! Page-range splitting and extraction.
//!
//! Every output file is produced the same way: clone the parsed source,
//! delete the pages outside the wanted range, drop the objects that became
//! unreachable and save. The source is parsed once per call no matter how
//! many chunks are written.
//!
//! All functions here are blocking; async callers wrap them in
//! `spawn_blocking`.

use crate::error::PagewiseError;
use crate::output::{Chunk, SplitResult};
use crate::pipeline::inspect::LoadedPdf;
use lopdf::Document;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Options for [`split_document`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitOptions {
    /// Pages per chunk. Default: 500.
    pub pages_per_chunk: usize,
    /// File name prefix for the chunks. Defaults to the source file stem.
    pub prefix: Option<String>,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            pages_per_chunk: 500,
            prefix: None,
        }
    }
}

/// Split `path` into contiguous chunks of at most `pages_per_chunk` pages.
///
/// Chunks are written to `out_dir` (created if missing) as
/// `{prefix}_chunk_{NNN}.pdf` and returned in page order. The first chunk
/// starts at page 1, the last ends at the page count, and there are no gaps.
pub fn split_document(
    path: &Path,
    out_dir: &Path,
    options: &SplitOptions,
) -> Result<SplitResult, PagewiseError> {
    if options.pages_per_chunk == 0 {
        return Err(PagewiseError::InvalidArgument(
            "pages_per_chunk must be at least 1".into(),
        ));
    }

    let source = open_for_extraction(path)?;
    let total = source.page_count();
    std::fs::create_dir_all(out_dir).map_err(|e| PagewiseError::io(out_dir, e))?;

    let prefix = options
        .prefix
        .clone()
        .unwrap_or_else(|| file_stem(path));

    let mut chunks = Vec::with_capacity(total.div_ceil(options.pages_per_chunk));
    for (i, start) in (1..=total).step_by(options.pages_per_chunk).enumerate() {
        let end = (start + options.pages_per_chunk - 1).min(total);
        let chunk_path = out_dir.join(format!("{}_chunk_{:03}.pdf", prefix, i + 1));
        let chunk = write_range(&source.document, start, end, &chunk_path, i + 1)?;
        debug!(
            "Wrote chunk {} (pages {}-{}) to {}",
            chunk.chunk_number,
            start,
            end,
            chunk_path.display()
        );
        chunks.push(chunk);
    }

    info!(
        "Split {} ({} pages) into {} chunks",
        path.display(),
        total,
        chunks.len()
    );

    Ok(SplitResult {
        original_path: path.to_path_buf(),
        original_page_count: total,
        chunks,
        output_directory: out_dir.to_path_buf(),
    })
}

/// Extract pages `start..=end` (1-indexed) into a new PDF.
///
/// Without `output`, the file lands next to the source as
/// `{stem}_pages_{start}-{end}.pdf`.
pub fn extract_pages(
    path: &Path,
    start: usize,
    end: usize,
    output: Option<&Path>,
) -> Result<PathBuf, PagewiseError> {
    let source = open_for_extraction(path)?;
    let total = source.page_count();
    validate_range(start, end, total)?;

    let output = match output {
        Some(p) => p.to_path_buf(),
        None => path.with_file_name(format!("{}_pages_{}-{}.pdf", file_stem(path), start, end)),
    };
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| PagewiseError::io(parent, e))?;
    }

    write_range(&source.document, start, end, &output, 1)?;
    info!(
        "Extracted pages {}-{} of {} to {}",
        start,
        end,
        path.display(),
        output.display()
    );
    Ok(output)
}

/// Write one single-page chunk per entry of `pages` into `out_dir`.
///
/// Each returned chunk has `start_page == end_page == page` and
/// `chunk_number == page`.
pub fn split_single_pages(
    path: &Path,
    out_dir: &Path,
    pages: &[usize],
) -> Result<Vec<Chunk>, PagewiseError> {
    let source = open_for_extraction(path)?;
    let total = source.page_count();
    std::fs::create_dir_all(out_dir).map_err(|e| PagewiseError::io(out_dir, e))?;

    let mut chunks = Vec::with_capacity(pages.len());
    for &page in pages {
        validate_range(page, page, total)?;
        let chunk_path = out_dir.join(format!("page_{:05}.pdf", page));
        chunks.push(write_range(&source.document, page, page, &chunk_path, page)?);
    }

    debug!(
        "Materialised {} single-page chunks from {}",
        chunks.len(),
        path.display()
    );
    Ok(chunks)
}

/// Range check shared by extraction and the one-shot page OCR.
pub(crate) fn validate_range(start: usize, end: usize, total: usize) -> Result<(), PagewiseError> {
    if start < 1 || start > end || end > total {
        return Err(PagewiseError::PageRange { start, end, total });
    }
    Ok(())
}

pub(crate) fn open_for_extraction(path: &Path) -> Result<LoadedPdf, PagewiseError> {
    let source = LoadedPdf::open(path)?;
    if source.is_encrypted {
        return Err(PagewiseError::Encrypted {
            path: path.to_path_buf(),
        });
    }
    if source.page_count() == 0 {
        return Err(PagewiseError::CorruptPdf {
            path: path.to_path_buf(),
            detail: "document has no pages".into(),
        });
    }
    Ok(source)
}

fn write_range(
    source: &Document,
    start: usize,
    end: usize,
    out: &Path,
    chunk_number: usize,
) -> Result<Chunk, PagewiseError> {
    let mut doc = source.clone();
    let drop: Vec<u32> = doc
        .get_pages()
        .keys()
        .copied()
        .filter(|&n| (n as usize) < start || (n as usize) > end)
        .collect();
    doc.delete_pages(&drop);
    doc.prune_objects();
    doc.renumber_objects();
    doc.compress();

    doc.save(out).map_err(|e| PagewiseError::Io {
        path: out.to_path_buf(),
        source: std::io::Error::other(e.to_string()),
    })?;
    let size_bytes = std::fs::metadata(out)
        .map_err(|e| PagewiseError::io(out, e))?
        .len();

    Ok(Chunk {
        chunk_number,
        start_page: start,
        end_page: end,
        page_count: end - start + 1,
        path: out.to_path_buf(),
        size_bytes,
    })
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string())
}
