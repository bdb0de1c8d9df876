//! One-shot OCR: a whole document, a page range, or a batch of documents.
//!
//! Unlike [`crate::split_ocr`], nothing here is durable: results come back
//! in memory. What these helpers share with the coordinator is the rule that
//! chunk-local page indices are remapped to document page numbers here, by
//! the caller of the client, and never by the client itself.

use crate::client::OcrClient;
use crate::config::OcrConfig;
use crate::error::PagewiseError;
use crate::output::OcrResult;
use crate::pipeline::input::{resolve_local, resolve_source, Source};
use crate::pipeline::inspect::inspect_document;
use crate::pipeline::run_blocking;
use crate::pipeline::split::{extract_pages, split_document, validate_range, SplitOptions};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::path::Path;
use tracing::{debug, info};

/// OCR a local PDF or a URL in one go.
///
/// Local documents over the service ceilings are split into
/// `config.chunk_size`-page chunks first (when `config.auto_split` is set);
/// chunk results are remapped, merged and returned in page order.
pub async fn ocr_document(
    source: &str,
    config: &OcrConfig,
    client: &dyn OcrClient,
) -> Result<OcrResult, PagewiseError> {
    config.validate()?;
    let path = match resolve_source(source)? {
        Source::Url(url) => {
            info!("OCR of remote document {}", url);
            return client.ocr_url(&url, &config.options).await;
        }
        Source::Local(path) => path,
    };

    let info = inspect_document(&path, &config.limits).await?;
    if !(config.auto_split && info.needs_splitting) {
        info!("OCR of {} ({} pages) in one call", path.display(), info.page_count);
        let mut result = client.ocr_file(&path, &config.options).await?;
        result.sort_pages();
        return Ok(result);
    }
    info.ensure_processable()?;

    // ── Oversized: split, OCR every chunk, remap ────────────────────────────
    let tmp = tempfile::tempdir().map_err(|e| PagewiseError::io(std::env::temp_dir(), e))?;
    let split = {
        let path = path.clone();
        let out_dir = tmp.path().to_path_buf();
        let options = SplitOptions {
            pages_per_chunk: config.chunk_size,
            prefix: None,
        };
        run_blocking("Split", move || split_document(&path, &out_dir, &options)).await?
    };
    info!(
        "{} exceeds service limits; OCR in {} chunks of up to {} pages",
        path.display(),
        split.chunks.len(),
        config.chunk_size
    );

    let results: Vec<OcrResult> = stream::iter(split.chunks.iter().map(|chunk| async move {
        debug!(
            "OCR of chunk {} (pages {}-{})",
            chunk.chunk_number, chunk.start_page, chunk.end_page
        );
        let mut result = client.ocr_file(&chunk.path, &config.options).await?;
        result.offset_pages(chunk.page_offset());
        Ok::<_, PagewiseError>(result)
    }))
    .buffered(config.concurrency)
    .try_collect()
    .await?;

    let mut merged = OcrResult::default();
    for result in results {
        merged.merge(result);
    }
    merged.sort_pages();
    Ok(merged)
}

/// OCR pages `start..=end` (1-indexed) of a local PDF.
///
/// Returned page indices are 0-based positions in the source document.
pub async fn ocr_pages(
    path: &Path,
    start: usize,
    end: usize,
    config: &OcrConfig,
    client: &dyn OcrClient,
) -> Result<OcrResult, PagewiseError> {
    config.validate()?;
    let path = resolve_local(path)?;
    let info = inspect_document(&path, &config.limits).await?;
    info.ensure_processable()?;
    validate_range(start, end, info.page_count)?;

    let requested = end - start + 1;
    if requested > config.limits.max_pages {
        return Err(PagewiseError::InvalidArgument(format!(
            "Range {}-{} spans {} pages; the service accepts at most {} per call",
            start, end, requested, config.limits.max_pages
        )));
    }

    let tmp = tempfile::tempdir().map_err(|e| PagewiseError::io(std::env::temp_dir(), e))?;
    let extracted = {
        let path = path.clone();
        let out = tmp.path().join(format!("pages_{start}-{end}.pdf"));
        run_blocking("Extract", move || extract_pages(&path, start, end, Some(&out))).await?
    };

    info!("OCR of pages {}-{} of {}", start, end, path.display());
    let mut result = client.ocr_file(&extracted, &config.options).await?;
    result.offset_pages(start - 1);
    result.sort_pages();
    Ok(result)
}

/// OCR many sources, at most `config.concurrency` at a time.
///
/// Results are returned in input order; the first failure fails the batch.
pub async fn ocr_batch<S: AsRef<str>>(
    sources: &[S],
    config: &OcrConfig,
    client: &dyn OcrClient,
) -> Result<Vec<OcrResult>, PagewiseError> {
    config.validate()?;
    info!("Batch OCR of {} sources", sources.len());
    stream::iter(
        sources
            .iter()
            .map(|s| ocr_document(s.as_ref(), config, client)),
    )
    .buffered(config.concurrency)
    .try_collect()
    .await
}
