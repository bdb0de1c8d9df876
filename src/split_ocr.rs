//! Durable, resumable page-by-page OCR of one PDF into one Markdown file.
//!
//! ## Why page by page?
//!
//! A several-hundred-page document takes long enough to OCR that a network
//! blip, a rate limit or a Ctrl-C is likely somewhere along the way. Storing
//! each page as soon as it is known, under a `<!-- Page N -->` marker, turns
//! every such failure into "run the same command again": the next run reads
//! the markers back and only sends the pages that are still missing.
//!
//! ## Ordered incremental commit
//!
//! Up to `concurrency` remote calls run at once and finish in any order,
//! but the artifact must only ever grow in ascending page order. Finished
//! pages wait in a `BTreeMap` until every lower missing page has been
//! written, then the contiguous run is appended one page at a time.
//!
//! Each call runs as its own Tokio task, so calls keep making progress (and
//! their timeouts keep measuring only the call) while the coordinator is busy
//! writing to disk.
//!
//! On the first failure no new calls are started. Calls for lower pages are
//! awaited so their pages can still be committed; calls for higher pages are
//! aborted. Whatever was appended stays appended.

use crate::client::OcrClient;
use crate::config::OcrConfig;
use crate::error::PagewiseError;
use crate::output::{Chunk, SplitOcrSummary};
use crate::pipeline::input::resolve_local;
use crate::pipeline::inspect::inspect_document;
use crate::pipeline::ledger::{append_page, read_completed_pages, repair_trailing_fragment};
use crate::pipeline::postprocess::sanitize_page;
use crate::pipeline::run_blocking;
use crate::pipeline::split::split_single_pages;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// OCR `source` into `output`, resuming from whatever `output` already holds.
///
/// Returns once every page of the document is present in `output`, or with
/// the first error after committing every page that could still be written
/// in order. Re-running after an error continues where this run stopped.
///
/// Callers must not run two invocations against the same `output` at once.
pub async fn split_and_ocr(
    source: &Path,
    output: &Path,
    config: &OcrConfig,
    client: Arc<dyn OcrClient>,
) -> Result<SplitOcrSummary, PagewiseError> {
    let run_start = Instant::now();
    config.validate()?;

    // ── Step 1: Validate the source ─────────────────────────────────────────
    let source = resolve_local(source)?;

    // ── Step 2: Inspect ─────────────────────────────────────────────────────
    let info = inspect_document(&source, &config.limits).await?;
    info.ensure_processable()?;
    let total = info.page_count;
    if total == 0 {
        return Err(PagewiseError::CorruptPdf {
            path: source,
            detail: "document has no pages".into(),
        });
    }

    // ── Step 3: Recover progress from the artifact ──────────────────────────
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| PagewiseError::OutputWriteFailed {
                path: output.to_path_buf(),
                source: e,
            })?;
    }
    repair_trailing_fragment(output).await?;
    let completed = read_completed_pages(output).await?;
    let resumed_from = completed.last().copied().unwrap_or(0);
    let missing: Vec<usize> = (1..=total).filter(|p| !completed.contains(p)).collect();

    let summary = |pages_processed| SplitOcrSummary {
        source_file: source.clone(),
        output_file: output.to_path_buf(),
        total_pages: total,
        pages_processed,
        resumed_from,
    };

    if let Some(ref cb) = config.progress_callback {
        cb.on_run_start(total, missing.len());
    }

    // ── Step 4: Nothing left to do ──────────────────────────────────────────
    if missing.is_empty() {
        info!(
            "{} already holds all {} pages of {}",
            output.display(),
            total,
            source.display()
        );
        if let Some(ref cb) = config.progress_callback {
            cb.on_run_complete(total, 0);
        }
        return Ok(summary(0));
    }
    if resumed_from > 0 {
        info!(
            "Resuming {}: {} of {} pages already present (highest {})",
            output.display(),
            completed.len(),
            total,
            resumed_from
        );
    }

    // ── Step 5: Materialise only the missing pages ──────────────────────────
    let tmp = tempfile::Builder::new()
        .prefix("pagewise-")
        .tempdir()
        .map_err(|e| PagewiseError::io(std::env::temp_dir(), e))?;
    let chunks = {
        let source = source.clone();
        let out_dir = tmp.path().to_path_buf();
        let pages = missing.clone();
        run_blocking("Split", move || split_single_pages(&source, &out_dir, &pages)).await?
    };
    debug!("Materialised {} pages in {}", chunks.len(), tmp.path().display());

    // ── Step 6-9: Dispatch, reorder, commit ─────────────────────────────────
    let shared = Arc::new(config.clone());
    let mut upcoming = chunks.into_iter();
    let mut tasks = JoinSet::new();
    let mut in_flight = BTreeSet::new();
    for chunk in upcoming.by_ref().take(config.concurrency) {
        in_flight.insert(chunk.start_page);
        tasks.spawn(ocr_one(client.clone(), chunk, shared.clone(), total));
    }

    let mut commit = OrderedCommit::new(output, &missing, total, config);
    let mut failure: Option<(usize, PagewiseError)> = None;

    while let Some(joined) = tasks.join_next().await {
        let (page, outcome) = match joined {
            Ok(done) => done,
            Err(e) => {
                tasks.shutdown().await;
                return Err(PagewiseError::Internal(format!("OCR task failed: {e}")));
            }
        };
        in_flight.remove(&page);
        let below_failure = failure.as_ref().is_none_or(|(f, _)| page < *f);

        match outcome {
            Ok(markdown) if below_failure => commit.ready(page, markdown),
            Ok(_) => {}
            Err(e) => {
                warn!("Page {}/{} failed: {}", page, total, e);
                if let Some(ref cb) = config.progress_callback {
                    cb.on_page_error(page, total, &e.to_string());
                }
                if below_failure {
                    failure = Some((page, e));
                }
            }
        }

        if let Err(e) = commit.flush().await {
            tasks.shutdown().await;
            return Err(e);
        }

        match &failure {
            None => {
                if let Some(chunk) = upcoming.next() {
                    in_flight.insert(chunk.start_page);
                    tasks.spawn(ocr_one(client.clone(), chunk, shared.clone(), total));
                }
            }
            Some((f, _)) => {
                if in_flight.range(..*f).next().is_none() {
                    break;
                }
            }
        }
    }
    // Aborts calls for pages above a failure.
    tasks.shutdown().await;

    let processed = commit.saved;
    if let Some((page, e)) = failure {
        warn!(
            "Stopped at page {}/{}; {} pages saved this run, re-run to resume",
            page, total, processed
        );
        return Err(e);
    }

    info!(
        "OCR complete: {} pages saved this run, {}/{} total, {}ms",
        processed,
        total,
        total,
        run_start.elapsed().as_millis()
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_run_complete(total, processed);
    }
    Ok(summary(processed))
}

/// One remote call for one single-page chunk, bounded by the per-call timeout.
async fn ocr_one(
    client: Arc<dyn OcrClient>,
    chunk: Chunk,
    config: Arc<OcrConfig>,
    total: usize,
) -> (usize, Result<String, PagewiseError>) {
    let page = chunk.start_page;
    if let Some(ref cb) = config.progress_callback {
        cb.on_page_start(page, total);
    }
    debug!("Sending page {}/{}", page, total);

    let timeout = Duration::from_secs(config.api_timeout_secs);
    let outcome = match tokio::time::timeout(timeout, client.ocr_file(&chunk.path, &config.options)).await {
        Ok(Ok(mut result)) if !result.pages.is_empty() => {
            result.sort_pages();
            Ok(sanitize_page(&result.markdown()))
        }
        Ok(Ok(_)) => Err(PagewiseError::service(format!(
            "Service returned no pages for page {page}"
        ))),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(PagewiseError::ApiTimeout {
            page,
            secs: config.api_timeout_secs,
        }),
    };

    if let (Ok(markdown), Some(cb)) = (&outcome, &config.progress_callback) {
        cb.on_page_complete(page, total, markdown.len());
    }
    (page, outcome)
}

/// Buffers finished pages and appends them strictly in ascending order.
struct OrderedCommit<'a> {
    output: &'a Path,
    total: usize,
    config: &'a OcrConfig,
    /// Missing pages not yet appended, ascending.
    queue: std::iter::Peekable<std::slice::Iter<'a, usize>>,
    ready: BTreeMap<usize, String>,
    saved: usize,
}

impl<'a> OrderedCommit<'a> {
    fn new(output: &'a Path, missing: &'a [usize], total: usize, config: &'a OcrConfig) -> Self {
        Self {
            output,
            total,
            config,
            queue: missing.iter().peekable(),
            ready: BTreeMap::new(),
            saved: 0,
        }
    }

    fn ready(&mut self, page: usize, markdown: String) {
        self.ready.insert(page, markdown);
    }

    /// Append every buffered page that is next in line.
    async fn flush(&mut self) -> Result<(), PagewiseError> {
        while let Some(&&next) = self.queue.peek() {
            let Some(markdown) = self.ready.remove(&next) else {
                break;
            };
            append_page(self.output, next, &markdown).await?;
            self.queue.next();
            self.saved += 1;

            info!("Saved page {}/{}", next, self.total);
            if let Some(ref cb) = self.config.progress_callback {
                cb.on_page_saved(next, self.total);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OcrOptions;
    use crate::output::{OcrPage, OcrResult};
    use crate::pipeline::testing::{page_labels, write_pdf};
    use async_trait::async_trait;

    struct EchoClient;

    #[async_trait]
    impl OcrClient for EchoClient {
        async fn ocr_file(&self, path: &Path, options: &OcrOptions) -> Result<OcrResult, PagewiseError> {
            let label = page_labels(path)[0];
            Ok(OcrResult {
                pages: vec![OcrPage {
                    index: 0,
                    markdown: format!("page {label}\r\n"),
                    images: vec![],
                    tables: vec![],
                    hyperlinks: vec![],
                    header: None,
                    footer: None,
                }],
                model: options.model.clone(),
                usage_info: Default::default(),
            })
        }

        async fn ocr_url(&self, _url: &str, _options: &OcrOptions) -> Result<OcrResult, PagewiseError> {
            Err(PagewiseError::service("not used"))
        }
    }

    #[tokio::test]
    async fn fresh_run_writes_every_page_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("doc.pdf");
        let out = dir.path().join("nested/doc.md");
        write_pdf(&src, 3);

        let summary = split_and_ocr(&src, &out, &OcrConfig::default(), Arc::new(EchoClient))
            .await
            .unwrap();

        assert_eq!(summary.total_pages, 3);
        assert_eq!(summary.pages_processed, 3);
        assert_eq!(summary.resumed_from, 0);
        assert_eq!(
            std::fs::read_to_string(&out).unwrap(),
            "<!-- Page 1 -->\npage 1\n\n---\n\n<!-- Page 2 -->\npage 2\n\n---\n\n<!-- Page 3 -->\npage 3"
        );
    }

    #[tokio::test]
    async fn empty_service_response_is_a_service_error() {
        struct Blank;

        #[async_trait]
        impl OcrClient for Blank {
            async fn ocr_file(&self, _p: &Path, _o: &OcrOptions) -> Result<OcrResult, PagewiseError> {
                Ok(OcrResult::default())
            }
            async fn ocr_url(&self, _u: &str, _o: &OcrOptions) -> Result<OcrResult, PagewiseError> {
                Ok(OcrResult::default())
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("doc.pdf");
        write_pdf(&src, 1);
        let err = split_and_ocr(&src, &dir.path().join("o.md"), &OcrConfig::default(), Arc::new(Blank))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
