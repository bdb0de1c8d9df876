//! The output artifact as a progress ledger.
//!
//! The Markdown file is the only record of progress. Each page is stored as
//!
//! ```text
//! <!-- Page N -->
//! <markdown>
//! ```
//!
//! with consecutive blocks joined by `\n\n---\n\n`. A page counts as done
//! iff its complete marker is present, so the completed set is recomputed
//! from the file on every run and never stored anywhere else.
//!
//! Appends only write the new block. Before touching the artifact, its
//! current length is recorded in a sibling `.pending` file (itself written
//! through `.tmp` + rename); the record is removed once the block is synced.
//! A record found on the next run means the append may be torn, and the
//! artifact is cut back to the recorded length. Either way the artifact holds
//! the old blocks, or the old blocks plus one whole new block.

use crate::error::PagewiseError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Separator written between two page blocks.
pub const PAGE_SEPARATOR: &str = "\n\n---\n\n";

static RE_PAGE_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"<!-- Page (\d+) -->").unwrap());

/// A trailing marker that was cut short after its page number.
static RE_CUT_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^<!-- Page \d+ ?-{0,2}$").unwrap());

/// The marker line for page `page`.
pub fn page_marker(page: usize) -> String {
    format!("<!-- Page {} -->", page)
}

/// Every page number with a complete marker in `text`.
pub fn completed_pages(text: &str) -> BTreeSet<usize> {
    RE_PAGE_MARKER
        .captures_iter(text)
        .filter_map(|caps| caps[1].parse::<usize>().ok())
        .filter(|&n| n >= 1)
        .collect()
}

/// [`completed_pages`] of the file at `path`; a missing file has none.
pub async fn read_completed_pages(path: &Path) -> Result<BTreeSet<usize>, PagewiseError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(completed_pages(&String::from_utf8_lossy(&bytes))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeSet::new()),
        Err(e) => Err(PagewiseError::io(path, e)),
    }
}

/// Render one page block, optionally preceded by [`PAGE_SEPARATOR`].
pub fn render_block(page: usize, markdown: &str, needs_separator: bool) -> String {
    let sep = if needs_separator { PAGE_SEPARATOR } else { "" };
    format!("{}{}\n{}", sep, page_marker(page), markdown)
}

/// Durably append page `page` to the artifact at `path`.
///
/// Writes only the new block, so the cost does not grow with the artifact.
/// The separator is written iff the artifact is non-empty. The caller is the
/// only writer of `path` for the duration of the call.
pub async fn append_page(path: &Path, page: usize, markdown: &str) -> Result<(), PagewiseError> {
    let write_failed = |e| PagewiseError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    let committed_len = match tokio::fs::metadata(path).await {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
        Err(e) => return Err(write_failed(e)),
    };
    let block = render_block(page, markdown, committed_len > 0);

    let pending = pending_sibling(path);
    write_atomic(&pending, committed_len.to_string().as_bytes()).await?;

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(write_failed)?;
    file.write_all(block.as_bytes()).await.map_err(write_failed)?;
    file.sync_data().await.map_err(write_failed)?;
    drop(file);

    tokio::fs::remove_file(&pending).await.map_err(write_failed)?;
    debug!("Appended page {} to {} ({} bytes)", page, path.display(), block.len());
    Ok(())
}

/// Undo an append that was interrupted, then remove an incomplete marker
/// left at the end of the artifact.
///
/// A fragment such as `<!-- Pa` or `<!-- Page 12 --` directly after a
/// separator (or at the start of the file) is dropped together with that
/// separator. Bytes before the cut are kept exactly as they are, valid UTF-8
/// or not. Returns `true` if the file was shortened.
pub async fn repair_trailing_fragment(path: &Path) -> Result<bool, PagewiseError> {
    let rolled_back = rollback_pending_append(path).await?;

    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(rolled_back),
        Err(e) => {
            return Err(PagewiseError::OutputWriteFailed {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };

    let Some(cut) = trailing_fragment_start(&bytes) else {
        return Ok(rolled_back);
    };

    warn!(
        "Removing incomplete page marker at end of {}: {:?}",
        path.display(),
        String::from_utf8_lossy(&bytes[cut..])
    );
    truncate(path, cut as u64).await?;
    Ok(true)
}

/// Cut the artifact back to the length recorded before an unfinished append.
async fn rollback_pending_append(path: &Path) -> Result<bool, PagewiseError> {
    let pending = pending_sibling(path);
    let record = match tokio::fs::read_to_string(&pending).await {
        Ok(record) => record,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(PagewiseError::io(&pending, e)),
    };

    let current_len = match tokio::fs::metadata(path).await {
        Ok(meta) => Some(meta.len()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => return Err(PagewiseError::io(path, e)),
    };

    let mut rolled_back = false;
    match (record.trim().parse::<u64>(), current_len) {
        (Ok(len), Some(current)) if len < current => {
            warn!(
                "Rolling back interrupted append to {}: {} -> {} bytes",
                path.display(),
                current,
                len
            );
            truncate(path, len).await?;
            rolled_back = true;
        }
        (Ok(_), _) => {}
        (Err(_), _) => warn!("Ignoring unreadable append record {}", pending.display()),
    }

    tokio::fs::remove_file(&pending)
        .await
        .map_err(|e| PagewiseError::io(&pending, e))?;
    Ok(rolled_back)
}

/// Byte offset where a dangling fragment (and its separator) begins.
fn trailing_fragment_start(bytes: &[u8]) -> Option<usize> {
    let line_start = bytes
        .iter()
        .rposition(|&b| b == b'\n')
        .map(|i| i + 1)
        .unwrap_or(0);
    let last_line = std::str::from_utf8(&bytes[line_start..]).ok()?;
    if last_line.is_empty() || RE_PAGE_MARKER.is_match(last_line) {
        return None;
    }

    const MARKER_HEAD: &str = "<!-- Page ";
    let is_fragment = MARKER_HEAD.starts_with(last_line) || RE_CUT_MARKER.is_match(last_line);
    if !is_fragment {
        return None;
    }

    let before = &bytes[..line_start];
    if before.is_empty() {
        Some(0)
    } else if before.ends_with(PAGE_SEPARATOR.as_bytes()) {
        Some(before.len() - PAGE_SEPARATOR.len())
    } else {
        None
    }
}

async fn truncate(path: &Path, len: u64) -> Result<(), PagewiseError> {
    let write_failed = |e| PagewiseError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };
    let file = tokio::fs::OpenOptions::new()
        .write(true)
        .open(path)
        .await
        .map_err(write_failed)?;
    file.set_len(len).await.map_err(write_failed)?;
    file.sync_all().await.map_err(write_failed)
}

/// Write `bytes` to `{path}.tmp`, fsync, then rename over `path`.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PagewiseError> {
    let write_failed = |e| PagewiseError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    let tmp_path = tmp_sibling(path);
    let mut file = tokio::fs::File::create(&tmp_path)
        .await
        .map_err(write_failed)?;
    file.write_all(bytes).await.map_err(write_failed)?;
    file.sync_all().await.map_err(write_failed)?;
    drop(file);

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(write_failed)
}

fn tmp_sibling(path: &Path) -> PathBuf {
    with_suffix(path, ".tmp")
}

fn pending_sibling(path: &Path) -> PathBuf {
    with_suffix(path, ".pending")
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}
