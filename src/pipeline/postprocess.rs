//! Post-processing: deterministic cleanup of page Markdown before it is
//! appended to the output artifact.
//!
//! The service already returns Markdown, so unlike a free-form generator the
//! text needs no structural repair. What matters is that a page can never
//! confuse the progress scan: a page that happened to contain
//! `<!-- Page 7 -->` would otherwise mark page 7 as done.
//!
//! ## Rule Order
//!
//! Line endings are normalised first so the marker rule and the trailing
//! blank-line trim see plain `\n`.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all rules to one page of service output.
///
/// Rules (applied in order):
/// 1. Normalise line endings (CRLF / CR → LF)
/// 2. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens, etc.)
/// 3. Neutralise embedded page markers
/// 4. Trim trailing whitespace and blank lines
pub fn sanitize_page(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = remove_invisible_chars(&s);
    let s = neutralise_page_markers(&s);
    s.trim_end().to_string()
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 3: Neutralise embedded page markers ────────────────────────────────
//
// Lower-casing "Page" keeps the comment readable while taking it out of the
// marker grammar, which is case-sensitive.

static RE_EMBEDDED_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<!--\s*Page\s+(\d+)\s*-->").unwrap());

fn neutralise_page_markers(input: &str) -> String {
    RE_EMBEDDED_MARKER
        .replace_all(input, "<!-- page $1 -->")
        .into_owned()
}

// ── Tests ────────────────────────────────────────────────────────────────────
