//! End-to-end tests against the live OCR service.
//!
//! These tests use real PDF files in `./test_cases/` and make paid API
//! calls. They are gated behind `E2E_ENABLED` and `MISTRAL_API_KEY` so they
//! never run in CI unless explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 cargo test --test e2e -- --nocapture
//!
//! To restrict to a specific test:
//!   E2E_ENABLED=1 cargo test --test e2e resume -- --nocapture

mod common;

use common::marker_sequence;
use pagewise_ocr::{
    inspect_document, ocr_document, split_and_ocr, MistralClient, OcrConfig, ServiceLimits,
};
use std::path::PathBuf;
use std::sync::Arc;

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

/// Skip unless E2E_ENABLED and an API key are set and `path` exists.
macro_rules! e2e_skip_unless_ready {
    ($path:expr) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        if std::env::var("MISTRAL_API_KEY").is_err() {
            println!("SKIP: MISTRAL_API_KEY is not set");
            return;
        }
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP: test file not found: {}", p.display());
            return;
        }
        p
    }};
}

fn client() -> Arc<MistralClient> {
    Arc::new(MistralClient::from_env().expect("client from env"))
}

#[tokio::test]
async fn split_and_ocr_small_report() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("small_report.pdf"));
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("small_report.md");

    let info = inspect_document(&path, &ServiceLimits::default())
        .await
        .unwrap();
    let config = OcrConfig::builder().concurrency(4).build().unwrap();

    let summary = split_and_ocr(&path, &out, &config, client()).await.unwrap();
    assert_eq!(summary.total_pages, info.page_count);
    assert_eq!(summary.pages_processed, info.page_count);

    let text = std::fs::read_to_string(&out).unwrap();
    assert_eq!(
        marker_sequence(&text),
        (1..=info.page_count).collect::<Vec<_>>()
    );
    println!("✓ {} pages, {} bytes", summary.total_pages, text.len());
}

#[tokio::test]
async fn resume_only_sends_missing_pages() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("small_report.pdf"));
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("small_report.md");
    let config = OcrConfig::builder().concurrency(2).build().unwrap();

    let first = split_and_ocr(&path, &out, &config, client()).await.unwrap();
    let full = std::fs::read_to_string(&out).unwrap();

    // Drop everything after page 1 and run again.
    let cut = full.find("\n\n---\n\n<!-- Page 2 -->").unwrap_or(full.len());
    std::fs::write(&out, &full[..cut]).unwrap();

    let second = split_and_ocr(&path, &out, &config, client()).await.unwrap();
    assert_eq!(second.resumed_from, 1);
    assert_eq!(second.pages_processed, first.total_pages - 1);
    assert_eq!(
        marker_sequence(&std::fs::read_to_string(&out).unwrap()),
        (1..=first.total_pages).collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn whole_document_ocr() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("small_report.pdf"));
    let config = OcrConfig::default();

    let result = ocr_document(path.to_str().unwrap(), &config, client().as_ref())
        .await
        .unwrap();

    assert!(!result.pages.is_empty());
    assert!(result.pages.windows(2).all(|w| w[0].index < w[1].index));
    assert!(!result.markdown().trim().is_empty());
}
