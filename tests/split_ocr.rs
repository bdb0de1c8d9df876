//! Integration tests for the durable page-by-page pipeline.

mod common;

use async_trait::async_trait;
use common::{
    expected_artifact, make_pdf, mark_encrypted, marker_sequence, page_labels, page_text,
    FakeOcrClient,
};
use pagewise_ocr::config::OcrOptions;
use pagewise_ocr::{
    split_and_ocr, OcrClient, OcrConfig, OcrPage, OcrProgressCallback, OcrResult, PagewiseError,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn setup(pages: usize) -> (tempfile::TempDir, PathBuf, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("contract.pdf");
    let out = dir.path().join("contract.md");
    make_pdf(&src, pages);
    (dir, src, out)
}

fn config(concurrency: usize) -> OcrConfig {
    OcrConfig::builder().concurrency(concurrency).build().unwrap()
}

#[derive(Default)]
struct SavedOrder(Mutex<Vec<usize>>);

impl OcrProgressCallback for SavedOrder {
    fn on_page_saved(&self, page_num: usize, _total_pages: usize) {
        self.0.lock().unwrap().push(page_num);
    }
}

#[tokio::test]
async fn second_run_is_a_no_op() {
    let (_dir, src, out) = setup(4);

    let first = split_and_ocr(&src, &out, &config(2), Arc::new(FakeOcrClient::new()))
        .await
        .unwrap();
    assert_eq!(first.pages_processed, 4);
    let after_first = std::fs::read_to_string(&out).unwrap();

    let client = Arc::new(FakeOcrClient::new());
    let second = split_and_ocr(&src, &out, &config(2), client.clone())
        .await
        .unwrap();

    assert_eq!(second.pages_processed, 0);
    assert_eq!(second.resumed_from, 4);
    assert!(client.calls().is_empty());
    assert_eq!(std::fs::read_to_string(&out).unwrap(), after_first);
}

#[tokio::test]
async fn resumes_after_existing_pages() {
    let (_dir, src, out) = setup(3);
    std::fs::write(&out, format!("<!-- Page 1 -->\n{}", page_text(1))).unwrap();

    let client = Arc::new(FakeOcrClient::new());
    let summary = split_and_ocr(&src, &out, &config(5), client.clone())
        .await
        .unwrap();

    assert_eq!(summary.resumed_from, 1);
    assert_eq!(summary.pages_processed, 2);
    assert_eq!(summary.total_pages, 3);
    assert_eq!(client.calls(), vec![2, 3]);
    assert_eq!(std::fs::read_to_string(&out).unwrap(), expected_artifact(3));
}

#[tokio::test]
async fn out_of_order_completion_is_written_in_page_order() {
    let (_dir, src, out) = setup(6);
    // Page 1 finishes last, page 6 first.
    let client = (1..=6).fold(FakeOcrClient::new(), |c, p| c.delay(p, (7 - p as u64) * 30));
    let saved = Arc::new(SavedOrder::default());
    let config = OcrConfig::builder()
        .concurrency(6)
        .progress_callback(saved.clone())
        .build()
        .unwrap();

    split_and_ocr(&src, &out, &config, Arc::new(client))
        .await
        .unwrap();

    let text = std::fs::read_to_string(&out).unwrap();
    assert_eq!(marker_sequence(&text), vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(text, expected_artifact(6));
    assert_eq!(*saved.0.lock().unwrap(), vec![1, 2, 3, 4, 5, 6]);
}

#[tokio::test]
async fn in_flight_calls_never_exceed_concurrency() {
    let (_dir, src, out) = setup(12);
    let client = Arc::new(FakeOcrClient::new().delay_all(20));

    split_and_ocr(&src, &out, &config(3), client.clone())
        .await
        .unwrap();

    assert_eq!(client.calls(), (1..=12).collect::<Vec<_>>());
    assert!(client.max_in_flight() <= 3, "max {}", client.max_in_flight());
    assert!(client.max_in_flight() >= 2, "calls were not concurrent");
}

#[tokio::test]
async fn failure_keeps_contiguous_prefix_and_rerun_completes() {
    let (_dir, src, out) = setup(6);
    let failing = FakeOcrClient::new().delay_all(10).fail_on(4);

    let err = split_and_ocr(&src, &out, &config(2), Arc::new(failing))
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    assert!(matches!(err, PagewiseError::Service { status: Some(503), .. }));

    let partial = std::fs::read_to_string(&out).unwrap();
    assert_eq!(marker_sequence(&partial), vec![1, 2, 3]);
    assert_eq!(partial, expected_artifact(3));

    let healthy = Arc::new(FakeOcrClient::new());
    let summary = split_and_ocr(&src, &out, &config(2), healthy.clone())
        .await
        .unwrap();
    assert_eq!(summary.resumed_from, 3);
    assert_eq!(summary.pages_processed, 3);
    assert_eq!(healthy.calls(), vec![4, 5, 6]);
    assert_eq!(std::fs::read_to_string(&out).unwrap(), expected_artifact(6));
}

#[tokio::test]
async fn slower_lower_page_is_still_committed_after_a_failure() {
    let (_dir, src, out) = setup(5);
    let client = FakeOcrClient::new().delay(2, 150).fail_on(3);

    split_and_ocr(&src, &out, &config(3), Arc::new(client))
        .await
        .unwrap_err();

    let text = std::fs::read_to_string(&out).unwrap();
    assert_eq!(marker_sequence(&text), vec![1, 2]);
}

#[tokio::test]
async fn truncated_trailing_marker_is_repaired() {
    let (_dir, src, out) = setup(3);
    std::fs::write(
        &out,
        format!("<!-- Page 1 -->\n{}\n\n---\n\n<!-- Pa", page_text(1)),
    )
    .unwrap();

    let client = Arc::new(FakeOcrClient::new());
    let summary = split_and_ocr(&src, &out, &config(2), client.clone())
        .await
        .unwrap();

    assert_eq!(summary.resumed_from, 1);
    assert_eq!(client.calls(), vec![2, 3]);
    let text = std::fs::read_to_string(&out).unwrap();
    assert_eq!(marker_sequence(&text), vec![1, 2, 3]);
    assert_eq!(text, expected_artifact(3));
}

#[tokio::test]
async fn hung_call_times_out() {
    let (_dir, src, out) = setup(3);
    let client = FakeOcrClient::new().hang_on(2);
    let config = OcrConfig::builder()
        .concurrency(1)
        .api_timeout_secs(1)
        .build()
        .unwrap();

    let err = split_and_ocr(&src, &out, &config, Arc::new(client))
        .await
        .unwrap_err();

    assert!(matches!(err, PagewiseError::ApiTimeout { page: 2, secs: 1 }));
    assert!(err.is_retryable());
    assert_eq!(marker_sequence(&std::fs::read_to_string(&out).unwrap()), vec![1]);
}

#[tokio::test]
async fn missing_source_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let err = split_and_ocr(
        &dir.path().join("nope.pdf"),
        &dir.path().join("nope.md"),
        &config(1),
        Arc::new(FakeOcrClient::new()),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, PagewiseError::FileNotFound { .. }));
    assert!(!dir.path().join("nope.md").exists());
}

#[tokio::test]
async fn zero_concurrency_is_rejected_before_any_work() {
    let (_dir, src, out) = setup(3);
    let config = OcrConfig {
        concurrency: 0,
        ..Default::default()
    };
    let client = Arc::new(FakeOcrClient::new());

    let err = split_and_ocr(&src, &out, &config, client.clone())
        .await
        .unwrap_err();

    assert!(matches!(err, PagewiseError::InvalidConfig(_)), "got {err}");
    assert!(!err.is_retryable());
    assert!(client.calls().is_empty());
    assert!(!out.exists());
}

#[tokio::test]
async fn encrypted_source_is_refused() {
    let (dir, src, out) = setup(2);
    let locked = dir.path().join("locked.pdf");
    mark_encrypted(&src, &locked);
    let client = Arc::new(FakeOcrClient::new());

    let err = split_and_ocr(&locked, &out, &config(2), client.clone())
        .await
        .unwrap_err();

    assert!(matches!(err, PagewiseError::Encrypted { .. }), "got {err}");
    assert!(client.calls().is_empty());
    assert!(!out.exists());
}

/// Page 2 needs two separate waits to finish; every other page is instant.
struct TwoStepClient;

#[async_trait]
impl OcrClient for TwoStepClient {
    async fn ocr_file(&self, path: &Path, options: &OcrOptions) -> Result<OcrResult, PagewiseError> {
        let page = page_labels(path)[0];
        if page == 2 {
            tokio::time::sleep(Duration::from_millis(500)).await;
            tokio::time::sleep(Duration::from_millis(1000)).await;
        }
        Ok(OcrResult {
            pages: vec![OcrPage {
                index: 0,
                markdown: page_text(page),
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

/// Holds up the coordinator for a while after page 1 is written.
struct SlowFirstSave;

impl OcrProgressCallback for SlowFirstSave {
    fn on_page_saved(&self, page_num: usize, _total_pages: usize) {
        if page_num == 1 {
            std::thread::sleep(Duration::from_millis(1200));
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn calls_keep_running_while_pages_are_written() {
    let (_dir, src, out) = setup(2);
    let config = OcrConfig::builder()
        .concurrency(2)
        .api_timeout_secs(2)
        .progress_callback(Arc::new(SlowFirstSave))
        .build()
        .unwrap();

    let summary = split_and_ocr(&src, &out, &config, Arc::new(TwoStepClient))
        .await
        .unwrap();

    assert_eq!(summary.pages_processed, 2);
    assert_eq!(std::fs::read_to_string(&out).unwrap(), expected_artifact(2));
}
