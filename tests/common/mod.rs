//! Shared fixtures for the integration tests: real PDFs built with lopdf and
//! a scripted in-process OCR client.

#![allow(dead_code)]

use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use pagewise_ocr::config::OcrOptions;
use pagewise_ocr::{OcrClient, OcrPage, OcrResult, PagewiseError};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Write an `n`-page PDF to `path`; page k shows the text `Page k`.
pub fn make_pdf(path: &Path, n: usize) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(n);
    for k in 1..=n {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(format!("Page {k}"))]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => n as i64,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).unwrap();
}

/// Copy `src` to `dst` with an `/Encrypt` entry in the trailer.
pub fn mark_encrypted(src: &Path, dst: &Path) {
    let mut doc = Document::load(src).unwrap();
    let encrypt_id = doc.add_object(dictionary! {
        "Filter" => "Standard",
        "V" => 1_i64,
        "R" => 2_i64,
        "O" => Object::string_literal(vec![0u8; 32]),
        "U" => Object::string_literal(vec![0u8; 32]),
        "P" => -4_i64,
    });
    doc.trailer.set("Encrypt", encrypt_id);
    doc.save(dst).unwrap();
}

/// The `Page k` label of every page of `path`, in page order.
pub fn page_labels(path: &Path) -> Vec<usize> {
    let re = Regex::new(r"\(Page (\d+)\)").unwrap();
    let doc = Document::load(path).unwrap();
    doc.get_pages()
        .values()
        .map(|&id| {
            let content = doc.get_page_content(id).unwrap();
            re.captures(&String::from_utf8_lossy(&content)).unwrap()[1]
                .parse()
                .unwrap()
        })
        .collect()
}

/// Markdown the fake client returns for page `k`.
pub fn page_text(k: usize) -> String {
    format!("Content of page {k}")
}

/// The artifact a complete run over `n` pages must produce.
pub fn expected_artifact(n: usize) -> String {
    (1..=n)
        .map(|k| format!("<!-- Page {k} -->\n{}", page_text(k)))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

/// Page numbers of every complete marker in `text`, in file order.
pub fn marker_sequence(text: &str) -> Vec<usize> {
    let re = Regex::new(r"<!-- Page (\d+) -->").unwrap();
    re.captures_iter(text)
        .map(|c| c[1].parse().unwrap())
        .collect()
}

/// Scripted OCR client. Each call identifies its page from the chunk's
/// content, so results are checked against the real page, not call order.
#[derive(Default)]
pub struct FakeOcrClient {
    delays: HashMap<usize, Duration>,
    default_delay: Duration,
    failing: HashSet<usize>,
    hanging: HashSet<usize>,
    calls: Mutex<Vec<usize>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeOcrClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delay_all(mut self, ms: u64) -> Self {
        self.default_delay = Duration::from_millis(ms);
        self
    }

    pub fn delay(mut self, page: usize, ms: u64) -> Self {
        self.delays.insert(page, Duration::from_millis(ms));
        self
    }

    pub fn fail_on(mut self, page: usize) -> Self {
        self.failing.insert(page);
        self
    }

    pub fn hang_on(mut self, page: usize) -> Self {
        self.hanging.insert(page);
        self
    }

    /// Pages sent to the service, sorted.
    pub fn calls(&self) -> Vec<usize> {
        let mut calls = self.calls.lock().unwrap().clone();
        calls.sort_unstable();
        calls
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl OcrClient for FakeOcrClient {
    async fn ocr_file(&self, path: &Path, options: &OcrOptions) -> Result<OcrResult, PagewiseError> {
        let labels = page_labels(path);
        assert_eq!(labels.len(), 1, "coordinator must send single pages");
        let page = labels[0];
        self.calls.lock().unwrap().push(page);

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if self.hanging.contains(&page) {
            std::future::pending::<()>().await;
        }
        let delay = self.delays.get(&page).copied().unwrap_or(self.default_delay);
        tokio::time::sleep(delay).await;

        if self.failing.contains(&page) {
            return Err(PagewiseError::Service {
                status: Some(503),
                message: format!("scripted failure on page {page}"),
            });
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
        Err(PagewiseError::service("fake client does not fetch URLs"))
    }
}
