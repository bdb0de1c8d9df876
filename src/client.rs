//! Remote page processor: the [`OcrClient`] seam and its HTTP implementation.
//!
//! The pipeline only ever talks to `Arc<dyn OcrClient>`, which keeps the
//! coordinator testable with scripted fakes. [`MistralClient`] speaks a
//! Mistral-compatible Document-AI protocol:
//!
//! ```text
//! local file ──▶ POST /v1/files ──▶ GET /v1/files/{id}/url ──▶ POST /v1/ocr
//!                (multipart)        (signed URL, retried)      (JSON)
//! URL ─────────────────────────────────────────────────────▶ POST /v1/ocr
//! ```
//!
//! Page indices are returned exactly as the service reports them (0-based,
//! local to the uploaded file). Remapping to document page numbers is the
//! caller's job.

use crate::config::{ClientConfig, OcrOptions};
use crate::error::PagewiseError;
use crate::output::{ImageInfo, OcrPage, OcrResult, TableInfo};
use crate::pipeline::input::is_image_url;
use async_trait::async_trait;
use base64::Engine;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Anything that can turn a document into per-page Markdown.
#[async_trait]
pub trait OcrClient: Send + Sync {
    /// OCR a local file.
    async fn ocr_file(&self, path: &Path, options: &OcrOptions) -> Result<OcrResult, PagewiseError>;

    /// OCR a document (or image) the service can fetch itself.
    async fn ocr_url(&self, url: &str, options: &OcrOptions) -> Result<OcrResult, PagewiseError>;
}

/// HTTP client for a Mistral-compatible OCR endpoint.
#[derive(Debug, Clone)]
pub struct MistralClient {
    http: Client,
    config: ClientConfig,
}

impl MistralClient {
    pub fn new(config: ClientConfig) -> Result<Self, PagewiseError> {
        let http = Client::builder()
            .user_agent(concat!("pagewise-ocr/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| PagewiseError::Internal(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { http, config })
    }

    /// Build a client from `MISTRAL_API_KEY`.
    pub fn from_env() -> Result<Self, PagewiseError> {
        Self::new(ClientConfig::from_env()?)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// OCR base64-encoded document bytes, uploaded under `file_name`.
    pub async fn ocr_base64(
        &self,
        content: &str,
        file_name: &str,
        options: &OcrOptions,
    ) -> Result<OcrResult, PagewiseError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(content.trim())
            .map_err(|e| PagewiseError::InvalidArgument(format!("Invalid base64 content: {e}")))?;
        self.ocr_bytes(bytes, file_name, options).await
    }

    async fn ocr_bytes(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
        options: &OcrOptions,
    ) -> Result<OcrResult, PagewiseError> {
        let file_id = self.upload(bytes, file_name).await?;
        let signed_url = self.signed_url_with_retry(&file_id).await?;
        let document = json!({ "type": "document_url", "document_url": signed_url });
        self.process(document, options).await
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn upload(&self, bytes: Vec<u8>, file_name: &str) -> Result<String, PagewiseError> {
        let size = bytes.len();
        let form = Form::new()
            .text("purpose", "ocr")
            .part("file", Part::bytes(bytes).file_name(file_name.to_string()));

        let response = self
            .http
            .post(self.endpoint("/v1/files"))
            .bearer_auth(&self.config.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(transport_error)?;
        let uploaded: UploadedFile = decode(check_status(response).await?).await?;

        debug!("Uploaded {} ({} bytes) as {}", file_name, size, uploaded.id);
        Ok(uploaded.id)
    }

    /// A freshly uploaded file may not be addressable yet, so resolving its
    /// signed URL is retried with a fixed delay.
    async fn signed_url_with_retry(&self, file_id: &str) -> Result<String, PagewiseError> {
        let attempts = self.config.signed_url_attempts.max(1);
        let delay = Duration::from_millis(self.config.signed_url_delay_ms);
        let mut last_err = None;

        for attempt in 1..=attempts {
            match self.signed_url(file_id).await {
                Ok(url) => return Ok(url),
                Err(e) => {
                    warn!(
                        "Signed URL for {} not ready (attempt {}/{}): {}",
                        file_id, attempt, attempts, e
                    );
                    last_err = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        let detail = last_err.map(|e| e.to_string()).unwrap_or_default();
        Err(PagewiseError::service(format!(
            "Could not resolve signed URL for {file_id} after {attempts} attempts: {detail}"
        )))
    }

    async fn signed_url(&self, file_id: &str) -> Result<String, PagewiseError> {
        let response = self
            .http
            .get(self.endpoint(&format!("/v1/files/{file_id}/url")))
            .query(&[("expiry", self.config.signed_url_expiry_hours)])
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(transport_error)?;
        let signed: SignedUrl = decode(check_status(response).await?).await?;
        Ok(signed.url)
    }

    async fn process(&self, document: Value, options: &OcrOptions) -> Result<OcrResult, PagewiseError> {
        let mut body = json!({
            "model": options.model,
            "document": document,
            "extract_header": options.extract_header,
            "extract_footer": options.extract_footer,
            "include_image_base64": options.include_images,
        });
        if let Some(format) = options.table_format {
            body["table_format"] = Value::from(format.as_wire());
        }

        let response = self
            .http
            .post(self.endpoint("/v1/ocr"))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        let raw: RawOcrResponse = decode(check_status(response).await?).await?;

        let result = raw.into_result(&options.model);
        debug!("OCR returned {} pages", result.page_count());
        Ok(result)
    }
}

#[async_trait]
impl OcrClient for MistralClient {
    async fn ocr_file(&self, path: &Path, options: &OcrOptions) -> Result<OcrResult, PagewiseError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PagewiseError::FileNotFound {
                    path: path.to_path_buf(),
                })
            }
            Err(e) => return Err(PagewiseError::io(path, e)),
        };
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document.pdf".to_string());
        self.ocr_bytes(bytes, &file_name, options).await
    }

    async fn ocr_url(&self, url: &str, options: &OcrOptions) -> Result<OcrResult, PagewiseError> {
        let document = if is_image_url(url) {
            json!({ "type": "image_url", "image_url": url })
        } else {
            json!({ "type": "document_url", "document_url": url })
        };
        self.process(document, options).await
    }
}

// ── HTTP helpers ─────────────────────────────────────────────────────────────

fn transport_error(e: reqwest::Error) -> PagewiseError {
    PagewiseError::Service {
        status: e.status().map(|s| s.as_u16()),
        message: e.to_string(),
    }
}

async fn check_status(response: Response) -> Result<Response, PagewiseError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(PagewiseError::Service {
        status: Some(status.as_u16()),
        message: if body.is_empty() {
            status.to_string()
        } else {
            body
        },
    })
}

async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, PagewiseError> {
    response
        .json()
        .await
        .map_err(|e| PagewiseError::service(format!("Failed to decode service response: {e}")))
}

// ── Wire types ───────────────────────────────────────────────────────────────
//
// The service sends `null` as freely as it omits fields, so every optional
// collection is an `Option` here and flattened into the public types.

#[derive(Debug, Deserialize)]
struct UploadedFile {
    id: String,
}

#[derive(Debug, Deserialize)]
struct SignedUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct RawOcrResponse {
    #[serde(default)]
    pages: Option<Vec<RawPage>>,
    #[serde(default)]
    usage_info: Option<serde_json::Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct RawPage {
    index: usize,
    #[serde(default)]
    markdown: Option<String>,
    #[serde(default)]
    images: Option<Vec<ImageInfo>>,
    #[serde(default)]
    tables: Option<Vec<TableInfo>>,
    #[serde(default)]
    hyperlinks: Option<Vec<String>>,
    #[serde(default)]
    header: Option<String>,
    #[serde(default)]
    footer: Option<String>,
}

impl RawOcrResponse {
    fn into_result(self, model: &str) -> OcrResult {
        let pages = self
            .pages
            .unwrap_or_default()
            .into_iter()
            .map(|p| OcrPage {
                index: p.index,
                markdown: p.markdown.unwrap_or_default(),
                images: p.images.unwrap_or_default(),
                tables: p.tables.unwrap_or_default(),
                hyperlinks: p.hyperlinks.unwrap_or_default(),
                header: p.header,
                footer: p.footer,
            })
            .collect();

        let usage_info: BTreeMap<String, u64> = self
            .usage_info
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(k, v)| v.as_u64().map(|n| (k, n)))
            .collect();

        OcrResult {
            pages,
            model: model.to_string(),
            usage_info,
        }
    }
}
