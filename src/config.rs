//! Configuration types for page-level OCR.
//!
//! All pipeline behaviour is controlled through [`OcrConfig`], built via its
//! [`OcrConfigBuilder`]. The HTTP client has its own [`ClientConfig`] so that
//! one client (and its connection pool) can be shared by many pipeline runs
//! with different settings.

use crate::error::PagewiseError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default OCR model requested from the service.
pub const DEFAULT_OCR_MODEL: &str = "mistral-ocr-latest";

/// Default base URL of the remote OCR service.
pub const DEFAULT_BASE_URL: &str = "https://api.mistral.ai";

/// Environment variable holding the service API key.
pub const API_KEY_ENV: &str = "MISTRAL_API_KEY";

/// Size and page ceilings enforced by the remote service for a single call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceLimits {
    /// Largest document accepted in one call, in bytes. Default: 50 MiB.
    pub max_file_bytes: u64,
    /// Most pages accepted in one call. Default: 1000.
    pub max_pages: usize,
    /// Pages per chunk when a document has to be pre-split. Default: 500.
    ///
    /// Half the page ceiling, which leaves headroom for chunks whose byte
    /// size would otherwise approach `max_file_bytes`.
    pub default_chunk_size: usize,
}

impl Default for ServiceLimits {
    fn default() -> Self {
        Self {
            max_file_bytes: 50 * 1024 * 1024,
            max_pages: 1000,
            default_chunk_size: 500,
        }
    }
}

/// How the service should render tables it finds on a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableFormat {
    /// Tables stay inline in the page markdown (service default).
    Inline,
    /// Tables are returned separately as markdown.
    Markdown,
    /// Tables are returned separately as HTML.
    Html,
}

impl TableFormat {
    /// Value sent on the wire. `Inline` maps to the service's markdown mode.
    pub fn as_wire(&self) -> &'static str {
        match self {
            TableFormat::Html => "html",
            TableFormat::Inline | TableFormat::Markdown => "markdown",
        }
    }
}

/// Per-request options forwarded to an [`crate::client::OcrClient`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrOptions {
    pub model: String,
    pub table_format: Option<TableFormat>,
    pub extract_header: bool,
    pub extract_footer: bool,
    pub include_images: bool,
}

impl Default for OcrOptions {
    fn default() -> Self {
        Self {
            model: DEFAULT_OCR_MODEL.to_string(),
            table_format: None,
            extract_header: false,
            extract_footer: false,
            include_images: false,
        }
    }
}

/// Configuration for an OCR run.
///
/// Built via [`OcrConfig::builder()`] or using [`OcrConfig::default()`].
///
/// # Example
/// ```rust
/// use pagewise_ocr::OcrConfig;
///
/// let config = OcrConfig::builder()
///     .concurrency(8)
///     .api_timeout_secs(90)
///     .build()
///     .unwrap();
/// assert_eq!(config.concurrency, 8);
/// ```
#[derive(Clone)]
pub struct OcrConfig {
    /// Maximum number of remote OCR calls in flight at once. Default: 5.
    ///
    /// Bounds network concurrency only; every missing page is queued up front.
    pub concurrency: usize,

    /// Options forwarded with every remote call.
    pub options: OcrOptions,

    /// Split oversized local documents before one-shot OCR. Default: true.
    pub auto_split: bool,

    /// Pages per chunk for one-shot OCR of oversized documents. Default: 500.
    pub chunk_size: usize,

    /// Per-call timeout in seconds. Default: 120.
    ///
    /// A timed-out call is reported as [`PagewiseError::ApiTimeout`] and
    /// handled exactly like a service failure.
    pub api_timeout_secs: u64,

    /// Service ceilings used to decide whether a document must be split.
    pub limits: ServiceLimits,

    /// Optional per-page event sink.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        let limits = ServiceLimits::default();
        Self {
            concurrency: 5,
            options: OcrOptions::default(),
            auto_split: true,
            chunk_size: limits.default_chunk_size,
            api_timeout_secs: 120,
            limits,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for OcrConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OcrConfig")
            .field("concurrency", &self.concurrency)
            .field("options", &self.options)
            .field("auto_split", &self.auto_split)
            .field("chunk_size", &self.chunk_size)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("limits", &self.limits)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn OcrProgressCallback>"),
            )
            .finish()
    }
}

impl OcrConfig {
    /// Create a new builder for `OcrConfig`.
    pub fn builder() -> OcrConfigBuilder {
        OcrConfigBuilder {
            config: Self::default(),
        }
    }

    /// Check the constraints [`OcrConfigBuilder::build`] enforces.
    ///
    /// The fields are public, so every entry point re-checks a config that
    /// may have been assembled by hand.
    pub fn validate(&self) -> Result<(), PagewiseError> {
        if self.concurrency == 0 {
            return Err(PagewiseError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(PagewiseError::InvalidConfig(
                "Chunk size must be ≥ 1 page".into(),
            ));
        }
        if self.chunk_size > self.limits.max_pages {
            return Err(PagewiseError::InvalidConfig(format!(
                "Chunk size {} exceeds the service page limit {}",
                self.chunk_size, self.limits.max_pages
            )));
        }
        if self.options.model.trim().is_empty() {
            return Err(PagewiseError::InvalidConfig("Model must not be empty".into()));
        }
        Ok(())
    }
}

/// Builder for [`OcrConfig`].
#[derive(Debug)]
pub struct OcrConfigBuilder {
    config: OcrConfig,
}

impl OcrConfigBuilder {
    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.options.model = model.into();
        self
    }

    pub fn table_format(mut self, format: TableFormat) -> Self {
        self.config.options.table_format = Some(format);
        self
    }

    pub fn extract_header(mut self, v: bool) -> Self {
        self.config.options.extract_header = v;
        self
    }

    pub fn extract_footer(mut self, v: bool) -> Self {
        self.config.options.extract_footer = v;
        self
    }

    pub fn include_images(mut self, v: bool) -> Self {
        self.config.options.include_images = v;
        self
    }

    pub fn auto_split(mut self, v: bool) -> Self {
        self.config.auto_split = v;
        self
    }

    pub fn chunk_size(mut self, pages: usize) -> Self {
        self.config.chunk_size = pages;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs.max(1);
        self
    }

    pub fn limits(mut self, limits: ServiceLimits) -> Self {
        self.config.limits = limits;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<OcrConfig, PagewiseError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Connection settings for [`crate::client::MistralClient`].
#[derive(Clone)]
pub struct ClientConfig {
    pub api_key: String,
    /// Service root, without a trailing slash. Default: [`DEFAULT_BASE_URL`].
    pub base_url: String,
    /// Attempts at resolving an uploaded file's signed URL. Default: 3.
    pub signed_url_attempts: u32,
    /// Fixed delay between signed-URL attempts in milliseconds. Default: 1000.
    pub signed_url_delay_ms: u64,
    /// Lifetime of the signed URL in hours. Default: 1.
    pub signed_url_expiry_hours: u32,
    /// HTTP request timeout in seconds. Default: 300.
    pub request_timeout_secs: u64,
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            signed_url_attempts: 3,
            signed_url_delay_ms: 1000,
            signed_url_expiry_hours: 1,
            request_timeout_secs: 300,
        }
    }

    /// Read the API key from [`API_KEY_ENV`].
    pub fn from_env() -> Result<Self, PagewiseError> {
        match std::env::var(API_KEY_ENV) {
            Ok(key) if !key.trim().is_empty() => Ok(Self::new(key)),
            _ => Err(PagewiseError::MissingApiKey { var: API_KEY_ENV }),
        }
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn signed_url_retry(mut self, attempts: u32, delay_ms: u64) -> Self {
        self.signed_url_attempts = attempts.max(1);
        self.signed_url_delay_ms = delay_ms;
        self
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("signed_url_attempts", &self.signed_url_attempts)
            .field("signed_url_delay_ms", &self.signed_url_delay_ms)
            .field("signed_url_expiry_hours", &self.signed_url_expiry_hours)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}
