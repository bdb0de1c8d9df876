//! CLI binary for pagewise-ocr.
//!
//! A thin shim over the library crate that maps CLI flags to `OcrConfig`
//! and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use pagewise_ocr::{
    extract_pages, inspect_document, ocr_document, render_pages, split_and_ocr, split_document,
    ClientConfig, ImageFormat, MistralClient, OcrConfig, OcrProgressCallback, ProgressCallback,
    RenderOptions, ServiceLimits, SplitOptions, TableFormat,
};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback. The bar advances when a page is saved, which
/// happens in page order; the per-page lines appear as calls return, which
/// may be out of order.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading PDF and output file…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self, page_num: usize) -> f64 {
        self.start_times
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&page_num)
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl OcrProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_pages: usize, remaining: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total_pages as u64);
        self.bar.set_position((total_pages - remaining) as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("OCR");
        self.bar.reset_eta();
        if remaining > 0 {
            self.bar.println(format!(
                "{} {}",
                cyan("◆"),
                bold(&format!("{remaining} of {total_pages} pages to process…"))
            ));
        }
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        self.start_times
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(page_num, Instant::now());
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, markdown_len: usize) {
        let secs = self.elapsed_secs(page_num);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<8}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{markdown_len:>5} chars")),
            dim(&format!("{secs:.1}s")),
        ));
    }

    fn on_page_saved(&self, _page_num: usize, _total: usize) {
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(page_num);
        self.errors.fetch_add(1, Ordering::SeqCst);

        // Truncate very long error messages to keep output tidy.
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
    }

    fn on_run_complete(&self, _total_pages: usize, _pages_processed: usize) {
        self.bar.finish_and_clear();
    }
}

impl CliProgressCallback {
    /// Leave the bar on screen after a failed run.
    fn abandon(&self) {
        if self.bar.is_finished() {
            return;
        }
        self.bar.abandon();
        let failed = self.errors.load(Ordering::SeqCst);
        if failed > 0 {
            eprintln!("{} {} page call(s) failed", red("✘"), failed);
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Resumable page-by-page OCR (writes contract.md next to the PDF)
  pagewise ocr contract.pdf

  # Same, explicit output and 10 concurrent calls; re-run to resume
  pagewise ocr contract.pdf out/contract.md --concurrent 10

  # Page count, size and split recommendation (no API key needed)
  pagewise info contract.pdf --json

  # Split into 200-page chunks
  pagewise split book.pdf --out-dir chunks --pages-per-chunk 200

  # Extract pages 2-5
  pagewise extract book.pdf 2 5 -o excerpt.pdf

  # Render pages 1-3 to PNG at 200 dpi (needs libpdfium)
  pagewise images book.pdf --pages 1-3 --dpi 200

  # One-shot OCR of a URL as JSON
  pagewise document https://example.com/report.pdf --json

OUTPUT FORMAT (ocr):
  <!-- Page 1 -->
  ...page markdown...

  ---

  <!-- Page 2 -->
  ...

ENVIRONMENT VARIABLES:
  MISTRAL_API_KEY         Service API key (also read from .env)
  MISTRAL_BASE_URL        Override the service base URL
  PAGEWISE_CONCURRENCY    Default for --concurrent
  PAGEWISE_MODEL          Default for --model
  PDFIUM_LIB_PATH         pdfium library used by `images`
  RUST_LOG                Log filter, e.g. pagewise_ocr=debug
"#;

/// Durable, resumable page-by-page OCR of PDF documents.
#[derive(Parser, Debug)]
#[command(
    name = "pagewise",
    version,
    about = "Durable, resumable page-by-page OCR of PDF documents",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PAGEWISE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PAGEWISE_QUIET")]
    quiet: bool,

    /// Disable progress bar.
    #[arg(long, global = true, env = "PAGEWISE_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// OCR a PDF page by page into a resumable Markdown file.
    Ocr {
        /// Local PDF file.
        file: PathBuf,

        /// Markdown output file. Default: the PDF path with a `.md` extension.
        output: Option<PathBuf>,

        /// Maximum concurrent OCR calls.
        #[arg(short, long = "concurrent", env = "PAGEWISE_CONCURRENCY", default_value_t = 5)]
        concurrent: usize,

        #[command(flatten)]
        service: ServiceArgs,
    },

    /// Print page count, size, encryption and split recommendation.
    Info {
        file: PathBuf,

        /// Output JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Split a PDF into contiguous page-range chunks.
    Split {
        file: PathBuf,

        /// Directory for the chunk files. Default: `{stem}_chunks` next to the PDF.
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// Pages per chunk.
        #[arg(long, default_value_t = 500)]
        pages_per_chunk: usize,

        /// Chunk file name prefix. Default: the PDF file stem.
        #[arg(long)]
        prefix: Option<String>,
    },

    /// Extract an inclusive 1-indexed page range into a new PDF.
    Extract {
        file: PathBuf,
        start: usize,
        end: usize,

        /// Output PDF. Default: `{stem}_pages_{start}-{end}.pdf` next to the source.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Render pages to PNG or JPEG images.
    Images {
        file: PathBuf,

        /// Directory for the images. Default: `{stem}_images` next to the PDF.
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// Resolution in dots per inch.
        #[arg(long, default_value_t = 150)]
        dpi: u32,

        /// Image format.
        #[arg(long, value_enum, default_value_t = ImageFormatArg::Png)]
        format: ImageFormatArg,

        /// Inclusive 1-indexed page range, e.g. `2-5`. Default: every page.
        #[arg(long, value_parser = parse_page_range)]
        pages: Option<(usize, usize)>,
    },

    /// One-shot OCR of a local PDF or URL, printed or written in one go.
    Document {
        /// Local PDF file path or HTTP/HTTPS URL.
        source: String,

        /// Write to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output the full OCR result as JSON.
        #[arg(long)]
        json: bool,

        /// Never split oversized documents into chunks.
        #[arg(long)]
        no_split: bool,

        #[command(flatten)]
        service: ServiceArgs,
    },
}

/// Options forwarded to the OCR service.
#[derive(Args, Debug)]
struct ServiceArgs {
    /// OCR model ID.
    #[arg(long, env = "PAGEWISE_MODEL", default_value = pagewise_ocr::config::DEFAULT_OCR_MODEL)]
    model: String,

    /// Service base URL.
    #[arg(long, env = "MISTRAL_BASE_URL", default_value = pagewise_ocr::config::DEFAULT_BASE_URL)]
    base_url: String,

    /// How tables are returned: inline, markdown, html.
    #[arg(long, value_enum)]
    table_format: Option<TableFormatArg>,

    /// Ask the service to extract page headers.
    #[arg(long)]
    extract_header: bool,

    /// Ask the service to extract page footers.
    #[arg(long)]
    extract_footer: bool,

    /// Include base64 images in the service response.
    #[arg(long)]
    include_images: bool,

    /// Per-call timeout in seconds.
    #[arg(long, env = "PAGEWISE_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum TableFormatArg {
    Inline,
    Markdown,
    Html,
}

impl From<TableFormatArg> for TableFormat {
    fn from(v: TableFormatArg) -> Self {
        match v {
            TableFormatArg::Inline => TableFormat::Inline,
            TableFormatArg::Markdown => TableFormat::Markdown,
            TableFormatArg::Html => TableFormat::Html,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ImageFormatArg {
    Png,
    Jpeg,
}

impl From<ImageFormatArg> for ImageFormat {
    fn from(v: ImageFormatArg) -> Self {
        match v {
            ImageFormatArg::Png => ImageFormat::Png,
            ImageFormatArg::Jpeg => ImageFormat::Jpeg,
        }
    }
}

fn parse_page_range(s: &str) -> Result<(usize, usize), String> {
    let parse = |p: &str| {
        p.trim()
            .parse::<usize>()
            .map_err(|_| format!("'{p}' is not a page number"))
    };
    match s.split_once('-') {
        Some((start, end)) => Ok((parse(start)?, parse(end)?)),
        None => {
            let page = parse(s)?;
            Ok((page, page))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine; the key may come from the shell.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let shows_bar = matches!(cli.command, Command::Ocr { .. });
    let show_progress = shows_bar && !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Ocr {
            ref file,
            ref output,
            concurrent,
            ref service,
        } => run_ocr(&cli, file, output.as_deref(), concurrent, service, show_progress).await,
        Command::Info { ref file, json } => run_info(file, json).await,
        Command::Split {
            ref file,
            ref out_dir,
            pages_per_chunk,
            ref prefix,
        } => run_split(&cli, file, out_dir.as_deref(), pages_per_chunk, prefix.clone()).await,
        Command::Extract {
            ref file,
            start,
            end,
            ref output,
        } => {
            let path = {
                let file = file.clone();
                let output = output.clone();
                tokio::task::spawn_blocking(move || extract_pages(&file, start, end, output.as_deref()))
                    .await
                    .context("Extract task panicked")??
            };
            if !cli.quiet {
                eprintln!("{} pages {start}-{end}  →  {}", green("✔"), bold(&path.display().to_string()));
            }
            Ok(())
        }
        Command::Images {
            ref file,
            ref out_dir,
            dpi,
            format,
            pages,
        } => {
            let options = RenderOptions {
                dpi,
                format: format.into(),
                page_range: pages,
            };
            run_images(&cli, file, out_dir.as_deref(), options).await
        }
        Command::Document {
            ref source,
            ref output,
            json,
            no_split,
            ref service,
        } => run_document(&cli, source, output.as_deref(), json, no_split, service).await,
    }
}

// ── ocr ──────────────────────────────────────────────────────────────────────

async fn run_ocr(
    cli: &Cli,
    file: &Path,
    output: Option<&Path>,
    concurrent: usize,
    service: &ServiceArgs,
    show_progress: bool,
) -> Result<()> {
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| file.with_extension("md"));

    let progress = show_progress.then(CliProgressCallback::new_dynamic);
    let mut builder = OcrConfig::builder().concurrency(concurrent);
    if let Some(ref cb) = progress {
        builder = builder.progress_callback(cb.clone() as ProgressCallback);
    }
    let config = apply_service_args(builder, service)
        .build()
        .context("Invalid configuration")?;
    let client = build_client(service)?;

    let result = split_and_ocr(file, &output, &config, Arc::new(client)).await;
    if let Some(ref cb) = progress {
        cb.abandon();
    }
    let summary = result.context("OCR stopped; re-run the same command to resume")?;

    if !cli.quiet {
        if summary.resumed_from > 0 {
            eprintln!("Resumed from page {}", summary.resumed_from);
        }
        eprintln!(
            "{}  Processed {}/{} pages  →  {}",
            green("✔"),
            summary.pages_processed,
            summary.total_pages,
            bold(&output.display().to_string()),
        );
    }
    Ok(())
}

// ── info ─────────────────────────────────────────────────────────────────────

async fn run_info(file: &Path, json: bool) -> Result<()> {
    let info = inspect_document(file, &ServiceLimits::default())
        .await
        .context("Failed to inspect PDF")?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&info).context("Failed to serialize document info")?
        );
    } else {
        println!("File:         {}", info.path.display());
        println!("Pages:        {}", info.page_count);
        println!("Size:         {:.2} MiB", info.size_mb());
        println!("Encrypted:    {}", info.is_encrypted);
        println!("Needs split:  {}", info.needs_splitting);
        if info.needs_splitting {
            println!("Chunks:       {}", info.recommended_chunks);
        }
    }
    Ok(())
}

// ── split ────────────────────────────────────────────────────────────────────

async fn run_split(
    cli: &Cli,
    file: &Path,
    out_dir: Option<&Path>,
    pages_per_chunk: usize,
    prefix: Option<String>,
) -> Result<()> {
    let out_dir = out_dir.map(Path::to_path_buf).unwrap_or_else(|| {
        let stem = file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".into());
        file.with_file_name(format!("{stem}_chunks"))
    });
    let options = SplitOptions {
        pages_per_chunk,
        prefix,
    };

    let file = file.to_path_buf();
    let result = tokio::task::spawn_blocking(move || split_document(&file, &out_dir, &options))
        .await
        .context("Split task panicked")?
        .context("Failed to split PDF")?;

    if !cli.quiet {
        for chunk in &result.chunks {
            println!(
                "{}  pages {:>4}-{:<4}  {}",
                chunk.path.display(),
                chunk.start_page,
                chunk.end_page,
                dim(&format!("{} bytes", chunk.size_bytes)),
            );
        }
        eprintln!(
            "{} {} pages in {} chunks  →  {}",
            green("✔"),
            result.original_page_count,
            result.chunks.len(),
            bold(&result.output_directory.display().to_string()),
        );
    }
    Ok(())
}

// ── images ───────────────────────────────────────────────────────────────────

async fn run_images(
    cli: &Cli,
    file: &Path,
    out_dir: Option<&Path>,
    options: RenderOptions,
) -> Result<()> {
    let dpi = options.dpi;
    let file = file.to_path_buf();
    let out_dir = out_dir.map(Path::to_path_buf);
    let files = tokio::task::spawn_blocking(move || render_pages(&file, out_dir.as_deref(), &options))
        .await
        .context("Render task panicked")?
        .context("Failed to render PDF pages")?;

    if !cli.quiet {
        for f in &files {
            println!("{}", f.display());
        }
        eprintln!("{} {} pages at {} dpi", green("✔"), files.len(), dpi);
    }
    Ok(())
}

// ── document ─────────────────────────────────────────────────────────────────

async fn run_document(
    cli: &Cli,
    source: &str,
    output: Option<&Path>,
    json: bool,
    no_split: bool,
    service: &ServiceArgs,
) -> Result<()> {
    let config = apply_service_args(OcrConfig::builder().auto_split(!no_split), service)
        .build()
        .context("Invalid configuration")?;
    let client = build_client(service)?;

    let result = ocr_document(source, &config, &client)
        .await
        .context("OCR failed")?;

    let rendered = if json {
        serde_json::to_string_pretty(&result).context("Failed to serialise output")?
    } else {
        result.full_text()
    };

    match output {
        Some(path) => {
            tokio::fs::write(path, &rendered)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            if !cli.quiet {
                eprintln!(
                    "{}  {} pages  →  {}",
                    green("✔"),
                    result.page_count(),
                    bold(&path.display().to_string()),
                );
            }
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(rendered.as_bytes())
                .context("Failed to write to stdout")?;
            if !rendered.ends_with('\n') {
                handle.write_all(b"\n").ok();
            }
        }
    }
    Ok(())
}

// ── shared ───────────────────────────────────────────────────────────────────

fn apply_service_args(
    builder: pagewise_ocr::OcrConfigBuilder,
    service: &ServiceArgs,
) -> pagewise_ocr::OcrConfigBuilder {
    let builder = builder
        .model(service.model.clone())
        .extract_header(service.extract_header)
        .extract_footer(service.extract_footer)
        .include_images(service.include_images)
        .api_timeout_secs(service.api_timeout);
    match service.table_format {
        Some(format) => builder.table_format(format.into()),
        None => builder,
    }
}

fn build_client(service: &ServiceArgs) -> Result<MistralClient> {
    let config = ClientConfig::from_env()
        .context("No API key")?
        .base_url(service.base_url.clone());
    MistralClient::new(config).context("Failed to create OCR client")
}
