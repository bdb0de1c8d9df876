//! Page rasterisation: render PDF pages to PNG or JPEG files via pdfium.
//!
//! lopdf validates the document first (existence, encryption, page range),
//! so argument errors surface the same way they do for splitting and never
//! depend on pdfium being installed. Only the drawing itself goes through
//! pdfium.
//!
//! The pdfium library is located from `PDFIUM_LIB_PATH`, then the working
//! directory, then the system library path.
//!
//! Blocking; async callers wrap [`render_pages`] in `spawn_blocking`.

use crate::error::PagewiseError;
use crate::pipeline::split::{open_for_extraction, validate_range};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Encoding of rendered page images.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ImageFormat {
    #[default]
    Png,
    Jpeg,
}

impl ImageFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpeg",
        }
    }
}

/// Options for [`render_pages`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    /// Resolution. 72 = screen, 150 = print, 300 = high quality. Default: 150.
    pub dpi: u32,
    pub format: ImageFormat,
    /// Inclusive 1-indexed page range; every page when `None`.
    pub page_range: Option<(usize, usize)>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            dpi: 150,
            format: ImageFormat::Png,
            page_range: None,
        }
    }
}

const MAX_DPI: u32 = 1200;

/// Render pages of `path` to `out_dir/page_{NNN}.{ext}`.
///
/// `out_dir` defaults to `{stem}_images` next to the source and is created if
/// missing. Returns the written files in page order.
pub fn render_pages(
    path: &Path,
    out_dir: Option<&Path>,
    options: &RenderOptions,
) -> Result<Vec<PathBuf>, PagewiseError> {
    if options.dpi == 0 || options.dpi > MAX_DPI {
        return Err(PagewiseError::InvalidArgument(format!(
            "dpi must be between 1 and {MAX_DPI}, got {}",
            options.dpi
        )));
    }

    let total = open_for_extraction(path)?.page_count();
    let (start, end) = options.page_range.unwrap_or((1, total));
    validate_range(start, end, total)?;

    let out_dir = match out_dir {
        Some(d) => d.to_path_buf(),
        None => default_out_dir(path),
    };
    std::fs::create_dir_all(&out_dir).map_err(|e| PagewiseError::io(&out_dir, e))?;

    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_file(path, None)
        .map_err(|e| PagewiseError::CorruptPdf {
            path: path.to_path_buf(),
            detail: format!("{e:?}"),
        })?;
    let pages = document.pages();

    let mut written = Vec::with_capacity(end - start + 1);
    for page_num in start..=end {
        let page = pages
            .get((page_num - 1) as u16)
            .map_err(|e| PagewiseError::RenderFailed {
                page: page_num,
                detail: format!("{e:?}"),
            })?;

        let width = target_width(page.width().value, options.dpi);
        let render_config = PdfRenderConfig::new().set_target_width(width);
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| PagewiseError::RenderFailed {
                page: page_num,
                detail: format!("{e:?}"),
            })?;
        let image = bitmap.as_image();

        let file = out_dir.join(page_file_name(page_num, options.format));
        save_image(image, &file, options.format).map_err(|e| PagewiseError::RenderFailed {
            page: page_num,
            detail: e.to_string(),
        })?;
        debug!("Rendered page {} → {}", page_num, file.display());
        written.push(file);
    }

    info!(
        "Rendered pages {}-{} of {} at {} dpi into {}",
        start,
        end,
        path.display(),
        options.dpi,
        out_dir.display()
    );
    Ok(written)
}

fn bind_pdfium() -> Result<Pdfium, PagewiseError> {
    let bindings = match std::env::var_os("PDFIUM_LIB_PATH") {
        Some(lib) => Pdfium::bind_to_library(PathBuf::from(lib)),
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| PagewiseError::RendererUnavailable(format!("{e:?}")))?;
    Ok(Pdfium::new(bindings))
}

/// Pixel width of a page `points` wide (1 pt = 1/72 in) at `dpi`.
fn target_width(points: f32, dpi: u32) -> i32 {
    ((points * dpi as f32 / 72.0).round() as i32).max(1)
}

fn page_file_name(page_num: usize, format: ImageFormat) -> String {
    format!("page_{:03}.{}", page_num, format.extension())
}

fn default_out_dir(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".into());
    path.with_file_name(format!("{stem}_images"))
}

fn save_image(image: DynamicImage, file: &Path, format: ImageFormat) -> image::ImageResult<()> {
    match format {
        ImageFormat::Png => image.save_with_format(file, image::ImageFormat::Png),
        // JPEG has no alpha channel.
        ImageFormat::Jpeg => {
            DynamicImage::ImageRgb8(image.to_rgb8()).save_with_format(file, image::ImageFormat::Jpeg)
        }
    }
}
