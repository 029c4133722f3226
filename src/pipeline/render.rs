//! pdfium access: bind the library, read the text layer, rasterise pages.
//!
//! Everything here runs inside `spawn_blocking`; pdfium keeps thread-local
//! state and must not be driven from a Tokio worker.
//!
//! Rendering caps the longest edge at `max_rendered_pixels` whatever the
//! page size, so a poster-sized page cannot blow up memory.

use crate::config::ExtractorConfig;
use crate::error::StudyKitError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Bind pdfium: `PDFIUM_LIB_PATH` (file or directory), then the working
/// directory, then the system library path.
pub fn bind_pdfium() -> Result<Pdfium, StudyKitError> {
    let mut tried = Vec::new();

    if let Ok(configured) = std::env::var("PDFIUM_LIB_PATH") {
        let p = PathBuf::from(&configured);
        let lib = if p.is_dir() {
            Pdfium::pdfium_platform_library_name_at_path(&p)
        } else {
            p
        };
        match Pdfium::bind_to_library(&lib) {
            Ok(bindings) => return Ok(Pdfium::new(bindings)),
            Err(e) => tried.push(format!("{}: {:?}", lib.display(), e)),
        }
    }

    let local = Pdfium::pdfium_platform_library_name_at_path("./");
    match Pdfium::bind_to_library(&local) {
        Ok(bindings) => return Ok(Pdfium::new(bindings)),
        Err(e) => tried.push(format!("{}: {:?}", local.display(), e)),
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(e) => {
            tried.push(format!("system library: {:?}", e));
            Err(StudyKitError::PdfiumBindingFailed(tried.join("; ")))
        }
    }
}

fn open_document<'a>(
    pdfium: &'a Pdfium,
    pdf_path: &Path,
    password: Option<&'a str>,
) -> Result<PdfDocument<'a>, StudyKitError> {
    pdfium.load_pdf_from_file(pdf_path, password).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.to_lowercase().contains("password") {
            if password.is_some() {
                StudyKitError::WrongPassword {
                    path: pdf_path.to_path_buf(),
                }
            } else {
                StudyKitError::PasswordRequired {
                    path: pdf_path.to_path_buf(),
                }
            }
        } else {
            StudyKitError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: err_str,
            }
        }
    })
}

/// Embedded text of the first pages of a document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextLayer {
    /// One entry per read page, in page order. Empty for image-only pages.
    pub pages: Vec<String>,
    pub total_pages: usize,
}

impl TextLayer {
    /// Non-empty pages joined by blank lines.
    pub fn text(&self) -> String {
        self.pages
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Share of read pages that carry any text.
    pub fn coverage(&self) -> f32 {
        if self.pages.is_empty() {
            return 0.0;
        }
        let with_text = self.pages.iter().filter(|p| !p.trim().is_empty()).count();
        with_text as f32 / self.pages.len() as f32
    }
}

/// Read the text layer of the first `max_pages` pages.
pub async fn read_text_layer(
    pdf_path: &Path,
    password: Option<&str>,
    max_pages: usize,
) -> Result<TextLayer, StudyKitError> {
    let path = pdf_path.to_path_buf();
    let password = password.map(str::to_string);

    tokio::task::spawn_blocking(move || {
        read_text_layer_blocking(&path, password.as_deref(), max_pages)
    })
    .await
    .map_err(|e| StudyKitError::Internal(format!("Text-layer task panicked: {}", e)))?
}

fn read_text_layer_blocking(
    pdf_path: &Path,
    password: Option<&str>,
    max_pages: usize,
) -> Result<TextLayer, StudyKitError> {
    let pdfium = bind_pdfium()?;
    let document = open_document(&pdfium, pdf_path, password)?;
    let pages = document.pages();
    let total_pages = pages.len() as usize;

    let mut layer = TextLayer {
        pages: Vec::with_capacity(total_pages.min(max_pages)),
        total_pages,
    };
    for idx in 0..total_pages.min(max_pages) {
        let page = pages
            .get(idx as u16)
            .map_err(|e| StudyKitError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: format!("page {}: {:?}", idx + 1, e),
            })?;
        let text = match page.text() {
            Ok(t) => t.all(),
            Err(e) => {
                warn!("Page {}: no text layer ({:?})", idx + 1, e);
                String::new()
            }
        };
        layer.pages.push(text);
    }

    debug!(
        "Text layer: {}/{} pages read, coverage {:.2}",
        layer.pages.len(),
        total_pages,
        layer.coverage()
    );
    Ok(layer)
}

/// Target bitmap width for a page `width_pt` points wide.
fn target_width_px(width_pt: f32, dpi: u32, max_pixels: u32) -> i32 {
    let px = (width_pt / 72.0 * dpi as f32).round() as i64;
    px.clamp(1, max_pixels.max(1) as i64) as i32
}

/// Rasterise the first `max_pages` pages.
///
/// Returns `(page_index_0based, image)` in page order.
pub async fn render_pages(
    pdf_path: &Path,
    config: &ExtractorConfig,
) -> Result<Vec<(usize, DynamicImage)>, StudyKitError> {
    let path = pdf_path.to_path_buf();
    let dpi = config.dpi;
    let max_pixels = config.max_rendered_pixels;
    let max_pages = config.max_pages;
    let password = config.password.clone();

    tokio::task::spawn_blocking(move || {
        render_pages_blocking(&path, dpi, max_pixels, password.as_deref(), max_pages)
    })
    .await
    .map_err(|e| StudyKitError::Internal(format!("Render task panicked: {}", e)))?
}

fn render_pages_blocking(
    pdf_path: &Path,
    dpi: u32,
    max_pixels: u32,
    password: Option<&str>,
    max_pages: usize,
) -> Result<Vec<(usize, DynamicImage)>, StudyKitError> {
    let pdfium = bind_pdfium()?;
    let document = open_document(&pdfium, pdf_path, password)?;
    let pages = document.pages();
    let total_pages = pages.len() as usize;
    let count = total_pages.min(max_pages);
    info!("PDF loaded: {} pages, rendering {}", total_pages, count);

    let mut results = Vec::with_capacity(count);
    for idx in 0..count {
        let page = pages
            .get(idx as u16)
            .map_err(|e| StudyKitError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{:?}", e),
            })?;

        let render_config = PdfRenderConfig::new()
            .set_target_width(target_width_px(page.width().value, dpi, max_pixels))
            .set_maximum_height(max_pixels as i32);

        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            StudyKitError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{:?}", e),
            }
        })?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );
        results.push((idx, image));
    }

    Ok(results)
}
