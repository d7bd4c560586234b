//! Page rasterization through PDFium

use crate::error::{Error, Result};
use crate::pdf::geometry::{compute_fit_scale, compute_rotated_viewport, normalize_rotation};
use crate::pdf::preview::CancellationToken;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, RgbImage};
use pdfium_render::prelude::*;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::PathBuf;

/// Where PDFium is looked up and how exports are encoded
#[derive(Debug, Clone, PartialEq)]
pub struct RasterizerConfig {
    /// Directories searched for the platform PDFium library, in order
    pub library_paths: Vec<PathBuf>,
    /// Fall back to the system library search path
    pub use_system_library: bool,
    /// Scale used for page-to-image export
    pub export_scale: f32,
    /// JPEG quality, 1-100
    pub jpeg_quality: u8,
}

impl Default for RasterizerConfig {
    fn default() -> Self {
        Self {
            library_paths: vec![PathBuf::from("./"), PathBuf::from("/opt/pdfium/lib")],
            use_system_library: true,
            export_scale: 2.5,
            jpeg_quality: 92,
        }
    }
}

/// Container format for rasterized pages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RasterFormat {
    #[default]
    #[serde(alias = "jpeg")]
    Jpg,
    Png,
}

impl RasterFormat {
    pub fn extension(self) -> &'static str {
        match self {
            RasterFormat::Jpg => "jpg",
            RasterFormat::Png => "png",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            RasterFormat::Jpg => "image/jpeg",
            RasterFormat::Png => "image/png",
        }
    }
}

/// Scale and extra rotation applied on top of the page's own `/Rotate`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderViewport {
    pub scale: f32,
    pub rotation: i64,
}

impl RenderViewport {
    pub fn scale(scale: f32) -> Self {
        Self { scale, rotation: 0 }
    }
}

/// Renders pages to white-backed RGB buffers.
///
/// PDFium is not thread-safe, so each call binds its own instance.
#[derive(Debug, Clone)]
pub struct Rasterizer {
    config: RasterizerConfig,
}

impl Rasterizer {
    /// Check that PDFium can be bound with `config` and keep it for later calls.
    pub fn new(config: RasterizerConfig) -> Result<Self> {
        let rasterizer = Self { config };
        rasterizer.bind()?;
        Ok(rasterizer)
    }

    pub fn config(&self) -> &RasterizerConfig {
        &self.config
    }

    fn bind(&self) -> Result<Pdfium> {
        let mut last_error = None;
        for dir in &self.config.library_paths {
            let path = Pdfium::pdfium_platform_library_name_at_path(dir);
            match Pdfium::bind_to_library(&path) {
                Ok(bindings) => return Ok(Pdfium::new(bindings)),
                Err(e) => last_error = Some(e),
            }
        }
        if self.config.use_system_library {
            match Pdfium::bind_to_system_library() {
                Ok(bindings) => return Ok(Pdfium::new(bindings)),
                Err(e) => last_error = Some(e),
            }
        }
        Err(Error::Rendering {
            reason: match last_error {
                Some(e) => format!("Failed to bind PDFium library: {}", e),
                None => "no PDFium library location configured".to_string(),
            },
        })
    }

    fn load<'a>(pdfium: &'a Pdfium, data: &'a [u8]) -> Result<PdfDocument<'a>> {
        pdfium
            .load_pdf_from_byte_slice(data, None)
            .map_err(|e| match e {
                PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError) => {
                    Error::PasswordRequired
                }
                _ => Error::CorruptDocument {
                    reason: format!("{}", e),
                },
            })
    }

    fn page_at<'a>(document: &PdfDocument<'a>, index: usize) -> Result<PdfPage<'a>> {
        let pages = document.pages();
        let total = pages.len() as usize;
        if index >= total {
            return Err(Error::validation(format!(
                "page {} out of range (1-{})",
                index + 1,
                total
            )));
        }
        pages.get(index as u16).map_err(|e| Error::Rendering {
            reason: format!("Failed to get page {}: {}", index + 1, e),
        })
    }

    fn render_loaded(
        page: &PdfPage,
        viewport: RenderViewport,
        cancel: Option<&CancellationToken>,
    ) -> Result<RgbImage> {
        if let Some(token) = cancel {
            token.check()?;
        }
        let rotation = match normalize_rotation(viewport.rotation) {
            0 => PdfPageRenderRotation::None,
            90 => PdfPageRenderRotation::Degrees90,
            180 => PdfPageRenderRotation::Degrees180,
            270 => PdfPageRenderRotation::Degrees270,
            other => {
                tracing::warn!(rotation = other, "render rotation must be a multiple of 90, ignoring");
                PdfPageRenderRotation::None
            }
        };
        let config = PdfRenderConfig::new()
            .scale_page_by_factor(viewport.scale)
            .rotate(rotation, true)
            .set_clear_color(PdfColor::WHITE)
            .render_form_data(true)
            .render_annotations(true);

        let bitmap = page.render_with_config(&config).map_err(|e| Error::Rendering {
            reason: format!("{}", e),
        })?;
        let image = flatten_onto_white(bitmap.as_image());

        // A request superseded mid-render must not deliver its pixels
        if let Some(token) = cancel {
            token.check()?;
        }
        Ok(image)
    }

    /// Render one page (zero-based) of `data`.
    pub fn render_page(
        &self,
        data: &[u8],
        page_index: usize,
        viewport: RenderViewport,
        cancel: Option<&CancellationToken>,
    ) -> Result<RgbImage> {
        let pdfium = self.bind()?;
        let document = Self::load(&pdfium, data)?;
        let page = Self::page_at(&document, page_index)?;
        Self::render_loaded(&page, viewport, cancel)
    }

    /// Render every page in order. Any failure fails the whole call.
    pub fn render_all(
        &self,
        data: &[u8],
        viewport: RenderViewport,
        cancel: Option<&CancellationToken>,
    ) -> Result<Vec<RgbImage>> {
        let pdfium = self.bind()?;
        let document = Self::load(&pdfium, data)?;
        let total = document.pages().len() as usize;
        let mut images = Vec::with_capacity(total);
        for index in 0..total {
            let page = Self::page_at(&document, index)?;
            let image = Self::render_loaded(&page, viewport, cancel).map_err(|e| match e {
                Error::Rendering { reason } => Error::Rendering {
                    reason: format!("page {}: {}", index + 1, reason),
                },
                other => other,
            })?;
            tracing::debug!(page = index + 1, width = image.width(), height = image.height(), "rendered page");
            images.push(image);
        }
        Ok(images)
    }

    /// Render a page scaled to fit `max_width x max_height`, never above `cap_scale`.
    ///
    /// `rotation` is extra rotation on top of the page's own, as in [`RenderViewport`].
    #[allow(clippy::too_many_arguments)]
    pub fn render_thumbnail(
        &self,
        data: &[u8],
        page_index: usize,
        rotation: i64,
        max_width: f64,
        max_height: f64,
        cap_scale: f64,
        cancel: Option<&CancellationToken>,
    ) -> Result<RgbImage> {
        let pdfium = self.bind()?;
        let document = Self::load(&pdfium, data)?;
        let page = Self::page_at(&document, page_index)?;
        let base = compute_rotated_viewport(
            page.width().value as f64,
            page.height().value as f64,
            rotation,
            1.0,
        );
        let scale = compute_fit_scale(base.width, base.height, max_width, max_height, cap_scale);
        Self::render_loaded(
            &page,
            RenderViewport {
                scale: scale as f32,
                rotation,
            },
            cancel,
        )
    }

    /// Plain text of every page, in order.
    pub fn page_texts(&self, data: &[u8]) -> Result<Vec<String>> {
        let pdfium = self.bind()?;
        let document = Self::load(&pdfium, data)?;
        let total = document.pages().len() as usize;
        let mut texts = Vec::with_capacity(total);
        for index in 0..total {
            let page = Self::page_at(&document, index)?;
            let text = match page.text() {
                Ok(t) => t.all(),
                Err(e) => {
                    tracing::warn!(page = index + 1, error = %e, "no text layer");
                    String::new()
                }
            };
            texts.push(text);
        }
        Ok(texts)
    }
}

/// Composite any alpha over white and drop the channel.
fn flatten_onto_white(image: DynamicImage) -> RgbImage {
    let rgba = image.into_rgba8();
    let (w, h) = rgba.dimensions();
    RgbImage::from_fn(w, h, |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let a = a as u32;
        let blend = |c: u8| ((c as u32 * a + 255 * (255 - a) + 127) / 255) as u8;
        image::Rgb([blend(r), blend(g), blend(b)])
    })
}

/// Encode a rendered page.
pub fn encode_image(image: &RgbImage, format: RasterFormat, jpeg_quality: u8) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    match format {
        RasterFormat::Jpg => {
            let mut encoder = JpegEncoder::new_with_quality(&mut buf, jpeg_quality.clamp(1, 100));
            encoder.encode_image(image).map_err(|e| Error::Serialization {
                reason: format!("JPEG encoding failed: {}", e),
            })?;
        }
        RasterFormat::Png => {
            image
                .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
                .map_err(|e| Error::Serialization {
                    reason: format!("PNG encoding failed: {}", e),
                })?;
        }
    }
    Ok(buf)
}
