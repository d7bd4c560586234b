//! Conversions between PDF pages, raster images and text

use crate::engine::output::{page_file_name, InputFile, OutputFile};
use crate::error::{Error, Result};
use crate::pdf::document::Document;
use crate::pdf::geometry::{fit_within, PageSize, Rect};
use crate::pdf::overlay::{ImageRun, Overlay, OverlayImage};
use crate::pdf::raster::{encode_image, RasterFormat, Rasterizer, RenderViewport};
use std::sync::Arc;

/// 10 mm in points
pub const IMAGE_PAGE_MARGIN: f64 = 28.35;

/// Render every page of `data` to `<base>_page_<n>.<ext>`.
///
/// Any page failing to render or encode fails the whole conversion.
pub fn pdf_to_images(
    rasterizer: &Rasterizer,
    data: &[u8],
    base_name: &str,
    format: RasterFormat,
    scale: f32,
) -> Result<Vec<OutputFile>> {
    if !scale.is_finite() || scale <= 0.0 {
        return Err(Error::validation(format!("scale must be positive, got {}", scale)));
    }
    let quality = rasterizer.config().jpeg_quality;
    rasterizer
        .render_all(data, RenderViewport::scale(scale), None)?
        .iter()
        .enumerate()
        .map(|(index, image)| {
            Ok(OutputFile {
                name: page_file_name(base_name, index + 1, format.extension()),
                data: encode_image(image, format, quality)?,
                mime_type: format.mime_type(),
            })
        })
        .collect()
}

/// One A4 page per image, each fitted inside the page margins and centered.
///
/// Every image is decoded before the document is built.
pub fn images_to_pdf(images: &[InputFile]) -> Result<Document> {
    if images.is_empty() {
        return Err(Error::validation("at least one image is required"));
    }
    let decoded = images
        .iter()
        .map(|file| {
            OverlayImage::decode(&file.data)
                .map(Arc::new)
                .map_err(|e| match e {
                    Error::UnsupportedImage { reason } => Error::UnsupportedImage {
                        reason: format!("{}: {}", file.name, reason),
                    },
                    other => other,
                })
        })
        .collect::<Result<Vec<_>>>()?;

    let (width, height) = PageSize::A4.dimensions();
    let mut doc = Document::create_empty();
    for (index, image) in decoded.into_iter().enumerate() {
        doc.add_blank_page(width, height)?;
        let rect = image_rect(image.width, image.height);
        let mut overlay = Overlay::new();
        overlay.push_image(ImageRun {
            image,
            rect,
            rotation: 0.0,
            opacity: 1.0,
        });
        doc.append_overlay(index, &overlay)?;
    }
    Ok(doc)
}

/// Where an image of `width` x `height` pixels lands on its A4 page
fn image_rect(width: u32, height: u32) -> Rect {
    let (page_width, page_height) = PageSize::A4.dimensions();
    let area = Rect::new(
        IMAGE_PAGE_MARGIN,
        IMAGE_PAGE_MARGIN,
        page_width - 2.0 * IMAGE_PAGE_MARGIN,
        page_height - 2.0 * IMAGE_PAGE_MARGIN,
    );
    fit_within(width as f64, height as f64, area)
}

/// Text of every page, each preceded by a `--- Page N ---` separator.
pub fn extract_text(rasterizer: &Rasterizer, data: &[u8]) -> Result<String> {
    let texts = rasterizer.page_texts(data)?;
    Ok(join_page_texts(&texts))
}

fn join_page_texts(texts: &[String]) -> String {
    let mut out = String::new();
    for (index, text) in texts.iter().enumerate() {
        out.push_str(&format!("\n\n--- Page {} ---\n\n", index + 1));
        out.push_str(text);
    }
    out
}
