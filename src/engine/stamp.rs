//! Operations that draw on top of existing pages
//!
//! Every stamp is laid out against the page's crop box in unrotated page
//! space, so a cropped page keeps its marks inside the visible area.
//! Parameters are resolved and validated before the first page is touched.

use crate::engine::params::{
    HeaderFooterOptions, PageNumberOptions, SignatureOptions, WatermarkKind, WatermarkOptions,
    APPLICATION_NAME,
};
use crate::error::{Error, Result};
use crate::pdf::document::{Document, Metadata};
use crate::pdf::overlay::OverlayImage;
use std::sync::Arc;

/// Most watermark marks drawn on one page
pub const MAX_MARKS_PER_PAGE: f64 = 20_000.0;

pub fn add_page_numbers(doc: &mut Document, options: &PageNumberOptions) -> Result<()> {
    let numbering = options.to_numbering()?;
    let infos = doc.pages_info()?;
    let total = infos.len();
    // The last label is the largest, so it overflows first
    if total > 0 {
        numbering.label(total - 1, total)?;
    }
    for (index, info) in infos.iter().enumerate() {
        let overlay = numbering.overlay(info.crop_box, index, total)?;
        doc.append_overlay(index, &overlay)?;
    }
    Ok(())
}

/// Stamp header and footer rows. With both templates empty the document is left as is.
pub fn add_header_footer(doc: &mut Document, options: &HeaderFooterOptions) -> Result<()> {
    let header_footer = options.to_header_footer()?;
    if header_footer.is_empty() {
        tracing::debug!("header and footer are empty, nothing to stamp");
        return Ok(());
    }
    let infos = doc.pages_info()?;
    let total = infos.len();
    for (index, info) in infos.iter().enumerate() {
        let overlay = header_footer.overlay(info.crop_box, index, total);
        doc.append_overlay(index, &overlay)?;
    }
    Ok(())
}

/// Stamp every page. Text marks also record the watermark in the document info.
pub fn add_watermark(
    doc: &mut Document,
    options: &WatermarkOptions,
    image: Option<Arc<OverlayImage>>,
) -> Result<()> {
    let watermark = options.to_watermark(image)?;
    let infos = doc.pages_info()?;
    if let Some((index, marks)) = infos
        .iter()
        .map(|info| watermark.mark_count(info.crop_box))
        .enumerate()
        .find(|(_, marks)| *marks > MAX_MARKS_PER_PAGE)
    {
        return Err(Error::validation(format!(
            "tile spacing would draw {} marks on page {} (limit {})",
            marks,
            index + 1,
            MAX_MARKS_PER_PAGE
        )));
    }
    for (index, info) in infos.iter().enumerate() {
        let overlay = watermark.overlay(info.crop_box);
        tracing::debug!(page = index + 1, marks = overlay.items().len(), "watermarking page");
        doc.append_overlay(index, &overlay)?;
    }
    if options.kind == WatermarkKind::Text {
        doc.set_metadata(&Metadata {
            title: Some(format!("Watermarked: {}", options.text)),
            author: Some(APPLICATION_NAME.to_string()),
            subject: Some(format!("Watermarked with: {}", options.text)),
            ..Metadata::default()
        })?;
    }
    Ok(())
}

pub fn add_signature(
    doc: &mut Document,
    options: &SignatureOptions,
    image: Arc<OverlayImage>,
) -> Result<()> {
    let stamp = options.to_stamp(image)?;
    let index = options.target_index(doc.page_count()?)?;
    let info = doc.page_info(index)?;
    doc.append_overlay(index, &stamp.overlay(info.crop_box))
}
