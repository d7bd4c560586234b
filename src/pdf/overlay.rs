//! Overlay descriptors and their content streams
//!
//! An [`Overlay`] is a list of text and image runs in page space. The
//! descriptors below (watermark, page numbers, header/footer, signature)
//! each turn into one overlay per page; the document adapter then registers
//! resources and appends the generated content.

use crate::error::{Error, Result};
use crate::pdf::fonts::{encode_win_ansi, StandardFont};
use crate::pdf::geometry::{
    fit_within, place_box, place_text, tiled_watermark_anchors, Corner, HorizontalAlign, Rect,
    VerticalPosition,
};
use crate::pdf::objects::{escape_literal, num};
use image::{ColorType, DynamicImage, ImageFormat};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Cap height of Helvetica, used to center text vertically on a point
const CAP_HEIGHT: f64 = 0.718;

/// Fill color with components in `0.0..=1.0`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb {
        r: 0.0,
        g: 0.0,
        b: 0.0,
    };

    pub fn gray(level: f64) -> Self {
        Self {
            r: level,
            g: level,
            b: level,
        }
    }

    /// Parse `#RRGGBB` or `RRGGBB`
    pub fn from_hex(hex: &str) -> Result<Self> {
        let digits = hex.trim().trim_start_matches('#');
        if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::validation(format!("invalid color `{}`", hex)));
        }
        let channel = |i: usize| -> Result<f64> {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map(|v| v as f64 / 255.0)
                .map_err(|_| Error::validation(format!("invalid color `{}`", hex)))
        };
        Ok(Self {
            r: channel(0)?,
            g: channel(2)?,
            b: channel(4)?,
        })
    }
}

/// Pixel payload of an overlay image
#[derive(Debug, Clone, PartialEq)]
pub enum ImagePixels {
    /// Baseline JPEG embedded as-is
    Jpeg { data: Vec<u8>, gray: bool },
    /// 8-bit RGB samples with an optional 8-bit alpha plane
    Raw { rgb: Vec<u8>, alpha: Option<Vec<u8>> },
}

/// A decoded PNG or JPEG ready to embed as an image XObject
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayImage {
    pub width: u32,
    pub height: u32,
    pub pixels: ImagePixels,
}

impl OverlayImage {
    /// Decode PNG or JPEG bytes. Any other codec is rejected.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let format = image::guess_format(bytes).map_err(|e| Error::UnsupportedImage {
            reason: e.to_string(),
        })?;
        if !matches!(format, ImageFormat::Png | ImageFormat::Jpeg) {
            return Err(Error::UnsupportedImage {
                reason: format!("{:?} images are not supported", format),
            });
        }
        let img = image::load_from_memory_with_format(bytes, format).map_err(|e| {
            Error::UnsupportedImage {
                reason: e.to_string(),
            }
        })?;

        if format == ImageFormat::Jpeg {
            match img.color() {
                ColorType::Rgb8 | ColorType::L8 => {
                    return Ok(Self {
                        width: img.width(),
                        height: img.height(),
                        pixels: ImagePixels::Jpeg {
                            data: bytes.to_vec(),
                            gray: img.color() == ColorType::L8,
                        },
                    })
                }
                _ => {}
            }
        }
        Ok(Self::from_dynamic(&img))
    }

    pub fn from_dynamic(img: &DynamicImage) -> Self {
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        let mut rgb = Vec::with_capacity((width * height * 3) as usize);
        let mut alpha = Vec::with_capacity((width * height) as usize);
        for px in rgba.pixels() {
            rgb.extend_from_slice(&px.0[..3]);
            alpha.push(px.0[3]);
        }
        let alpha = alpha.iter().any(|&a| a != u8::MAX).then_some(alpha);
        Self {
            width,
            height,
            pixels: ImagePixels::Raw { rgb, alpha },
        }
    }
}

/// One line of text in page space
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub font: StandardFont,
    pub size: f64,
    pub color: Rgb,
    pub opacity: f64,
    /// Baseline origin
    pub x: f64,
    pub y: f64,
    /// Counter-clockwise, about the origin
    pub rotation: f64,
}

/// An image drawn into a rectangle, rotated about the rectangle's center
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRun {
    pub image: Arc<OverlayImage>,
    pub rect: Rect,
    pub rotation: f64,
    pub opacity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OverlayItem {
    Text(TextRun),
    Image(ImageRun),
}

/// Content drawn on top of a page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overlay {
    items: Vec<OverlayItem>,
}

/// Resource name for a constant-alpha graphics state, keyed by thousandths
pub(crate) fn opacity_resource_name(opacity: f64) -> String {
    format!("/PtGS{}", opacity_key(opacity))
}

fn opacity_key(opacity: f64) -> u16 {
    (opacity.clamp(0.0, 1.0) * 1000.0).round() as u16
}

impl Overlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_text(&mut self, run: TextRun) {
        if !run.text.is_empty() {
            self.items.push(OverlayItem::Text(run));
        }
    }

    pub fn push_image(&mut self, run: ImageRun) {
        self.items.push(OverlayItem::Image(run));
    }

    pub fn items(&self) -> &[OverlayItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(crate) fn fonts(&self) -> BTreeSet<StandardFont> {
        self.items
            .iter()
            .filter_map(|item| match item {
                OverlayItem::Text(t) => Some(t.font),
                OverlayItem::Image(_) => None,
            })
            .collect()
    }

    /// Distinct opacities below 1.0, as `(resource name, alpha)`
    pub(crate) fn opacities(&self) -> Vec<(String, f64)> {
        let keys: BTreeSet<u16> = self
            .items
            .iter()
            .map(|item| match item {
                OverlayItem::Text(t) => t.opacity,
                OverlayItem::Image(i) => i.opacity,
            })
            .map(opacity_key)
            .filter(|&k| k < 1000)
            .collect();
        keys.into_iter()
            .map(|k| (format!("/PtGS{}", k), k as f64 / 1000.0))
            .collect()
    }

    pub(crate) fn images(&self) -> Vec<Arc<OverlayImage>> {
        let mut out: Vec<Arc<OverlayImage>> = Vec::new();
        for item in &self.items {
            if let OverlayItem::Image(run) = item {
                if !out.iter().any(|i| Arc::ptr_eq(i, &run.image)) {
                    out.push(run.image.clone());
                }
            }
        }
        out
    }

    /// Content stream operators. `image_name` maps each image to its XObject name.
    ///
    /// Fails when a text run holds characters the standard fonts cannot draw.
    pub(crate) fn content(&self, image_name: impl Fn(&Arc<OverlayImage>) -> String) -> Result<String> {
        let mut out = String::new();
        for item in &self.items {
            out.push_str("q\n");
            match item {
                OverlayItem::Text(t) => {
                    if opacity_key(t.opacity) < 1000 {
                        out.push_str(&format!("{} gs\n", opacity_resource_name(t.opacity)));
                    }
                    let (sin, cos) = t.rotation.to_radians().sin_cos();
                    let encoded = encode_win_ansi(&t.text)?;
                    out.push_str(&format!(
                        "{} {} {} rg\nBT\n{} {} Tf\n{} {} {} {} {} {} Tm\n({}) Tj\nET\n",
                        num(t.color.r),
                        num(t.color.g),
                        num(t.color.b),
                        t.font.resource_name(),
                        num(t.size),
                        num(cos),
                        num(sin),
                        num(-sin),
                        num(cos),
                        num(t.x),
                        num(t.y),
                        escape_literal(&encoded),
                    ));
                }
                OverlayItem::Image(i) => {
                    if opacity_key(i.opacity) < 1000 {
                        out.push_str(&format!("{} gs\n", opacity_resource_name(i.opacity)));
                    }
                    let (sin, cos) = i.rotation.to_radians().sin_cos();
                    let (w, h) = (i.rect.width, i.rect.height);
                    let cx = i.rect.left + w / 2.0;
                    let cy = i.rect.bottom + h / 2.0;
                    out.push_str(&format!(
                        "{} {} {} {} {} {} cm\n{} Do\n",
                        num(w * cos),
                        num(w * sin),
                        num(-h * sin),
                        num(h * cos),
                        num(cx - cos * w / 2.0 + sin * h / 2.0),
                        num(cy - sin * w / 2.0 - cos * h / 2.0),
                        image_name(&i.image),
                    ));
                }
            }
            out.push_str("Q\n");
        }
        Ok(out)
    }
}

/// Baseline origin that puts the visual center of a rotated text run on `(cx, cy)`.
pub fn centered_text_origin(cx: f64, cy: f64, text_width: f64, font_size: f64, rotation: f64) -> (f64, f64) {
    let (sin, cos) = rotation.to_radians().sin_cos();
    let hw = text_width / 2.0;
    let hh = font_size * CAP_HEIGHT / 2.0;
    (cx - (hw * cos - hh * sin), cy - (hw * sin + hh * cos))
}

// ============================================================================
// Watermark
// ============================================================================

/// What a watermark draws
#[derive(Debug, Clone, PartialEq)]
pub enum WatermarkMark {
    Text {
        text: String,
        font_size: f64,
        color: Rgb,
    },
    /// Image fitted into a `size x size` box, aspect preserved
    Image { image: Arc<OverlayImage>, size: f64 },
}

/// Where a watermark goes
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WatermarkPlacement {
    /// One mark centered on the page
    Centered,
    /// Marks repeated over the page on a grid
    Tiled { spacing_x: f64, spacing_y: f64 },
}

/// Watermark descriptor, applied identically to every page
#[derive(Debug, Clone, PartialEq)]
pub struct Watermark {
    pub mark: WatermarkMark,
    pub opacity: f64,
    pub rotation: f64,
    pub placement: WatermarkPlacement,
}

impl Watermark {
    /// Number of marks drawn on a page of this size
    pub fn mark_count(&self, page: Rect) -> f64 {
        match self.placement {
            WatermarkPlacement::Centered => 1.0,
            WatermarkPlacement::Tiled {
                spacing_x,
                spacing_y,
            } => {
                // Anchors cover three page widths and heights so rotated marks reach the corners
                let columns = (3.0 * page.width / spacing_x).ceil().max(0.0);
                let rows = (3.0 * page.height / spacing_y).ceil().max(0.0);
                columns * rows
            }
        }
    }

    pub fn overlay(&self, page: Rect) -> Overlay {
        let mut overlay = Overlay::new();
        match self.placement {
            WatermarkPlacement::Centered => {
                let cx = page.left + page.width / 2.0;
                let cy = page.bottom + page.height / 2.0;
                self.draw_centered(&mut overlay, cx, cy);
            }
            WatermarkPlacement::Tiled {
                spacing_x,
                spacing_y,
            } => {
                for (x, y) in tiled_watermark_anchors(page.width, page.height, spacing_x, spacing_y) {
                    self.draw_anchored(&mut overlay, page.left + x, page.bottom + y);
                }
            }
        }
        overlay
    }

    fn draw_centered(&self, overlay: &mut Overlay, cx: f64, cy: f64) {
        match &self.mark {
            WatermarkMark::Text {
                text,
                font_size,
                color,
            } => {
                let font = StandardFont::HelveticaBold;
                let tw = font.text_width(text, *font_size);
                let (x, y) = centered_text_origin(cx, cy, tw, *font_size, self.rotation);
                overlay.push_text(TextRun {
                    text: text.clone(),
                    font,
                    size: *font_size,
                    color: *color,
                    opacity: self.opacity,
                    x,
                    y,
                    rotation: self.rotation,
                });
            }
            WatermarkMark::Image { image, size } => {
                let area = Rect::new(cx - size / 2.0, cy - size / 2.0, *size, *size);
                let rect = fit_image(image, area);
                overlay.push_image(ImageRun {
                    image: image.clone(),
                    rect,
                    rotation: self.rotation,
                    opacity: self.opacity,
                });
            }
        }
    }

    fn draw_anchored(&self, overlay: &mut Overlay, x: f64, y: f64) {
        match &self.mark {
            WatermarkMark::Text {
                text,
                font_size,
                color,
            } => overlay.push_text(TextRun {
                text: text.clone(),
                font: StandardFont::HelveticaBold,
                size: *font_size,
                color: *color,
                opacity: self.opacity,
                x,
                y,
                rotation: self.rotation,
            }),
            WatermarkMark::Image { image, size } => {
                let rect = fit_image(image, Rect::new(x, y, *size, *size));
                overlay.push_image(ImageRun {
                    image: image.clone(),
                    rect,
                    rotation: self.rotation,
                    opacity: self.opacity,
                });
            }
        }
    }
}

fn fit_image(image: &OverlayImage, area: Rect) -> Rect {
    fit_within(image.width as f64, image.height as f64, area)
}

// ============================================================================
// Page numbers
// ============================================================================

/// How page numbers are written
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PageNumberFormat {
    /// `7`
    #[default]
    Number,
    /// `Page 7 of 12`
    PageOfTotal,
    /// `VII`
    Roman,
}

/// Largest value with a standard roman numeral
pub const MAX_ROMAN: i64 = 3999;

/// Upper-case roman numeral, `None` outside `1..=3999`.
pub fn to_roman(mut n: i64) -> Option<String> {
    const TABLE: [(&str, i64); 13] = [
        ("M", 1000),
        ("CM", 900),
        ("D", 500),
        ("CD", 400),
        ("C", 100),
        ("XC", 90),
        ("L", 50),
        ("XL", 40),
        ("X", 10),
        ("IX", 9),
        ("V", 5),
        ("IV", 4),
        ("I", 1),
    ];
    if !(1..=MAX_ROMAN).contains(&n) {
        return None;
    }
    let mut out = String::new();
    for (symbol, value) in TABLE {
        while n >= value {
            out.push_str(symbol);
            n -= value;
        }
    }
    Some(out)
}

/// Page number descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct PageNumbering {
    pub vertical: VerticalPosition,
    pub align: HorizontalAlign,
    pub format: PageNumberFormat,
    pub start_number: i64,
    pub font_size: f64,
    pub margin: f64,
}

impl Default for PageNumbering {
    fn default() -> Self {
        Self {
            vertical: VerticalPosition::Bottom,
            align: HorizontalAlign::Center,
            format: PageNumberFormat::Number,
            start_number: 1,
            font_size: 12.0,
            margin: 30.0,
        }
    }
}

impl PageNumbering {
    /// Label for the page at zero-based `index` of `total`.
    ///
    /// Roman labels fall back to arabic digits outside `1..=3999`.
    pub fn label(&self, index: usize, total: usize) -> Result<String> {
        let n = i64::try_from(index)
            .ok()
            .and_then(|i| self.start_number.checked_add(i))
            .ok_or_else(|| {
                Error::validation(format!(
                    "page number overflows when starting at {}",
                    self.start_number
                ))
            })?;
        Ok(match self.format {
            PageNumberFormat::Number => n.to_string(),
            PageNumberFormat::PageOfTotal => format!("Page {} of {}", n, total),
            PageNumberFormat::Roman => to_roman(n).unwrap_or_else(|| n.to_string()),
        })
    }

    pub fn overlay(&self, page: Rect, index: usize, total: usize) -> Result<Overlay> {
        let text = self.label(index, total)?;
        let font = StandardFont::Helvetica;
        let tw = font.text_width(&text, self.font_size);
        let (x, y) = place_text(page, tw, self.vertical, self.align, self.margin);
        let mut overlay = Overlay::new();
        overlay.push_text(TextRun {
            text,
            font,
            size: self.font_size,
            color: Rgb::BLACK,
            opacity: 1.0,
            x,
            y,
            rotation: 0.0,
        });
        Ok(overlay)
    }
}

// ============================================================================
// Header / footer
// ============================================================================

/// Replace every `{page}` and `{total}` placeholder.
pub fn substitute_placeholders(template: &str, page: usize, total: usize) -> String {
    template
        .replace("{page}", &page.to_string())
        .replace("{total}", &total.to_string())
}

/// Header and footer descriptor. An empty template skips its row.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderFooter {
    pub header: String,
    pub footer: String,
    pub font_size: f64,
    pub margin: f64,
}

impl HeaderFooter {
    pub fn new(header: impl Into<String>, footer: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            footer: footer.into(),
            font_size: 10.0,
            margin: 30.0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.header.is_empty() && self.footer.is_empty()
    }

    pub fn overlay(&self, page: Rect, index: usize, total: usize) -> Overlay {
        let mut overlay = Overlay::new();
        let font = StandardFont::Helvetica;
        for (template, vertical) in [
            (&self.header, VerticalPosition::Top),
            (&self.footer, VerticalPosition::Bottom),
        ] {
            if template.is_empty() {
                continue;
            }
            let text = substitute_placeholders(template, index + 1, total);
            let tw = font.text_width(&text, self.font_size);
            let (x, y) = place_text(page, tw, vertical, HorizontalAlign::Center, self.margin);
            overlay.push_text(TextRun {
                text,
                font,
                size: self.font_size,
                color: Rgb::BLACK,
                opacity: 1.0,
                x,
                y,
                rotation: 0.0,
            });
        }
        overlay
    }
}

// ============================================================================
// Signature
// ============================================================================

/// Signature image stamped into a corner box of one page
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureStamp {
    pub image: Arc<OverlayImage>,
    pub corner: Corner,
    pub width: f64,
    pub height: f64,
    pub margin: f64,
}

impl SignatureStamp {
    pub fn new(image: Arc<OverlayImage>, corner: Corner) -> Self {
        Self {
            image,
            corner,
            width: 150.0,
            height: 50.0,
            margin: 50.0,
        }
    }

    pub fn overlay(&self, page: Rect) -> Overlay {
        let (x, y) = place_box(page, self.width, self.height, self.corner, self.margin);
        let slot = Rect::new(x, y, self.width, self.height);
        let mut overlay = Overlay::new();
        overlay.push_image(ImageRun {
            image: self.image.clone(),
            rect: fit_image(&self.image, slot),
            rotation: 0.0,
            opacity: 1.0,
        });
        overlay
    }
}
