//! Typed parameters for operations that take more than a page list

use crate::error::{Error, Result};
use crate::pdf::document::Metadata;
use crate::pdf::fonts::encode_win_ansi;
use crate::pdf::geometry::{Corner, HorizontalAlign, VerticalPosition};
use crate::pdf::overlay::{
    HeaderFooter, OverlayImage, PageNumberFormat, PageNumbering, Rgb, SignatureStamp, Watermark,
    WatermarkMark, WatermarkPlacement,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Name recorded as author/creator on documents this crate writes metadata for
pub const APPLICATION_NAME: &str = "PDF Tools Pro";

/// Smallest distance between tiled watermark anchors, in points
pub const MIN_TILE_SPACING: f64 = 20.0;

fn check_font_size(size: f64) -> Result<()> {
    if !size.is_finite() || size <= 0.0 {
        return Err(Error::validation(format!("font size must be positive, got {}", size)));
    }
    Ok(())
}

fn check_non_negative(what: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(Error::validation(format!("{} must not be negative, got {}", what, value)));
    }
    Ok(())
}

// ============================================================================
// Page numbers
// ============================================================================

/// Where page numbers go
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum NumberPosition {
    TopLeft,
    TopCenter,
    TopRight,
    BottomLeft,
    #[default]
    BottomCenter,
    BottomRight,
}

impl NumberPosition {
    pub fn split(self) -> (VerticalPosition, HorizontalAlign) {
        use HorizontalAlign::*;
        use VerticalPosition::*;
        match self {
            NumberPosition::TopLeft => (Top, Left),
            NumberPosition::TopCenter => (Top, Center),
            NumberPosition::TopRight => (Top, Right),
            NumberPosition::BottomLeft => (Bottom, Left),
            NumberPosition::BottomCenter => (Bottom, Center),
            NumberPosition::BottomRight => (Bottom, Right),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct PageNumberOptions {
    pub position: NumberPosition,
    pub format: PageNumberFormat,
    /// Number printed on the first page
    pub start_number: i64,
    pub font_size: f64,
    /// Distance from the page edge in points
    pub margin: f64,
}

impl Default for PageNumberOptions {
    fn default() -> Self {
        let defaults = PageNumbering::default();
        Self {
            position: NumberPosition::BottomCenter,
            format: defaults.format,
            start_number: defaults.start_number,
            font_size: defaults.font_size,
            margin: defaults.margin,
        }
    }
}

impl PageNumberOptions {
    pub fn to_numbering(&self) -> Result<PageNumbering> {
        check_font_size(self.font_size)?;
        check_non_negative("margin", self.margin)?;
        let (vertical, align) = self.position.split();
        Ok(PageNumbering {
            vertical,
            align,
            format: self.format,
            start_number: self.start_number,
            font_size: self.font_size,
            margin: self.margin,
        })
    }
}

// ============================================================================
// Header / footer
// ============================================================================

/// Templates may contain `{page}` and `{total}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct HeaderFooterOptions {
    pub header: String,
    pub footer: String,
    pub font_size: f64,
}

impl Default for HeaderFooterOptions {
    fn default() -> Self {
        Self {
            header: String::new(),
            footer: String::new(),
            font_size: 10.0,
        }
    }
}

impl HeaderFooterOptions {
    pub fn to_header_footer(&self) -> Result<HeaderFooter> {
        check_font_size(self.font_size)?;
        encode_win_ansi(&self.header)?;
        encode_win_ansi(&self.footer)?;
        let mut hf = HeaderFooter::new(self.header.clone(), self.footer.clone());
        hf.font_size = self.font_size;
        Ok(hf)
    }
}

// ============================================================================
// Watermark
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum WatermarkKind {
    #[default]
    Text,
    /// The image is the second input file
    Image,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum WatermarkLayout {
    /// One mark in the middle of each page
    #[default]
    Centered,
    /// A grid of smaller marks over the whole page
    Tiled,
}

/// Watermark parameters. Unset values take the layout's defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct WatermarkOptions {
    pub kind: WatermarkKind,
    pub text: String,
    pub layout: WatermarkLayout,
    /// 0.0 (invisible) to 1.0 (opaque)
    pub opacity: Option<f64>,
    /// Counter-clockwise degrees, default 45
    pub rotation: Option<f64>,
    pub font_size: Option<f64>,
    /// `#RRGGBB`; defaults to light gray
    pub color: Option<String>,
    /// Edge of the square an image mark is fitted into, in points
    pub image_size: Option<f64>,
    pub spacing_x: Option<f64>,
    pub spacing_y: Option<f64>,
}

impl WatermarkOptions {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Resolve defaults and validate. `image` is required for image marks.
    pub fn to_watermark(&self, image: Option<Arc<OverlayImage>>) -> Result<Watermark> {
        let tiled = self.layout == WatermarkLayout::Tiled;
        let opacity = self.opacity.unwrap_or(match (self.kind, tiled) {
            (WatermarkKind::Image, _) => 0.3,
            (WatermarkKind::Text, false) => 0.15,
            (WatermarkKind::Text, true) => 0.12,
        });
        if !(0.0..=1.0).contains(&opacity) {
            return Err(Error::validation(format!(
                "opacity must be between 0 and 1, got {}",
                opacity
            )));
        }
        let rotation = self.rotation.unwrap_or(45.0);
        if !rotation.is_finite() {
            return Err(Error::validation("rotation must be a finite number"));
        }

        let mark = match self.kind {
            WatermarkKind::Text => {
                if self.text.trim().is_empty() {
                    return Err(Error::validation("watermark text must not be empty"));
                }
                encode_win_ansi(&self.text)?;
                let font_size = self.font_size.unwrap_or(if tiled { 40.0 } else { 80.0 });
                check_font_size(font_size)?;
                let color = match &self.color {
                    Some(hex) => Rgb::from_hex(hex)?,
                    None => Rgb::gray(if tiled { 0.7 } else { 0.6 }),
                };
                WatermarkMark::Text {
                    text: self.text.clone(),
                    font_size,
                    color,
                }
            }
            WatermarkKind::Image => {
                let image = image
                    .ok_or_else(|| Error::validation("image watermark needs an image input"))?;
                let size = self.image_size.unwrap_or(100.0);
                if !size.is_finite() || size <= 0.0 {
                    return Err(Error::validation(format!("image size must be positive, got {}", size)));
                }
                WatermarkMark::Image { image, size }
            }
        };

        let placement = if tiled {
            let spacing_x = self.spacing_x.unwrap_or(250.0);
            let spacing_y = self.spacing_y.unwrap_or(150.0);
            let too_small = |v: f64| !v.is_finite() || v < MIN_TILE_SPACING;
            if too_small(spacing_x) || too_small(spacing_y) {
                return Err(Error::validation(format!(
                    "tile spacing must be at least {} points, got {}x{}",
                    MIN_TILE_SPACING, spacing_x, spacing_y
                )));
            }
            WatermarkPlacement::Tiled {
                spacing_x,
                spacing_y,
            }
        } else {
            WatermarkPlacement::Centered
        };

        Ok(Watermark {
            mark,
            opacity,
            rotation,
            placement,
        })
    }
}

// ============================================================================
// Signature
// ============================================================================

/// Signature placement. The image is the second input file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SignatureOptions {
    pub corner: Corner,
    /// 1-based page; the last page when unset
    pub page: Option<u32>,
    pub width: f64,
    pub height: f64,
    pub margin: f64,
}

impl Default for SignatureOptions {
    fn default() -> Self {
        Self {
            corner: Corner::BottomRight,
            page: None,
            width: 150.0,
            height: 50.0,
            margin: 50.0,
        }
    }
}

impl SignatureOptions {
    /// Zero-based target page index
    pub fn target_index(&self, page_count: usize) -> Result<usize> {
        match self.page {
            None if page_count > 0 => Ok(page_count - 1),
            None => Err(Error::validation("document has no pages to sign")),
            Some(p) if p >= 1 && p as usize <= page_count => Ok(p as usize - 1),
            Some(p) => Err(Error::validation(format!(
                "page {} out of range (1-{})",
                p, page_count
            ))),
        }
    }

    pub fn to_stamp(&self, image: Arc<OverlayImage>) -> Result<SignatureStamp> {
        if self.width <= 0.0 || self.height <= 0.0 {
            return Err(Error::validation("signature box must have a positive size"));
        }
        check_non_negative("margin", self.margin)?;
        let mut stamp = SignatureStamp::new(image, self.corner);
        stamp.width = self.width;
        stamp.height = self.height;
        stamp.margin = self.margin;
        Ok(stamp)
    }
}

// ============================================================================
// Metadata
// ============================================================================

/// Fields to overwrite. Empty or missing fields are left as they are.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct MetadataUpdate {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    /// Comma-separated list
    pub keywords: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
}

impl MetadataUpdate {
    pub fn to_metadata(&self) -> Metadata {
        let keep = |v: &Option<String>| v.as_ref().filter(|s| !s.trim().is_empty()).cloned();
        let keywords = self.keywords.as_ref().and_then(|k| {
            let words: Vec<&str> = k.split(',').map(str::trim).filter(|w| !w.is_empty()).collect();
            (!words.is_empty()).then(|| words.join(" "))
        });
        Metadata {
            title: keep(&self.title),
            author: keep(&self.author),
            subject: keep(&self.subject),
            keywords,
            creator: keep(&self.creator),
            producer: keep(&self.producer),
        }
    }
}
