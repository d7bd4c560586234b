//! Page geometry
//!
//! Pure functions over points (1/72 inch) with the PDF origin at the bottom-left.
//! Nothing in this module touches a document.

use crate::error::{Error, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Normalize any integer angle into `0..360`.
pub fn normalize_rotation(degrees: i64) -> u16 {
    degrees.rem_euclid(360) as u16
}

/// Size of a rendered page in device units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

/// Rendered size of a page at `scale`, swapping the axes for quarter turns.
pub fn compute_rotated_viewport(
    base_width: f64,
    base_height: f64,
    rotation_degrees: i64,
    scale: f64,
) -> Viewport {
    let (w, h) = match normalize_rotation(rotation_degrees) {
        90 | 270 => (base_height, base_width),
        _ => (base_width, base_height),
    };
    Viewport {
        width: w * scale,
        height: h * scale,
    }
}

/// Largest scale that fits the content into the box, never above `cap_scale`.
///
/// Degenerate content (zero or negative extent) yields `cap_scale`, since any
/// scale fits it.
pub fn compute_fit_scale(
    content_width: f64,
    content_height: f64,
    max_width: f64,
    max_height: f64,
    cap_scale: f64,
) -> f64 {
    let sx = if content_width > 0.0 {
        max_width / content_width
    } else {
        f64::INFINITY
    };
    let sy = if content_height > 0.0 {
        max_height / content_height
    } else {
        f64::INFINITY
    };
    sx.min(sy).min(cap_scale).max(0.0)
}

/// Margins in points, clockwise from the top like CSS.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Margins {
    #[serde(default)]
    pub top: f64,
    #[serde(default)]
    pub right: f64,
    #[serde(default)]
    pub bottom: f64,
    #[serde(default)]
    pub left: f64,
}

impl Margins {
    pub fn uniform(value: f64) -> Self {
        Self {
            top: value,
            right: value,
            bottom: value,
            left: value,
        }
    }

    /// Every edge multiplied by `factor`
    pub fn scaled(self, factor: f64) -> Self {
        Self {
            top: self.top * factor,
            right: self.right * factor,
            bottom: self.bottom * factor,
            left: self.left * factor,
        }
    }

    /// The same margins seen after turning the page `degrees` clockwise.
    ///
    /// Angles are normalized first; anything but a quarter turn multiple
    /// leaves the margins unchanged.
    pub fn rotated(self, degrees: i64) -> Self {
        let Self {
            top,
            right,
            bottom,
            left,
        } = self;
        match normalize_rotation(degrees) {
            90 => Self {
                top: left,
                right: top,
                bottom: right,
                left: bottom,
            },
            180 => Self {
                top: bottom,
                right: left,
                bottom: top,
                left: right,
            },
            270 => Self {
                top: right,
                right: bottom,
                bottom: left,
                left: top,
            },
            _ => self,
        }
    }

    fn validate(&self) -> Result<()> {
        for (name, v) in [
            ("top", self.top),
            ("right", self.right),
            ("bottom", self.bottom),
            ("left", self.left),
        ] {
            if !v.is_finite() || v < 0.0 {
                return Err(Error::validation(format!(
                    "{} margin must be a non-negative number, got {}",
                    name, v
                )));
            }
        }
        Ok(())
    }
}

/// Convert margins captured in on-screen pixels back to whole document points.
pub fn margins_to_points(pixel_margins: Margins, display_to_content_ratio: f64) -> Result<Margins> {
    if !display_to_content_ratio.is_finite() || display_to_content_ratio <= 0.0 {
        return Err(Error::validation(format!(
            "display-to-content ratio must be positive, got {}",
            display_to_content_ratio
        )));
    }
    let points = Margins {
        top: (pixel_margins.top * display_to_content_ratio).round(),
        right: (pixel_margins.right * display_to_content_ratio).round(),
        bottom: (pixel_margins.bottom * display_to_content_ratio).round(),
        left: (pixel_margins.left * display_to_content_ratio).round(),
    };
    points.validate()?;
    Ok(points)
}

/// Axis-aligned rectangle given by its lower-left corner and extent
#[derive(Debug, Clone, Copy, PartialEq, Serialize, JsonSchema)]
pub struct Rect {
    pub left: f64,
    pub bottom: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(left: f64, bottom: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            bottom,
            width,
            height,
        }
    }

    /// Build from a PDF rectangle `[llx lly urx ury]`; corners may come in any order.
    pub fn from_corners(c: [f64; 4]) -> Self {
        let (x0, x1) = (c[0].min(c[2]), c[0].max(c[2]));
        let (y0, y1) = (c[1].min(c[3]), c[1].max(c[3]));
        Self::new(x0, y0, x1 - x0, y1 - y0)
    }

    pub fn to_corners(&self) -> [f64; 4] {
        [
            self.left,
            self.bottom,
            self.left + self.width,
            self.bottom + self.height,
        ]
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn top(&self) -> f64 {
        self.bottom + self.height
    }
}

/// Crop box for a page of the given media rectangle.
///
/// The result is `(left, bottom, width-left-right, height-top-bottom)`
/// relative to the media box origin. A zero or negative extent is rejected.
pub fn crop_rect(media: Rect, margins: Margins) -> Result<Rect> {
    margins.validate()?;
    let width = media.width - margins.left - margins.right;
    let height = media.height - margins.top - margins.bottom;
    if width <= 0.0 || height <= 0.0 {
        return Err(Error::validation(format!(
            "margins leave a {}x{} crop box on a {}x{} page",
            width, height, media.width, media.height
        )));
    }
    Ok(Rect::new(
        media.left + margins.left,
        media.bottom + margins.bottom,
        width,
        height,
    ))
}

/// Named physical page sizes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(from = "String")]
pub enum PageSize {
    #[default]
    A4,
    Letter,
    Legal,
    A3,
    A5,
    Tabloid,
}

impl PageSize {
    /// Dimensions in points, portrait orientation
    pub fn dimensions(self) -> (f64, f64) {
        match self {
            PageSize::A4 => (595.0, 842.0),
            PageSize::Letter => (612.0, 792.0),
            PageSize::Legal => (612.0, 1008.0),
            PageSize::A3 => (842.0, 1191.0),
            PageSize::A5 => (420.0, 595.0),
            PageSize::Tabloid => (792.0, 1224.0),
        }
    }

    /// Case-insensitive lookup. Unknown names fall back to A4.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "letter" => PageSize::Letter,
            "legal" => PageSize::Legal,
            "a3" => PageSize::A3,
            "a5" => PageSize::A5,
            "tabloid" => PageSize::Tabloid,
            "a4" => PageSize::A4,
            other => {
                tracing::debug!(name = other, "unknown page size, using A4");
                PageSize::A4
            }
        }
    }
}

impl From<String> for PageSize {
    fn from(name: String) -> Self {
        PageSize::from_name(&name)
    }
}

/// Lazy grid of watermark anchors covering `[-w, 2w) x [-h, 2h)`.
///
/// Rows advance along y, columns along x. The grid over-covers the page so
/// text rotated around each anchor still fills the visible area.
#[derive(Debug, Clone)]
pub struct TileAnchors {
    x_start: f64,
    x_end: f64,
    y_end: f64,
    spacing_x: f64,
    spacing_y: f64,
    next: Option<(f64, f64)>,
}

impl Iterator for TileAnchors {
    type Item = (f64, f64);

    fn next(&mut self) -> Option<Self::Item> {
        let (x, y) = self.next?;
        let mut nx = x + self.spacing_x;
        let mut ny = y;
        if nx >= self.x_end {
            nx = self.x_start;
            ny += self.spacing_y;
        }
        self.next = if ny < self.y_end { Some((nx, ny)) } else { None };
        Some((x, y))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self.next {
            None => (0, Some(0)),
            Some(_) => (0, None),
        }
    }
}

/// Anchors for a tiled watermark. Non-positive spacing or page size yields no anchors.
pub fn tiled_watermark_anchors(
    page_width: f64,
    page_height: f64,
    spacing_x: f64,
    spacing_y: f64,
) -> TileAnchors {
    let valid = spacing_x > 0.0
        && spacing_y > 0.0
        && page_width > 0.0
        && page_height > 0.0
        && spacing_x.is_finite()
        && spacing_y.is_finite();
    TileAnchors {
        x_start: -page_width,
        x_end: 2.0 * page_width,
        y_end: 2.0 * page_height,
        spacing_x,
        spacing_y,
        next: valid.then_some((-page_width, -page_height)),
    }
}

/// Vertical band of the page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum VerticalPosition {
    Top,
    #[default]
    Bottom,
}

/// Horizontal alignment within a band
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum HorizontalAlign {
    Left,
    #[default]
    Center,
    Right,
}

/// Page corner
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    #[default]
    BottomRight,
}

/// Baseline origin for a text run of `text_width` placed in a band of the page.
///
/// The baseline sits `margin` from the bottom or top edge.
pub fn place_text(
    page: Rect,
    text_width: f64,
    vertical: VerticalPosition,
    align: HorizontalAlign,
    margin: f64,
) -> (f64, f64) {
    let x = match align {
        HorizontalAlign::Left => page.left + margin,
        HorizontalAlign::Center => page.left + (page.width - text_width) / 2.0,
        HorizontalAlign::Right => page.right() - margin - text_width,
    };
    let y = match vertical {
        VerticalPosition::Bottom => page.bottom + margin,
        VerticalPosition::Top => page.top() - margin,
    };
    (x, y)
}

/// Lower-left origin of a `width x height` box inset `margin` from a corner.
pub fn place_box(page: Rect, width: f64, height: f64, corner: Corner, margin: f64) -> (f64, f64) {
    let x = match corner {
        Corner::TopLeft | Corner::BottomLeft => page.left + margin,
        Corner::TopRight | Corner::BottomRight => page.right() - margin - width,
    };
    let y = match corner {
        Corner::BottomLeft | Corner::BottomRight => page.bottom + margin,
        Corner::TopLeft | Corner::TopRight => page.top() - margin - height,
    };
    (x, y)
}

/// Scale `content` to the largest size that fits `area` with its aspect ratio kept, centered.
pub fn fit_within(content_width: f64, content_height: f64, area: Rect) -> Rect {
    if content_width <= 0.0 || content_height <= 0.0 {
        return area;
    }
    let scale = compute_fit_scale(
        content_width,
        content_height,
        area.width,
        area.height,
        f64::INFINITY,
    );
    let w = content_width * scale;
    let h = content_height * scale;
    Rect::new(
        area.left + (area.width - w) / 2.0,
        area.bottom + (area.height - h) / 2.0,
        w,
        h,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(0, 0)]
    #[case(90, 90)]
    #[case(360, 0)]
    #[case(450, 90)]
    #[case(-90, 270)]
    #[case(-450, 270)]
    #[case(45, 45)]
    fn test_normalize_rotation(#[case] input: i64, #[case] expected: u16) {
        assert_eq!(normalize_rotation(input), expected);
    }

    #[rstest]
    #[case(0, 200.0, 100.0)]
    #[case(90, 100.0, 200.0)]
    #[case(180, 200.0, 100.0)]
    #[case(270, 100.0, 200.0)]
    #[case(-90, 100.0, 200.0)]
    fn test_rotated_viewport_swaps_for_quarter_turns(
        #[case] rotation: i64,
        #[case] width: f64,
        #[case] height: f64,
    ) {
        let vp = compute_rotated_viewport(100.0, 50.0, rotation, 2.0);
        assert_eq!(vp, Viewport { width, height });
    }

    #[test]
    fn test_fit_scale_respects_cap() {
        // Tiny content would scale up 100x without the cap
        assert_eq!(compute_fit_scale(10.0, 10.0, 1000.0, 1000.0, 1.5), 1.5);
        assert_eq!(compute_fit_scale(612.0, 792.0, 306.0, 1000.0, 1.2), 0.5);
        assert_eq!(compute_fit_scale(612.0, 792.0, 1000.0, 396.0, 1.2), 0.5);
    }

    #[test]
    fn test_fit_scale_degenerate_content() {
        assert_eq!(compute_fit_scale(0.0, 0.0, 100.0, 100.0, 2.0), 2.0);
    }

    #[rstest]
    #[case(0, Margins { top: 1.0, right: 2.0, bottom: 3.0, left: 4.0 })]
    #[case(90, Margins { top: 4.0, right: 1.0, bottom: 2.0, left: 3.0 })]
    #[case(180, Margins { top: 3.0, right: 4.0, bottom: 1.0, left: 2.0 })]
    #[case(-90, Margins { top: 2.0, right: 3.0, bottom: 4.0, left: 1.0 })]
    #[case(45, Margins { top: 1.0, right: 2.0, bottom: 3.0, left: 4.0 })]
    fn test_margins_rotated_clockwise(#[case] degrees: i64, #[case] expected: Margins) {
        let m = Margins {
            top: 1.0,
            right: 2.0,
            bottom: 3.0,
            left: 4.0,
        };
        assert_eq!(m.rotated(degrees), expected);
        if degrees % 90 == 0 {
            assert_eq!(m.rotated(degrees).rotated(-degrees), m);
        }
    }

    #[test]
    fn test_margins_to_points_rounds() {
        let px = Margins {
            top: 10.4,
            right: 10.6,
            bottom: 0.0,
            left: 3.0,
        };
        let pt = margins_to_points(px, 1.5).unwrap();
        assert_eq!(
            pt,
            Margins {
                top: 16.0,
                right: 16.0,
                bottom: 0.0,
                left: 5.0
            }
        );
    }

    #[test]
    fn test_margins_to_points_rejects_negative() {
        let px = Margins {
            top: -4.0,
            ..Margins::default()
        };
        assert!(matches!(
            margins_to_points(px, 1.0),
            Err(Error::Validation { .. })
        ));
        assert!(margins_to_points(Margins::default(), 0.0).is_err());
        assert!(margins_to_points(Margins::default(), f64::NAN).is_err());
    }

    #[test]
    fn test_crop_rect_offsets_by_media_origin() {
        let media = Rect::new(10.0, 20.0, 600.0, 800.0);
        let margins = Margins {
            top: 5.0,
            right: 15.0,
            bottom: 25.0,
            left: 35.0,
        };
        let crop = crop_rect(media, margins).unwrap();
        assert_eq!(crop, Rect::new(45.0, 45.0, 550.0, 770.0));
    }

    #[rstest]
    #[case(Margins { left: 300.0, right: 300.0, ..Margins::default() })]
    #[case(Margins { top: 400.0, bottom: 500.0, ..Margins::default() })]
    fn test_crop_rect_rejects_non_positive(#[case] margins: Margins) {
        let media = Rect::new(0.0, 0.0, 600.0, 800.0);
        assert!(matches!(
            crop_rect(media, margins),
            Err(Error::Validation { .. })
        ));
    }

    #[test]
    fn test_crop_rect_just_inside_boundary() {
        let media = Rect::new(0.0, 0.0, 600.0, 800.0);
        let margins = Margins {
            left: 299.0,
            right: 300.0,
            ..Margins::default()
        };
        assert_eq!(crop_rect(media, margins).unwrap().width, 1.0);
    }

    #[rstest]
    #[case("A4", (595.0, 842.0))]
    #[case("letter", (612.0, 792.0))]
    #[case("Legal", (612.0, 1008.0))]
    #[case("a3", (842.0, 1191.0))]
    #[case("A5", (420.0, 595.0))]
    #[case("TABLOID", (792.0, 1224.0))]
    #[case("B5", (595.0, 842.0))]
    #[case("", (595.0, 842.0))]
    fn test_page_size_lookup(#[case] name: &str, #[case] dims: (f64, f64)) {
        assert_eq!(PageSize::from_name(name).dimensions(), dims);
    }

    #[test]
    fn test_tiled_anchors_cover_extended_area() {
        let anchors: Vec<_> = tiled_watermark_anchors(100.0, 50.0, 100.0, 50.0).collect();
        // x in {-100, 0, 100}, y in {-50, 0, 50}
        assert_eq!(anchors.len(), 9);
        assert_eq!(anchors.first(), Some(&(-100.0, -50.0)));
        assert_eq!(anchors.last(), Some(&(100.0, 50.0)));
        assert!(anchors.iter().all(|&(x, y)| (-100.0..200.0).contains(&x)
            && (-50.0..100.0).contains(&y)));
    }

    #[test]
    fn test_tiled_anchors_are_lazy_and_finite() {
        let mut it = tiled_watermark_anchors(595.0, 842.0, 250.0, 150.0);
        assert_eq!(it.next(), Some((-595.0, -842.0)));
        // columns: ceil(1785 / 250) = 8, rows: ceil(2526 / 150) = 17
        assert_eq!(it.count(), 8 * 17 - 1);
    }

    #[test]
    fn test_tiled_anchors_reject_bad_spacing() {
        assert_eq!(tiled_watermark_anchors(100.0, 100.0, 0.0, 10.0).count(), 0);
        assert_eq!(tiled_watermark_anchors(100.0, 100.0, 10.0, -1.0).count(), 0);
    }

    #[test]
    fn test_place_box_corners() {
        let page = Rect::new(0.0, 0.0, 600.0, 800.0);
        assert_eq!(place_box(page, 150.0, 50.0, Corner::BottomRight, 50.0), (400.0, 50.0));
        assert_eq!(place_box(page, 150.0, 50.0, Corner::TopLeft, 50.0), (50.0, 700.0));
    }

    #[test]
    fn test_place_text_center_bottom() {
        let page = Rect::new(0.0, 0.0, 600.0, 800.0);
        let (x, y) = place_text(
            page,
            100.0,
            VerticalPosition::Bottom,
            HorizontalAlign::Center,
            30.0,
        );
        assert_eq!((x, y), (250.0, 30.0));
        let (x, y) = place_text(
            page,
            100.0,
            VerticalPosition::Top,
            HorizontalAlign::Right,
            30.0,
        );
        assert_eq!((x, y), (470.0, 770.0));
    }

    #[test]
    fn test_fit_within_preserves_aspect() {
        let area = Rect::new(10.0, 10.0, 200.0, 200.0);
        let r = fit_within(400.0, 200.0, area);
        assert_eq!(r, Rect::new(10.0, 60.0, 200.0, 100.0));
        // Small content is scaled up to fill the area
        let r = fit_within(50.0, 20.0, area);
        assert_eq!(r, Rect::new(10.0, 70.0, 200.0, 80.0));
    }
}
