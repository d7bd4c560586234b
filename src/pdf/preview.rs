//! Interactive preview plumbing
//!
//! Renders may be requested faster than they finish. Each request gets a
//! [`RenderTicket`] carrying a [`CancellationToken`]; starting a new request
//! cancels the previous token, and results arriving for a stale ticket are
//! dropped by [`PreviewSession`]. Crop-handle drags go through
//! [`LatestWins`] so only the newest pointer position per frame is applied.
//!
//! Crop margins live in unrotated page space relative to the media box, while
//! a preview shows the crop box turned by the page's `/Rotate` plus any extra
//! rotation. [`displayed_crop_margins`] and [`page_crop_margins`] map between
//! the two.

use crate::error::{Error, Result};
use crate::pdf::document::PageInfo;
use crate::pdf::geometry::{compute_rotated_viewport, crop_rect, margins_to_points, Margins, Rect};
use image::RgbImage;
use parking_lot::Mutex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Smallest crop area a handle drag may leave, in display pixels
pub const MIN_CROP_EXTENT: f64 = 50.0;

/// Shared flag a render checks to see whether it has been superseded
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(RenderCancelled)` once cancelled
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::RenderCancelled)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviewState {
    Idle,
    Rendering,
    Overlaying,
    Ready,
}

/// Handle for one render request
#[derive(Debug, Clone)]
pub struct RenderTicket {
    generation: u64,
    token: CancellationToken,
}

impl RenderTicket {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Render, then overlay, then ready; any new request restarts from rendering.
#[derive(Debug)]
pub struct PreviewSession {
    state: PreviewState,
    generation: u64,
    current: Option<CancellationToken>,
}

impl Default for PreviewSession {
    fn default() -> Self {
        Self::new()
    }
}

impl PreviewSession {
    pub fn new() -> Self {
        Self {
            state: PreviewState::Idle,
            generation: 0,
            current: None,
        }
    }

    pub fn state(&self) -> PreviewState {
        self.state
    }

    /// Start a render, cancelling whatever was in flight.
    pub fn begin_render(&mut self) -> RenderTicket {
        if let Some(previous) = self.current.take() {
            previous.cancel();
        }
        self.generation += 1;
        let token = CancellationToken::new();
        self.current = Some(token.clone());
        self.state = PreviewState::Rendering;
        RenderTicket {
            generation: self.generation,
            token,
        }
    }

    fn is_current(&self, ticket: &RenderTicket) -> bool {
        ticket.generation == self.generation && !ticket.token.is_cancelled()
    }

    /// Accept a finished render. Stale tickets are refused and change nothing.
    pub fn finish_render(&mut self, ticket: &RenderTicket) -> bool {
        if !self.is_current(ticket) || self.state != PreviewState::Rendering {
            tracing::debug!(generation = ticket.generation, "discarding superseded render");
            return false;
        }
        self.state = PreviewState::Overlaying;
        true
    }

    /// Accept a finished overlay pass for the current render.
    pub fn finish_overlay(&mut self, ticket: &RenderTicket) -> bool {
        if !self.is_current(ticket) || self.state != PreviewState::Overlaying {
            return false;
        }
        self.state = PreviewState::Ready;
        self.current = None;
        true
    }

    /// Drop a failed render without touching a newer one.
    pub fn abandon(&mut self, ticket: &RenderTicket) {
        if ticket.generation == self.generation {
            self.current = None;
            self.state = PreviewState::Idle;
        }
    }

    /// Cancel everything and go back to idle.
    pub fn reset(&mut self) {
        if let Some(token) = self.current.take() {
            token.cancel();
        }
        self.state = PreviewState::Idle;
    }
}

/// Single-slot mailbox: a newer value replaces an unconsumed older one.
#[derive(Debug)]
pub struct LatestWins<T> {
    slot: Mutex<Option<T>>,
}

impl<T> Default for LatestWins<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LatestWins<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Store `value`. Returns true if it superseded a pending value.
    pub fn submit(&self, value: T) -> bool {
        self.slot.lock().replace(value).is_some()
    }

    /// Take the newest pending value, if any.
    pub fn take(&self) -> Option<T> {
        self.slot.lock().take()
    }
}

/// Crop edge being dragged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CropHandle {
    Top,
    Right,
    Bottom,
    Left,
}

/// A crop handle moved to `(x, y)`, in pixels from the preview's top-left
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CropHandleMove {
    pub handle: CropHandle,
    pub x: f64,
    pub y: f64,
}

/// Crop margins edited in display pixels over a rendered page
#[derive(Debug, Clone, PartialEq)]
pub struct CropDrag {
    display_width: f64,
    display_height: f64,
    margins: Margins,
}

impl CropDrag {
    pub fn new(display_width: f64, display_height: f64, initial: Margins) -> Self {
        Self {
            display_width,
            display_height,
            margins: initial,
        }
    }

    pub fn margins(&self) -> Margins {
        self.margins
    }

    /// Move `handle` to the pointer at `(x, y)`, in pixels from the top-left.
    ///
    /// Each edge stays inside the canvas and at least [`MIN_CROP_EXTENT`]
    /// away from the opposite edge.
    pub fn drag(&mut self, handle: CropHandle, x: f64, y: f64) {
        let (w, h) = (self.display_width, self.display_height);
        let m = &mut self.margins;
        match handle {
            CropHandle::Top => m.top = y.min(h - m.bottom - MIN_CROP_EXTENT).max(0.0),
            CropHandle::Bottom => m.bottom = (h - y).min(h - m.top - MIN_CROP_EXTENT).max(0.0),
            CropHandle::Left => m.left = x.min(w - m.right - MIN_CROP_EXTENT).max(0.0),
            CropHandle::Right => m.right = (w - x).min(w - m.left - MIN_CROP_EXTENT).max(0.0),
        }
    }

    /// Apply every pending pointer move, newest only.
    pub fn apply_latest(&mut self, moves: &LatestWins<CropHandleMove>) -> bool {
        match moves.take() {
            Some(m) => {
                self.drag(m.handle, m.x, m.y);
                true
            }
            None => false,
        }
    }

    /// Margins in page points for a page `page_width` points wide.
    pub fn to_points(&self, page_width: f64) -> Result<Margins> {
        if self.display_width <= 0.0 {
            return Err(Error::validation("preview has no width"));
        }
        margins_to_points(self.margins, page_width / self.display_width)
    }
}

/// Margins of `target` inside the visible `crop_box`, as seen once the page is
/// turned `rotation` degrees clockwise. Parts of `target` beyond the visible
/// area count as zero.
pub fn displayed_crop_margins(crop_box: Rect, target: Rect, rotation: i64) -> Margins {
    Margins {
        top: (crop_box.top() - target.top()).max(0.0),
        right: (crop_box.right() - target.right()).max(0.0),
        bottom: (target.bottom - crop_box.bottom).max(0.0),
        left: (target.left - crop_box.left).max(0.0),
    }
    .rotated(rotation)
}

/// Margins measured on a preview turned `rotation` degrees, mapped back to
/// unrotated page space and measured from the media box edges.
pub fn page_crop_margins(media: Rect, crop_box: Rect, displayed: Margins, rotation: i64) -> Margins {
    let m = displayed.rotated(-rotation);
    Margins {
        top: m.top + (media.top() - crop_box.top()),
        right: m.right + (media.right() - crop_box.right()),
        bottom: m.bottom + (crop_box.bottom - media.bottom),
        left: m.left + (crop_box.left - media.left),
    }
}

/// Shade the area of a rendered page that `margins` would crop away.
///
/// `image` shows the page's crop box turned by its `/Rotate` plus
/// `extra_rotation`. The newest pending handle move in `moves` is applied
/// first; `own_move` is used only when nothing is pending. Returns the
/// resulting margins in whole points, media box relative, ready for the crop
/// operation.
pub fn overlay_crop(
    image: &mut RgbImage,
    page: &PageInfo,
    extra_rotation: i64,
    margins: Margins,
    own_move: Option<CropHandleMove>,
    moves: &LatestWins<CropHandleMove>,
) -> Result<Margins> {
    let rotation = i64::from(page.rotation) + extra_rotation;
    let target = crop_rect(page.media_box, margins)?;
    let shown = compute_rotated_viewport(page.crop_box.width, page.crop_box.height, rotation, 1.0);
    let (w, h) = image.dimensions();
    if shown.width <= 0.0 || w == 0 {
        return Err(Error::validation("page has no visible area"));
    }
    let pixels_per_point = w as f64 / shown.width;
    let initial = displayed_crop_margins(page.crop_box, target, rotation).scaled(pixels_per_point);
    let mut drag = CropDrag::new(w as f64, h as f64, initial);
    if !drag.apply_latest(moves) {
        if let Some(m) = own_move {
            drag.drag(m.handle, m.x, m.y);
        }
    }
    shade_outside_crop(image, &drag.margins());
    let displayed = drag.to_points(shown.width)?;
    Ok(page_crop_margins(page.media_box, page.crop_box, displayed, rotation))
}

/// Darken everything outside the crop area to half brightness.
pub fn shade_outside_crop(image: &mut RgbImage, margins: &Margins) {
    let (w, h) = image.dimensions();
    let left = margins.left.max(0.0).round() as u32;
    let top = margins.top.max(0.0).round() as u32;
    let right = w.saturating_sub(margins.right.max(0.0).round() as u32);
    let bottom = h.saturating_sub(margins.bottom.max(0.0).round() as u32);
    for (x, y, px) in image.enumerate_pixels_mut() {
        let inside = x >= left && x < right && y >= top && y < bottom;
        if !inside {
            for c in px.0.iter_mut() {
                *c /= 2;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_new_render_supersedes_old() {
        let mut session = PreviewSession::new();
        let first = session.begin_render();
        let second = session.begin_render();
        assert!(first.token().is_cancelled());
        assert!(matches!(first.token().check(), Err(Error::RenderCancelled)));

        assert!(!session.finish_render(&first));
        assert_eq!(session.state(), PreviewState::Rendering);

        assert!(session.finish_render(&second));
        assert_eq!(session.state(), PreviewState::Overlaying);
        assert!(session.finish_overlay(&second));
        assert_eq!(session.state(), PreviewState::Ready);
    }

    #[test]
    fn test_overlay_for_stale_ticket_is_ignored() {
        let mut session = PreviewSession::new();
        let first = session.begin_render();
        assert!(session.finish_render(&first));
        let _second = session.begin_render();
        assert!(!session.finish_overlay(&first));
        assert_eq!(session.state(), PreviewState::Rendering);
    }

    #[test]
    fn test_abandon_only_affects_current() {
        let mut session = PreviewSession::new();
        let first = session.begin_render();
        let second = session.begin_render();
        session.abandon(&first);
        assert_eq!(session.state(), PreviewState::Rendering);
        session.abandon(&second);
        assert_eq!(session.state(), PreviewState::Idle);
    }

    #[test]
    fn test_latest_wins() {
        let slot = LatestWins::new();
        assert!(!slot.submit(1));
        assert!(slot.submit(2));
        assert!(slot.submit(3));
        assert_eq!(slot.take(), Some(3));
        assert_eq!(slot.take(), None);
    }

    #[test]
    fn test_crop_drag_clamps() {
        let mut drag = CropDrag::new(400.0, 600.0, Margins::uniform(20.0));
        drag.drag(CropHandle::Top, 0.0, 590.0);
        // Bottom margin 20, minimum extent 50
        assert_eq!(drag.margins().top, 530.0);
        drag.drag(CropHandle::Top, 0.0, -15.0);
        assert_eq!(drag.margins().top, 0.0);
        drag.drag(CropHandle::Right, 10.0, 0.0);
        assert_eq!(drag.margins().right, 330.0);
        drag.drag(CropHandle::Bottom, 0.0, 700.0);
        assert_eq!(drag.margins().bottom, 0.0);
    }

    #[test]
    fn test_crop_drag_coalesces_moves() {
        let mut drag = CropDrag::new(400.0, 600.0, Margins::default());
        let moves = LatestWins::new();
        moves.submit(CropHandleMove {
            handle: CropHandle::Left,
            x: 10.0,
            y: 0.0,
        });
        moves.submit(CropHandleMove {
            handle: CropHandle::Left,
            x: 40.0,
            y: 0.0,
        });
        assert!(drag.apply_latest(&moves));
        assert_eq!(drag.margins().left, 40.0);
        assert!(!drag.apply_latest(&moves));
    }

    #[test]
    fn test_crop_drag_to_points() {
        let drag = CropDrag::new(
            300.0,
            400.0,
            Margins {
                top: 10.0,
                right: 15.0,
                bottom: 0.0,
                left: 33.0,
            },
        );
        let points = drag.to_points(600.0).unwrap();
        assert_eq!(
            points,
            Margins {
                top: 20.0,
                right: 30.0,
                bottom: 0.0,
                left: 66.0
            }
        );
    }

    #[test]
    fn test_displayed_margins_follow_quarter_turn() {
        // Portrait page with a cropped band on the left and top
        let media = Rect::new(0.0, 0.0, 600.0, 800.0);
        let target = Rect::new(50.0, 0.0, 550.0, 780.0);
        let shown = displayed_crop_margins(media, target, 0);
        assert_eq!(
            shown,
            Margins {
                top: 20.0,
                right: 0.0,
                bottom: 0.0,
                left: 50.0
            }
        );
        // Turned clockwise the left band ends up on top, the top band on the right
        let turned = displayed_crop_margins(media, target, 90);
        assert_eq!(
            turned,
            Margins {
                top: 50.0,
                right: 20.0,
                bottom: 0.0,
                left: 0.0
            }
        );
        assert_eq!(page_crop_margins(media, media, turned, 90), shown);
    }

    #[test]
    fn test_displayed_margins_measure_from_visible_crop_box() {
        let media = Rect::new(0.0, 0.0, 600.0, 800.0);
        let crop_box = Rect::new(100.0, 100.0, 400.0, 600.0);
        let target = Rect::new(150.0, 100.0, 350.0, 500.0);
        let shown = displayed_crop_margins(crop_box, target, 0);
        assert_eq!(
            shown,
            Margins {
                top: 100.0,
                right: 0.0,
                bottom: 0.0,
                left: 50.0
            }
        );
        assert_eq!(
            page_crop_margins(media, crop_box, shown, 0),
            Margins {
                top: 200.0,
                right: 100.0,
                bottom: 100.0,
                left: 150.0
            }
        );
        // A target larger than the visible area shades nothing
        assert_eq!(displayed_crop_margins(crop_box, media, 270), Margins::default());
    }

    fn quarter_turned_page() -> PageInfo {
        let media = Rect::new(0.0, 0.0, 600.0, 800.0);
        PageInfo {
            width: 600.0,
            height: 800.0,
            rotation: 90,
            media_box: media,
            crop_box: media,
        }
    }

    fn left_band() -> Margins {
        Margins {
            left: 50.0,
            ..Margins::default()
        }
    }

    #[test]
    fn test_overlay_crop_on_rotated_page() {
        // 800x600 points on screen at half scale
        let mut img = RgbImage::from_pixel(400, 300, image::Rgb([200, 200, 200]));
        let page = quarter_turned_page();
        let moves = LatestWins::new();
        let result = overlay_crop(&mut img, &page, 0, left_band(), None, &moves).unwrap();

        // The page's left edge is on top after a clockwise quarter turn
        assert_eq!(img.get_pixel(200, 10).0, [100, 100, 100]);
        assert_eq!(img.get_pixel(200, 30).0, [200, 200, 200]);
        assert_eq!(img.get_pixel(5, 150).0, [200, 200, 200]);
        assert_eq!(result, left_band());
    }

    #[test]
    fn test_overlay_crop_adds_extra_rotation() {
        // /Rotate 90 plus 90 more shows the left band on the right
        let mut img = RgbImage::from_pixel(300, 400, image::Rgb([200, 200, 200]));
        let page = quarter_turned_page();
        let result = overlay_crop(&mut img, &page, 90, left_band(), None, &LatestWins::new()).unwrap();
        assert_eq!(img.get_pixel(290, 200).0, [100, 100, 100]);
        assert_eq!(img.get_pixel(10, 200).0, [200, 200, 200]);
        assert_eq!(img.get_pixel(150, 5).0, [200, 200, 200]);
        assert_eq!(result, left_band());
    }

    #[test]
    fn test_overlay_crop_applies_handle_moves() {
        let page = quarter_turned_page();
        let own = CropHandleMove {
            handle: CropHandle::Top,
            x: 0.0,
            y: 40.0,
        };

        let mut img = RgbImage::from_pixel(400, 300, image::Rgb([200, 200, 200]));
        let result = overlay_crop(&mut img, &page, 0, left_band(), Some(own), &LatestWins::new()).unwrap();
        assert_eq!(result.left, 80.0);

        // A newer pending move wins over the request's own
        let moves = LatestWins::new();
        moves.submit(CropHandleMove {
            handle: CropHandle::Right,
            x: 380.0,
            y: 0.0,
        });
        let mut img = RgbImage::from_pixel(400, 300, image::Rgb([200, 200, 200]));
        let result = overlay_crop(&mut img, &page, 0, left_band(), Some(own), &moves).unwrap();
        assert_eq!(
            result,
            Margins {
                top: 40.0,
                right: 0.0,
                bottom: 0.0,
                left: 50.0
            }
        );
        assert_eq!(moves.take(), None);
    }

    #[test]
    fn test_shade_outside_crop() {
        let mut img = RgbImage::from_pixel(4, 4, image::Rgb([200, 200, 200]));
        shade_outside_crop(&mut img, &Margins::uniform(1.0));
        assert_eq!(img.get_pixel(0, 0).0, [100, 100, 100]);
        assert_eq!(img.get_pixel(1, 1).0, [200, 200, 200]);
        assert_eq!(img.get_pixel(3, 2).0, [100, 100, 100]);
    }
}
