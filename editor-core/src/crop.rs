//! Crop box geometry.
//!
//! All values are percentages of the image bounds. Every operation keeps the
//! box inside `[0, 100]` on both axes and no smaller than the minimum size;
//! out-of-range input is clamped, never rejected.

use serde::{Deserialize, Serialize};

use crate::frame::FrameSize;

/// Default minimum crop width/height in percent.
pub const MIN_CROP_SIZE: f32 = 5.0;

const BOUND: f32 = 100.0;

/// A draggable part of the crop box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CropHandle {
    /// Top-left corner.
    TopLeft,
    /// Top-right corner.
    TopRight,
    /// Bottom-left corner.
    BottomLeft,
    /// Bottom-right corner.
    BottomRight,
    /// The box interior; moves without resizing.
    Body,
}

impl CropHandle {
    /// `(grows_left, grows_up)` for corner handles.
    const fn directions(self) -> Option<(bool, bool)> {
        match self {
            Self::TopLeft => Some((true, true)),
            Self::TopRight => Some((false, true)),
            Self::BottomLeft => Some((true, false)),
            Self::BottomRight => Some((false, false)),
            Self::Body => None,
        }
    }
}

/// A crop region in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRect {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width.
    pub width: u32,
    /// Height.
    pub height: u32,
}

/// Transient crop selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropBox {
    /// Left edge in percent.
    pub x: f32,
    /// Top edge in percent.
    pub y: f32,
    /// Width in percent.
    pub w: f32,
    /// Height in percent.
    pub h: f32,
    locked_ratio: Option<f32>,
    min_size: f32,
}

impl Default for CropBox {
    fn default() -> Self {
        Self::full()
    }
}

impl CropBox {
    /// Create a box, clamping it into the image bounds.
    #[must_use]
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self::full().with_rect(x, y, w, h)
    }

    /// A box covering the whole image.
    #[must_use]
    pub fn full() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            w: BOUND,
            h: BOUND,
            locked_ratio: None,
            min_size: MIN_CROP_SIZE,
        }
    }

    /// Use a different minimum size (clamped to `1..=100`).
    #[must_use]
    pub fn with_min_size(mut self, min_size: f32) -> Self {
        self.min_size = finite_or(min_size, MIN_CROP_SIZE).clamp(1.0, BOUND);
        let (x, y, w, h) = (self.x, self.y, self.w, self.h);
        self.with_rect(x, y, w, h)
    }

    /// Replace the rectangle, keeping ratio lock and minimum size.
    #[must_use]
    pub fn with_rect(mut self, x: f32, y: f32, w: f32, h: f32) -> Self {
        self.w = finite_or(w, BOUND).clamp(self.min_size, BOUND);
        self.h = finite_or(h, BOUND).clamp(self.min_size, BOUND);
        self.x = finite_or(x, 0.0).clamp(0.0, BOUND - self.w);
        self.y = finite_or(y, 0.0).clamp(0.0, BOUND - self.h);
        if let Some(ratio) = self.locked_ratio {
            self.apply_ratio(ratio);
        }
        self
    }

    /// The locked width/height ratio, if any.
    #[must_use]
    pub const fn locked_ratio(&self) -> Option<f32> {
        self.locked_ratio
    }

    /// Minimum width/height in percent.
    #[must_use]
    pub const fn min_size(&self) -> f32 {
        self.min_size
    }

    /// Lock (`Some`) or unlock (`None`) the aspect ratio.
    ///
    /// Locking re-derives the height from the width immediately. Ratios are
    /// clamped so that a box satisfying both the ratio and the minimum size
    /// always fits inside the image.
    pub fn lock_ratio(&mut self, ratio: Option<f32>) {
        match ratio {
            Some(r) if r.is_finite() && r > 0.0 => {
                let r = r.clamp(self.min_size / BOUND, BOUND / self.min_size);
                self.locked_ratio = Some(r);
                self.apply_ratio(r);
            }
            Some(r) => {
                tracing::debug!(ratio = r, "Ignoring invalid crop ratio");
            }
            None => self.locked_ratio = None,
        }
    }

    fn apply_ratio(&mut self, r: f32) {
        let lo = self.min_size.max(self.min_size * r);
        let mut hi = (BOUND - self.x).min((BOUND - self.y) * r);
        if lo > hi {
            // No room from the current origin; grow from the top-left instead.
            self.x = 0.0;
            self.y = 0.0;
            hi = BOUND.min(BOUND * r);
        }
        self.w = self.w.clamp(lo, hi);
        self.h = (self.w / r).min(BOUND - self.y);
    }

    /// Result of dragging `handle` by `(dx, dy)` percent from this box.
    ///
    /// Corner handles resize with the opposite corner anchored. With a locked
    /// ratio the height follows the width.
    #[must_use]
    pub fn resized(&self, handle: CropHandle, dx: f32, dy: f32) -> Self {
        let dx = finite_or(dx, 0.0);
        let dy = finite_or(dy, 0.0);
        let mut next = *self;

        let Some((grows_left, grows_up)) = handle.directions() else {
            next.x = (self.x + dx).clamp(0.0, BOUND - self.w);
            next.y = (self.y + dy).clamp(0.0, BOUND - self.h);
            return next;
        };

        let anchor_x = if grows_left { self.x + self.w } else { self.x };
        let anchor_y = if grows_up { self.y + self.h } else { self.y };
        let max_w = if grows_left { anchor_x } else { BOUND - anchor_x };
        let max_h = if grows_up { anchor_y } else { BOUND - anchor_y };
        let raw_w = if grows_left { self.w - dx } else { self.w + dx };
        let raw_h = if grows_up { self.h - dy } else { self.h + dy };

        let (w, h) = self.fit(raw_w, raw_h, max_w, max_h);
        next.w = w;
        next.h = h;
        next.x = if grows_left { (anchor_x - w).max(0.0) } else { anchor_x };
        next.y = if grows_up { (anchor_y - h).max(0.0) } else { anchor_y };
        next
    }

    fn fit(&self, raw_w: f32, raw_h: f32, max_w: f32, max_h: f32) -> (f32, f32) {
        let min_w = self.min_size.min(max_w);
        let min_h = self.min_size.min(max_h);
        match self.locked_ratio {
            None => (raw_w.clamp(min_w, max_w), raw_h.clamp(min_h, max_h)),
            Some(r) => {
                let lo = min_w.max(min_h * r);
                let hi = max_w.min(max_h * r);
                // Bounds win over the minimum if both cannot hold.
                let w = if lo <= hi { raw_w.clamp(lo, hi) } else { hi };
                (w, (w / r).min(max_h))
            }
        }
    }

    /// Convert to a pixel rectangle against the image's natural size.
    #[must_use]
    pub fn to_pixel_rect(&self, size: FrameSize) -> PixelRect {
        let scale = |pct: f32, dim: u32| -> u32 {
            let v = (f64::from(pct) / 100.0 * f64::from(dim)).round();
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let v = v.max(0.0) as u32;
            v
        };
        let width_px = size.width.max(1);
        let height_px = size.height.max(1);

        let x = scale(self.x, width_px).min(width_px - 1);
        let y = scale(self.y, height_px).min(height_px - 1);
        let width = scale(self.w, width_px).clamp(1, width_px - x);
        let height = scale(self.h, height_px).clamp(1, height_px - y);
        PixelRect {
            x,
            y,
            width,
            height,
        }
    }

    /// Whether the box satisfies the bounds and minimum size (with tolerance).
    #[must_use]
    pub fn is_within_bounds(&self) -> bool {
        const EPS: f32 = 1e-3;
        self.x >= -EPS
            && self.y >= -EPS
            && self.x + self.w <= BOUND + EPS
            && self.y + self.h <= BOUND + EPS
            && self.w >= self.min_size - EPS
            && self.h >= self.min_size - EPS
    }
}

fn finite_or(v: f32, fallback: f32) -> f32 {
    if v.is_finite() {
        v
    } else {
        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn test_new_clamps_into_bounds() {
        let b = CropBox::new(-10.0, 90.0, 150.0, 30.0);
        assert!(approx(b.x, 0.0));
        assert!(approx(b.w, 100.0));
        assert!(approx(b.h, 30.0));
        assert!(approx(b.y, 70.0));
        assert!(b.is_within_bounds());
    }

    #[test]
    fn test_new_enforces_min_size() {
        let b = CropBox::new(50.0, 50.0, 1.0, 0.0);
        assert!(approx(b.w, MIN_CROP_SIZE));
        assert!(approx(b.h, MIN_CROP_SIZE));
    }

    #[test]
    fn test_bottom_right_grows_and_clamps() {
        let b = CropBox::new(10.0, 10.0, 50.0, 50.0);
        let r = b.resized(CropHandle::BottomRight, 20.0, 5.0);
        assert!(approx(r.w, 70.0));
        assert!(approx(r.h, 55.0));

        let r = b.resized(CropHandle::BottomRight, 1_000.0, 1_000.0);
        assert!(approx(r.x, 10.0));
        assert!(approx(r.w, 90.0));
        assert!(approx(r.h, 90.0));
    }

    #[test]
    fn test_top_left_keeps_opposite_corner() {
        let b = CropBox::new(20.0, 20.0, 50.0, 50.0);
        let r = b.resized(CropHandle::TopLeft, -500.0, 10.0);
        assert!(approx(r.x, 0.0));
        assert!(approx(r.x + r.w, 70.0));
        assert!(approx(r.y, 30.0));
        assert!(approx(r.y + r.h, 70.0));
    }

    #[test]
    fn test_shrink_stops_at_min_size() {
        let b = CropBox::new(20.0, 20.0, 50.0, 50.0);
        let r = b.resized(CropHandle::TopRight, -1_000.0, 1_000.0);
        assert!(approx(r.w, MIN_CROP_SIZE));
        assert!(approx(r.h, MIN_CROP_SIZE));
        // Bottom-left corner anchored.
        assert!(approx(r.x, 20.0));
        assert!(approx(r.y + r.h, 70.0));
    }

    #[test]
    fn test_body_moves_without_resizing() {
        let b = CropBox::new(10.0, 10.0, 30.0, 40.0);
        let r = b.resized(CropHandle::Body, 200.0, -200.0);
        assert!(approx(r.w, 30.0));
        assert!(approx(r.h, 40.0));
        assert!(approx(r.x, 70.0));
        assert!(approx(r.y, 0.0));
    }

    #[test]
    fn test_ratio_lock_derives_height() {
        let mut b = CropBox::new(0.0, 0.0, 60.0, 20.0);
        b.lock_ratio(Some(2.0));
        assert!(approx(b.h, 30.0));

        let r = b.resized(CropHandle::BottomRight, 10.0, -40.0);
        assert!(approx(r.w, 70.0));
        assert!(approx(r.h, 35.0));
    }

    #[test]
    fn test_ratio_lock_reclamps_at_boundary() {
        let mut b = CropBox::new(0.0, 50.0, 20.0, 20.0);
        b.lock_ratio(Some(1.0));
        let r = b.resized(CropHandle::BottomRight, 90.0, 0.0);
        // Height is limited to 50, so width is too.
        assert!(approx(r.h, 50.0));
        assert!(approx(r.w, 50.0));
        assert!(r.is_within_bounds());
    }

    #[test]
    fn test_invalid_ratio_is_ignored() {
        let mut b = CropBox::new(0.0, 0.0, 50.0, 50.0);
        b.lock_ratio(Some(f32::NAN));
        assert!(b.locked_ratio().is_none());
        b.lock_ratio(Some(-1.0));
        assert!(b.locked_ratio().is_none());
    }

    #[test]
    fn test_unlock_ratio() {
        let mut b = CropBox::new(0.0, 0.0, 50.0, 50.0);
        b.lock_ratio(Some(1.5));
        b.lock_ratio(None);
        let r = b.resized(CropHandle::BottomRight, 0.0, 30.0);
        assert!(approx(r.w, 50.0));
        assert!(approx(r.h, b.h + 30.0));
    }

    #[test]
    fn test_non_finite_delta_is_noop() {
        let b = CropBox::new(10.0, 10.0, 50.0, 50.0);
        let r = b.resized(CropHandle::BottomRight, f32::NAN, f32::INFINITY);
        assert_eq!(r, b);
    }

    #[test]
    fn test_pixel_rect_uses_natural_size() {
        let b = CropBox::new(10.0, 10.0, 50.0, 50.0);
        let rect = b.to_pixel_rect(FrameSize::new(800, 600));
        assert_eq!(
            rect,
            PixelRect {
                x: 80,
                y: 60,
                width: 400,
                height: 300
            }
        );
    }

    #[test]
    fn test_pixel_rect_never_exceeds_image() {
        let b = CropBox::new(95.0, 95.0, 5.0, 5.0);
        let rect = b.to_pixel_rect(FrameSize::new(3, 3));
        assert!(rect.x + rect.width <= 3);
        assert!(rect.y + rect.height <= 3);
        assert!(rect.width >= 1 && rect.height >= 1);
    }
}
