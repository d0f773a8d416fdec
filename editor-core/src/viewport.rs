//! View transform between screen pixels and image-percent coordinates.

use serde::{Deserialize, Serialize};

/// Pan/zoom state of the canvas view.
///
/// The base image is drawn at `(offset_x, offset_y)` with a size of
/// `display_width * zoom` by `display_height * zoom` screen pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Pan offset X in screen pixels.
    pub offset_x: f32,
    /// Pan offset Y in screen pixels.
    pub offset_y: f32,
    /// Zoom level (1.0 = 100%).
    pub zoom: f32,
    /// Fitted width of the image at zoom 1.0.
    pub display_width: f32,
    /// Fitted height of the image at zoom 1.0.
    pub display_height: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(800.0, 600.0)
    }
}

impl Viewport {
    /// Smallest allowed zoom.
    pub const MIN_ZOOM: f32 = 0.1;
    /// Largest allowed zoom.
    pub const MAX_ZOOM: f32 = 8.0;

    /// Create a viewport for an image displayed at the given size.
    #[must_use]
    pub fn new(display_width: f32, display_height: f32) -> Self {
        Self {
            offset_x: 0.0,
            offset_y: 0.0,
            zoom: 1.0,
            display_width: display_width.max(1.0),
            display_height: display_height.max(1.0),
        }
    }

    /// Set the fitted display size of the image.
    pub fn set_display_size(&mut self, width: f32, height: f32) {
        self.display_width = width.max(1.0);
        self.display_height = height.max(1.0);
    }

    /// Set the zoom level, clamped to the supported range.
    pub fn set_zoom(&mut self, zoom: f32) {
        self.zoom = zoom.clamp(Self::MIN_ZOOM, Self::MAX_ZOOM);
    }

    /// Set the pan offset.
    pub fn set_offset(&mut self, x: f32, y: f32) {
        self.offset_x = x;
        self.offset_y = y;
    }

    /// Restore offset and zoom to their defaults.
    pub fn reset(&mut self) {
        self.offset_x = 0.0;
        self.offset_y = 0.0;
        self.zoom = 1.0;
    }

    /// Convert a screen position to image-percent coordinates (not clamped).
    #[must_use]
    pub fn to_image_percent(&self, x: f32, y: f32) -> (f32, f32) {
        let px = (x - self.offset_x) / (self.display_width * self.zoom) * 100.0;
        let py = (y - self.offset_y) / (self.display_height * self.zoom) * 100.0;
        (px, py)
    }

    /// Convert a screen-space delta to an image-percent delta.
    #[must_use]
    pub fn delta_to_percent(&self, dx: f32, dy: f32) -> (f32, f32) {
        (
            dx / (self.display_width * self.zoom) * 100.0,
            dy / (self.display_height * self.zoom) * 100.0,
        )
    }
}
