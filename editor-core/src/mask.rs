//! Freehand mask surface.
//!
//! The mask is its own addressable surface, separate from the base image.
//! Each stroke records the blend mode it was drawn with, so the surface can be
//! replayed onto any backend: `Paint` adds coverage, `Erase` cuts it out
//! (destination-out).

use serde::{Deserialize, Serialize};

use crate::frame::FrameSize;

/// How a stroke composites onto the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    /// Source-over: add coverage.
    Paint,
    /// Destination-out: remove coverage.
    Erase,
}

/// A point in image-percent coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaskPoint {
    /// X in percent of image width.
    pub x: f32,
    /// Y in percent of image height.
    pub y: f32,
}

/// One continuous stroke.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    /// Composite operation.
    pub blend: BlendMode,
    /// Brush diameter in percent of image width.
    pub brush_size: f32,
    /// Path points, in drawing order.
    pub points: Vec<MaskPoint>,
}

/// Overlay surface holding mask strokes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaskSurface {
    strokes: Vec<Stroke>,
    /// Index of the stroke being drawn, if a gesture is in progress.
    #[serde(skip)]
    active: Option<usize>,
}

impl MaskSurface {
    /// Create an empty surface.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a stroke at `(x, y)`.
    pub fn begin_stroke(&mut self, blend: BlendMode, brush_size: f32, x: f32, y: f32) {
        self.strokes.push(Stroke {
            blend,
            brush_size: brush_size.max(0.0),
            points: vec![MaskPoint { x, y }],
        });
        self.active = Some(self.strokes.len() - 1);
    }

    /// Extend the active stroke. No-op when no stroke is active.
    pub fn extend_stroke(&mut self, x: f32, y: f32) {
        if let Some(stroke) = self.active.and_then(|i| self.strokes.get_mut(i)) {
            stroke.points.push(MaskPoint { x, y });
        }
    }

    /// Finish the active stroke.
    pub fn end_stroke(&mut self) {
        self.active = None;
    }

    /// Whether a stroke is being drawn.
    #[must_use]
    pub fn is_drawing(&self) -> bool {
        self.active.is_some()
    }

    /// Remove every stroke.
    pub fn clear(&mut self) {
        self.strokes.clear();
        self.active = None;
    }

    /// Whether any stroke adds coverage.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.strokes.iter().any(|s| s.blend == BlendMode::Paint)
    }

    /// All strokes, in drawing order.
    #[must_use]
    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    /// Rasterize the surface into a single-channel coverage buffer
    /// (row-major, `width * height` bytes, 255 = masked).
    #[must_use]
    pub fn rasterize(&self, size: FrameSize) -> Vec<u8> {
        let width = size.width as usize;
        let height = size.height as usize;
        let mut buf = vec![0u8; width * height];
        if width == 0 || height == 0 {
            return buf;
        }

        let to_px = |p: MaskPoint| {
            (
                p.x / 100.0 * size.width as f32,
                p.y / 100.0 * size.height as f32,
            )
        };

        for stroke in &self.strokes {
            let value = match stroke.blend {
                BlendMode::Paint => 255,
                BlendMode::Erase => 0,
            };
            let radius = (stroke.brush_size / 100.0 * size.width as f32 / 2.0).max(0.5);
            let step = (radius / 2.0).max(0.5);

            let mut points = stroke.points.iter().copied().map(to_px);
            let Some(mut prev) = points.next() else {
                continue;
            };
            stamp(&mut buf, width, height, prev, radius, value);
            for next in points {
                let (dx, dy) = (next.0 - prev.0, next.1 - prev.1);
                let len = (dx * dx + dy * dy).sqrt();
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let steps = (len / step).ceil().max(1.0) as usize;
                for i in 1..=steps {
                    let t = i as f32 / steps as f32;
                    stamp(
                        &mut buf,
                        width,
                        height,
                        (prev.0 + dx * t, prev.1 + dy * t),
                        radius,
                        value,
                    );
                }
                prev = next;
            }
        }
        buf
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn stamp(buf: &mut [u8], width: usize, height: usize, center: (f32, f32), radius: f32, value: u8) {
    let (cx, cy) = center;
    let min_x = (cx - radius).floor().max(0.0) as usize;
    let min_y = (cy - radius).floor().max(0.0) as usize;
    let max_x = ((cx + radius).ceil().max(0.0) as usize).min(width);
    let max_y = ((cy + radius).ceil().max(0.0) as usize).min(height);
    let r2 = radius * radius;

    for y in min_y..max_y {
        for x in min_x..max_x {
            let px = x as f32 + 0.5 - cx;
            let py = y as f32 + 0.5 - cy;
            if px * px + py * py <= r2 {
                buf[y * width + x] = value;
            }
        }
    }
}
