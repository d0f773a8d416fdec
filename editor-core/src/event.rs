//! Pointer input events for canvas interaction.

use serde::{Deserialize, Serialize};

use crate::crop::CropHandle;
use crate::text::TextLayerId;

/// Phase of a pointer event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointerPhase {
    /// Button pressed / finger down.
    Down,
    /// Pointer moved.
    Move,
    /// Button released / finger up.
    Up,
    /// Gesture cancelled by the platform (e.g., palm rejection, focus loss).
    Cancel,
}

/// What the pointer was over when the event fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum PointerTarget {
    /// The drawing surface itself.
    Canvas,
    /// A text layer overlay.
    TextLayer(TextLayerId),
    /// A crop box handle.
    CropHandle(CropHandle),
    /// Somewhere outside the drawing surface (global listener).
    Outside,
}

/// A pointer (mouse, pen or touch) event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointerEvent {
    /// Phase of this event.
    pub phase: PointerPhase,
    /// X position in screen pixels relative to the canvas origin.
    pub x: f32,
    /// Y position in screen pixels relative to the canvas origin.
    pub y: f32,
    /// Timestamp in milliseconds since session start.
    pub timestamp_ms: u64,
    /// Hit-test result supplied by the presentation layer.
    pub target: PointerTarget,
}

impl PointerEvent {
    /// Create a new pointer event over the canvas.
    #[must_use]
    pub fn new(phase: PointerPhase, x: f32, y: f32, timestamp_ms: u64) -> Self {
        Self {
            phase,
            x,
            y,
            timestamp_ms,
            target: PointerTarget::Canvas,
        }
    }

    /// Pointer-down event.
    #[must_use]
    pub fn down(x: f32, y: f32, timestamp_ms: u64) -> Self {
        Self::new(PointerPhase::Down, x, y, timestamp_ms)
    }

    /// Pointer-move event.
    #[must_use]
    pub fn moved(x: f32, y: f32, timestamp_ms: u64) -> Self {
        Self::new(PointerPhase::Move, x, y, timestamp_ms)
    }

    /// Pointer-up event.
    #[must_use]
    pub fn up(x: f32, y: f32, timestamp_ms: u64) -> Self {
        Self::new(PointerPhase::Up, x, y, timestamp_ms)
    }

    /// Set the hit-test target.
    #[must_use]
    pub fn on(mut self, target: PointerTarget) -> Self {
        self.target = target;
        self
    }
}
