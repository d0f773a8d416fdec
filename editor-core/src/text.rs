//! Text overlay layers.
//!
//! Text layers are metadata drawn over the base image. They do not create
//! history entries until they are flattened into a new frame.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EditorError, EditorResult};

/// Default window, in milliseconds, for two presses to count as a double click.
pub const DOUBLE_CLICK_WINDOW_MS: u64 = 300;

/// Unique identifier for a text layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextLayerId(Uuid);

impl TextLayerId {
    /// Create a new unique layer ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TextLayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TextLayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A text overlay positioned in image-percent coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextLayer {
    /// Unique identifier.
    pub id: TextLayerId,
    /// Text content.
    pub text: String,
    /// Anchor X in percent of image width (0-100).
    pub x: f32,
    /// Anchor Y in percent of image height (0-100).
    pub y: f32,
    /// Font size in pixels at the image's natural size.
    pub font_size: f32,
    /// Text color as hex.
    pub color: String,
}

impl TextLayer {
    /// Create a layer centered on the image.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: TextLayerId::new(),
            text: text.into(),
            x: 50.0,
            y: 50.0,
            font_size: 32.0,
            color: "#ffffff".to_string(),
        }
    }

    /// Set the position, clamped to the image bounds.
    #[must_use]
    pub fn at(mut self, x: f32, y: f32) -> Self {
        self.move_to(x, y);
        self
    }

    /// Set the font size.
    #[must_use]
    pub fn with_font_size(mut self, font_size: f32) -> Self {
        self.font_size = font_size.max(1.0);
        self
    }

    /// Set the color.
    #[must_use]
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    /// Move the anchor, clamped to `[0, 100]`.
    pub fn move_to(&mut self, x: f32, y: f32) {
        self.x = clamp_percent(x);
        self.y = clamp_percent(y);
    }
}

fn clamp_percent(v: f32) -> f32 {
    if v.is_finite() {
        v.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

/// Partial update for a text layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextLayerUpdate {
    /// New content.
    pub text: Option<String>,
    /// New font size.
    pub font_size: Option<f32>,
    /// New color.
    pub color: Option<String>,
}

/// Ordered collection of text layers (later layers draw on top).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TextLayers {
    layers: Vec<TextLayer>,
}

impl TextLayers {
    /// Create an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a layer on top and return its ID.
    pub fn add(&mut self, layer: TextLayer) -> TextLayerId {
        let id = layer.id;
        self.layers.push(layer);
        id
    }

    /// Get a layer by ID.
    #[must_use]
    pub fn get(&self, id: TextLayerId) -> Option<&TextLayer> {
        self.layers.iter().find(|l| l.id == id)
    }

    /// Get a mutable layer by ID.
    pub fn get_mut(&mut self, id: TextLayerId) -> Option<&mut TextLayer> {
        self.layers.iter_mut().find(|l| l.id == id)
    }

    /// Apply a partial update.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::TextLayerNotFound`] if no layer has this ID.
    pub fn update(&mut self, id: TextLayerId, update: TextLayerUpdate) -> EditorResult<()> {
        let layer = self
            .get_mut(id)
            .ok_or(EditorError::TextLayerNotFound(id))?;
        if let Some(text) = update.text {
            layer.text = text;
        }
        if let Some(size) = update.font_size {
            layer.font_size = size.max(1.0);
        }
        if let Some(color) = update.color {
            layer.color = color;
        }
        Ok(())
    }

    /// Move a layer.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::TextLayerNotFound`] if no layer has this ID.
    pub fn move_layer(&mut self, id: TextLayerId, x: f32, y: f32) -> EditorResult<()> {
        self.get_mut(id)
            .ok_or(EditorError::TextLayerNotFound(id))?
            .move_to(x, y);
        Ok(())
    }

    /// Remove a layer.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::TextLayerNotFound`] if no layer has this ID.
    pub fn remove(&mut self, id: TextLayerId) -> EditorResult<TextLayer> {
        let index = self
            .layers
            .iter()
            .position(|l| l.id == id)
            .ok_or(EditorError::TextLayerNotFound(id))?;
        Ok(self.layers.remove(index))
    }

    /// Remove every layer.
    pub fn clear(&mut self) {
        self.layers.clear();
    }

    /// All layers, bottom first.
    pub fn iter(&self) -> impl Iterator<Item = &TextLayer> {
        self.layers.iter()
    }

    /// All layers as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[TextLayer] {
        &self.layers
    }

    /// Number of layers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Whether there are no layers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

/// What a press on a text layer means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickIntent {
    /// Start dragging the layer.
    Drag,
    /// Second press on the same layer inside the window: edit its text.
    Edit,
}

/// Distinguishes drag from double-click edit by press timing.
///
/// A press on the same layer within the window of the previous press is an
/// edit. An edit consumes the recorded press, so a third quick press starts a
/// drag again.
#[derive(Debug, Clone)]
pub struct ClickTracker {
    window_ms: u64,
    last: Option<(TextLayerId, u64)>,
}

impl Default for ClickTracker {
    fn default() -> Self {
        Self::new(DOUBLE_CLICK_WINDOW_MS)
    }
}

impl ClickTracker {
    /// Create a tracker with the given window.
    #[must_use]
    pub fn new(window_ms: u64) -> Self {
        Self {
            window_ms,
            last: None,
        }
    }

    /// Classify a press on `layer` at `timestamp_ms`.
    pub fn press(&mut self, layer: TextLayerId, timestamp_ms: u64) -> ClickIntent {
        match self.last {
            Some((prev, at))
                if prev == layer && timestamp_ms.saturating_sub(at) < self.window_ms =>
            {
                self.last = None;
                ClickIntent::Edit
            }
            _ => {
                self.last = Some((layer, timestamp_ms));
                ClickIntent::Drag
            }
        }
    }

    /// Forget the recorded press.
    pub fn reset(&mut self) {
        self.last = None;
    }
}
