//! Visible layer set.

use serde::{Deserialize, Serialize};

/// A toggleable display layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayerKind {
    /// The base image (the history cursor's frame).
    Background,
    /// Pen/eraser overlay as drawn.
    DrawOverlay,
    /// The mask surface sent with generation requests.
    Mask,
    /// Text layers.
    Text,
}

impl LayerKind {
    /// All layer kinds, bottom to top.
    pub const ALL: [Self; 4] = [Self::Background, Self::DrawOverlay, Self::Mask, Self::Text];
}

/// Which layers are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct VisibleLayers {
    /// Base image.
    pub background: bool,
    /// Drawing overlay.
    pub draw_overlay: bool,
    /// Mask surface.
    pub mask: bool,
    /// Text layers.
    pub text: bool,
}

impl Default for VisibleLayers {
    fn default() -> Self {
        Self {
            background: true,
            draw_overlay: true,
            mask: true,
            text: true,
        }
    }
}

impl VisibleLayers {
    /// Flip a layer and return its new visibility.
    pub fn toggle(&mut self, kind: LayerKind) -> bool {
        let slot = self.slot(kind);
        *slot = !*slot;
        *slot
    }

    /// Set a layer's visibility.
    pub fn set(&mut self, kind: LayerKind, visible: bool) {
        *self.slot(kind) = visible;
    }

    /// Whether a layer is drawn.
    #[must_use]
    pub const fn is_visible(&self, kind: LayerKind) -> bool {
        match kind {
            LayerKind::Background => self.background,
            LayerKind::DrawOverlay => self.draw_overlay,
            LayerKind::Mask => self.mask,
            LayerKind::Text => self.text,
        }
    }

    fn slot(&mut self, kind: LayerKind) -> &mut bool {
        match kind {
            LayerKind::Background => &mut self.background,
            LayerKind::DrawOverlay => &mut self.draw_overlay,
            LayerKind::Mask => &mut self.mask,
            LayerKind::Text => &mut self.text,
        }
    }
}
