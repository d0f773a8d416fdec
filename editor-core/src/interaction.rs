//! Pointer gesture state machine.
//!
//! ```text
//!            down (hand)          ┌──────────┐
//!        ┌──────────────────────▶ │ Panning  │ ──┐
//!        │   down (pen/eraser)    ├──────────┤   │
//!  ┌──────┐ ───────────────────▶ │ Drawing  │ ──┤ up / cancel
//!  │ Idle │   down (crop handle)  ├──────────┤   │ (anywhere)
//!  └──────┘ ───────────────────▶ │ Cropping │ ──┤
//!     ▲  │   down (text layer)    ├──────────┤   │
//!     │  └──────────────────────▶ │ Dragging │ ──┤
//!     │                           └──────────┘   │
//!     └──────────────────────────────────────────┘
//! ```
//!
//! Only one gesture runs at a time. A pointer-down that arrives while a
//! gesture is active is ignored.

use serde::{Deserialize, Serialize};

use crate::crop::{CropBox, CropHandle};
use crate::event::{PointerEvent, PointerPhase, PointerTarget};
use crate::mask::{BlendMode, MaskSurface};
use crate::text::{ClickIntent, ClickTracker, TextLayerId, TextLayers};
use crate::viewport::Viewport;

/// The active editing tool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    /// Pan the view.
    #[default]
    Hand,
    /// Paint the mask.
    Pen,
    /// Erase the mask.
    Eraser,
    /// Adjust the crop box.
    Crop,
}

impl Tool {
    /// Stable name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hand => "hand",
            Self::Pen => "pen",
            Self::Eraser => "eraser",
            Self::Crop => "crop",
        }
    }

    /// Mask blend mode for drawing tools.
    #[must_use]
    pub const fn blend(self) -> Option<BlendMode> {
        match self {
            Self::Pen => Some(BlendMode::Paint),
            Self::Eraser => Some(BlendMode::Erase),
            Self::Hand | Self::Crop => None,
        }
    }
}

/// Kind of gesture in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GestureKind {
    /// Viewport pan.
    Pan,
    /// Freehand mask stroke.
    Draw,
    /// Crop box resize or move.
    Crop,
    /// Text layer drag.
    TextDrag,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum GestureState {
    Idle,
    Panning {
        start_x: f32,
        start_y: f32,
        origin_x: f32,
        origin_y: f32,
    },
    Drawing,
    Cropping {
        handle: CropHandle,
        start: CropBox,
        start_x: f32,
        start_y: f32,
    },
    DraggingText {
        id: TextLayerId,
        start_x: f32,
        start_y: f32,
        origin_x: f32,
        origin_y: f32,
    },
}

impl GestureState {
    const fn kind(&self) -> Option<GestureKind> {
        match self {
            Self::Idle => None,
            Self::Panning { .. } => Some(GestureKind::Pan),
            Self::Drawing => Some(GestureKind::Draw),
            Self::Cropping { .. } => Some(GestureKind::Crop),
            Self::DraggingText { .. } => Some(GestureKind::TextDrag),
        }
    }
}

/// Result of feeding one pointer event to the state machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InteractionOutcome {
    /// The event had no effect.
    Ignored,
    /// A gesture started.
    Started(GestureKind),
    /// The viewport offset changed.
    Panned {
        /// New offset X.
        offset_x: f32,
        /// New offset Y.
        offset_y: f32,
    },
    /// The active mask stroke grew.
    Stroked,
    /// The crop box changed.
    CropChanged(CropBox),
    /// A text layer moved.
    TextMoved {
        /// Layer moved.
        id: TextLayerId,
        /// New X in percent.
        x: f32,
        /// New Y in percent.
        y: f32,
    },
    /// Double click on a text layer: open its inline editor.
    EditTextRequested(TextLayerId),
    /// A gesture finished and the state is idle again.
    Ended(GestureKind),
}

/// Mutable session state a gesture may touch.
#[derive(Debug)]
pub struct InteractionContext<'a> {
    /// View transform.
    pub viewport: &'a mut Viewport,
    /// Mask surface.
    pub mask: &'a mut MaskSurface,
    /// Crop box, present only while cropping is active.
    pub crop: Option<&'a mut CropBox>,
    /// Text layers.
    pub text: &'a mut TextLayers,
    /// Brush diameter in screen pixels.
    pub brush_size: f32,
}

/// Translates pointer events into exactly one gesture at a time.
#[derive(Debug, Clone)]
pub struct CanvasInteraction {
    tool: Tool,
    state: GestureState,
    clicks: ClickTracker,
}

impl Default for CanvasInteraction {
    fn default() -> Self {
        Self::new()
    }
}

impl CanvasInteraction {
    /// Create an idle state machine with the hand tool.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tool: Tool::default(),
            state: GestureState::Idle,
            clicks: ClickTracker::default(),
        }
    }

    /// Use a custom double-click window.
    #[must_use]
    pub fn with_double_click_window(mut self, window_ms: u64) -> Self {
        self.clicks = ClickTracker::new(window_ms);
        self
    }

    /// Active tool.
    #[must_use]
    pub const fn tool(&self) -> Tool {
        self.tool
    }

    /// Change the tool. A gesture already in progress runs to its pointer-up.
    pub fn set_tool(&mut self, tool: Tool) {
        self.tool = tool;
    }

    /// Whether no gesture is in progress.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.state == GestureState::Idle
    }

    /// The gesture in progress, if any.
    #[must_use]
    pub const fn gesture(&self) -> Option<GestureKind> {
        self.state.kind()
    }

    /// Feed one pointer event.
    pub fn handle(
        &mut self,
        event: &PointerEvent,
        ctx: &mut InteractionContext<'_>,
    ) -> InteractionOutcome {
        match event.phase {
            PointerPhase::Down => self.on_down(event, ctx),
            PointerPhase::Move => self.on_move(event, ctx),
            PointerPhase::Up | PointerPhase::Cancel => self.finish(ctx),
        }
    }

    fn on_down(
        &mut self,
        event: &PointerEvent,
        ctx: &mut InteractionContext<'_>,
    ) -> InteractionOutcome {
        if let Some(kind) = self.state.kind() {
            tracing::debug!(active = ?kind, "Ignoring pointer-down during gesture");
            return InteractionOutcome::Ignored;
        }

        let next = match (event.target, self.tool) {
            (PointerTarget::Outside, _) => return InteractionOutcome::Ignored,
            (PointerTarget::CropHandle(handle), Tool::Crop) => {
                let Some(start) = ctx.crop.as_deref().copied() else {
                    return InteractionOutcome::Ignored;
                };
                GestureState::Cropping {
                    handle,
                    start,
                    start_x: event.x,
                    start_y: event.y,
                }
            }
            (PointerTarget::TextLayer(id), tool) if tool != Tool::Crop => {
                let Some(layer) = ctx.text.get(id) else {
                    return InteractionOutcome::Ignored;
                };
                if self.clicks.press(id, event.timestamp_ms) == ClickIntent::Edit {
                    tracing::debug!(layer_id = %id, "Text edit requested");
                    return InteractionOutcome::EditTextRequested(id);
                }
                GestureState::DraggingText {
                    id,
                    start_x: event.x,
                    start_y: event.y,
                    origin_x: layer.x,
                    origin_y: layer.y,
                }
            }
            (_, Tool::Hand) => GestureState::Panning {
                start_x: event.x,
                start_y: event.y,
                origin_x: ctx.viewport.offset_x,
                origin_y: ctx.viewport.offset_y,
            },
            (PointerTarget::Canvas, tool @ (Tool::Pen | Tool::Eraser)) => {
                let Some(blend) = tool.blend() else {
                    return InteractionOutcome::Ignored;
                };
                let (x, y) = ctx.viewport.to_image_percent(event.x, event.y);
                let (brush, _) = ctx.viewport.delta_to_percent(ctx.brush_size, 0.0);
                ctx.mask.begin_stroke(blend, brush, x, y);
                GestureState::Drawing
            }
            _ => return InteractionOutcome::Ignored,
        };

        self.state = next;
        match next.kind() {
            Some(kind) => InteractionOutcome::Started(kind),
            None => InteractionOutcome::Ignored,
        }
    }

    fn on_move(
        &mut self,
        event: &PointerEvent,
        ctx: &mut InteractionContext<'_>,
    ) -> InteractionOutcome {
        match self.state {
            GestureState::Idle => InteractionOutcome::Ignored,
            GestureState::Panning {
                start_x,
                start_y,
                origin_x,
                origin_y,
            } => {
                let offset_x = origin_x + (event.x - start_x);
                let offset_y = origin_y + (event.y - start_y);
                ctx.viewport.set_offset(offset_x, offset_y);
                InteractionOutcome::Panned { offset_x, offset_y }
            }
            GestureState::Drawing => {
                let (x, y) = ctx.viewport.to_image_percent(event.x, event.y);
                ctx.mask.extend_stroke(x, y);
                InteractionOutcome::Stroked
            }
            GestureState::Cropping {
                handle,
                start,
                start_x,
                start_y,
            } => {
                let Some(crop) = ctx.crop.as_deref_mut() else {
                    return InteractionOutcome::Ignored;
                };
                let (dx, dy) = ctx
                    .viewport
                    .delta_to_percent(event.x - start_x, event.y - start_y);
                *crop = start.resized(handle, dx, dy);
                InteractionOutcome::CropChanged(*crop)
            }
            GestureState::DraggingText {
                id,
                start_x,
                start_y,
                origin_x,
                origin_y,
            } => {
                let (dx, dy) = ctx
                    .viewport
                    .delta_to_percent(event.x - start_x, event.y - start_y);
                let Some(layer) = ctx.text.get_mut(id) else {
                    return InteractionOutcome::Ignored;
                };
                layer.move_to(origin_x + dx, origin_y + dy);
                InteractionOutcome::TextMoved {
                    id,
                    x: layer.x,
                    y: layer.y,
                }
            }
        }
    }

    fn finish(&mut self, ctx: &mut InteractionContext<'_>) -> InteractionOutcome {
        let previous = std::mem::replace(&mut self.state, GestureState::Idle);
        if previous == GestureState::Drawing {
            ctx.mask.end_stroke();
        }
        match previous.kind() {
            Some(kind) => InteractionOutcome::Ended(kind),
            None => InteractionOutcome::Ignored,
        }
    }
}
