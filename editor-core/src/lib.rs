//! # Editor Core
//!
//! Synchronous engine logic for an image editing session: the undo/redo
//! history, pointer gestures, crop geometry, the mask surface and text
//! overlays. Nothing here performs I/O.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                 editor-core                 │
//! ├─────────────────────────────────────────────┤
//! │  History         │  Interaction             │
//! │  - EditFrame     │  - Pointer events        │
//! │  - Cursor        │  - Pan / draw / crop     │
//! │  - Branch prune  │  - Text drag & edit      │
//! ├─────────────────────────────────────────────┤
//! │  Overlays        │  Geometry                │
//! │  - Mask surface  │  - Crop box              │
//! │  - Text layers   │  - Viewport              │
//! └─────────────────────────────────────────────┘
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)]

pub mod crop;
pub mod error;
pub mod event;
pub mod frame;
pub mod history;
pub mod interaction;
pub mod layers;
pub mod mask;
pub mod text;
pub mod viewport;

pub use crop::{CropBox, CropHandle, PixelRect, MIN_CROP_SIZE};
pub use error::{EditorError, EditorResult};
pub use event::{PointerEvent, PointerPhase, PointerTarget};
pub use frame::{EditFrame, FrameId, FrameOrigin, FrameSize};
pub use history::{HistoryStack, SharedHistory, DEFAULT_HISTORY_CAPACITY};
pub use interaction::{
    CanvasInteraction, GestureKind, InteractionContext, InteractionOutcome, Tool,
};
pub use layers::{LayerKind, VisibleLayers};
pub use mask::{BlendMode, MaskPoint, MaskSurface, Stroke};
pub use text::{
    ClickIntent, ClickTracker, TextLayer, TextLayerId, TextLayerUpdate, TextLayers,
    DOUBLE_CLICK_WINDOW_MS,
};
pub use viewport::Viewport;

/// Editor core version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
