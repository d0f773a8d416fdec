//! Edit frames - immutable references to one rendered image state.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameId(Uuid);

impl FrameId {
    /// Create a new unique frame ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from an existing UUID.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for FrameId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for FrameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Natural pixel dimensions of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSize {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl FrameSize {
    /// Create a new size.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Where a frame came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameOrigin {
    /// The image the session was opened with.
    Load,
    /// Imported programmatically (paste, file drop).
    Import,
    /// Produced by applying a crop box.
    Crop,
    /// Produced by a generation task.
    Generation,
    /// Text layers baked into the image.
    Flatten,
}

impl FrameOrigin {
    /// Short label for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::Import => "import",
            Self::Crop => "crop",
            Self::Generation => "generation",
            Self::Flatten => "flatten",
        }
    }
}

/// One fully rendered image state.
///
/// Frames are never mutated. A frame's `uri` is either a remote URL (durable)
/// or a `data:` URI holding the encoded pixels inline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditFrame {
    /// Unique identifier.
    pub id: FrameId,
    /// Image reference: `https://...` or `data:image/png;base64,...`.
    pub uri: String,
    /// Natural pixel size, when known.
    pub size: Option<FrameSize>,
    /// What produced this frame.
    pub origin: FrameOrigin,
}

impl EditFrame {
    /// Create a frame referencing `uri`.
    #[must_use]
    pub fn new(uri: impl Into<String>, origin: FrameOrigin) -> Self {
        Self {
            id: FrameId::new(),
            uri: uri.into(),
            size: None,
            origin,
        }
    }

    /// Set the natural pixel size.
    #[must_use]
    pub fn with_size(mut self, size: FrameSize) -> Self {
        self.size = Some(size);
        self
    }

    /// Whether the frame is a remote reference that can be handed to a backend as-is.
    #[must_use]
    pub fn is_durable(&self) -> bool {
        !self.is_inline()
    }

    /// Whether the frame holds its pixels inline as a `data:` URI.
    #[must_use]
    pub fn is_inline(&self) -> bool {
        self.uri.starts_with("data:")
    }
}
