//! Error types for editing operations.

use thiserror::Error;

use crate::text::TextLayerId;

/// Result type for editing operations.
pub type EditorResult<T> = Result<T, EditorError>;

/// Errors that can occur in editing operations.
#[derive(Debug, Error)]
pub enum EditorError {
    /// An operation needed a base image but none is loaded.
    #[error("No image loaded")]
    NoImage,

    /// Text layer not found.
    #[error("Text layer not found: {0}")]
    TextLayerNotFound(TextLayerId),

    /// Crop operation requested while the crop tool is not active.
    #[error("No active crop box")]
    NoCropBox,

    /// Invalid value supplied to an operation.
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
