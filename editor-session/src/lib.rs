//! # Editor Session
//!
//! Session layer for the image editor: the [`EditSession`] facade,
//! background generation, and adapters for remote services.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                        EditSession                         │
//! │  tool · brush · layers · text · crop · mask · mode         │
//! └─────┬───────────────────────┬───────────────────────┬──────┘
//!       │                       │                       │
//!       ▼                       ▼                       ▼
//! ┌─────────────┐      ┌─────────────────┐      ┌─────────────┐
//! │SharedHistory│◄─────│   Generation    │─────►│ JobBackend  │
//! │(editor-core)│ push │   Coordinator   │ poll │  Balance    │
//! └─────────────┘      └─────────────────┘      │  AuthGate   │
//!                                               └─────────────┘
//! ```
//!
//! Collaborators are traits in [`backend`]; [`http::HttpStudioClient`]
//! and [`raster::ImageRasterizer`] are the shipped implementations.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod config;
pub mod coordinator;
pub mod http;
pub mod metrics;
pub mod prefs;
pub mod raster;
pub mod session;

pub use backend::{
    AuthGate, Balance, BackendError, BackendResult, FixedModeSelector, JobBackend, JobRequest,
    JobState, JobStatus, JobSubmission, LocalBalance, MediaStore, ModeSelector, RasterImage,
    Rasterizer, StaticAuth, UploadedImage,
};
pub use config::{PollConfig, SessionConfig};
pub use coordinator::{
    Admission, FailureKind, GenerateError, GenerationCoordinator, GenerationTask, TaskEvent, TaskId,
    TaskStatus, GENERIC_FAILURE_MESSAGE,
};
pub use http::{HttpClientError, HttpStudioClient};
pub use prefs::{
    FilePreferenceStore, MemoryPreferenceStore, PreferenceError, PreferenceStore, ResourceMode,
    RESOURCE_MODE_KEY,
};
pub use raster::ImageRasterizer;
pub use session::{Collaborators, EditSession, SessionError, SessionResult};
