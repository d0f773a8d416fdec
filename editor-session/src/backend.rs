//! Collaborator interfaces the session depends on.
//!
//! The session never talks to a network or a pixel buffer directly. Job
//! submission, media upload, credit accounting, authentication, the mode
//! prompt and rasterization are all injected through these traits.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use base64::Engine;
use editor_core::{EditFrame, FrameSize, PixelRect, TextLayer};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::prefs::ResourceMode;

/// Result type for collaborator calls.
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors reported by collaborators.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The request never produced a usable response (connection, timeout).
    #[error("transport failure: {0}")]
    Transport(String),
    /// The service answered with a non-success HTTP status.
    #[error("service returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },
    /// The response did not have the expected shape.
    #[error("unexpected response: {0}")]
    InvalidResponse(String),
    /// Image bytes could not be decoded or encoded.
    #[error("image error: {0}")]
    Image(String),
    /// The frame reference cannot be resolved by this collaborator.
    #[error("unsupported frame reference: {0}")]
    Unsupported(String),
}

impl BackendError {
    /// Returns true if the failure happened at the transport level.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Status { .. })
    }
}

/// Payload for a new generation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    /// Text prompt.
    pub prompt: String,
    /// Durable image URLs: the current frame, then the mask if any.
    pub reference_images: Vec<String>,
    /// Generation model.
    pub model_id: String,
    /// Requested aspect ratio, e.g. `"1:1"`.
    pub aspect_ratio: String,
    /// Caller-supplied access credential (own-credential mode).
    #[serde(skip)]
    pub credential: Option<String>,
}

/// Response to a job submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSubmission {
    /// Whether the job was accepted.
    pub success: bool,
    /// Remote job ID when accepted.
    #[serde(default)]
    pub job_id: Option<String>,
}

/// Remote job state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Queued.
    Pending,
    /// Running.
    Processing,
    /// Finished.
    Done,
    /// Failed remotely.
    Failed,
    /// Any status this client does not know about.
    #[serde(other)]
    Unknown,
}

/// Poll response for a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    /// Current state.
    pub status: JobState,
    /// Result image URLs when done.
    #[serde(default)]
    pub result_image_urls: Vec<String>,
    /// Human-readable message, usually set on failure.
    #[serde(default)]
    pub message: Option<String>,
}

/// A stored image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedImage {
    /// Durable URL.
    pub url: String,
    /// Storage ID.
    pub id: String,
}

/// Encoded image bytes with their pixel size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage {
    /// PNG-encoded bytes.
    pub bytes: Vec<u8>,
    /// Pixel size.
    pub size: FrameSize,
}

impl RasterImage {
    /// Encode as a `data:image/png;base64,...` URI.
    #[must_use]
    pub fn to_data_uri(&self) -> String {
        let encoded = base64::engine::general_purpose::STANDARD.encode(&self.bytes);
        format!("data:image/png;base64,{encoded}")
    }
}

/// Remote generation service.
#[async_trait]
pub trait JobBackend: Send + Sync {
    /// Submit a job.
    async fn submit_job(&self, request: &JobRequest) -> BackendResult<JobSubmission>;

    /// Fetch the status of a job.
    async fn job_status(&self, job_id: &str) -> BackendResult<JobStatus>;
}

/// Durable image storage.
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Upload encoded image bytes.
    async fn upload_image(&self, bytes: Vec<u8>) -> BackendResult<UploadedImage>;
}

/// Metered credit balance.
#[async_trait]
pub trait Balance: Send + Sync {
    /// Atomically take `amount`. Returns `false`, without mutating, if the
    /// balance is insufficient.
    async fn debit(&self, amount: u64) -> BackendResult<bool>;

    /// Add `amount`.
    async fn credit(&self, amount: u64) -> BackendResult<()>;

    /// Current balance.
    async fn available(&self) -> BackendResult<u64>;
}

/// Login state of the current user.
pub trait AuthGate: Send + Sync {
    /// Whether the user is signed in.
    fn is_authenticated(&self) -> bool;

    /// Ask the user to sign in.
    fn request_login(&self);
}

/// Prompts the user to pick a resource mode.
#[async_trait]
pub trait ModeSelector: Send + Sync {
    /// Returns `None` if the user dismissed the prompt.
    async fn choose_mode(&self) -> Option<ResourceMode>;
}

/// Pixel operations on frames.
#[async_trait]
pub trait Rasterizer: Send + Sync {
    /// Natural pixel size of a frame.
    async fn natural_size(&self, frame: &EditFrame) -> BackendResult<FrameSize>;

    /// Cut `rect` out of a frame.
    async fn crop(&self, frame: &EditFrame, rect: PixelRect) -> BackendResult<RasterImage>;

    /// Draw text layers onto a frame.
    async fn flatten_text(
        &self,
        frame: &EditFrame,
        layers: &[TextLayer],
    ) -> BackendResult<RasterImage>;

    /// Encode a single-channel coverage buffer as an image.
    async fn encode_mask(&self, coverage: &[u8], size: FrameSize) -> BackendResult<RasterImage>;
}

/// In-process credit balance.
#[derive(Debug, Default)]
pub struct LocalBalance {
    credits: AtomicU64,
}

impl LocalBalance {
    /// Create a balance holding `credits`.
    #[must_use]
    pub fn new(credits: u64) -> Self {
        Self {
            credits: AtomicU64::new(credits),
        }
    }
}

#[async_trait]
impl Balance for LocalBalance {
    async fn debit(&self, amount: u64) -> BackendResult<bool> {
        let result = self
            .credits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                current.checked_sub(amount)
            });
        Ok(result.is_ok())
    }

    async fn credit(&self, amount: u64) -> BackendResult<()> {
        self.credits.fetch_add(amount, Ordering::SeqCst);
        Ok(())
    }

    async fn available(&self) -> BackendResult<u64> {
        Ok(self.credits.load(Ordering::SeqCst))
    }
}

/// Auth gate with a fixed answer, for headless use.
#[derive(Debug)]
pub struct StaticAuth {
    authenticated: AtomicBool,
}

impl StaticAuth {
    /// A signed-in user.
    #[must_use]
    pub fn signed_in() -> Self {
        Self {
            authenticated: AtomicBool::new(true),
        }
    }

    /// A signed-out user.
    #[must_use]
    pub fn signed_out() -> Self {
        Self {
            authenticated: AtomicBool::new(false),
        }
    }
}

impl AuthGate for StaticAuth {
    fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    fn request_login(&self) {
        tracing::info!("Login requested");
    }
}

/// Mode selector that always returns the same choice.
#[derive(Debug, Clone, Copy)]
pub struct FixedModeSelector(pub Option<ResourceMode>);

#[async_trait]
impl ModeSelector for FixedModeSelector {
    async fn choose_mode(&self) -> Option<ResourceMode> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_balance_debit_is_all_or_nothing() {
        let balance = LocalBalance::new(100);
        assert!(!balance.debit(150).await.expect("debit"));
        assert_eq!(balance.available().await.expect("available"), 100);

        assert!(balance.debit(60).await.expect("debit"));
        assert_eq!(balance.available().await.expect("available"), 40);

        balance.credit(10).await.expect("credit");
        assert_eq!(balance.available().await.expect("available"), 50);
    }

    #[test]
    fn test_transport_classification() {
        assert!(BackendError::Transport("timeout".into()).is_transport());
        assert!(BackendError::Status {
            status: 502,
            body: String::new()
        }
        .is_transport());
        assert!(!BackendError::InvalidResponse("x".into()).is_transport());
        assert!(!BackendError::Image("x".into()).is_transport());
    }

    #[test]
    fn test_unknown_job_state_deserializes() {
        let status: JobStatus =
            serde_json::from_str(r#"{"status":"queued_for_gpu"}"#).expect("parse");
        assert_eq!(status.status, JobState::Unknown);
        assert!(status.result_image_urls.is_empty());
        assert!(status.message.is_none());
    }

    #[test]
    fn test_credential_is_not_serialized() {
        let request = JobRequest {
            prompt: "a cat".into(),
            reference_images: vec!["https://cdn.example/a.png".into()],
            model_id: "m".into(),
            aspect_ratio: "1:1".into(),
            credential: Some("secret".into()),
        };
        let json = serde_json::to_string(&request).expect("serialize");
        assert!(!json.contains("secret"));
    }

    #[test]
    fn test_raster_image_data_uri() {
        let image = RasterImage {
            bytes: vec![1, 2, 3],
            size: FrameSize::new(1, 1),
        };
        assert_eq!(image.to_data_uri(), "data:image/png;base64,AQID");
    }
}
