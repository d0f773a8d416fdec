//! Test doubles for session integration tests.
//!
//! Every fake records what it was asked to do so tests can assert on
//! side effects (submits, uploads, prompts) rather than only on results.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use editor_core::{EditFrame, FrameSize, PixelRect, TextLayer};
use editor_session::{
    BackendError, BackendResult, Collaborators, EditSession, JobBackend, JobRequest, JobState,
    JobStatus, JobSubmission, LocalBalance, MediaStore, MemoryPreferenceStore, ModeSelector,
    PollConfig, RasterImage, Rasterizer, ResourceMode, SessionConfig, StaticAuth, TaskEvent,
    UploadedImage,
};
use tokio::sync::broadcast;

/// Poll interval used by test sessions.
pub const POLL_MS: u64 = 1_000;

// ===========================================================================
// Job backend
// ===========================================================================

/// Job backend whose jobs stay pending until a test completes them.
///
/// Job IDs are handed out as `job-1`, `job-2`, ... in submit order.
#[derive(Default)]
pub struct ManualJobs {
    submits: AtomicUsize,
    requests: Mutex<Vec<JobRequest>>,
    outcomes: Mutex<HashMap<String, JobStatus>>,
    reject: bool,
}

impl ManualJobs {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A backend that answers every submit with `success: false`.
    pub fn rejecting() -> Arc<Self> {
        Arc::new(Self {
            reject: true,
            ..Self::default()
        })
    }

    pub fn submit_count(&self) -> usize {
        self.submits.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<JobRequest> {
        self.requests.lock().expect("lock").clone()
    }

    /// Finish `job_id` with a single result image.
    pub fn complete(&self, job_id: &str, url: &str) {
        self.outcomes.lock().expect("lock").insert(
            job_id.to_string(),
            JobStatus {
                status: JobState::Done,
                result_image_urls: vec![url.to_string()],
                message: None,
            },
        );
    }

    /// Fail `job_id` with a remote message.
    pub fn fail(&self, job_id: &str, message: Option<&str>) {
        self.outcomes.lock().expect("lock").insert(
            job_id.to_string(),
            JobStatus {
                status: JobState::Failed,
                result_image_urls: Vec::new(),
                message: message.map(ToString::to_string),
            },
        );
    }
}

#[async_trait]
impl JobBackend for ManualJobs {
    async fn submit_job(&self, request: &JobRequest) -> BackendResult<JobSubmission> {
        let n = self.submits.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests.lock().expect("lock").push(request.clone());
        Ok(JobSubmission {
            success: !self.reject,
            job_id: (!self.reject).then(|| format!("job-{n}")),
        })
    }

    async fn job_status(&self, job_id: &str) -> BackendResult<JobStatus> {
        Ok(self
            .outcomes
            .lock()
            .expect("lock")
            .get(job_id)
            .cloned()
            .unwrap_or(JobStatus {
                status: JobState::Processing,
                result_image_urls: Vec::new(),
                message: None,
            }))
    }
}

// ===========================================================================
// Media store
// ===========================================================================

/// Media store that keeps every upload in memory.
#[derive(Default)]
pub struct RecordingMedia {
    uploads: Mutex<Vec<Vec<u8>>>,
    failing: AtomicBool,
}

impl RecordingMedia {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every following upload fail with a transport error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn uploads(&self) -> Vec<Vec<u8>> {
        self.uploads.lock().expect("lock").clone()
    }
}

#[async_trait]
impl MediaStore for RecordingMedia {
    async fn upload_image(&self, bytes: Vec<u8>) -> BackendResult<UploadedImage> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(BackendError::Transport("connection reset".into()));
        }
        let mut uploads = self.uploads.lock().expect("lock");
        uploads.push(bytes);
        let n = uploads.len();
        Ok(UploadedImage {
            url: format!("https://media.example/{n}.png"),
            id: format!("upload-{n}"),
        })
    }
}

// ===========================================================================
// Mode selector
// ===========================================================================

/// Mode selector that counts how often it was shown.
pub struct CountingModeSelector {
    choice: Option<ResourceMode>,
    prompts: AtomicUsize,
}

impl CountingModeSelector {
    pub fn new(choice: Option<ResourceMode>) -> Arc<Self> {
        Arc::new(Self {
            choice,
            prompts: AtomicUsize::new(0),
        })
    }

    pub fn prompts(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModeSelector for CountingModeSelector {
    async fn choose_mode(&self) -> Option<ResourceMode> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        self.choice
    }
}

// ===========================================================================
// Rasterizer
// ===========================================================================

/// Rasterizer that never touches pixels. Every image has `size`.
pub struct FixedRaster {
    size: FrameSize,
}

impl FixedRaster {
    pub fn new(width: u32, height: u32) -> Arc<Self> {
        Arc::new(Self {
            size: FrameSize::new(width, height),
        })
    }
}

#[async_trait]
impl Rasterizer for FixedRaster {
    async fn natural_size(&self, _frame: &EditFrame) -> BackendResult<FrameSize> {
        Ok(self.size)
    }

    async fn crop(&self, _frame: &EditFrame, rect: PixelRect) -> BackendResult<RasterImage> {
        Ok(RasterImage {
            bytes: b"cropped".to_vec(),
            size: FrameSize::new(rect.width, rect.height),
        })
    }

    async fn flatten_text(
        &self,
        _frame: &EditFrame,
        layers: &[TextLayer],
    ) -> BackendResult<RasterImage> {
        if layers.is_empty() {
            return Err(BackendError::Image("nothing to flatten".into()));
        }
        Ok(RasterImage {
            bytes: b"flattened".to_vec(),
            size: self.size,
        })
    }

    async fn encode_mask(&self, coverage: &[u8], size: FrameSize) -> BackendResult<RasterImage> {
        assert_eq!(coverage.len(), (size.width * size.height) as usize);
        Ok(RasterImage {
            bytes: b"mask".to_vec(),
            size,
        })
    }
}

// ===========================================================================
// Harness
// ===========================================================================

/// A session wired to fakes, with handles to inspect them.
pub struct Harness {
    pub session: EditSession,
    pub jobs: Arc<ManualJobs>,
    pub media: Arc<RecordingMedia>,
    pub balance: Arc<LocalBalance>,
    pub modes: Arc<CountingModeSelector>,
    pub prefs: Arc<MemoryPreferenceStore>,
}

/// Builder for [`Harness`].
pub struct HarnessBuilder {
    jobs: Arc<ManualJobs>,
    credits: u64,
    signed_in: bool,
    mode_choice: Option<ResourceMode>,
    prefs: Arc<MemoryPreferenceStore>,
    raster: Arc<dyn Rasterizer>,
    config: SessionConfig,
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self {
            jobs: ManualJobs::new(),
            credits: 1_000,
            signed_in: true,
            mode_choice: Some(ResourceMode::Prepaid),
            prefs: Arc::new(MemoryPreferenceStore::new()),
            raster: FixedRaster::new(800, 600),
            config: SessionConfig {
                poll: PollConfig::fixed(POLL_MS),
                ..SessionConfig::default()
            },
        }
    }
}

impl HarnessBuilder {
    pub fn jobs(mut self, jobs: Arc<ManualJobs>) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn credits(mut self, credits: u64) -> Self {
        self.credits = credits;
        self
    }

    pub fn signed_out(mut self) -> Self {
        self.signed_in = false;
        self
    }

    pub fn mode_choice(mut self, choice: Option<ResourceMode>) -> Self {
        self.mode_choice = choice;
        self
    }

    pub fn prefs(mut self, prefs: Arc<MemoryPreferenceStore>) -> Self {
        self.prefs = prefs;
        self
    }

    pub fn raster(mut self, raster: Arc<dyn Rasterizer>) -> Self {
        self.raster = raster;
        self
    }

    pub fn config(mut self, f: impl FnOnce(&mut SessionConfig)) -> Self {
        f(&mut self.config);
        self
    }

    pub fn build(self) -> Harness {
        let media = RecordingMedia::new();
        let balance = Arc::new(LocalBalance::new(self.credits));
        let modes = CountingModeSelector::new(self.mode_choice);
        let auth = if self.signed_in {
            StaticAuth::signed_in()
        } else {
            StaticAuth::signed_out()
        };

        let session = EditSession::new(
            self.config,
            Collaborators {
                jobs: self.jobs.clone(),
                media: media.clone(),
                balance: balance.clone(),
                auth: Arc::new(auth),
                modes: modes.clone(),
                prefs: self.prefs.clone(),
                raster: self.raster,
            },
        );

        Harness {
            session,
            jobs: self.jobs,
            media,
            balance,
            modes,
            prefs: self.prefs,
        }
    }
}

// ===========================================================================
// Helpers
// ===========================================================================

/// Encode a solid RGBA image as a PNG data URI.
pub fn png_data_uri(width: u32, height: u32) -> String {
    use base64::Engine;

    let image = image::RgbaImage::from_pixel(width, height, image::Rgba([40, 80, 120, 255]));
    let mut bytes = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(image)
        .write_to(&mut bytes, image::ImageFormat::Png)
        .expect("encode png");
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes.into_inner());
    format!("data:image/png;base64,{encoded}")
}

/// Wait for the next `Succeeded` or `Failed` event.
pub async fn next_terminal(rx: &mut broadcast::Receiver<TaskEvent>) -> TaskEvent {
    loop {
        let event = rx.recv().await.expect("event");
        if matches!(
            event,
            TaskEvent::Succeeded { .. } | TaskEvent::Failed { .. }
        ) {
            return event;
        }
    }
}
