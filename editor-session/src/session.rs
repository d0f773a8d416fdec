//! Session facade.
//!
//! [`EditSession`] is the single surface presentation code talks to. It owns
//! the per-document state that never enters history (tool, brush, layers,
//! text overlays, crop box, mask, viewport, resource mode) and routes every
//! committed change through the shared history.

use std::sync::Arc;

use editor_core::{
    CanvasInteraction, CropBox, EditFrame, EditorError, FrameOrigin, FrameSize, HistoryStack,
    InteractionContext, InteractionOutcome, LayerKind, MaskSurface, PointerEvent, SharedHistory,
    TextLayer, TextLayerId, TextLayerUpdate, TextLayers, Tool, Viewport, VisibleLayers,
};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::backend::{
    AuthGate, Balance, BackendError, JobBackend, JobRequest, MediaStore, ModeSelector, Rasterizer,
};
use crate::config::SessionConfig;
use crate::coordinator::{GenerateError, GenerationCoordinator, GenerationTask, TaskEvent, TaskId};
use crate::metrics;
use crate::prefs::{PreferenceError, PreferenceStore, ResourceMode, RESOURCE_MODE_KEY};
use crate::raster::decode_data_uri;

/// Smallest brush diameter in screen pixels.
const MIN_BRUSH_SIZE: f32 = 1.0;
/// Largest brush diameter in screen pixels.
const MAX_BRUSH_SIZE: f32 = 500.0;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors from session operations other than generation.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Editing precondition failed.
    #[error(transparent)]
    Editor(#[from] EditorError),
    /// A collaborator failed.
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
    /// Preference storage failed.
    #[error("Preference error: {0}")]
    Preference(#[from] PreferenceError),
}

/// External services a session depends on.
#[derive(Clone)]
pub struct Collaborators {
    /// Generation service.
    pub jobs: Arc<dyn JobBackend>,
    /// Image storage.
    pub media: Arc<dyn MediaStore>,
    /// Credit balance.
    pub balance: Arc<dyn Balance>,
    /// Login state.
    pub auth: Arc<dyn AuthGate>,
    /// Resource mode prompt.
    pub modes: Arc<dyn ModeSelector>,
    /// Preference storage.
    pub prefs: Arc<dyn PreferenceStore>,
    /// Pixel operations.
    pub raster: Arc<dyn Rasterizer>,
}

/// One editing session over a single working image.
pub struct EditSession {
    config: SessionConfig,
    history: SharedHistory,
    coordinator: GenerationCoordinator,
    media: Arc<dyn MediaStore>,
    auth: Arc<dyn AuthGate>,
    modes: Arc<dyn ModeSelector>,
    prefs: Arc<dyn PreferenceStore>,
    raster: Arc<dyn Rasterizer>,
    interaction: CanvasInteraction,
    viewport: Viewport,
    mask: MaskSurface,
    crop: Option<CropBox>,
    text: TextLayers,
    layers: VisibleLayers,
    brush_size: f32,
    mode: Option<ResourceMode>,
}

impl std::fmt::Debug for EditSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditSession")
            .field("history_len", &self.history.len())
            .field("tool", &self.interaction.tool())
            .field("mode", &self.mode)
            .field("coordinator", &self.coordinator)
            .finish_non_exhaustive()
    }
}

impl EditSession {
    /// Create a session. The stored resource mode, if any, is read once here.
    ///
    /// Must be called within a Tokio runtime; generation polling is spawned
    /// on it.
    #[must_use]
    pub fn new(config: SessionConfig, collaborators: Collaborators) -> Self {
        let history = SharedHistory::with_capacity(config.history_capacity);
        let coordinator = GenerationCoordinator::new(
            Arc::clone(&collaborators.jobs),
            Arc::clone(&collaborators.balance),
            Arc::clone(&collaborators.auth),
            history.clone(),
            config.poll.clone(),
        );

        let mode = match collaborators.prefs.get(RESOURCE_MODE_KEY) {
            Ok(Some(value)) => match value.parse::<ResourceMode>() {
                Ok(mode) => Some(mode),
                Err(e) => {
                    tracing::warn!(error = %e, "Ignoring stored resource mode");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read resource mode preference");
                None
            }
        };

        Self {
            interaction: CanvasInteraction::new()
                .with_double_click_window(config.double_click_window_ms),
            brush_size: config.default_brush_size.clamp(MIN_BRUSH_SIZE, MAX_BRUSH_SIZE),
            history,
            coordinator,
            media: collaborators.media,
            auth: collaborators.auth,
            modes: collaborators.modes,
            prefs: collaborators.prefs,
            raster: collaborators.raster,
            viewport: Viewport::default(),
            mask: MaskSurface::new(),
            crop: None,
            text: TextLayers::new(),
            layers: VisibleLayers::default(),
            mode,
            config,
        }
    }

    /// Session configuration.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Image and history
    // -----------------------------------------------------------------------

    /// Open `uri` as the working image, replacing history and overlays.
    ///
    /// An image whose size cannot be read yet still loads; the size is
    /// resolved when a crop or mask first needs it.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::InvalidValue`] for an empty URI.
    pub async fn load_image(&mut self, uri: impl Into<String>) -> SessionResult<EditFrame> {
        let uri = uri.into();
        if uri.trim().is_empty() {
            return Err(EditorError::InvalidValue("image URI is empty".to_string()).into());
        }
        let mut frame = EditFrame::new(uri, FrameOrigin::Load);
        match self.raster.natural_size(&frame).await {
            Ok(size) => frame = frame.with_size(size),
            Err(e) => tracing::warn!(error = %e, "Could not read natural size on load"),
        }

        self.history.reset(frame.clone());
        self.mask.clear();
        self.text.clear();
        self.crop = None;
        self.viewport.reset();
        if self.interaction.tool() == Tool::Crop {
            self.interaction.set_tool(Tool::Hand);
        }
        metrics::record_commit(FrameOrigin::Load);
        tracing::info!(frame_id = %frame.id, "Image loaded");
        Ok(frame)
    }

    /// Upload encoded image bytes and push them as a new frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes cannot be decoded or the upload fails.
    pub async fn import_image(&mut self, bytes: Vec<u8>) -> SessionResult<EditFrame> {
        let probe = EditFrame::new(inline_uri(&bytes), FrameOrigin::Import);
        let size = self.raster.natural_size(&probe).await?;
        let uploaded = self.media.upload_image(bytes).await?;

        let frame = EditFrame::new(uploaded.url, FrameOrigin::Import).with_size(size);
        self.commit(frame.clone());
        Ok(frame)
    }

    fn commit(&self, frame: EditFrame) {
        let origin = frame.origin;
        self.history.push(frame);
        metrics::record_commit(origin);
    }

    /// Step back in history. Returns `false` at the oldest frame.
    pub fn undo(&mut self) -> bool {
        self.history.undo()
    }

    /// Step forward in history. Returns `false` at the newest frame.
    pub fn redo(&mut self) -> bool {
        self.history.redo()
    }

    /// Whether there is an older frame.
    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    /// Whether there is a newer frame.
    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// The frame to draw.
    #[must_use]
    pub fn current_frame(&self) -> Option<EditFrame> {
        self.history.current()
    }

    /// Copy of the history stack.
    #[must_use]
    pub fn history(&self) -> HistoryStack {
        self.history.snapshot()
    }

    /// Whether any generation task is in flight.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.coordinator.is_busy()
    }

    // -----------------------------------------------------------------------
    // Tools, layers and pointer input
    // -----------------------------------------------------------------------

    /// Active tool.
    #[must_use]
    pub fn tool(&self) -> Tool {
        self.interaction.tool()
    }

    /// Switch tools. Selecting the crop tool opens a crop box over the whole
    /// image; leaving it discards the box.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::NoImage`] when selecting the crop tool without
    /// an image.
    pub fn set_tool(&mut self, tool: Tool) -> SessionResult<()> {
        if tool == Tool::Crop {
            if self.crop.is_none() {
                self.begin_crop()?;
            }
        } else if self.crop.take().is_some() {
            tracing::debug!("Crop box discarded by tool change");
        }
        self.interaction.set_tool(tool);
        Ok(())
    }

    /// Brush diameter in screen pixels.
    #[must_use]
    pub fn brush_size(&self) -> f32 {
        self.brush_size
    }

    /// Set the brush diameter (clamped).
    pub fn set_brush_size(&mut self, size: f32) {
        if size.is_finite() {
            self.brush_size = size.clamp(MIN_BRUSH_SIZE, MAX_BRUSH_SIZE);
        }
    }

    /// Visible layer set.
    #[must_use]
    pub fn visible_layers(&self) -> VisibleLayers {
        self.layers
    }

    /// Flip a layer's visibility and return the new value.
    pub fn toggle_layer(&mut self, kind: LayerKind) -> bool {
        self.layers.toggle(kind)
    }

    /// View transform.
    #[must_use]
    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    /// Mutable view transform, for zoom and resize.
    pub fn viewport_mut(&mut self) -> &mut Viewport {
        &mut self.viewport
    }

    /// Mask surface.
    #[must_use]
    pub fn mask(&self) -> &MaskSurface {
        &self.mask
    }

    /// Remove every mask stroke.
    pub fn clear_mask(&mut self) {
        self.mask.clear();
    }

    /// Feed one pointer event to the gesture state machine.
    pub fn handle_pointer(&mut self, event: &PointerEvent) -> InteractionOutcome {
        let mut ctx = InteractionContext {
            viewport: &mut self.viewport,
            mask: &mut self.mask,
            crop: self.crop.as_mut(),
            text: &mut self.text,
            brush_size: self.brush_size,
        };
        self.interaction.handle(event, &mut ctx)
    }

    // -----------------------------------------------------------------------
    // Crop
    // -----------------------------------------------------------------------

    /// Open a crop box covering the whole image.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::NoImage`] if no image is loaded.
    pub fn begin_crop(&mut self) -> SessionResult<CropBox> {
        if self.history.is_empty() {
            return Err(EditorError::NoImage.into());
        }
        let crop = CropBox::full().with_min_size(self.config.crop_min_size);
        self.crop = Some(crop);
        self.interaction.set_tool(Tool::Crop);
        Ok(crop)
    }

    /// Active crop box.
    #[must_use]
    pub fn crop_box(&self) -> Option<CropBox> {
        self.crop
    }

    /// Replace the crop rectangle (clamped).
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::NoCropBox`] if cropping is not active.
    pub fn set_crop_box(&mut self, x: f32, y: f32, w: f32, h: f32) -> SessionResult<CropBox> {
        let crop = self.crop.as_mut().ok_or(EditorError::NoCropBox)?;
        *crop = crop.with_rect(x, y, w, h);
        Ok(*crop)
    }

    /// Lock (`Some`) or unlock (`None`) the crop aspect ratio.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::NoCropBox`] if cropping is not active.
    pub fn lock_crop_ratio(&mut self, ratio: Option<f32>) -> SessionResult<CropBox> {
        let crop = self.crop.as_mut().ok_or(EditorError::NoCropBox)?;
        crop.lock_ratio(ratio);
        Ok(*crop)
    }

    /// Crop the current frame and push the result.
    ///
    /// # Errors
    ///
    /// Returns an error if cropping is not active, no image is loaded, or the
    /// rasterizer fails. The crop box is kept on error.
    pub async fn apply_crop(&mut self) -> SessionResult<EditFrame> {
        let crop = self.crop.ok_or(EditorError::NoCropBox)?;
        let frame = self.history.current().ok_or(EditorError::NoImage)?;
        let size = self.natural_size(&frame).await?;

        let rect = crop.to_pixel_rect(size);
        tracing::debug!(?rect, width = size.width, height = size.height, "Applying crop");
        let image = self.raster.crop(&frame, rect).await?;

        let cropped = EditFrame::new(image.to_data_uri(), FrameOrigin::Crop).with_size(image.size);
        self.commit(cropped.clone());
        self.crop = None;
        self.interaction.set_tool(Tool::Hand);
        Ok(cropped)
    }

    /// Discard the crop box without changing the image.
    pub fn cancel_crop(&mut self) {
        self.crop = None;
        if self.interaction.tool() == Tool::Crop {
            self.interaction.set_tool(Tool::Hand);
        }
    }

    async fn natural_size(&self, frame: &EditFrame) -> Result<FrameSize, BackendError> {
        match frame.size {
            Some(size) => Ok(size),
            None => self.raster.natural_size(frame).await,
        }
    }

    // -----------------------------------------------------------------------
    // Text layers
    // -----------------------------------------------------------------------

    /// Text layers, bottom first.
    #[must_use]
    pub fn text_layers(&self) -> &TextLayers {
        &self.text
    }

    /// Add a text layer on top.
    pub fn add_text_layer(&mut self, layer: TextLayer) -> TextLayerId {
        self.text.add(layer)
    }

    /// Edit a text layer in place.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::TextLayerNotFound`] for an unknown ID.
    pub fn update_text_layer(
        &mut self,
        id: TextLayerId,
        update: TextLayerUpdate,
    ) -> SessionResult<()> {
        Ok(self.text.update(id, update)?)
    }

    /// Move a text layer (clamped to the image).
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::TextLayerNotFound`] for an unknown ID.
    pub fn move_text_layer(&mut self, id: TextLayerId, x: f32, y: f32) -> SessionResult<()> {
        Ok(self.text.move_layer(id, x, y)?)
    }

    /// Delete a text layer.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::TextLayerNotFound`] for an unknown ID.
    pub fn remove_text_layer(&mut self, id: TextLayerId) -> SessionResult<TextLayer> {
        Ok(self.text.remove(id)?)
    }

    /// Bake all text layers into a new frame and clear them.
    ///
    /// Returns `None` when there is nothing to flatten.
    ///
    /// # Errors
    ///
    /// Returns an error if no image is loaded or the rasterizer fails. Layers
    /// are kept on error.
    pub async fn flatten_text(&mut self) -> SessionResult<Option<EditFrame>> {
        if self.text.is_empty() {
            return Ok(None);
        }
        let frame = self.history.current().ok_or(EditorError::NoImage)?;
        let image = self.raster.flatten_text(&frame, self.text.as_slice()).await?;

        let flattened =
            EditFrame::new(image.to_data_uri(), FrameOrigin::Flatten).with_size(image.size);
        self.commit(flattened.clone());
        self.text.clear();
        Ok(Some(flattened))
    }

    // -----------------------------------------------------------------------
    // Generation
    // -----------------------------------------------------------------------

    /// Chosen resource mode, if any.
    #[must_use]
    pub fn resource_mode(&self) -> Option<ResourceMode> {
        self.mode
    }

    /// Choose and persist the resource mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the preference cannot be written. The mode is
    /// still applied to this session.
    pub fn set_resource_mode(&mut self, mode: ResourceMode) -> SessionResult<()> {
        self.mode = Some(mode);
        self.prefs.set(RESOURCE_MODE_KEY, mode.as_str())?;
        tracing::info!(mode = %mode, "Resource mode set");
        Ok(())
    }

    /// Request a generated variant of the current image.
    ///
    /// Asks for a resource mode first if none was chosen. Once the request is
    /// admitted (and, in prepaid mode, debited) the current frame is uploaded
    /// if it is inline, and a visible non-empty mask is uploaded as a second
    /// reference image.
    ///
    /// # Errors
    ///
    /// Returns a [`GenerateError`] if the request is refused. Nothing is
    /// debited or uploaded in that case. If an upload fails after admission
    /// the credits are given back.
    pub async fn generate(&mut self, prompt: &str) -> Result<TaskId, GenerateError> {
        let (frame, mode) = match self.precheck(prompt).await {
            Ok(checked) => checked,
            Err(e) => {
                tracing::info!(reason = e.reason(), error = %e, "Generation request rejected");
                metrics::record_rejected(e.reason());
                return Err(e);
            }
        };

        let admission = self
            .coordinator
            .admit(prompt, mode, self.config.generation_cost)
            .await?;
        match self.build_request(prompt, &frame, mode).await {
            Ok(request) => self.coordinator.dispatch(admission, request).await,
            Err(e) => {
                tracing::warn!(error = %e, "Preparing reference images failed");
                self.coordinator.release(admission).await;
                metrics::record_rejected(e.reason());
                Err(e)
            }
        }
    }

    async fn precheck(&mut self, prompt: &str) -> Result<(EditFrame, ResourceMode), GenerateError> {
        if self.coordinator.is_shut_down() {
            return Err(GenerateError::ShutDown);
        }
        if prompt.trim().is_empty() {
            return Err(GenerateError::EmptyPrompt);
        }
        let frame = self.history.current().ok_or(GenerateError::NoImage)?;
        let mode = self.ensure_mode().await?;
        if !self.auth.is_authenticated() {
            self.auth.request_login();
            return Err(GenerateError::Unauthenticated);
        }
        Ok((frame, mode))
    }

    async fn build_request(
        &self,
        prompt: &str,
        frame: &EditFrame,
        mode: ResourceMode,
    ) -> Result<JobRequest, GenerateError> {
        let mut reference_images = vec![self.durable_uri(frame).await?];
        if self.layers.is_visible(LayerKind::Mask) && !self.mask.is_empty() {
            let size = self.natural_size(frame).await?;
            let coverage = self.mask.rasterize(size);
            let encoded = self.raster.encode_mask(&coverage, size).await?;
            let uploaded = self.media.upload_image(encoded.bytes).await?;
            tracing::debug!(url = %uploaded.url, "Mask uploaded");
            reference_images.push(uploaded.url);
        }

        let credential = match mode {
            ResourceMode::OwnCredential => self.config.own_credential.clone(),
            ResourceMode::Prepaid => None,
        };
        Ok(JobRequest {
            prompt: prompt.to_string(),
            reference_images,
            model_id: self.config.model_id.clone(),
            aspect_ratio: self.config.aspect_ratio.clone(),
            credential,
        })
    }

    async fn ensure_mode(&mut self) -> Result<ResourceMode, GenerateError> {
        if let Some(mode) = self.mode {
            return Ok(mode);
        }
        let mode = self
            .modes
            .choose_mode()
            .await
            .ok_or(GenerateError::ModeNotSelected)?;
        if let Err(e) = self.set_resource_mode(mode) {
            tracing::warn!(error = %e, "Failed to persist resource mode");
        }
        Ok(mode)
    }

    async fn durable_uri(&self, frame: &EditFrame) -> Result<String, BackendError> {
        if frame.is_durable() {
            return Ok(frame.uri.clone());
        }
        let bytes = decode_data_uri(&frame.uri)?;
        let uploaded = self.media.upload_image(bytes).await?;
        tracing::debug!(frame_id = %frame.id, url = %uploaded.url, "Inline frame uploaded");
        Ok(uploaded.url)
    }

    /// Subscribe to generation task events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.coordinator.subscribe()
    }

    /// Unresolved generation tasks.
    #[must_use]
    pub fn active_tasks(&self) -> Vec<GenerationTask> {
        self.coordinator.active_tasks()
    }

    /// Stop all background work. Pending tasks never push a frame after this.
    pub fn shutdown(&self) {
        self.coordinator.shutdown();
    }
}

impl Drop for EditSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn inline_uri(bytes: &[u8]) -> String {
    use base64::Engine;
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    format!("data:application/octet-stream;base64,{encoded}")
}
