//! Session configuration.

use serde::{Deserialize, Serialize};

use editor_core::{DEFAULT_HISTORY_CAPACITY, DOUBLE_CLICK_WINDOW_MS, MIN_CROP_SIZE};

/// Default credits charged per generation.
pub const DEFAULT_GENERATION_COST: u64 = 150;

/// Default generation model.
pub const DEFAULT_MODEL_ID: &str = "image-edit-v1";

/// Default aspect ratio sent with jobs.
pub const DEFAULT_ASPECT_RATIO: &str = "1:1";

/// Cadence of job status polling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Delay before the first poll, in milliseconds.
    pub initial_delay_ms: u64,
    /// Upper bound on the delay between polls, in milliseconds.
    pub max_delay_ms: u64,
    /// Growth factor per poll. `1.0` keeps a fixed cadence.
    pub multiplier: f64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 5_000,
            max_delay_ms: 5_000,
            multiplier: 1.0,
        }
    }
}

impl PollConfig {
    /// Largest accepted growth factor.
    pub const MAX_MULTIPLIER: f64 = 4.0;

    /// A fixed cadence.
    #[must_use]
    pub fn fixed(interval_ms: u64) -> Self {
        Self {
            initial_delay_ms: interval_ms,
            max_delay_ms: interval_ms,
            multiplier: 1.0,
        }
    }

    /// Delay before poll number `attempt` (0-indexed).
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss,
        clippy::cast_possible_wrap
    )]
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        let multiplier = if self.multiplier.is_finite() {
            self.multiplier.clamp(1.0, Self::MAX_MULTIPLIER)
        } else {
            1.0
        };
        let ceiling = self.max_delay_ms.max(self.initial_delay_ms);
        let exponent = attempt.min(64) as i32;
        let base = self.initial_delay_ms as f64 * multiplier.powi(exponent);
        base.min(ceiling as f64) as u64
    }
}

/// Tunables for an editing session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum number of history frames.
    pub history_capacity: usize,
    /// Double-click window for text layers, in milliseconds.
    pub double_click_window_ms: u64,
    /// Minimum crop width/height in percent.
    pub crop_min_size: f32,
    /// Initial brush diameter in screen pixels.
    pub default_brush_size: f32,
    /// Credits charged per generation in prepaid mode.
    pub generation_cost: u64,
    /// Generation model.
    pub model_id: String,
    /// Aspect ratio sent with jobs.
    pub aspect_ratio: String,
    /// Status poll cadence.
    pub poll: PollConfig,
    /// Credential sent with jobs in own-credential mode.
    #[serde(skip_serializing)]
    pub own_credential: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            double_click_window_ms: DOUBLE_CLICK_WINDOW_MS,
            crop_min_size: MIN_CROP_SIZE,
            default_brush_size: 24.0,
            generation_cost: DEFAULT_GENERATION_COST,
            model_id: DEFAULT_MODEL_ID.to_string(),
            aspect_ratio: DEFAULT_ASPECT_RATIO.to_string(),
            poll: PollConfig::default(),
            own_credential: None,
        }
    }
}

impl SessionConfig {
    /// Defaults with `EDITOR_*` environment overrides applied.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a key lookup. Unparseable values are logged and
    /// ignored.
    #[must_use]
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: std::str::FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            key: &str,
        ) -> Option<T> {
            let raw = lookup(key)?;
            match raw.trim().parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!(key, value = %raw, "Ignoring invalid config override");
                    None
                }
            }
        }

        if let Some(v) = parsed(&lookup, "EDITOR_HISTORY_CAPACITY") {
            self.history_capacity = v;
        }
        if let Some(v) = parsed(&lookup, "EDITOR_DOUBLE_CLICK_WINDOW_MS") {
            self.double_click_window_ms = v;
        }
        if let Some(v) = parsed(&lookup, "EDITOR_CROP_MIN_SIZE") {
            self.crop_min_size = v;
        }
        if let Some(v) = parsed(&lookup, "EDITOR_BRUSH_SIZE") {
            self.default_brush_size = v;
        }
        if let Some(v) = parsed(&lookup, "EDITOR_GENERATION_COST") {
            self.generation_cost = v;
        }
        if let Some(v) = lookup("EDITOR_MODEL_ID") {
            self.model_id = v;
        }
        if let Some(v) = lookup("EDITOR_ASPECT_RATIO") {
            self.aspect_ratio = v;
        }
        if let Some(v) = parsed::<u64>(&lookup, "EDITOR_POLL_INTERVAL_MS") {
            self.poll = PollConfig::fixed(v);
        }
        if let Some(v) = lookup("EDITOR_OWN_CREDENTIAL").filter(|v| !v.is_empty()) {
            self.own_credential = Some(v);
        }
        self
    }
}
