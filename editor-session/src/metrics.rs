//! Session metrics.
//!
//! Emitted through the `metrics` facade. The library installs no recorder;
//! the embedding application decides where they go.

use editor_core::FrameOrigin;
use metrics::{counter, gauge};

// Metric names as constants for consistency
const GENERATION_SUBMITTED_TOTAL: &str = "editor_generation_submitted_total";
const GENERATION_REJECTED_TOTAL: &str = "editor_generation_rejected_total";
const GENERATION_COMPLETED_TOTAL: &str = "editor_generation_completed_total";
const GENERATION_POLLS_TOTAL: &str = "editor_generation_polls_total";
const GENERATION_ACTIVE: &str = "editor_generation_active";
const HISTORY_COMMITS_TOTAL: &str = "editor_history_commits_total";

/// Record a generation task that was created and submitted.
pub fn record_submitted() {
    counter!(GENERATION_SUBMITTED_TOTAL).increment(1);
}

/// Record a generation request rejected before a task existed.
///
/// # Arguments
///
/// * `reason` - "validation", "unauthenticated", "low_balance", "shutdown" or "backend"
pub fn record_rejected(reason: &str) {
    counter!(
        GENERATION_REJECTED_TOTAL,
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// Record a task reaching a terminal state.
///
/// # Arguments
///
/// * `outcome` - "succeeded", "rejected", "transport" or "remote"
pub fn record_completed(outcome: &str) {
    counter!(
        GENERATION_COMPLETED_TOTAL,
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record one status poll.
pub fn record_poll() {
    counter!(GENERATION_POLLS_TOTAL).increment(1);
}

/// Update the number of in-flight tasks.
#[allow(clippy::cast_precision_loss)]
pub fn set_active_tasks(count: usize) {
    gauge!(GENERATION_ACTIVE).set(count as f64);
}

/// Record a frame committed to history.
pub fn record_commit(origin: FrameOrigin) {
    counter!(
        HISTORY_COMMITS_TOTAL,
        "origin" => origin.as_str()
    )
    .increment(1);
}
