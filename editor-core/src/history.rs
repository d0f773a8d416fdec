//! # Edit History
//!
//! Append/rewind stack of [`EditFrame`]s with a cursor. The frame at the
//! cursor is the one rendered as the base image.
//!
//! ```text
//! push(D) with cursor on B:
//!
//!   [A, B, C]          [A, B, D]
//!       ^         ->         ^
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::frame::EditFrame;

/// Default number of frames retained before the oldest is evicted.
pub const DEFAULT_HISTORY_CAPACITY: usize = 20;

/// Capacity-bounded undo/redo stack of frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryStack {
    frames: VecDeque<EditFrame>,
    /// Index of the displayed frame. Meaningless while `frames` is empty.
    cursor: usize,
    capacity: usize,
}

impl Default for HistoryStack {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryStack {
    /// Create an empty stack with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    /// Create an empty stack holding at most `capacity` frames (minimum 1).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            frames: VecDeque::new(),
            cursor: 0,
            capacity: capacity.max(1),
        }
    }

    /// Commit a frame.
    ///
    /// Frames after the cursor are discarded, the new frame becomes the tail
    /// and the cursor moves onto it. The oldest frames are evicted once the
    /// capacity is exceeded.
    pub fn push(&mut self, frame: EditFrame) {
        if !self.frames.is_empty() {
            self.frames.truncate(self.cursor + 1);
        }
        self.frames.push_back(frame);

        while self.frames.len() > self.capacity {
            self.frames.pop_front();
        }
        self.cursor = self.frames.len() - 1;
    }

    /// Replace the whole history with a single frame.
    pub fn reset(&mut self, frame: EditFrame) {
        self.frames.clear();
        self.frames.push_back(frame);
        self.cursor = 0;
    }

    /// Step back one frame. Saturates at the oldest frame.
    ///
    /// Returns `true` if the cursor moved.
    pub fn undo(&mut self) -> bool {
        if self.can_undo() {
            self.cursor -= 1;
            true
        } else {
            false
        }
    }

    /// Step forward one frame. Saturates at the newest frame.
    ///
    /// Returns `true` if the cursor moved.
    pub fn redo(&mut self) -> bool {
        if self.can_redo() {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    /// The displayed frame, or `None` when empty.
    #[must_use]
    pub fn current(&self) -> Option<&EditFrame> {
        self.frames.get(self.cursor)
    }

    /// Whether [`undo`](Self::undo) would move the cursor.
    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.frames.is_empty() && self.cursor > 0
    }

    /// Whether [`redo`](Self::redo) would move the cursor.
    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.frames.is_empty() && self.cursor < self.frames.len() - 1
    }

    /// Cursor position, or `None` when empty.
    #[must_use]
    pub fn cursor(&self) -> Option<usize> {
        (!self.frames.is_empty()).then_some(self.cursor)
    }

    /// Number of frames held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether the stack holds no frames.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Maximum number of frames retained.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// All frames, oldest first.
    pub fn frames(&self) -> impl Iterator<Item = &EditFrame> {
        self.frames.iter()
    }

    /// Drop every frame.
    pub fn clear(&mut self) {
        self.frames.clear();
        self.cursor = 0;
    }
}

/// Cloneable handle to a history stack shared between the interaction layer,
/// the generation coordinator and the session facade.
///
/// Every commit goes through [`SharedHistory::push`].
#[derive(Debug, Clone, Default)]
pub struct SharedHistory {
    inner: Arc<RwLock<HistoryStack>>,
}

impl SharedHistory {
    /// Wrap a history stack.
    #[must_use]
    pub fn new(stack: HistoryStack) -> Self {
        Self {
            inner: Arc::new(RwLock::new(stack)),
        }
    }

    /// Create an empty shared stack with the given capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(HistoryStack::with_capacity(capacity))
    }

    /// Commit a frame.
    pub fn push(&self, frame: EditFrame) {
        let origin = frame.origin;
        let id = frame.id;
        let mut stack = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        stack.push(frame);
        tracing::debug!(
            frame_id = %id,
            origin = origin.as_str(),
            len = stack.len(),
            "Committed frame"
        );
    }

    /// Replace the history with a single frame.
    pub fn reset(&self, frame: EditFrame) {
        self.write(|stack| stack.reset(frame));
    }

    /// Step back one frame.
    pub fn undo(&self) -> bool {
        self.write(HistoryStack::undo)
    }

    /// Step forward one frame.
    pub fn redo(&self) -> bool {
        self.write(HistoryStack::redo)
    }

    /// Clone of the displayed frame.
    #[must_use]
    pub fn current(&self) -> Option<EditFrame> {
        self.read(|stack| stack.current().cloned())
    }

    /// Whether undo is possible right now.
    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.read(HistoryStack::can_undo)
    }

    /// Whether redo is possible right now.
    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.read(HistoryStack::can_redo)
    }

    /// Number of frames held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read(HistoryStack::len)
    }

    /// Whether no frame is loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read(HistoryStack::is_empty)
    }

    /// Copy of the underlying stack.
    #[must_use]
    pub fn snapshot(&self) -> HistoryStack {
        self.read(Clone::clone)
    }

    /// Run a closure with shared access to the stack.
    pub fn read<R>(&self, f: impl FnOnce(&HistoryStack) -> R) -> R {
        let stack = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f(&stack)
    }

    fn write<R>(&self, f: impl FnOnce(&mut HistoryStack) -> R) -> R {
        let mut stack = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut stack)
    }
}
