// src/history.rs
//
// Bounded, newest-first store of recent frames.
// Readers only ever get a filtered copy (snapshot), never a reference into the store.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::io::Frame;

/// Number of frames kept when no capacity is configured
pub const DEFAULT_CAPACITY: usize = 50;

/// Case-insensitive substring filter over frame ids
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameFilter {
    /// Filter is only applied when enabled
    pub enabled: bool,
    /// Substring to look for in the id
    pub text: String,
}

impl FrameFilter {
    /// A filter that passes every frame
    pub fn disabled() -> Self {
        Self::default()
    }

    /// An enabled filter on `text`
    pub fn id_contains(text: impl Into<String>) -> Self {
        FrameFilter {
            enabled: true,
            text: text.into(),
        }
    }

    /// Whether the filter narrows anything at all
    pub fn is_active(&self) -> bool {
        self.enabled && !self.text.is_empty()
    }
}

/// Filter predicate with the needle lowered once per snapshot
struct IdMatcher {
    needle: Option<String>,
}

impl IdMatcher {
    fn new(filter: &FrameFilter) -> Self {
        IdMatcher {
            needle: filter.is_active().then(|| filter.text.to_lowercase()),
        }
    }

    fn matches(&self, frame: &Frame) -> bool {
        match &self.needle {
            Some(needle) => frame.id.to_lowercase().contains(needle.as_str()),
            None => true,
        }
    }
}

/// Fixed-capacity frame history. Index 0 is the newest frame.
#[derive(Debug)]
pub struct FrameHistory {
    frames: VecDeque<Frame>,
    capacity: usize,
}

impl Default for FrameHistory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl FrameHistory {
    /// Create a history holding at most `capacity` frames (at least one).
    /// Storage grows on demand past the default size.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        FrameHistory {
            frames: VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY) + 1),
            capacity,
        }
    }

    /// Prepend a frame, dropping the oldest ones past capacity.
    pub fn insert_front(&mut self, frame: Frame) {
        self.frames.push_front(frame);
        if self.frames.len() > self.capacity {
            self.frames.truncate(self.capacity);
        }
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    /// Copy of the frames passing `filter`, newest first.
    pub fn snapshot(&self, filter: &FrameFilter) -> Vec<Frame> {
        let matcher = IdMatcher::new(filter);
        self.frames
            .iter()
            .filter(|frame| matcher.matches(frame))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
