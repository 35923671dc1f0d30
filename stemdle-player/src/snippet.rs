//! Snippet window
//!
//! Fixed-length clip boundaries within the full track. Transport works in
//! relative time (0..length); stems are positioned in absolute time
//! (`start_offset + relative`).

use serde::Serialize;
use stemdle_common::models::RandomSong;

/// Playable clip of one round
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SnippetWindow {
    start_offset: f64,
    length: f64,
}

impl SnippetWindow {
    pub const DEFAULT_LENGTH: f64 = 15.0;

    /// Window starting at `start_offset` seconds into the track.
    ///
    /// Negative or non-finite offsets are treated as 0; a length that is not
    /// a positive number becomes [`Self::DEFAULT_LENGTH`].
    pub fn new(start_offset: f64, length: f64) -> Self {
        let start_offset = if start_offset.is_finite() && start_offset > 0.0 {
            start_offset
        } else {
            0.0
        };
        let length = if length.is_finite() && length > 0.0 {
            length
        } else {
            Self::DEFAULT_LENGTH
        };
        Self {
            start_offset,
            length,
        }
    }

    /// Use the server-assigned clip start verbatim, or 0 when absent
    pub fn resolve(song: &RandomSong, length: f64) -> Self {
        Self::new(song.clip_start_time.unwrap_or(0.0), length)
    }

    pub fn start_offset(&self) -> f64 {
        self.start_offset
    }

    pub fn length(&self) -> f64 {
        self.length
    }

    /// Clamp a relative position into `[0, length]`
    pub fn clamp(&self, relative: f64) -> f64 {
        if relative.is_nan() {
            return 0.0;
        }
        relative.clamp(0.0, self.length)
    }

    /// Absolute track time for a (clamped) relative position
    pub fn to_absolute(&self, relative: f64) -> f64 {
        self.start_offset + self.clamp(relative)
    }

    /// Relative position for an absolute track time, not clamped
    pub fn to_relative(&self, absolute: f64) -> f64 {
        absolute - self.start_offset
    }

    /// Seconds left until the snippet end from a relative position
    pub fn remaining(&self, relative: f64) -> f64 {
        self.length - self.clamp(relative)
    }
}
