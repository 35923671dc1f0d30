//! Error types for stemdle-player
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use stemdle_common::StemKind;
use thiserror::Error;

/// Main error type for stemdle-player
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport-level HTTP failure (connect, timeout, body read)
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Backend answered with a non-success status
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Audio decoding errors
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// A stem refused a transport command (e.g. autoplay policy)
    #[error("Playback error: {0}")]
    Playback(String),

    /// Operation named a stem that is not loaded
    #[error("Stem not loaded: {0}")]
    StemNotFound(StemKind),

    /// Stem output is already routed into the audio graph
    #[error("Stem already wired into the audio graph: {0}")]
    AlreadyWired(StemKind),

    /// Audio graph has been shut down
    #[error("Audio graph is closed")]
    GraphClosed,

    /// Guess submitted without choosing a song
    #[error("Please select a song guess")]
    MissingGuess,

    /// Guess submitted while no round is loaded
    #[error("No song is currently loaded")]
    NoActiveSong,

    /// Confirmation requested with no scored guess pending
    #[error("No scored guess to confirm")]
    NoPendingScore,

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding/decoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors from the shared library
    #[error(transparent)]
    Common(#[from] stemdle_common::Error),
}

/// Convenience Result type using stemdle-player Error
pub type Result<T> = std::result::Result<T, Error>;
