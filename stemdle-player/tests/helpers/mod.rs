//! Shared fixtures for stemdle-player integration tests
//!
//! - MockBackend: in-process game backend on an ephemeral port
//! - audio_generator: deterministic WAV stems
//! - fixtures: headless engines and sessions

#![allow(dead_code)]

pub mod audio_generator;
pub mod fixtures;
pub mod mock_backend;

pub use fixtures::{
    drain_events, headless_engine, random_song, song, stop_reasons, EngineFixture, SessionFixture,
    INITIAL_RATING,
};
pub use mock_backend::MockBackend;
