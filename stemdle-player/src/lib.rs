//! # Stemdle Player Library (stemdle-player)
//!
//! Client core of the stem-guessing game.
//!
//! **Purpose:** Play a fixed-length snippet of a song split into stems, with
//! per-stem transport and volume, keep the stems in sync, and score the
//! listener's guess against the game backend.
//!
//! **Architecture:** One `PlaybackEngine` drives every stem through the
//! `audio` traits (cpal/symphonia device backend or virtual clocks), with
//! cutoff timers and a drift-correcting position tracker on tokio.
//! `GameSession` runs rounds against the backend over reqwest.

pub mod api;
pub mod audio;
pub mod config;
pub mod console;
pub mod error;
pub mod game;
pub mod playback;
pub mod report;
pub mod scoring;
pub mod snippet;
pub mod state;
pub mod stems;

pub use error::{Error, Result};
pub use state::SharedState;
