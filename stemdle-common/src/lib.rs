//! # Stemdle Common Library
//!
//! Shared code for the stem-guessing game:
//! - Wire models for the song catalog, guess scoring and rating endpoints
//! - Stem vocabulary and the stem URL naming convention
//! - Event types (GameEvent enum)
//! - Configuration file resolution
//! - Time and music display helpers

pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod stems;
pub mod time;

pub use error::{Error, Result};
pub use stems::StemKind;
