//! Snippet playback: transport, cutoff timers, position tracking

pub mod engine;
pub mod session;
mod timers;
pub mod tracker;

pub use engine::PlaybackEngine;
pub use session::{AggregateState, PlaybackSession, PlaybackSnapshot, StemStatus};
pub use tracker::needs_correction;
