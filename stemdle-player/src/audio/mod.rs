//! Audio backends and the shared output graph
//!
//! The playback engine only sees three seams:
//! - [`StemOutput`]: one playable stem with its own media clock
//! - [`AudioContext`]: the shared output, which may start suspended
//! - [`StemSource`]: opens a `StemOutput` for a stem track
//!
//! Two backends implement them: `device` (symphonia decode + cpal output)
//! and `headless` (virtual clocks, no sound).

pub mod decoder;
pub mod device;
pub mod graph;
pub mod headless;
pub mod output;

use crate::error::Result;
use crate::snippet::SnippetWindow;
use crate::stems::StemTrack;
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;

pub use graph::{amplification_for, AudioGraph, GainNode};

/// One playable stem.
///
/// Times are absolute positions within the full track, in seconds.
pub trait StemOutput: Send + Sync + fmt::Debug {
    fn current_time(&self) -> f64;

    fn set_current_time(&self, seconds: f64);

    /// Start playback; may be refused by the platform
    fn play(&self) -> Result<()>;

    fn pause(&self);

    fn is_paused(&self) -> bool;

    /// Media ran out before being paused
    fn has_ended(&self) -> bool;

    /// Route this stem's signal through `gain`.
    ///
    /// A stem can be routed once; further calls return `Error::AlreadyWired`.
    fn route(&self, gain: Arc<GainNode>) -> Result<()>;

    /// Gain node this stem is routed through, if any
    fn gain(&self) -> Option<Arc<GainNode>>;

    /// Detach from the backend once the stem's song is unloaded
    fn release(&self) {}
}

/// Shared audio output
pub trait AudioContext: Send + Sync {
    fn is_suspended(&self) -> bool;

    /// Ask the platform to start (or restart) audio output
    fn resume(&self) -> BoxFuture<'_, Result<()>>;
}

/// Opens stem outputs for a round
pub trait StemSource: Send + Sync {
    fn open<'a>(
        &'a self,
        track: &'a StemTrack,
        window: SnippetWindow,
    ) -> BoxFuture<'a, Result<Arc<dyn StemOutput>>>;
}
