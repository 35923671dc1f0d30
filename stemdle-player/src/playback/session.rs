//! Playback session state and published snapshots

use crate::snippet::SnippetWindow;
use crate::stems::StemRegistry;
use serde::Serialize;
use std::collections::BTreeMap;
use stemdle_common::StemKind;

/// Transport state of the loaded song
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackSession {
    /// Relative playhead, always within `[0, length]`
    pub position: f64,
    playing: BTreeMap<StemKind, bool>,
}

impl PlaybackSession {
    /// Fresh session for a newly loaded song: position 0, nothing playing
    pub fn reset(&mut self, kinds: impl IntoIterator<Item = StemKind>) {
        self.position = 0.0;
        self.playing = kinds.into_iter().map(|kind| (kind, false)).collect();
    }

    /// No song loaded
    pub fn clear(&mut self) {
        self.position = 0.0;
        self.playing.clear();
    }

    pub fn is_playing(&self, kind: StemKind) -> bool {
        self.playing.get(&kind).copied().unwrap_or(false)
    }

    pub fn set_playing(&mut self, kind: StemKind, playing: bool) {
        if let Some(flag) = self.playing.get_mut(&kind) {
            *flag = playing;
        }
    }

    pub fn any_playing(&self) -> bool {
        self.playing.values().any(|p| *p)
    }

    /// True when there is at least one stem and every stem is playing
    pub fn all_playing(&self) -> bool {
        !self.playing.is_empty() && self.playing.values().all(|p| *p)
    }

    pub fn playing_kinds(&self) -> Vec<StemKind> {
        self.playing
            .iter()
            .filter(|(_, playing)| **playing)
            .map(|(kind, _)| *kind)
            .collect()
    }

    pub fn aggregate(&self) -> AggregateState {
        if self.all_playing() {
            AggregateState::AllPlaying
        } else if self.any_playing() {
            AggregateState::SomePlaying
        } else {
            AggregateState::AllStopped
        }
    }
}

/// What the global transport control shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateState {
    AllPlaying,
    SomePlaying,
    AllStopped,
}

/// Per-stem view for observers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StemStatus {
    pub kind: StemKind,
    pub label: String,
    pub playing: bool,
    pub volume_percent: u8,
    pub ever_unmuted: bool,
}

/// Published view of the transport
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackSnapshot {
    /// Relative playhead in seconds
    pub position: f64,
    /// Snippet length (0 when nothing is loaded)
    pub length: f64,
    /// Absolute start of the snippet within the track
    pub start_offset: f64,
    pub state: AggregateState,
    pub stems: Vec<StemStatus>,
}

impl Default for PlaybackSnapshot {
    fn default() -> Self {
        Self {
            position: 0.0,
            length: 0.0,
            start_offset: 0.0,
            state: AggregateState::AllStopped,
            stems: Vec::new(),
        }
    }
}

impl PlaybackSnapshot {
    pub fn capture(
        session: &PlaybackSession,
        registry: &StemRegistry,
        window: Option<&SnippetWindow>,
    ) -> Self {
        let stems = registry
            .tracks()
            .iter()
            .map(|track| StemStatus {
                kind: track.kind,
                label: track.label.clone(),
                playing: session.is_playing(track.kind),
                volume_percent: track.volume_percent(),
                ever_unmuted: track.ever_unmuted(),
            })
            .collect();

        Self {
            position: session.position,
            length: window.map_or(0.0, SnippetWindow::length),
            start_offset: window.map_or(0.0, SnippetWindow::start_offset),
            state: session.aggregate(),
            stems,
        }
    }

    /// "Play All" control reads as playing only when every stem plays
    pub fn all_playing(&self) -> bool {
        self.state == AggregateState::AllPlaying
    }

    pub fn stem(&self, kind: StemKind) -> Option<&StemStatus> {
        self.stems.iter().find(|s| s.kind == kind)
    }
}
