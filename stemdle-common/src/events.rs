//! Event types for the Stemdle event system
//!
//! Events are broadcast by the player to any observer (console, UI, logs).
//! They describe what happened; observers never mutate playback through them.

use crate::stems::StemKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a stem stopped playing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Listener paused it
    Paused,
    /// Its cutoff timer fired at the snippet boundary
    SnippetEnd,
    /// Listener restarted it back to the clip start
    Restarted,
    /// The underlying media ran out before the snippet end
    MediaEnded,
    /// The platform refused to start playback
    Rejected,
}

/// Stemdle event types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GameEvent {
    /// A new song's stems were loaded into the engine
    SongLoaded {
        song_id: String,
        stem_count: usize,
        clip_start_time: f64,
        timestamp: DateTime<Utc>,
    },

    /// A stem started playing from the given relative position
    StemStarted {
        stem: StemKind,
        position: f64,
        timestamp: DateTime<Utc>,
    },

    /// A stem stopped playing
    StemStopped {
        stem: StemKind,
        reason: StopReason,
        timestamp: DateTime<Utc>,
    },

    /// A stem's volume percentage changed
    VolumeChanged {
        stem: StemKind,
        percent: u8,
        timestamp: DateTime<Utc>,
    },

    /// The playhead was moved by the listener
    Seeked {
        position: f64,
        timestamp: DateTime<Utc>,
    },

    /// A guess was scored
    GuessScored {
        similarity_score: i64,
        final_points: i64,
        rating_after: i64,
        timestamp: DateTime<Utc>,
    },

    /// The listener's rating changed
    RatingUpdated {
        rating: i64,
        persisted: bool,
        timestamp: DateTime<Utc>,
    },

    /// Loading a round or scoring a guess failed
    RoundFailed {
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl GameEvent {
    /// Event type name as it appears in the serialized `type` tag
    pub fn event_type(&self) -> &'static str {
        match self {
            GameEvent::SongLoaded { .. } => "SongLoaded",
            GameEvent::StemStarted { .. } => "StemStarted",
            GameEvent::StemStopped { .. } => "StemStopped",
            GameEvent::VolumeChanged { .. } => "VolumeChanged",
            GameEvent::Seeked { .. } => "Seeked",
            GameEvent::GuessScored { .. } => "GuessScored",
            GameEvent::RatingUpdated { .. } => "RatingUpdated",
            GameEvent::RoundFailed { .. } => "RoundFailed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = GameEvent::StemStopped {
            stem: StemKind::Vocals,
            reason: StopReason::SnippetEnd,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "StemStopped");
        assert_eq!(json["stem"], "vocals");
        assert_eq!(json["reason"], "snippet_end");
        assert_eq!(event.event_type(), "StemStopped");
    }

    #[test]
    fn test_event_roundtrip() {
        let event = GameEvent::GuessScored {
            similarity_score: 85,
            final_points: 65,
            rating_after: 1265,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: GameEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
