//! Stem vocabulary shared by the backend contract and the player
//!
//! A song is split into six stems. Each stem has a wire field name
//! (`url_drum`, ...), a display label (`Drums`, ...) and a file suffix used
//! to derive its URL from the song's original audio URL.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One isolated instrumental or vocal component of a song
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StemKind {
    Drum,
    Bass,
    Piano,
    Guitar,
    Vocals,
    Other,
}

impl StemKind {
    /// All stems in display order
    pub const ALL: [StemKind; 6] = [
        StemKind::Drum,
        StemKind::Bass,
        StemKind::Piano,
        StemKind::Guitar,
        StemKind::Vocals,
        StemKind::Other,
    ];

    /// Field name carrying this stem's URL in song objects
    pub fn field(&self) -> &'static str {
        match self {
            StemKind::Drum => "url_drum",
            StemKind::Bass => "url_bass",
            StemKind::Piano => "url_piano",
            StemKind::Guitar => "url_guitar",
            StemKind::Vocals => "url_vocals",
            StemKind::Other => "url_other",
        }
    }

    /// Display label; also the identity used for scoring
    pub fn label(&self) -> &'static str {
        match self {
            StemKind::Drum => "Drums",
            StemKind::Bass => "Bass",
            StemKind::Piano => "Piano",
            StemKind::Guitar => "Guitar",
            StemKind::Vocals => "Vocals",
            StemKind::Other => "Other",
        }
    }

    /// Suffix appended to the original file name when deriving stem URLs
    pub fn suffix(&self) -> &'static str {
        match self {
            StemKind::Drum => "drums",
            StemKind::Bass => "bass",
            StemKind::Piano => "piano",
            StemKind::Guitar => "guitar",
            StemKind::Vocals => "vocals",
            StemKind::Other => "other",
        }
    }

    pub fn is_vocals(&self) -> bool {
        matches!(self, StemKind::Vocals)
    }
}

impl fmt::Display for StemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for StemKind {
    type Err = Error;

    /// Accepts the label, the suffix, the lowercase variant name or the wire
    /// field name, case-insensitively.
    fn from_str(s: &str) -> Result<Self> {
        let needle = s.trim().to_ascii_lowercase();
        StemKind::ALL
            .into_iter()
            .find(|kind| {
                needle == kind.label().to_ascii_lowercase()
                    || needle == kind.suffix()
                    || needle == kind.field()
                    || needle == format!("{:?}", kind).to_ascii_lowercase()
            })
            .ok_or_else(|| Error::InvalidInput(format!("Unknown stem: {}", s)))
    }
}

/// Derive a stem URL from the song's original audio URL.
///
/// `.../track.mp3` becomes `.../track-drums.wav`. Only a dot in the last path
/// segment counts as an extension separator, and a leading dot (hidden file)
/// does not.
pub fn derive_stem_url(original: &str, kind: StemKind) -> String {
    let segment_start = original.rfind('/').map(|i| i + 1).unwrap_or(0);
    let base = match original[segment_start..].rfind('.') {
        Some(dot) if dot > 0 => &original[..segment_start + dot],
        _ => original,
    };
    format!("{}-{}.wav", base, kind.suffix())
}
