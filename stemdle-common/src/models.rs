//! Wire models for the game backend
//!
//! Shapes follow the backend's JSON contract:
//! - `GET /songs` → `Vec<Song>`
//! - `GET /songs/random?snippet_length=N` → `RandomSong`
//! - `POST /guess` with `GuessRequest` → `GuessResponse`
//! - `PATCH /users/{id}/elo` with `RatingUpdate`

use crate::stems::{derive_stem_url, StemKind};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Song as listed in the catalog
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Song {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "deserialize_artists")]
    pub artists: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub metadata: Option<SongMetadata>,
    #[serde(default)]
    pub url_original: Option<String>,
    #[serde(default)]
    pub url_drum: Option<String>,
    #[serde(default)]
    pub url_bass: Option<String>,
    #[serde(default)]
    pub url_piano: Option<String>,
    #[serde(default)]
    pub url_guitar: Option<String>,
    #[serde(default)]
    pub url_vocals: Option<String>,
    #[serde(default)]
    pub url_other: Option<String>,
}

impl Song {
    /// URL explicitly provided for a stem (empty strings count as absent)
    pub fn explicit_stem_url(&self, kind: StemKind) -> Option<&str> {
        let url = match kind {
            StemKind::Drum => &self.url_drum,
            StemKind::Bass => &self.url_bass,
            StemKind::Piano => &self.url_piano,
            StemKind::Guitar => &self.url_guitar,
            StemKind::Vocals => &self.url_vocals,
            StemKind::Other => &self.url_other,
        };
        url.as_deref().filter(|u| !u.is_empty())
    }

    /// Stem URL: the explicit one, else derived from `url_original`
    pub fn stem_url(&self, kind: StemKind) -> Option<String> {
        if let Some(url) = self.explicit_stem_url(kind) {
            return Some(url.to_string());
        }
        self.url_original
            .as_deref()
            .filter(|u| !u.is_empty())
            .map(|original| derive_stem_url(original, kind))
    }

    /// Full-mix audio URL: `url_original`, else the backend's file route
    pub fn audio_url(&self, api_base: &str) -> Option<String> {
        if let Some(original) = self.url_original.as_deref().filter(|u| !u.is_empty()) {
            return Some(original.to_string());
        }
        self.filename
            .as_deref()
            .map(|f| format!("{}/songs/{}", api_base.trim_end_matches('/'), f))
    }

    /// Name plus artists, for pickers and reports
    pub fn display_name(&self) -> String {
        match &self.artists {
            Some(artists) if !artists.is_empty() => format!("{} - {}", self.name, artists),
            _ => self.name.clone(),
        }
    }
}

/// Song chosen for a round, with its server-assigned clip offset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomSong {
    #[serde(flatten)]
    pub song: Song,
    /// Absolute clip start within the full track, in seconds
    #[serde(default)]
    pub clip_start_time: Option<f64>,
}

/// Body of `POST /guess`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuessRequest {
    pub actual_song_id: String,
    pub guessed_song_id: String,
    pub clip_start_time: f64,
}

/// Minimal song reference inside a guess response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SongRef {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "deserialize_artists")]
    pub artists: Option<String>,
}

/// Result of `POST /guess`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuessResponse {
    /// Likeness between the guessed and actual song, 0–100
    pub similarity_score: f64,
    #[serde(default)]
    pub message: String,
    /// Per-feature match percentages (e.g. "Tempo Match" → 80)
    #[serde(default)]
    pub breakdown: BTreeMap<String, f64>,
    #[serde(default)]
    pub actual_song: SongRef,
    #[serde(default)]
    pub guessed_song: SongRef,
    #[serde(default)]
    pub actual_song_metadata: Option<SongMetadata>,
    #[serde(default)]
    pub guessed_song_metadata: Option<SongMetadata>,
}

impl GuessResponse {
    /// Similarity rounded to an integer in 0..=100
    pub fn similarity_points(&self) -> i64 {
        if self.similarity_score.is_finite() {
            (self.similarity_score.round() as i64).clamp(0, 100)
        } else {
            0
        }
    }

    /// Breakdown percentage for a feature, 0 when absent
    pub fn breakdown_percent(&self, feature: &str) -> f64 {
        self.breakdown.get(feature).copied().unwrap_or(0.0)
    }
}

/// Audio features attached to a song
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SongMetadata {
    /// Pitch class, 0 = C … 11 = B
    #[serde(default)]
    pub key: Option<i32>,
    /// 1 = major, 0 = minor
    #[serde(default)]
    pub mode: Option<i32>,
    #[serde(default)]
    pub tempo: Option<f64>,
    #[serde(default)]
    pub energy: Option<f64>,
    #[serde(default)]
    pub valence: Option<f64>,
    #[serde(default)]
    pub loudness: Option<f64>,
    /// Remaining features (danceability, acousticness, ...)
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl SongMetadata {
    /// Key and mode, e.g. "F♯/G♭ Minor"
    pub fn key_label(&self) -> String {
        let key = self.key.map(key_name).unwrap_or("Unknown");
        format!("{} {}", key, mode_name(self.mode.unwrap_or(0)))
    }
}

/// Body of `PATCH /users/{id}/elo`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingUpdate {
    pub elo_rating: i64,
}

/// Body of `GET /health`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
}

/// Error body returned by the backend on failure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub error: Option<String>,
}

const KEY_NAMES: [&str; 12] = [
    "C", "C♯/D♭", "D", "D♯/E♭", "E", "F", "F♯/G♭", "G", "G♯/A♭", "A", "A♯/B♭", "B",
];

/// Name of a pitch class; `Unknown` outside 0..=11
pub fn key_name(pitch_class: i32) -> &'static str {
    usize::try_from(pitch_class)
        .ok()
        .and_then(|i| KEY_NAMES.get(i).copied())
        .unwrap_or("Unknown")
}

pub fn mode_name(mode: i32) -> &'static str {
    if mode == 1 {
        "Major"
    } else {
        "Minor"
    }
}

/// Artists arrive either as a string or as a list of names
fn deserialize_artists<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Artists {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<Artists>::deserialize(deserializer)? {
        Some(Artists::One(name)) => Some(name),
        Some(Artists::Many(names)) => Some(names.join(", ")),
        None => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_names() {
        assert_eq!(key_name(0), "C");
        assert_eq!(key_name(6), "F♯/G♭");
        assert_eq!(key_name(11), "B");
        assert_eq!(key_name(12), "Unknown");
        assert_eq!(key_name(-1), "Unknown");
    }

    #[test]
    fn test_key_label() {
        let meta = SongMetadata {
            key: Some(9),
            mode: Some(0),
            ..Default::default()
        };
        assert_eq!(meta.key_label(), "A Minor");

        let meta = SongMetadata {
            key: Some(7),
            mode: Some(1),
            ..Default::default()
        };
        assert_eq!(meta.key_label(), "G Major");
    }

    #[test]
    fn test_explicit_stem_url_wins_over_derived() {
        let song = Song {
            id: "1".to_string(),
            url_original: Some("https://cdn/x/song.mp3".to_string()),
            url_bass: Some("https://cdn/x/custom-bass.wav".to_string()),
            ..Default::default()
        };
        assert_eq!(song.stem_url(StemKind::Bass).as_deref(), Some("https://cdn/x/custom-bass.wav"));
        assert_eq!(song.stem_url(StemKind::Drum).as_deref(), Some("https://cdn/x/song-drums.wav"));
    }

    #[test]
    fn test_empty_explicit_url_falls_back() {
        let song = Song {
            id: "1".to_string(),
            url_original: Some("a/b.mp3".to_string()),
            url_piano: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(song.stem_url(StemKind::Piano).as_deref(), Some("a/b-piano.wav"));
    }

    #[test]
    fn test_no_urls_means_no_stems() {
        let song = Song {
            id: "1".to_string(),
            ..Default::default()
        };
        assert!(StemKind::ALL.iter().all(|k| song.stem_url(*k).is_none()));
    }

    #[test]
    fn test_audio_url_fallback() {
        let mut song = Song {
            id: "a.m4a".to_string(),
            filename: Some("a.m4a".to_string()),
            ..Default::default()
        };
        assert_eq!(
            song.audio_url("http://localhost:5001/api/").as_deref(),
            Some("http://localhost:5001/api/songs/a.m4a")
        );
        song.url_original = Some("https://cdn/a.mp3".to_string());
        assert_eq!(song.audio_url("http://x").as_deref(), Some("https://cdn/a.mp3"));
    }

    #[test]
    fn test_similarity_points_rounds_and_clamps() {
        let mut response: GuessResponse = serde_json::from_str(
            r#"{"similarity_score": 84.6, "actual_song": {"name": "A"}, "guessed_song": {"name": "B"}}"#,
        )
        .unwrap();
        assert_eq!(response.similarity_points(), 85);
        response.similarity_score = 130.0;
        assert_eq!(response.similarity_points(), 100);
        response.similarity_score = -4.0;
        assert_eq!(response.similarity_points(), 0);
    }
}
