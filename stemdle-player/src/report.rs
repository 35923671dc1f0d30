//! Plain-text guess result report

use crate::scoring::ScoreResult;
use std::fmt::Write;
use stemdle_common::models::{GuessResponse, SongMetadata, SongRef};

/// Breakdown entries paired with each metadata comparison row
const FEATURE_ROWS: [(&str, &str); 5] = [
    ("Key", "Key Match"),
    ("Tempo", "Tempo Match"),
    ("Energy", "Energy Match"),
    ("Valence", "Mood Match"),
    ("Loudness", "Loudness Match"),
];

fn song_line(song: &SongRef) -> String {
    match song.artists.as_deref() {
        Some(artists) if !artists.is_empty() => format!("{} by {}", song.name, artists),
        _ => song.name.clone(),
    }
}

fn feature_value(metadata: &SongMetadata, feature: &str) -> String {
    match feature {
        "Key" => metadata.key_label(),
        "Tempo" => metadata
            .tempo
            .map_or_else(|| "-".to_string(), |t| format!("{:.0} BPM", t)),
        "Energy" => metadata
            .energy
            .map_or_else(|| "-".to_string(), |e| format!("{:.0}%", e * 100.0)),
        "Valence" => metadata
            .valence
            .map_or_else(|| "-".to_string(), |v| format!("{:.0}%", v * 100.0)),
        "Loudness" => metadata
            .loudness
            .map_or_else(|| "-".to_string(), |l| format!("{:.1} dB", l)),
        _ => "-".to_string(),
    }
}

/// Render the result of a scored guess
pub fn render(response: &GuessResponse, score: &ScoreResult) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "Actual:  {}", song_line(&response.actual_song));
    let _ = writeln!(out, "Guessed: {}", song_line(&response.guessed_song));
    let _ = writeln!(out, "Similarity: {}%", score.similarity_score);
    if !response.message.is_empty() {
        let _ = writeln!(out, "{}", response.message);
    }

    if !response.breakdown.is_empty() {
        let _ = writeln!(out, "Breakdown:");
        for (feature, percent) in &response.breakdown {
            let _ = writeln!(out, "  {:<16} {:>5.1}%", feature, percent);
        }
    }

    if let (Some(actual), Some(guessed)) = (
        response.actual_song_metadata.as_ref(),
        response.guessed_song_metadata.as_ref(),
    ) {
        let _ = writeln!(out, "{:<10} {:<18} {:<18} Match", "", "Actual", "Guessed");
        for (feature, match_key) in FEATURE_ROWS {
            let _ = writeln!(
                out,
                "{:<10} {:<18} {:<18} {:.0}%",
                feature,
                feature_value(actual, feature),
                feature_value(guessed, feature),
                response.breakdown_percent(match_key)
            );
        }
    }

    if score.stems_ever_unmuted.is_empty() {
        let _ = writeln!(out, "Stems used: none");
    } else {
        let used: Vec<&str> = score.stems_ever_unmuted.iter().map(String::as_str).collect();
        let _ = writeln!(out, "Stems used: {}", used.join(", "));
    }
    let _ = writeln!(
        out,
        "Points: {} - {} (stems) - {} (vocals) = {}",
        score.similarity_score, score.non_vocal_penalty, score.vocal_penalty, score.final_points
    );
    let _ = write!(
        out,
        "Rating: {} -> {} ({})",
        score.rating_before,
        score.rating_after,
        score.rating_change()
    );

    out
}
