//! Scoring engine
//!
//! Turns the backend's similarity score and the stems the listener unmuted
//! into a point delta and a new rating. Pure; the caller caches the result
//! and persists the rating.

use crate::config::ScoringSettings;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use stemdle_common::StemKind;

/// Outcome of one scored guess. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoreResult {
    /// Similarity between guess and answer, 0–100
    pub similarity_score: i64,
    /// Labels of stems unmuted at any point during the round
    pub stems_ever_unmuted: BTreeSet<String>,
    pub non_vocal_penalty: i64,
    pub vocal_penalty: i64,
    /// May be negative
    pub final_points: i64,
    pub rating_before: i64,
    pub rating_after: i64,
}

impl ScoreResult {
    pub fn rating_change(&self) -> RatingChange {
        RatingChange(self.rating_after - self.rating_before)
    }
}

/// Signed rating delta, shown as `+N`, `-N` or `0`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatingChange(pub i64);

impl fmt::Display for RatingChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 > 0 {
            write!(f, "+{}", self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScoringEngine {
    settings: ScoringSettings,
}

impl ScoringEngine {
    pub fn new(settings: ScoringSettings) -> Self {
        Self { settings }
    }

    /// Score a guess.
    ///
    /// Every unmuted stem other than vocals costs the non-vocal penalty;
    /// vocals cost the vocals penalty once.
    pub fn score(
        &self,
        similarity_score: i64,
        stems_ever_unmuted: BTreeSet<String>,
        rating_before: i64,
    ) -> ScoreResult {
        let is_vocals = |label: &&String| {
            label
                .parse::<StemKind>()
                .is_ok_and(|kind| kind.is_vocals())
        };
        let non_vocal_count = stems_ever_unmuted
            .iter()
            .filter(|label| !is_vocals(label))
            .count() as i64;

        let non_vocal_penalty = self.settings.non_vocal_penalty * non_vocal_count;
        let vocal_penalty = if stems_ever_unmuted.iter().any(|label| is_vocals(&label)) {
            self.settings.vocals_penalty
        } else {
            0
        };
        let final_points = similarity_score - non_vocal_penalty - vocal_penalty;

        ScoreResult {
            similarity_score,
            stems_ever_unmuted,
            non_vocal_penalty,
            vocal_penalty,
            final_points,
            rating_before,
            rating_after: rating_before + final_points,
        }
    }
}

impl Default for ScoringEngine {
    fn default() -> Self {
        Self::new(ScoringSettings::default())
    }
}
