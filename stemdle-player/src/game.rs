//! Round orchestration
//!
//! `GameSession` runs the game loop around the playback engine: fetch a
//! random song, load its stems, score the listener's guess once, and persist
//! the confirmed rating. It is the only writer of the rating.
//!
//! Overlapping requests are allowed. Each round request and each guess takes
//! a generation number, and a response whose generation is no longer the
//! latest is dropped without touching any state.

use crate::api::GameApiClient;
use crate::audio::{StemOutput, StemSource};
use crate::config::PlayerConfig;
use crate::error::{Error, Result};
use crate::playback::PlaybackEngine;
use crate::scoring::{ScoreResult, ScoringEngine};
use crate::snippet::SnippetWindow;
use crate::state::{RoundState, SharedState};
use crate::stems::{StemRegistry, StemTrack};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use stemdle_common::events::GameEvent;
use stemdle_common::models::{GuessRequest, GuessResponse, Song};
use stemdle_common::time;
use stemdle_common::StemKind;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// The song currently loaded for guessing
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveRound {
    pub song: Song,
    pub window: SnippetWindow,
    pub stems: Vec<StemKind>,
    /// Full mix, for listening after the guess
    pub audio_url: Option<String>,
}

/// A scored guess awaiting confirmation
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredGuess {
    pub response: GuessResponse,
    pub score: ScoreResult,
}

pub struct GameSession {
    api: GameApiClient,
    engine: PlaybackEngine,
    source: Arc<dyn StemSource>,
    scoring: ScoringEngine,
    shared: Arc<SharedState>,
    user_id: Option<String>,
    snippet_length: f64,
    round_generation: AtomicU64,
    guess_generation: AtomicU64,
    round: Mutex<Option<ActiveRound>>,
    pending: Mutex<Option<ScoredGuess>>,
}

impl GameSession {
    pub fn new(
        config: &PlayerConfig,
        api: GameApiClient,
        engine: PlaybackEngine,
        source: Arc<dyn StemSource>,
        shared: Arc<SharedState>,
    ) -> Self {
        Self {
            api,
            engine,
            source,
            scoring: ScoringEngine::new(config.scoring.clone()),
            shared,
            user_id: config.user_id.clone(),
            snippet_length: config.playback.snippet_length_secs,
            round_generation: AtomicU64::new(0),
            guess_generation: AtomicU64::new(0),
            round: Mutex::new(None),
            pending: Mutex::new(None),
        }
    }

    pub fn engine(&self) -> &PlaybackEngine {
        &self.engine
    }

    pub fn shared(&self) -> &Arc<SharedState> {
        &self.shared
    }

    pub async fn state(&self) -> RoundState {
        self.shared.round_state().await
    }

    pub fn rating(&self) -> i64 {
        self.shared.rating()
    }

    pub async fn current_round(&self) -> Option<ActiveRound> {
        self.round.lock().await.clone()
    }

    /// Cached result of the last scored guess, if not yet confirmed
    pub async fn pending_score(&self) -> Option<ScoredGuess> {
        self.pending.lock().await.clone()
    }

    /// Song catalog for the guess picker, sorted by name ignoring case
    pub async fn catalog(&self) -> Result<Vec<Song>> {
        let mut songs = self.api.list_songs().await.map_err(|e| {
            warn!("Failed to fetch song catalog: {}", e);
            e
        })?;
        songs.sort_by_cached_key(|song| song.name.to_lowercase());
        debug!("Catalog has {} songs", songs.len());
        Ok(songs)
    }

    /// Fetch a random song and load it into the engine.
    ///
    /// Returns `Ok(None)` when a newer round was requested while this one
    /// was loading. Stems that fail to open are left out of the round.
    pub async fn new_round(&self) -> Result<Option<ActiveRound>> {
        let generation = self.round_generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.set_round_state(RoundState::Loading).await;

        let random = match self.api.random_song(self.snippet_length).await {
            Ok(random) => random,
            Err(e) => {
                if self.is_current_round(generation) {
                    warn!("Failed to load a new round: {}", e);
                    self.fail_round(e.to_string()).await;
                }
                return Err(e);
            }
        };
        if !self.is_current_round(generation) {
            debug!("Discarding stale round response for song {}", random.song.id);
            return Ok(None);
        }

        let window = SnippetWindow::resolve(&random, self.snippet_length);
        let tracks = StemRegistry::load_stems(&random.song);
        if tracks.is_empty() {
            info!("Song {} has no stems", random.song.id);
        }

        let mut loaded: Vec<(StemTrack, Arc<dyn StemOutput>)> = Vec::with_capacity(tracks.len());
        for track in tracks {
            match self.source.open(&track, window).await {
                Ok(output) => loaded.push((track, output)),
                Err(e) => warn!("Skipping stem {} ({}): {}", track.kind, track.source_url, e),
            }
        }

        // Check and load under the round lock so a newer round cannot be
        // overwritten by this one
        let mut round = self.round.lock().await;
        if !self.is_current_round(generation) {
            debug!("Discarding stale round for song {}", random.song.id);
            for (_, output) in &loaded {
                output.release();
            }
            return Ok(None);
        }

        // Guesses in flight belong to the previous song
        self.guess_generation.fetch_add(1, Ordering::SeqCst);
        *self.pending.lock().await = None;

        let stems: Vec<StemKind> = loaded.iter().map(|(track, _)| track.kind).collect();
        self.engine.load(window, loaded).await;

        let active = ActiveRound {
            audio_url: self.api.song_audio_url(&random.song),
            song: random.song,
            window,
            stems,
        };
        *round = Some(active.clone());
        drop(round);

        info!(
            "Loaded song {} ({} stems, clip start {:.2}s)",
            active.song.id,
            active.stems.len(),
            window.start_offset()
        );
        self.shared.set_round_state(RoundState::Ready).await;
        self.shared.broadcast_event(GameEvent::SongLoaded {
            song_id: active.song.id.clone(),
            stem_count: active.stems.len(),
            clip_start_time: window.start_offset(),
            timestamp: time::now(),
        });

        Ok(Some(active))
    }

    /// Submit a guess for the current song and score it.
    ///
    /// A missing guess or missing song is rejected before any request is
    /// made. The score is computed once, from the stems unmuted so far, and
    /// cached until confirmed. Returns `Ok(None)` if the round moved on while
    /// the guess was in flight.
    pub async fn submit_guess(&self, guessed_song_id: Option<&str>) -> Result<Option<ScoredGuess>> {
        let guessed = guessed_song_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(Error::MissingGuess)?;

        let (actual_song_id, clip_start_time) = {
            let round = self.round.lock().await;
            let active = round.as_ref().ok_or(Error::NoActiveSong)?;
            (active.song.id.clone(), active.window.start_offset())
        };

        let generation = self.guess_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let request = GuessRequest {
            actual_song_id,
            guessed_song_id: guessed.to_string(),
            clip_start_time,
        };

        let response = match self.api.submit_guess(&request).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Failed to score guess: {}", e);
                self.shared.broadcast_event(GameEvent::RoundFailed {
                    message: e.to_string(),
                    timestamp: time::now(),
                });
                return Err(e);
            }
        };

        let mut pending = self.pending.lock().await;
        if self.guess_generation.load(Ordering::SeqCst) != generation {
            debug!("Discarding stale guess response for {}", request.guessed_song_id);
            return Ok(None);
        }

        let labels = self.engine.ever_unmuted_labels().await;
        let score = self
            .scoring
            .score(response.similarity_points(), labels, self.shared.rating());
        info!(
            "Guess scored: similarity={}, points={}, rating {} -> {}",
            score.similarity_score, score.final_points, score.rating_before, score.rating_after
        );

        let scored = ScoredGuess { response, score };
        *pending = Some(scored.clone());
        drop(pending);

        self.shared.broadcast_event(GameEvent::GuessScored {
            similarity_score: scored.score.similarity_score,
            final_points: scored.score.final_points,
            rating_after: scored.score.rating_after,
            timestamp: time::now(),
        });
        Ok(Some(scored))
    }

    /// Apply the cached score's rating and persist it.
    ///
    /// The rating is applied locally first; a failed save is logged and
    /// otherwise ignored. Returns the new rating.
    pub async fn confirm(&self) -> Result<i64> {
        let scored = self
            .pending
            .lock()
            .await
            .take()
            .ok_or(Error::NoPendingScore)?;
        let rating = scored.score.rating_after;
        self.shared.set_rating(rating);

        let persisted = match self.user_id.as_deref() {
            Some(user_id) => match self.api.update_rating(user_id, rating).await {
                Ok(()) => {
                    info!("Persisted rating {} for user {}", rating, user_id);
                    true
                }
                Err(e) => {
                    warn!("Failed to persist rating for user {}: {}", user_id, e);
                    false
                }
            },
            None => {
                debug!("No user configured; rating {} kept locally", rating);
                false
            }
        };

        self.shared.broadcast_event(GameEvent::RatingUpdated {
            rating,
            persisted,
            timestamp: time::now(),
        });
        Ok(rating)
    }

    fn is_current_round(&self, generation: u64) -> bool {
        self.round_generation.load(Ordering::SeqCst) == generation
    }

    async fn fail_round(&self, message: String) {
        self.shared
            .set_round_state(RoundState::Failed(message.clone()))
            .await;
        self.shared.broadcast_event(GameEvent::RoundFailed {
            message,
            timestamp: time::now(),
        });
    }
}
