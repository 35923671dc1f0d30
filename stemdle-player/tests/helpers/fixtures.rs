//! Headless engines and game sessions

use std::sync::Arc;
use std::time::Duration;
use stemdle_common::events::{GameEvent, StopReason};
use stemdle_common::models::{RandomSong, Song};
use stemdle_common::StemKind;
use stemdle_player::api::GameApiClient;
use stemdle_player::audio::headless::{ClockedStem, HeadlessBackend, HeadlessContext};
use stemdle_player::audio::{AudioContext, AudioGraph, StemOutput, StemSource};
use stemdle_player::config::{PlaybackSettings, PlayerConfig};
use stemdle_player::game::GameSession;
use stemdle_player::playback::PlaybackEngine;
use stemdle_player::snippet::SnippetWindow;
use stemdle_player::stems::StemTrack;
use stemdle_player::SharedState;
use tokio::sync::broadcast;

use super::MockBackend;

pub const INITIAL_RATING: i64 = 1200;

pub struct EngineFixture {
    pub engine: PlaybackEngine,
    pub shared: Arc<SharedState>,
    pub graph: Arc<AudioGraph>,
}

/// Engine over a headless context with default playback settings
pub fn headless_engine(context: Arc<dyn AudioContext>) -> EngineFixture {
    let shared = Arc::new(SharedState::new(INITIAL_RATING));
    let graph = Arc::new(AudioGraph::new());
    let engine = PlaybackEngine::new(
        PlaybackSettings::default(),
        Arc::clone(&graph),
        context,
        Arc::clone(&shared),
    );
    EngineFixture {
        engine,
        shared,
        graph,
    }
}

impl EngineFixture {
    pub fn new() -> Self {
        headless_engine(Arc::new(HeadlessContext::new()))
    }

    /// Load clocked stems of the given kinds; returns them in load order
    pub async fn load(&self, window: SnippetWindow, kinds: &[StemKind]) -> Vec<Arc<ClockedStem>> {
        let clocks: Vec<Arc<ClockedStem>> =
            kinds.iter().map(|k| Arc::new(ClockedStem::new(*k))).collect();
        self.load_clocks(window, &clocks).await;
        clocks
    }

    pub async fn load_clocks(&self, window: SnippetWindow, clocks: &[Arc<ClockedStem>]) {
        let stems = clocks
            .iter()
            .map(|clock| {
                (
                    StemTrack::new(clock.stem(), format!("mem://{}", clock.stem())),
                    Arc::clone(clock) as Arc<dyn StemOutput>,
                )
            })
            .collect();
        self.engine.load(window, stems).await;
    }

    pub fn events(&self) -> broadcast::Receiver<GameEvent> {
        self.shared.subscribe_events()
    }
}

pub struct SessionFixture {
    pub session: Arc<GameSession>,
    pub backend: MockBackend,
    pub stems: Arc<HeadlessBackend>,
    pub shared: Arc<SharedState>,
}

impl SessionFixture {
    pub async fn start() -> Self {
        Self::start_as(None).await
    }

    /// Session against a fresh mock backend, optionally signed in as `user_id`
    pub async fn start_as(user_id: Option<&str>) -> Self {
        let backend = MockBackend::start().await;
        let config = PlayerConfig {
            api_base_url: backend.base_url().to_string(),
            user_id: user_id.map(str::to_string),
            initial_rating: INITIAL_RATING,
            ..Default::default()
        };

        let shared = Arc::new(SharedState::new(config.initial_rating));
        let engine = PlaybackEngine::new(
            config.playback.clone(),
            Arc::new(AudioGraph::new()),
            Arc::new(HeadlessContext::new()),
            Arc::clone(&shared),
        );
        let api = GameApiClient::new(&config.api_base_url, Duration::from_secs(5))
            .expect("mock backend client");
        let stems = Arc::new(HeadlessBackend::new());
        let source: Arc<dyn StemSource> = Arc::clone(&stems) as Arc<dyn StemSource>;
        let session = Arc::new(GameSession::new(&config, api, engine, source, Arc::clone(&shared)));

        Self {
            session,
            backend,
            stems,
            shared,
        }
    }
}

/// Song whose six stems are derived from `url_original`
pub fn song(id: &str, name: &str) -> Song {
    Song {
        id: id.to_string(),
        name: name.to_string(),
        artists: Some("Test Artist".to_string()),
        url_original: Some(format!("https://cdn.test/songs/{}.mp3", id)),
        ..Default::default()
    }
}

pub fn random_song(id: &str, clip_start_time: f64) -> RandomSong {
    RandomSong {
        song: song(id, &format!("Song {}", id)),
        clip_start_time: Some(clip_start_time),
    }
}

/// Everything queued on the receiver so far
pub fn drain_events(rx: &mut broadcast::Receiver<GameEvent>) -> Vec<GameEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Stop reasons reported for one stem, in order
pub fn stop_reasons(events: &[GameEvent], kind: StemKind) -> Vec<StopReason> {
    events
        .iter()
        .filter_map(|event| match event {
            GameEvent::StemStopped { stem, reason, .. } if *stem == kind => Some(*reason),
            _ => None,
        })
        .collect()
}
