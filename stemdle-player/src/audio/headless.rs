//! Headless audio backend
//!
//! Stems are virtual media clocks driven by `tokio::time`, so a paused test
//! runtime controls them exactly. Used for `--headless` runs and tests.

use super::{AudioContext, GainNode, StemOutput, StemSource};
use crate::error::{Error, Result};
use crate::snippet::SnippetWindow;
use crate::stems::StemTrack;
use futures::future::BoxFuture;
use futures::FutureExt;
use stemdle_common::StemKind;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Default)]
struct MediaClock {
    /// Position when last paused or seeked
    base: f64,
    /// Set while running
    started: Option<Instant>,
}

impl MediaClock {
    fn position(&self, duration: Option<f64>) -> f64 {
        let position = match self.started {
            Some(at) => self.base + at.elapsed().as_secs_f64(),
            None => self.base,
        };
        match duration {
            Some(d) => position.min(d),
            None => position,
        }
    }
}

/// Silent stem with a media clock
#[derive(Debug)]
pub struct ClockedStem {
    stem: StemKind,
    duration: Option<f64>,
    clock: Mutex<MediaClock>,
    gain: OnceLock<Arc<GainNode>>,
    refuse_play: AtomicBool,
}

impl ClockedStem {
    /// Stem with no end of media
    pub fn new(stem: StemKind) -> Self {
        Self {
            stem,
            duration: None,
            clock: Mutex::new(MediaClock::default()),
            gain: OnceLock::new(),
            refuse_play: AtomicBool::new(false),
        }
    }

    /// Stem whose media ends after `seconds`
    pub fn with_duration(stem: StemKind, seconds: f64) -> Self {
        Self {
            duration: Some(seconds.max(0.0)),
            ..Self::new(stem)
        }
    }

    pub fn stem(&self) -> StemKind {
        self.stem
    }

    /// Make `play()` fail, as a platform autoplay policy would
    pub fn refuse_play(&self, refuse: bool) {
        self.refuse_play.store(refuse, Ordering::SeqCst);
    }

    /// Shift the clock by `delta` seconds without going through a seek
    pub fn nudge(&self, delta: f64) {
        let mut clock = self.lock_clock();
        clock.base = (clock.base + delta).max(0.0);
    }

    fn lock_clock(&self) -> std::sync::MutexGuard<'_, MediaClock> {
        self.clock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ended(&self, clock: &MediaClock) -> bool {
        match self.duration {
            Some(d) => clock.started.is_some() && clock.position(self.duration) >= d,
            None => false,
        }
    }
}

impl StemOutput for ClockedStem {
    fn current_time(&self) -> f64 {
        self.lock_clock().position(self.duration)
    }

    fn set_current_time(&self, seconds: f64) {
        let mut clock = self.lock_clock();
        let seconds = seconds.max(0.0);
        clock.base = match self.duration {
            Some(d) => seconds.min(d),
            None => seconds,
        };
        if clock.started.is_some() {
            clock.started = Some(Instant::now());
        }
    }

    fn play(&self) -> Result<()> {
        if self.refuse_play.load(Ordering::SeqCst) {
            return Err(Error::Playback(format!(
                "{} stem: play request was not allowed",
                self.stem
            )));
        }
        let mut clock = self.lock_clock();
        if clock.started.is_none() {
            clock.started = Some(Instant::now());
        }
        Ok(())
    }

    fn pause(&self) {
        let mut clock = self.lock_clock();
        clock.base = clock.position(self.duration);
        clock.started = None;
    }

    fn is_paused(&self) -> bool {
        let clock = self.lock_clock();
        clock.started.is_none() || self.ended(&clock)
    }

    fn has_ended(&self) -> bool {
        let clock = self.lock_clock();
        self.ended(&clock)
    }

    fn route(&self, gain: Arc<GainNode>) -> Result<()> {
        self.gain
            .set(gain)
            .map_err(|_| Error::AlreadyWired(self.stem))
    }

    fn gain(&self) -> Option<Arc<GainNode>> {
        self.gain.get().cloned()
    }
}

/// Audio context that is either running or suspended
#[derive(Debug, Default)]
pub struct HeadlessContext {
    suspended: AtomicBool,
    refusals: AtomicU32,
    resume_calls: AtomicU32,
}

impl HeadlessContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context that needs a resume before output starts
    pub fn suspended() -> Self {
        Self {
            suspended: AtomicBool::new(true),
            ..Self::default()
        }
    }

    /// Fail the next `count` resume requests
    pub fn refuse_resumes(&self, count: u32) {
        self.refusals.store(count, Ordering::SeqCst);
    }

    pub fn resume_calls(&self) -> u32 {
        self.resume_calls.load(Ordering::SeqCst)
    }
}

impl AudioContext for HeadlessContext {
    fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::SeqCst)
    }

    fn resume(&self) -> BoxFuture<'_, Result<()>> {
        async move {
            self.resume_calls.fetch_add(1, Ordering::SeqCst);
            let refused = self
                .refusals
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if refused {
                return Err(Error::AudioOutput("resume refused".to_string()));
            }
            self.suspended.store(false, Ordering::SeqCst);
            Ok(())
        }
        .boxed()
    }
}

/// Opens a [`ClockedStem`] per track
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    opened: Mutex<HashMap<StemKind, Arc<ClockedStem>>>,
    unavailable: Mutex<HashSet<String>>,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recently opened stem of a kind
    pub fn opened(&self, stem: StemKind) -> Option<Arc<ClockedStem>> {
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&stem)
            .cloned()
    }

    /// Make opening `url` fail
    pub fn make_unavailable(&self, url: impl Into<String>) {
        self.unavailable
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.into());
    }
}

impl StemSource for HeadlessBackend {
    fn open<'a>(
        &'a self,
        track: &'a StemTrack,
        _window: SnippetWindow,
    ) -> BoxFuture<'a, Result<Arc<dyn StemOutput>>> {
        async move {
            let unavailable = self
                .unavailable
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .contains(&track.source_url);
            if unavailable {
                return Err(Error::Decode(format!(
                    "Failed to open {}",
                    track.source_url
                )));
            }

            debug!("Opening headless stem {} ({})", track.kind, track.source_url);
            let stem = Arc::new(ClockedStem::new(track.kind));
            self.opened
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(track.kind, Arc::clone(&stem));
            Ok(stem as Arc<dyn StemOutput>)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_clock_advances_only_while_playing() {
        let stem = ClockedStem::new(StemKind::Drum);
        stem.set_current_time(10.0);
        assert!(stem.is_paused());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(stem.current_time(), 10.0);

        stem.play().unwrap();
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(stem.current_time(), 12.5);

        stem.pause();
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(stem.current_time(), 12.5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_seek_while_playing_restarts_from_target() {
        let stem = ClockedStem::new(StemKind::Bass);
        stem.play().unwrap();
        tokio::time::sleep(Duration::from_secs(4)).await;

        stem.set_current_time(1.0);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(stem.current_time(), 2.0);
        assert!(!stem.is_paused());
    }

    #[tokio::test(start_paused = true)]
    async fn test_media_end() {
        let stem = ClockedStem::with_duration(StemKind::Piano, 3.0);
        stem.play().unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert!(stem.has_ended());
        assert!(stem.is_paused());
        assert_eq!(stem.current_time(), 3.0);
    }

    #[test]
    fn test_refused_play() {
        let stem = ClockedStem::new(StemKind::Vocals);
        stem.refuse_play(true);
        assert!(matches!(stem.play(), Err(Error::Playback(_))));
        assert!(stem.is_paused());
    }

    #[test]
    fn test_route_once() {
        let stem = ClockedStem::new(StemKind::Other);
        stem.route(Arc::new(GainNode::new(StemKind::Other, 0))).unwrap();
        let err = stem
            .route(Arc::new(GainNode::new(StemKind::Other, 0)))
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyWired(StemKind::Other)));
    }

    #[tokio::test]
    async fn test_context_resume_refusals() {
        let ctx = HeadlessContext::suspended();
        ctx.refuse_resumes(1);

        assert!(ctx.resume().await.is_err());
        assert!(ctx.is_suspended());
        ctx.resume().await.unwrap();
        assert!(!ctx.is_suspended());
        assert_eq!(ctx.resume_calls(), 2);
    }

    #[tokio::test]
    async fn test_backend_open_and_unavailable() {
        let backend = HeadlessBackend::new();
        backend.make_unavailable("http://x/a-bass.wav");
        let window = SnippetWindow::new(0.0, 15.0);

        let ok = StemTrack::new(StemKind::Drum, "http://x/a-drum.wav");
        backend.open(&ok, window).await.unwrap();
        assert!(backend.opened(StemKind::Drum).is_some());

        let bad = StemTrack::new(StemKind::Bass, "http://x/a-bass.wav");
        assert!(backend.open(&bad, window).await.is_err());
        assert!(backend.opened(StemKind::Bass).is_none());
    }
}
