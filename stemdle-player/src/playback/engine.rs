//! Playback engine
//!
//! Owns the loaded song's stems and runs the snippet transport over them:
//! - all-stem and per-stem play/pause/restart
//! - seeking within the snippet window
//! - one cutoff timer per playing stem, pausing it at the snippet end
//! - the position tracker and drift corrector while anything plays
//! - per-stem volume through the audio graph
//!
//! All transport state sits behind one async mutex. Timer and tracker tasks
//! hold only a weak handle, so dropping the last engine clone ends them.

use super::session::{PlaybackSession, PlaybackSnapshot};
use super::timers::CutoffTimers;
use super::tracker;
use crate::audio::{AudioContext, AudioGraph, StemOutput};
use crate::config::PlaybackSettings;
use crate::error::{Error, Result};
use crate::snippet::SnippetWindow;
use crate::state::SharedState;
use crate::stems::{StemRegistry, StemTrack};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use stemdle_common::events::{GameEvent, StopReason};
use stemdle_common::time::{self, secs_to_duration};
use stemdle_common::StemKind;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Default)]
struct EngineState {
    registry: StemRegistry,
    outputs: HashMap<StemKind, Arc<dyn StemOutput>>,
    window: Option<SnippetWindow>,
    session: PlaybackSession,
    timers: CutoffTimers,
    tracker: Option<JoinHandle<()>>,
}

impl EngineState {
    fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot::capture(&self.session, &self.registry, self.window.as_ref())
    }

    fn order(&self) -> Vec<StemKind> {
        self.registry.kinds().collect()
    }

    /// Position to start playing from; restarts from 0 near the end.
    ///
    /// `joining` is set when the caller starts a stem next to others that
    /// are already playing; it then follows their playhead instead.
    fn start_position(&mut self, window: SnippetWindow, end_epsilon: f64, joining: bool) -> f64 {
        if !joining && self.session.position >= window.length() - end_epsilon {
            self.session.position = 0.0;
        }
        self.session.position
    }

    /// Re-read the playhead from the live reference stem, if one is playing
    fn refresh_position(&mut self) {
        let Some(window) = self.window else {
            return;
        };
        let reference = self.registry.kinds().find(|kind| {
            self.session.is_playing(*kind)
                && self.outputs.get(kind).is_some_and(|o| !o.is_paused())
        });
        if let Some(output) = reference.and_then(|kind| self.outputs.get(&kind)) {
            self.session.position = window.clamp(window.to_relative(output.current_time()));
        }
    }

    /// Pause one stem and disarm its cutoff; returns whether it was playing
    fn halt(&mut self, kind: StemKind) -> bool {
        if let Some(output) = self.outputs.get(&kind) {
            output.pause();
        }
        self.timers.cancel(kind);
        let was_playing = self.session.is_playing(kind);
        self.session.set_playing(kind, false);
        was_playing
    }

    fn stop_tracker(&mut self) {
        if let Some(handle) = self.tracker.take() {
            handle.abort();
        }
    }

    fn stop_tracker_if_idle(&mut self) {
        if !self.session.any_playing() {
            self.stop_tracker();
        }
    }

    /// Pause every output and release those not in `keep`
    fn drop_outputs(&mut self, keep: &[Arc<dyn StemOutput>]) {
        for output in self.outputs.values() {
            output.pause();
            if !keep.iter().any(|k| same_output(k, output)) {
                output.release();
            }
        }
        self.outputs.clear();
    }
}

fn same_output(a: &Arc<dyn StemOutput>, b: &Arc<dyn StemOutput>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

struct EngineInner {
    settings: PlaybackSettings,
    graph: Arc<AudioGraph>,
    context: Arc<dyn AudioContext>,
    shared: Arc<SharedState>,
    state: Mutex<EngineState>,
    snapshot_tx: watch::Sender<PlaybackSnapshot>,
}

/// Snippet transport over the loaded stems. Cheap to clone.
#[derive(Clone)]
pub struct PlaybackEngine {
    inner: Arc<EngineInner>,
}

impl PlaybackEngine {
    pub fn new(
        settings: PlaybackSettings,
        graph: Arc<AudioGraph>,
        context: Arc<dyn AudioContext>,
        shared: Arc<SharedState>,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(PlaybackSnapshot::default());
        Self {
            inner: Arc::new(EngineInner {
                settings,
                graph,
                context,
                shared,
                state: Mutex::new(EngineState::default()),
                snapshot_tx,
            }),
        }
    }

    pub fn settings(&self) -> &PlaybackSettings {
        &self.inner.settings
    }

    pub fn graph(&self) -> &Arc<AudioGraph> {
        &self.inner.graph
    }

    /// Watch the published playhead and per-stem state
    pub fn subscribe(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.inner.snapshot_tx.subscribe()
    }

    pub async fn snapshot(&self) -> PlaybackSnapshot {
        self.inner.state.lock().await.snapshot()
    }

    pub async fn window(&self) -> Option<SnippetWindow> {
        self.inner.state.lock().await.window
    }

    pub async fn stems(&self) -> Vec<StemTrack> {
        self.inner.state.lock().await.registry.tracks().to_vec()
    }

    /// Labels of stems unmuted at any point since the song was loaded
    pub async fn ever_unmuted_labels(&self) -> BTreeSet<String> {
        self.inner.state.lock().await.registry.ever_unmuted_labels()
    }

    /// Replace the loaded song.
    ///
    /// Cancels every timer and the tracker, tears down the previous stems,
    /// resets volumes and the playhead, and wires the new stems into the
    /// audio graph muted and parked at the snippet start.
    pub async fn load(&self, window: SnippetWindow, stems: Vec<(StemTrack, Arc<dyn StemOutput>)>) {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;

        state.timers.cancel_all();
        state.stop_tracker();
        let incoming: Vec<Arc<dyn StemOutput>> =
            stems.iter().map(|(_, output)| Arc::clone(output)).collect();
        state.drop_outputs(&incoming);
        self.inner.graph.reset();

        state
            .registry
            .replace(stems.iter().map(|(track, _)| track.clone()).collect());
        state.window = Some(window);
        let order = state.order();
        state.session.reset(order);

        for (track, output) in stems {
            output.pause();
            output.set_current_time(window.start_offset());
            self.inner.graph.wire(track.kind, output.as_ref(), 0);
            state.outputs.insert(track.kind, output);
        }

        info!(
            "Loaded {} stems, snippet {:.2}s..{:.2}s",
            state.registry.len(),
            window.start_offset(),
            window.start_offset() + window.length()
        );
        self.publish(state);
    }

    /// Drop the loaded song without loading another
    pub async fn unload(&self) {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;
        state.timers.cancel_all();
        state.stop_tracker();
        state.drop_outputs(&[]);
        self.inner.graph.reset();
        state.registry.clear();
        state.window = None;
        state.session.clear();
        self.publish(state);
    }

    /// Start every stem from the current position.
    ///
    /// Stems that refuse to start are skipped; returns how many started.
    pub async fn play_all(&self) -> usize {
        self.ensure_context_running().await;

        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;
        let Some(window) = state.window else {
            return 0;
        };

        state.refresh_position();
        let position = state.start_position(window, self.inner.settings.end_epsilon_secs, false);
        let mut started = 0;
        for kind in state.order() {
            if self.start_stem(state, window, kind, position) {
                started += 1;
            }
        }

        debug!("Started {} of {} stems at {:.2}s", started, state.registry.len(), position);
        self.ensure_tracker(state);
        self.publish(state);
        started
    }

    /// Start one stem from the current position.
    ///
    /// Returns `Ok(false)` when the stem refused to start.
    pub async fn play_one(&self, kind: StemKind) -> Result<bool> {
        self.ensure_context_running().await;

        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;
        let window = match state.window {
            Some(window) if state.registry.contains(kind) => window,
            _ => return Err(Error::StemNotFound(kind)),
        };

        state.refresh_position();
        let joining = state.session.playing_kinds().iter().any(|other| *other != kind);
        let position = state.start_position(window, self.inner.settings.end_epsilon_secs, joining);
        let started = self.start_stem(state, window, kind, position);

        self.ensure_tracker(state);
        self.publish(state);
        Ok(started)
    }

    /// Pause every stem, keeping the position
    pub async fn pause_all(&self) {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;

        state.refresh_position();
        for kind in state.order() {
            if state.halt(kind) {
                self.emit_stopped(kind, StopReason::Paused);
            }
        }

        state.stop_tracker();
        self.publish(state);
    }

    /// Pause one stem, keeping the position
    pub async fn pause_one(&self, kind: StemKind) -> Result<()> {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;
        if !state.registry.contains(kind) {
            return Err(Error::StemNotFound(kind));
        }

        state.refresh_position();
        if state.halt(kind) {
            self.emit_stopped(kind, StopReason::Paused);
        }

        state.stop_tracker_if_idle();
        self.publish(state);
        Ok(())
    }

    /// Stop one stem and park it at the snippet start; the playhead goes to 0
    pub async fn restart_one(&self, kind: StemKind) -> Result<()> {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;
        let window = match state.window {
            Some(window) if state.registry.contains(kind) => window,
            _ => return Err(Error::StemNotFound(kind)),
        };

        state.halt(kind);
        if let Some(output) = state.outputs.get(&kind) {
            output.set_current_time(window.start_offset());
        }
        state.session.position = 0.0;
        self.emit_stopped(kind, StopReason::Restarted);

        state.stop_tracker_if_idle();
        self.publish(state);
        Ok(())
    }

    /// Stop every stem and park all of them at the snippet start
    pub async fn restart_all(&self) {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;
        let Some(window) = state.window else {
            return;
        };

        for kind in state.order() {
            state.halt(kind);
            if let Some(output) = state.outputs.get(&kind) {
                output.set_current_time(window.start_offset());
            }
            self.emit_stopped(kind, StopReason::Restarted);
        }
        state.session.position = 0.0;

        state.stop_tracker();
        self.publish(state);
    }

    /// Move the playhead to `relative` seconds (clamped to the window).
    ///
    /// Every stem is moved; playing stems get their cutoff re-armed for the
    /// new remaining time, or stop at once when nothing remains. Returns the
    /// clamped position.
    pub async fn seek(&self, relative: f64) -> f64 {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;
        let Some(window) = state.window else {
            return 0.0;
        };

        let position = window.clamp(relative);
        state.session.position = position;
        let absolute = window.to_absolute(position);
        for output in state.outputs.values() {
            output.set_current_time(absolute);
        }

        let remaining = window.remaining(position);
        for kind in state.session.playing_kinds() {
            if remaining > 0.0 {
                self.arm_cutoff(state, kind, remaining);
            } else {
                state.halt(kind);
                self.emit_stopped(kind, StopReason::SnippetEnd);
            }
        }

        debug!("Seeked to {:.2}s ({:.2}s remaining)", position, remaining);
        self.inner.shared.broadcast_event(GameEvent::Seeked {
            position,
            timestamp: time::now(),
        });
        state.stop_tracker_if_idle();
        self.publish(state);
        position
    }

    /// Set a stem's volume (clamped to 0..=200) and apply it immediately.
    ///
    /// Returns the stored percentage.
    pub async fn set_volume(&self, kind: StemKind, percent: i32) -> Result<u8> {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;

        let applied = state.registry.set_volume(kind, percent)?;
        if !self.inner.graph.set_volume(kind, applied) {
            debug!("Stem {} has no gain node; volume stored only", kind);
        }

        self.inner.shared.broadcast_event(GameEvent::VolumeChanged {
            stem: kind,
            percent: applied,
            timestamp: time::now(),
        });
        self.publish(state);
        Ok(applied)
    }

    /// Stop everything and close the audio graph
    pub async fn shutdown(&self) {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;
        state.timers.cancel_all();
        state.stop_tracker();
        state.drop_outputs(&[]);
        self.inner.graph.close();
        state.session.clear();
        info!("Playback engine stopped");
    }

    async fn ensure_context_running(&self) {
        let context = &self.inner.context;
        if !context.is_suspended() {
            return;
        }

        let attempts = self.inner.settings.resume_attempts;
        for attempt in 1..=attempts {
            match context.resume().await {
                Ok(()) => {
                    debug!("Audio context resumed");
                    return;
                }
                Err(e) => {
                    warn!("Audio context resume attempt {}/{} failed: {}", attempt, attempts, e);
                    if attempt < attempts {
                        tokio::time::sleep(self.inner.settings.resume_backoff()).await;
                    }
                }
            }
        }
        warn!("Audio context still suspended; starting playback anyway");
    }

    fn start_stem(
        &self,
        state: &mut EngineState,
        window: SnippetWindow,
        kind: StemKind,
        position: f64,
    ) -> bool {
        let Some(output) = state.outputs.get(&kind).cloned() else {
            warn!("Stem {} has no output", kind);
            return false;
        };

        output.set_current_time(window.to_absolute(position));
        match output.play() {
            Ok(()) => {
                state.session.set_playing(kind, true);
                self.arm_cutoff(state, kind, window.remaining(position));
                self.inner.shared.broadcast_event(GameEvent::StemStarted {
                    stem: kind,
                    position,
                    timestamp: time::now(),
                });
                true
            }
            Err(e) => {
                warn!("Stem {} failed to start: {}", kind, e);
                state.session.set_playing(kind, false);
                state.timers.cancel(kind);
                self.emit_stopped(kind, StopReason::Rejected);
                false
            }
        }
    }

    fn arm_cutoff(&self, state: &mut EngineState, kind: StemKind, remaining: f64) {
        let engine = Arc::downgrade(&self.inner);
        state.timers.arm(kind, secs_to_duration(remaining), move |id| async move {
            if let Some(inner) = engine.upgrade() {
                PlaybackEngine { inner }.fire_cutoff(kind, id).await;
            }
        });
    }

    async fn fire_cutoff(&self, kind: StemKind, id: u64) {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;
        if !state.timers.complete(kind, id) {
            debug!("Ignoring superseded cutoff for stem {}", kind);
            return;
        }

        if let Some(output) = state.outputs.get(&kind) {
            output.pause();
        }
        state.session.set_playing(kind, false);
        if let Some(window) = state.window {
            state.session.position = window.length();
        }
        debug!("Stem {} reached the snippet end", kind);
        self.emit_stopped(kind, StopReason::SnippetEnd);

        state.stop_tracker_if_idle();
        self.publish(state);
    }

    fn ensure_tracker(&self, state: &mut EngineState) {
        if !state.session.any_playing() {
            return;
        }
        if state.tracker.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }

        let engine = Arc::downgrade(&self.inner);
        state.tracker = Some(tracker::spawn(self.inner.settings.poll_interval(), move || {
            let engine = engine.clone();
            async move {
                match engine.upgrade() {
                    Some(inner) => PlaybackEngine { inner }.track_tick().await,
                    None => false,
                }
            }
        }));
    }

    /// One tracker tick; returns false once nothing is playing
    async fn track_tick(&self) -> bool {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;
        let Some(window) = state.window else {
            state.tracker = None;
            return false;
        };

        let order = state.order();
        let result = tracker::reconcile(
            &mut state.session,
            &order,
            &state.outputs,
            window,
            self.inner.settings.drift_tolerance_secs,
        );
        for kind in result.ended {
            state.timers.cancel(kind);
            info!("Stem {} ran out of media before the snippet end", kind);
            self.emit_stopped(kind, StopReason::MediaEnded);
        }

        // A realigned stem keeps its old cutoff deadline unless re-armed
        let remaining = window.remaining(state.session.position);
        for kind in result.corrected {
            if !state.session.is_playing(kind) {
                continue;
            }
            if remaining > 0.0 {
                self.arm_cutoff(state, kind, remaining);
            } else if state.halt(kind) {
                self.emit_stopped(kind, StopReason::SnippetEnd);
            }
        }

        let overran: Vec<StemKind> = state
            .session
            .playing_kinds()
            .into_iter()
            .filter(|kind| {
                state
                    .outputs
                    .get(kind)
                    .is_some_and(|o| window.to_relative(o.current_time()) >= window.length())
            })
            .collect();
        for kind in overran {
            if state.halt(kind) {
                debug!("Stem {} passed the snippet end; stopping", kind);
                self.emit_stopped(kind, StopReason::SnippetEnd);
            }
            state.session.position = window.length();
        }
        self.publish(state);

        if state.session.any_playing() {
            true
        } else {
            // Dropping our own handle detaches; the loop exits on return
            state.tracker = None;
            false
        }
    }

    fn emit_stopped(&self, stem: StemKind, reason: StopReason) {
        self.inner.shared.broadcast_event(GameEvent::StemStopped {
            stem,
            reason,
            timestamp: time::now(),
        });
    }

    fn publish(&self, state: &EngineState) {
        self.inner.snapshot_tx.send_replace(state.snapshot());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::headless::{ClockedStem, HeadlessContext};
    use std::time::Duration;

    fn engine() -> PlaybackEngine {
        PlaybackEngine::new(
            PlaybackSettings::default(),
            Arc::new(AudioGraph::new()),
            Arc::new(HeadlessContext::new()),
            Arc::new(SharedState::new(1200)),
        )
    }

    fn stems(kinds: &[StemKind]) -> (Vec<(StemTrack, Arc<dyn StemOutput>)>, Vec<Arc<ClockedStem>>) {
        let clocks: Vec<Arc<ClockedStem>> =
            kinds.iter().map(|k| Arc::new(ClockedStem::new(*k))).collect();
        let loaded = clocks
            .iter()
            .map(|c| {
                (
                    StemTrack::new(c.stem(), format!("mem://{}", c.stem())),
                    Arc::clone(c) as Arc<dyn StemOutput>,
                )
            })
            .collect();
        (loaded, clocks)
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_parks_stems_muted_at_start() {
        let engine = engine();
        let (loaded, clocks) = stems(&[StemKind::Drum, StemKind::Vocals]);
        engine.load(SnippetWindow::new(30.0, 15.0), loaded).await;

        for clock in &clocks {
            assert_eq!(clock.current_time(), 30.0);
            assert!(clock.is_paused());
            assert_eq!(clock.gain().unwrap().amplification(), 0.0);
        }
        let snapshot = engine.snapshot().await;
        assert_eq!(snapshot.position, 0.0);
        assert_eq!(snapshot.length, 15.0);
        assert_eq!(snapshot.stems.len(), 2);
        assert!(!snapshot.all_playing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_operations_before_load() {
        let engine = engine();
        assert_eq!(engine.play_all().await, 0);
        assert_eq!(engine.seek(3.0).await, 0.0);
        assert!(matches!(
            engine.play_one(StemKind::Bass).await,
            Err(Error::StemNotFound(StemKind::Bass))
        ));
        assert!(engine.set_volume(StemKind::Bass, 50).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tracker_follows_reference() {
        let engine = engine();
        let (loaded, _clocks) = stems(&[StemKind::Drum, StemKind::Bass]);
        engine.load(SnippetWindow::new(10.0, 15.0), loaded).await;

        engine.play_all().await;
        tokio::time::sleep(Duration::from_millis(2050)).await;

        let snapshot = engine.snapshot().await;
        assert_eq!(snapshot.position, 2.0);
        assert!(snapshot.all_playing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_volume_reaches_gain_node() {
        let engine = engine();
        let (loaded, clocks) = stems(&[StemKind::Guitar]);
        engine.load(SnippetWindow::new(0.0, 15.0), loaded).await;

        assert_eq!(engine.set_volume(StemKind::Guitar, 250).await.unwrap(), 200);
        assert_eq!(clocks[0].gain().unwrap().amplification(), 2.0);
        assert_eq!(engine.set_volume(StemKind::Guitar, -4).await.unwrap(), 0);
        assert_eq!(clocks[0].gain().unwrap().amplification(), 0.0);

        let labels = engine.ever_unmuted_labels().await;
        assert!(labels.contains("Guitar"));
    }
}
