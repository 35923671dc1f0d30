//! Position tracker and drift corrector
//!
//! While anything plays, a periodic task reads the playhead from the first
//! playing stem (the reference), publishes it, and re-seeks any other stem
//! that drifted further than the tolerance from the reference.

use super::session::PlaybackSession;
use crate::audio::StemOutput;
use crate::snippet::SnippetWindow;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use stemdle_common::StemKind;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// Whether a stem is far enough from the expected time to be re-seeked
pub fn needs_correction(observed: f64, expected: f64, tolerance: f64) -> bool {
    (observed - expected).abs() > tolerance
}

/// Outcome of one tracker tick
#[derive(Debug, Default, PartialEq)]
pub(super) struct Reconciled {
    pub reference: Option<StemKind>,
    /// Stems whose media ran out since the last tick
    pub ended: Vec<StemKind>,
    pub corrected: Vec<StemKind>,
}

/// One tick: retire ended stems, follow the reference, realign the rest.
///
/// `order` is the registry order; the first playing stem in it is the
/// reference. Leaves the position untouched when nothing plays.
pub(super) fn reconcile(
    session: &mut PlaybackSession,
    order: &[StemKind],
    outputs: &HashMap<StemKind, Arc<dyn StemOutput>>,
    window: SnippetWindow,
    tolerance: f64,
) -> Reconciled {
    let mut result = Reconciled::default();

    for &kind in order {
        if session.is_playing(kind) && outputs.get(&kind).is_some_and(|o| o.has_ended()) {
            session.set_playing(kind, false);
            result.ended.push(kind);
        }
    }

    let reference = order.iter().copied().find(|kind| {
        session.is_playing(*kind) && outputs.get(kind).is_some_and(|o| !o.is_paused())
    });
    let Some(reference) = reference else {
        return result;
    };
    result.reference = Some(reference);

    if let Some(output) = outputs.get(&reference) {
        session.position = window.clamp(window.to_relative(output.current_time()));
    }
    let expected = window.to_absolute(session.position);

    for &kind in order {
        if kind == reference {
            continue;
        }
        let Some(output) = outputs.get(&kind) else {
            continue;
        };
        if output.has_ended() {
            continue;
        }
        let observed = output.current_time();
        if needs_correction(observed, expected, tolerance) {
            debug!(
                "Stem {} drifted {:.3}s from {}; realigning",
                kind,
                observed - expected,
                reference
            );
            output.set_current_time(expected);
            result.corrected.push(kind);
        }
    }

    result
}

/// Run `tick` every `interval` until it returns false
pub(super) fn spawn<F, Fut>(interval: Duration, mut tick: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = bool> + Send,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if !tick().await {
                break;
            }
        }
        debug!("Position tracker stopped");
    })
}
