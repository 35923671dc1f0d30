//! Per-stem gain controller
//!
//! Every stem output is routed through exactly one [`GainNode`]. The node is
//! created the first time a stem is wired and reused afterwards, so wiring the
//! same stem again is a no-op rather than an error.

use super::StemOutput;
use crate::error::{Error, Result};
use stemdle_common::StemKind;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

/// Linear amplification for a volume percentage (100 = unity)
pub fn amplification_for(percent: u8) -> f32 {
    f32::from(percent) / 100.0
}

/// Gain stage shared between the control side and the audio callback.
///
/// The amplification is stored as raw `f32` bits so the callback can read it
/// without locking.
#[derive(Debug)]
pub struct GainNode {
    stem: StemKind,
    amplification: AtomicU32,
}

impl GainNode {
    pub fn new(stem: StemKind, percent: u8) -> Self {
        Self {
            stem,
            amplification: AtomicU32::new(amplification_for(percent).to_bits()),
        }
    }

    pub fn stem(&self) -> StemKind {
        self.stem
    }

    pub fn set_percent(&self, percent: u8) {
        self.amplification
            .store(amplification_for(percent).to_bits(), Ordering::Release);
    }

    pub fn amplification(&self) -> f32 {
        f32::from_bits(self.amplification.load(Ordering::Acquire))
    }
}

/// Gain nodes for the stems of the current song
#[derive(Debug, Default)]
pub struct AudioGraph {
    nodes: Mutex<HashMap<StemKind, Arc<GainNode>>>,
    closed: AtomicBool,
}

impl AudioGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route `output` through a gain node for `stem`.
    ///
    /// Fails with `AlreadyWired` when the stem already has a node in this
    /// graph. An output that is still routed through a node from an earlier
    /// song keeps that node; it is adopted and re-levelled to `percent`.
    pub fn connect(
        &self,
        stem: StemKind,
        output: &dyn StemOutput,
        percent: u8,
    ) -> Result<Arc<GainNode>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::GraphClosed);
        }

        let mut nodes = self.nodes.lock().unwrap_or_else(PoisonError::into_inner);
        if nodes.contains_key(&stem) {
            return Err(Error::AlreadyWired(stem));
        }

        let node = match output.gain() {
            Some(existing) => {
                existing.set_percent(percent);
                existing
            }
            None => {
                let node = Arc::new(GainNode::new(stem, percent));
                match output.route(Arc::clone(&node)) {
                    Ok(()) => node,
                    // Lost a race with another router; use whatever won
                    Err(Error::AlreadyWired(_)) => output.gain().unwrap_or(node),
                    Err(e) => return Err(e),
                }
            }
        };

        nodes.insert(stem, Arc::clone(&node));
        Ok(node)
    }

    /// Idempotent form of [`connect`](Self::connect).
    ///
    /// Returns the stem's node, or `None` when the output could not be routed.
    /// Routing failures are logged and otherwise ignored.
    pub fn wire(
        &self,
        stem: StemKind,
        output: &dyn StemOutput,
        percent: u8,
    ) -> Option<Arc<GainNode>> {
        match self.connect(stem, output, percent) {
            Ok(node) => Some(node),
            Err(Error::AlreadyWired(_)) => {
                debug!("Stem {} already wired", stem);
                self.node(stem)
            }
            Err(e) => {
                warn!("Failed to wire stem {}: {}", stem, e);
                None
            }
        }
    }

    pub fn node(&self, stem: StemKind) -> Option<Arc<GainNode>> {
        self.nodes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&stem)
            .cloned()
    }

    /// Apply a volume change; returns false when the stem is not wired
    pub fn set_volume(&self, stem: StemKind, percent: u8) -> bool {
        match self.node(stem) {
            Some(node) => {
                node.set_percent(percent);
                true
            }
            None => false,
        }
    }

    /// Forget all nodes (song change)
    pub fn reset(&self) {
        self.nodes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Tear the graph down; later wiring fails with `GraphClosed`
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.reset();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.nodes.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
