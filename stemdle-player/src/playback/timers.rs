//! Per-stem cutoff timers
//!
//! Each playing stem has at most one armed timer. Arming again or cancelling
//! aborts the previous task, and every timer carries an id so a callback that
//! was already running when it got superseded can tell it is stale.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use stemdle_common::StemKind;
use tokio::task::JoinHandle;

struct CutoffTimer {
    id: u64,
    handle: JoinHandle<()>,
}

#[derive(Default)]
pub(super) struct CutoffTimers {
    armed: HashMap<StemKind, CutoffTimer>,
    next_id: u64,
}

impl CutoffTimers {
    /// Arm a timer for `kind`, replacing any armed one.
    ///
    /// `on_fire` receives the new timer's id and builds the future run when
    /// `delay` elapses.
    pub fn arm<F, Fut>(&mut self, kind: StemKind, delay: Duration, on_fire: F) -> u64
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel(kind);
        self.next_id += 1;
        let id = self.next_id;

        let fire = on_fire(id);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            fire.await;
        });

        self.armed.insert(kind, CutoffTimer { id, handle });
        id
    }

    /// Abort the armed timer for `kind`; returns whether one was armed
    pub fn cancel(&mut self, kind: StemKind) -> bool {
        match self.armed.remove(&kind) {
            Some(timer) => {
                timer.handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, timer) in self.armed.drain() {
            timer.handle.abort();
        }
    }

    /// Retire timer `id` from inside its own callback.
    ///
    /// Returns false when `id` has been superseded or cancelled.
    pub fn complete(&mut self, kind: StemKind, id: u64) -> bool {
        if self.armed.get(&kind).is_some_and(|t| t.id == id) {
            self.armed.remove(&kind);
            true
        } else {
            false
        }
    }

    pub fn is_armed(&self, kind: StemKind) -> bool {
        self.armed.contains_key(&kind)
    }

    pub fn len(&self) -> usize {
        self.armed.len()
    }
}

impl Drop for CutoffTimers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
