//! Shared state
//!
//! State read by every component: the event bus, the round state and the
//! player's rating.

use serde::Serialize;
use std::sync::atomic::{AtomicI64, Ordering};
use stemdle_common::events::GameEvent;
use tokio::sync::{broadcast, RwLock};

/// Where the current round stands
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum RoundState {
    /// No round requested yet
    Idle,
    /// A new song is being fetched
    Loading,
    /// Song loaded and playable
    Ready,
    /// The last round request failed
    Failed(String),
}

pub struct SharedState {
    pub event_tx: broadcast::Sender<GameEvent>,
    round_state: RwLock<RoundState>,
    rating: AtomicI64,
}

impl SharedState {
    pub fn new(initial_rating: i64) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self {
            event_tx,
            round_state: RwLock::new(RoundState::Idle),
            rating: AtomicI64::new(initial_rating),
        }
    }

    /// Broadcast an event to all listeners
    pub fn broadcast_event(&self, event: GameEvent) {
        // No receivers is fine
        let _ = self.event_tx.send(event);
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<GameEvent> {
        self.event_tx.subscribe()
    }

    pub async fn round_state(&self) -> RoundState {
        self.round_state.read().await.clone()
    }

    pub async fn set_round_state(&self, state: RoundState) {
        *self.round_state.write().await = state;
    }

    pub fn rating(&self) -> i64 {
        self.rating.load(Ordering::SeqCst)
    }

    pub fn set_rating(&self, rating: i64) {
        self.rating.store(rating, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stemdle_common::time;

    #[tokio::test]
    async fn test_round_state_transitions() {
        let state = SharedState::new(1200);
        assert_eq!(state.round_state().await, RoundState::Idle);

        state.set_round_state(RoundState::Loading).await;
        assert_eq!(state.round_state().await, RoundState::Loading);

        state
            .set_round_state(RoundState::Failed("boom".to_string()))
            .await;
        assert_eq!(
            state.round_state().await,
            RoundState::Failed("boom".to_string())
        );
    }

    #[tokio::test]
    async fn test_event_broadcast() {
        let state = SharedState::new(1200);
        // Broadcasting with no listeners does not fail
        state.broadcast_event(GameEvent::Seeked {
            position: 1.0,
            timestamp: time::now(),
        });

        let mut rx = state.subscribe_events();
        state.broadcast_event(GameEvent::Seeked {
            position: 2.0,
            timestamp: time::now(),
        });
        match rx.recv().await.unwrap() {
            GameEvent::Seeked { position, .. } => assert_eq!(position, 2.0),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_rating() {
        let state = SharedState::new(1200);
        assert_eq!(state.rating(), 1200);
        state.set_rating(1265);
        assert_eq!(state.rating(), 1265);
    }
}
