//! In-process game backend
//!
//! Serves the catalog, random-song, guess, rating and health routes under
//! `/api` on 127.0.0.1 with an ephemeral port. Responses, delays and
//! failures are scripted per test; every request is recorded.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stemdle_common::models::{GuessRequest, GuessResponse, RandomSong, RatingUpdate, Song};
use tokio::task::JoinHandle;

#[derive(Default)]
struct MockState {
    songs: Mutex<Vec<Song>>,
    /// Scripted `/songs/random` answers, served in request order
    random: Mutex<VecDeque<(RandomSong, Duration)>>,
    guess: Mutex<Option<GuessResponse>>,
    guess_delay: Mutex<Duration>,
    fail_random: AtomicBool,
    fail_rating: AtomicBool,
    requests: AtomicUsize,
    snippet_lengths: Mutex<Vec<String>>,
    guesses: Mutex<Vec<GuessRequest>>,
    rating_updates: Mutex<Vec<(String, i64)>>,
}

pub struct MockBackend {
    base_url: String,
    state: Arc<MockState>,
    server: JoinHandle<()>,
}

impl MockBackend {
    pub async fn start() -> Self {
        let state = Arc::new(MockState::default());
        let api = Router::new()
            .route("/songs", get(list_songs))
            .route("/songs/random", get(random_song))
            .route("/guess", post(guess))
            .route("/users/:id/elo", patch(update_elo))
            .route("/health", get(health))
            .with_state(Arc::clone(&state));
        let app = Router::new().nest("/api", api);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock backend");
        let addr = listener.local_addr().expect("mock backend address");
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("mock backend server");
        });

        Self {
            base_url: format!("http://{}/api", addr),
            state,
            server,
        }
    }

    /// Base URL including the `/api` prefix
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn set_songs(&self, songs: Vec<Song>) {
        *self.state.songs.lock().unwrap() = songs;
    }

    pub fn push_random(&self, song: RandomSong) {
        self.push_random_delayed(song, Duration::ZERO);
    }

    /// Queue a random-song answer sent after `delay`
    pub fn push_random_delayed(&self, song: RandomSong, delay: Duration) {
        self.state.random.lock().unwrap().push_back((song, delay));
    }

    pub fn set_guess_response(&self, response: GuessResponse) {
        *self.state.guess.lock().unwrap() = Some(response);
    }

    /// Hold every guess answer back for `delay`
    pub fn delay_guesses(&self, delay: Duration) {
        *self.state.guess_delay.lock().unwrap() = delay;
    }

    pub fn fail_random(&self, fail: bool) {
        self.state.fail_random.store(fail, Ordering::SeqCst);
    }

    pub fn fail_rating(&self, fail: bool) {
        self.state.fail_rating.store(fail, Ordering::SeqCst);
    }

    pub fn request_count(&self) -> usize {
        self.state.requests.load(Ordering::SeqCst)
    }

    pub fn snippet_lengths(&self) -> Vec<String> {
        self.state.snippet_lengths.lock().unwrap().clone()
    }

    pub fn guesses(&self) -> Vec<GuessRequest> {
        self.state.guesses.lock().unwrap().clone()
    }

    pub fn rating_updates(&self) -> Vec<(String, i64)> {
        self.state.rating_updates.lock().unwrap().clone()
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn list_songs(State(state): State<Arc<MockState>>) -> Json<Vec<Song>> {
    state.requests.fetch_add(1, Ordering::SeqCst);
    Json(state.songs.lock().unwrap().clone())
}

async fn random_song(
    State(state): State<Arc<MockState>>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);
    if let Some(length) = query.get("snippet_length") {
        state.snippet_lengths.lock().unwrap().push(length.clone());
    }
    if state.fail_random.load(Ordering::SeqCst) {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "no songs available" })),
        )
            .into_response();
    }

    let next = state.random.lock().unwrap().pop_front();
    match next {
        Some((song, delay)) => {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Json(song).into_response()
        }
        None => (StatusCode::NOT_FOUND, Json(json!({ "error": "no scripted song" }))).into_response(),
    }
}

async fn guess(State(state): State<Arc<MockState>>, Json(request): Json<GuessRequest>) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);
    state.guesses.lock().unwrap().push(request);
    let delay = *state.guess_delay.lock().unwrap();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    let response = state.guess.lock().unwrap().clone();
    match response {
        Some(response) => Json(response).into_response(),
        None => (StatusCode::INTERNAL_SERVER_ERROR, "no scripted guess response").into_response(),
    }
}

async fn update_elo(
    State(state): State<Arc<MockState>>,
    Path(user_id): Path<String>,
    Json(body): Json<RatingUpdate>,
) -> StatusCode {
    state.requests.fetch_add(1, Ordering::SeqCst);
    if state.fail_rating.load(Ordering::SeqCst) {
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    state
        .rating_updates
        .lock()
        .unwrap()
        .push((user_id, body.elo_rating));
    StatusCode::NO_CONTENT
}

async fn health(State(state): State<Arc<MockState>>) -> Json<serde_json::Value> {
    state.requests.fetch_add(1, Ordering::SeqCst);
    Json(json!({ "status": "ok" }))
}
