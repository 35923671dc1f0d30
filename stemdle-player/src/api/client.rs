//! Game backend client
//!
//! JSON over HTTP against the song catalog, guess scoring and user rating
//! endpoints. Failures are returned to the caller; nothing is retried here.

use crate::error::{Error, Result};
use reqwest::{Response, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use stemdle_common::models::{
    ApiErrorBody, GuessRequest, GuessResponse, HealthStatus, RandomSong, RatingUpdate, Song,
};
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("stemdle/", env!("CARGO_PKG_VERSION"));

pub struct GameApiClient {
    http: reqwest::Client,
    base_url: Url,
}

impl GameApiClient {
    /// Client for the backend at `base_url` (including any `/api` prefix)
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::Config(format!("Invalid API base URL '{}': {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Config(format!(
                "API base URL '{}' cannot carry a path",
                base_url
            )));
        }

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;

        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    /// Where the full mix of `song` can be fetched
    pub fn song_audio_url(&self, song: &Song) -> Option<String> {
        song.audio_url(self.base_url())
    }

    /// `GET /songs`
    pub async fn list_songs(&self) -> Result<Vec<Song>> {
        let url = self.endpoint(&["songs"])?;
        debug!(url = %url, "Fetching song catalog");
        let response = self.http.get(url).send().await?;
        decode(response).await
    }

    /// `GET /songs/random?snippet_length=N`
    pub async fn random_song(&self, snippet_length: f64) -> Result<RandomSong> {
        let mut url = self.endpoint(&["songs", "random"])?;
        url.query_pairs_mut()
            .append_pair("snippet_length", &format_length(snippet_length));
        debug!(url = %url, "Fetching random song");
        let response = self.http.get(url).send().await?;
        decode(response).await
    }

    /// `POST /guess`
    pub async fn submit_guess(&self, request: &GuessRequest) -> Result<GuessResponse> {
        let url = self.endpoint(&["guess"])?;
        debug!(
            actual = %request.actual_song_id,
            guessed = %request.guessed_song_id,
            "Submitting guess"
        );
        let response = self.http.post(url).json(request).send().await?;
        decode(response).await
    }

    /// `PATCH /users/{id}/elo`
    pub async fn update_rating(&self, user_id: &str, rating: i64) -> Result<()> {
        let url = self.endpoint(&["users", user_id, "elo"])?;
        let response = self
            .http
            .patch(url)
            .json(&RatingUpdate { elo_rating: rating })
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    /// `GET /health`; true when the backend reports `ok`
    pub async fn health(&self) -> Result<bool> {
        let url = self.endpoint(&["health"])?;
        let response = self.http.get(url).send().await?;
        let status: HealthStatus = decode(response).await?;
        Ok(status.status == "ok")
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("API base URL '{}' cannot carry a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

/// Snippet length as sent on the wire: `15`, not `15.0`
fn format_length(seconds: f64) -> String {
    if seconds.fract() == 0.0 && seconds.abs() < 1e9 {
        format!("{}", seconds as i64)
    } else {
        format!("{}", seconds)
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().clone();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorBody>(&body)
        .ok()
        .and_then(|b| b.error)
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                status.canonical_reason().unwrap_or("request failed").to_string()
            } else {
                body
            }
        });

    warn!(url = %url, status = status.as_u16(), "Backend request failed: {}", message);
    Err(Error::Api {
        status: status.as_u16(),
        message,
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let response = check_status(response).await?;
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_segments() {
        let client = GameApiClient::new("http://localhost:5001/api/", Duration::from_secs(5)).unwrap();
        assert_eq!(
            client.endpoint(&["songs", "random"]).unwrap().as_str(),
            "http://localhost:5001/api/songs/random"
        );
        assert_eq!(client.base_url(), "http://localhost:5001/api");

        let client = GameApiClient::new("http://localhost:5001/api", Duration::from_secs(5)).unwrap();
        assert_eq!(
            client.endpoint(&["users", "a b", "elo"]).unwrap().as_str(),
            "http://localhost:5001/api/users/a%20b/elo"
        );
    }

    #[test]
    fn test_song_audio_url_falls_back_to_file_route() {
        let client = GameApiClient::new("http://localhost:5001/api/", Duration::from_secs(5)).unwrap();
        let mut song = Song {
            id: "7".to_string(),
            filename: Some("7.m4a".to_string()),
            ..Default::default()
        };
        assert_eq!(
            client.song_audio_url(&song).as_deref(),
            Some("http://localhost:5001/api/songs/7.m4a")
        );

        song.url_original = Some("https://cdn.test/7.mp3".to_string());
        assert_eq!(client.song_audio_url(&song).as_deref(), Some("https://cdn.test/7.mp3"));
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            GameApiClient::new("not a url", Duration::from_secs(5)),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            GameApiClient::new("mailto:x@y", Duration::from_secs(5)),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_format_length() {
        assert_eq!(format_length(15.0), "15");
        assert_eq!(format_length(7.5), "7.5");
    }
}
