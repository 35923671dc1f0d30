//! Configuration for the Stemdle player
//!
//! Settings sources, highest priority first:
//! 1. Command-line arguments (and their environment fallbacks)
//! 2. TOML configuration file (see `stemdle_common::config`)
//! 3. Built-in defaults (code constants)
//!
//! Everything here is bootstrap configuration; the player must restart to
//! pick up changes.

use crate::error::{Error, Result};
use crate::snippet::SnippetWindow;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Complete player configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PlayerConfig {
    /// Base URL of the game backend, including the `/api` prefix
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// User whose rating is persisted after each confirmed guess
    #[serde(default)]
    pub user_id: Option<String>,

    /// Rating to start from when the backend has none for the user
    #[serde(default = "default_initial_rating")]
    pub initial_rating: i64,

    /// Per-request timeout for backend calls
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub playback: PlaybackSettings,

    #[serde(default)]
    pub scoring: ScoringSettings,

    #[serde(default)]
    pub audio: AudioSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Timing of the snippet transport and drift corrector
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    /// Length of every snippet, in seconds
    pub snippet_length_secs: f64,
    /// Drift corrector polling interval
    pub poll_interval_ms: u64,
    /// Drift beyond which a non-reference stem is re-seeked
    pub drift_tolerance_secs: f64,
    /// Playing from within this distance of the end restarts from zero
    pub end_epsilon_secs: f64,
    /// Attempts to resume a suspended audio context before playing
    pub resume_attempts: u32,
    pub resume_backoff_ms: u64,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            snippet_length_secs: SnippetWindow::DEFAULT_LENGTH,
            poll_interval_ms: 100,
            drift_tolerance_secs: 0.1,
            end_epsilon_secs: 0.1,
            resume_attempts: 3,
            resume_backoff_ms: 50,
        }
    }
}

impl PlaybackSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn resume_backoff(&self) -> Duration {
        Duration::from_millis(self.resume_backoff_ms)
    }
}

/// Penalties applied to the similarity score
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScoringSettings {
    /// Points deducted per unmuted stem other than vocals
    pub non_vocal_penalty: i64,
    /// Points deducted once if vocals were unmuted
    pub vocals_penalty: i64,
}

impl Default for ScoringSettings {
    fn default() -> Self {
        Self {
            non_vocal_penalty: 10,
            vocals_penalty: 50,
        }
    }
}

/// Audio backend selection
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Run with virtual stem clocks instead of a sound device
    pub headless: bool,
    /// Output device name (None = default device)
    pub device: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub api_base_url: Option<String>,
    pub user_id: Option<String>,
    pub rating: Option<i64>,
    pub headless: bool,
    pub device: Option<String>,
    pub log_level: Option<String>,
}

fn default_api_base_url() -> String {
    "http://localhost:5001/api".to_string()
}

fn default_initial_rating() -> i64 {
    1200
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            user_id: None,
            initial_rating: default_initial_rating(),
            request_timeout_secs: default_request_timeout_secs(),
            playback: PlaybackSettings::default(),
            scoring: ScoringSettings::default(),
            audio: AudioSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl PlayerConfig {
    /// Load from a resolved config file (or defaults) and validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config: PlayerConfig = stemdle_common::config::load_toml(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply command-line overrides, then re-validate
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Result<Self> {
        if let Some(url) = overrides.api_base_url {
            self.api_base_url = url;
        }
        if let Some(user_id) = overrides.user_id {
            self.user_id = Some(user_id);
        }
        if let Some(rating) = overrides.rating {
            self.initial_rating = rating;
        }
        if overrides.headless {
            self.audio.headless = true;
        }
        if let Some(device) = overrides.device {
            self.audio.device = Some(device);
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        let playback = &self.playback;
        if !(playback.snippet_length_secs.is_finite() && playback.snippet_length_secs > 0.0) {
            return Err(Error::Config(format!(
                "snippet_length_secs must be positive, got {}",
                playback.snippet_length_secs
            )));
        }
        if playback.poll_interval_ms < 10 {
            return Err(Error::Config(format!(
                "poll_interval_ms must be at least 10, got {}",
                playback.poll_interval_ms
            )));
        }
        if !(playback.drift_tolerance_secs >= 0.0 && playback.end_epsilon_secs >= 0.0) {
            return Err(Error::Config(
                "drift_tolerance_secs and end_epsilon_secs must not be negative".to_string(),
            ));
        }
        if self.api_base_url.trim().is_empty() {
            return Err(Error::Config("api_base_url must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PlayerConfig::default();
        assert_eq!(config.api_base_url, "http://localhost:5001/api");
        assert_eq!(config.initial_rating, 1200);
        assert_eq!(config.playback.snippet_length_secs, 15.0);
        assert_eq!(config.playback.poll_interval(), Duration::from_millis(100));
        assert_eq!(config.scoring.non_vocal_penalty, 10);
        assert_eq!(config.scoring.vocals_penalty, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: PlayerConfig = toml::from_str(
            r#"
            user_id = "u-1"

            [playback]
            snippet_length_secs = 10.0

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.user_id.as_deref(), Some("u-1"));
        assert_eq!(config.playback.snippet_length_secs, 10.0);
        assert_eq!(config.playback.drift_tolerance_secs, 0.1);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.initial_rating, 1200);
    }

    #[test]
    fn test_overrides_take_priority() {
        let config = PlayerConfig::default()
            .with_overrides(ConfigOverrides {
                api_base_url: Some("http://game/api".to_string()),
                rating: Some(900),
                headless: true,
                ..Default::default()
            })
            .unwrap();

        assert_eq!(config.api_base_url, "http://game/api");
        assert_eq!(config.initial_rating, 900);
        assert!(config.audio.headless);
    }

    #[test]
    fn test_invalid_snippet_length_rejected() {
        let mut config = PlayerConfig::default();
        config.playback.snippet_length_secs = 0.0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_too_fast_polling_rejected() {
        let mut config = PlayerConfig::default();
        config.playback.poll_interval_ms = 1;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
