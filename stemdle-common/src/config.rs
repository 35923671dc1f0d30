//! Configuration file resolution and loading
//!
//! The bootstrap TOML file is located by priority:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. `<user config dir>/stemdle/config.toml`, if it exists
//! 4. None: callers fall back to built-in defaults

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "STEMDLE_CONFIG";

/// Locate the config file following the priority order above.
///
/// An explicitly named file (argument or environment) is returned even if it
/// does not exist, so that loading reports the error instead of silently
/// using defaults.
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Per-user config file
    default_config_path().filter(|path| path.exists())
}

/// Per-user config file location for the platform
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("stemdle").join("config.toml"))
}

/// Load a TOML config, or `T::default()` when no file was resolved
pub fn load_toml<T>(path: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path else {
        info!("No config file found, using built-in defaults");
        return Ok(T::default());
    };

    debug!("Loading config from {}", path.display());
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;

    let config = toml::from_str(&content)?;
    info!("Loaded config from {}", path.display());
    Ok(config)
}
