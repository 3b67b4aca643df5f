//! TOML configuration file loading
//!
//! Supports `~/.config/omni/beacon-live/config.toml` as a persistent config
//! source. All fields are optional — the file is a partial overlay on top of
//! defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct LiveConfigFile {
    /// Remote session configuration
    #[serde(default)]
    pub session: SessionFileConfig,

    /// Wake word configuration
    #[serde(default)]
    pub wake: WakeFileConfig,

    /// Audio pipeline configuration
    #[serde(default)]
    pub audio: AudioFileConfig,

    /// Console log configuration
    #[serde(default)]
    pub console: ConsoleFileConfig,
}

/// Remote session configuration
#[derive(Debug, Default, Deserialize)]
pub struct SessionFileConfig {
    /// API key (prefer the environment)
    pub api_key: Option<String>,

    /// WebSocket endpoint
    pub endpoint: Option<String>,

    /// Model identifier
    pub model: Option<String>,

    /// Prebuilt voice name (e.g. "Charon")
    pub voice: Option<String>,

    /// System instruction sent at setup
    pub system_instruction: Option<String>,

    /// Seconds to wait for the handshake
    pub handshake_timeout_secs: Option<u64>,
}

/// Wake word configuration
#[derive(Debug, Default, Deserialize)]
pub struct WakeFileConfig {
    /// Wake word (e.g. "jarvis")
    pub word: Option<String>,

    /// Phrases that end the conversation loop
    pub sleep_phrases: Option<Vec<String>>,

    /// "Low", "Medium" or "High"
    pub sensitivity: Option<String>,
}

/// Audio pipeline configuration
#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    /// Capture frames allowed in flight before new frames are dropped
    pub capture_queue: Option<usize>,
}

/// Console log configuration
#[derive(Debug, Default, Deserialize)]
pub struct ConsoleFileConfig {
    /// Number of log entries retained
    pub capacity: Option<usize>,
}

/// Load the TOML config file from the standard path
///
/// Returns `LiveConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> LiveConfigFile {
    config_file_path().map_or_else(LiveConfigFile::default, |path| load_from(&path))
}

/// Load a TOML config file from `path`
///
/// Missing or invalid files fall back to defaults with a warning.
pub fn load_from(path: &Path) -> LiveConfigFile {
    if !path.exists() {
        return LiveConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                LiveConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            LiveConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/omni/beacon-live/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| {
        d.config_dir()
            .join("omni")
            .join("beacon-live")
            .join("config.toml")
    })
}
