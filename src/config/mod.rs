//! Configuration management for Beacon Live
//!
//! Precedence is env > TOML file > default.

pub mod file;

use std::time::Duration;

use secrecy::SecretString;

use crate::voice::{DEFAULT_SLEEP_PHRASES, DEFAULT_WAKE_WORD, Sensitivity};
use crate::{Error, Result};
use file::LiveConfigFile;

/// Default realtime endpoint
pub const DEFAULT_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Default native-audio model
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-native-audio-preview-09-2025";

/// Default prebuilt voice
pub const DEFAULT_VOICE: &str = "Charon";

/// Default handshake deadline
const DEFAULT_HANDSHAKE_TIMEOUT_SECS: u64 = 15;

/// Default number of capture frames in flight
const DEFAULT_CAPTURE_QUEUE: usize = 1;

/// Default number of retained console entries
const DEFAULT_LOG_CAPACITY: usize = 50;

/// Default system instruction
const DEFAULT_SYSTEM_INSTRUCTION: &str = "\
You are a voice assistant with a dry wit and impeccable manners. Keep answers \
short and conversational; they will be spoken aloud.

Once the user says your name you are awake and stay in the conversation \
without needing your name again. If the user says \"go to sleep\" or \
\"standby\", say you are going offline and wait for your name.

You can report system status, clear the console log, and change how \
strictly you listen for your name (Low, Medium or High).";

/// Beacon Live configuration
#[derive(Debug)]
pub struct Config {
    /// API key for the realtime service
    pub api_key: Option<SecretString>,

    /// WebSocket endpoint
    pub endpoint: String,

    /// Model identifier
    pub model: String,

    /// Prebuilt voice name
    pub voice_name: String,

    /// System instruction sent at setup
    pub system_instruction: Option<String>,

    /// Wake word
    pub wake_word: String,

    /// Phrases that put the assistant to sleep
    pub sleep_phrases: Vec<String>,

    /// Initial wake word sensitivity
    pub sensitivity: Sensitivity,

    /// Deadline for the session handshake
    pub handshake_timeout: Duration,

    /// Capture frames allowed in flight before dropping
    pub capture_queue: usize,

    /// Console entries retained
    pub log_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            voice_name: DEFAULT_VOICE.to_string(),
            system_instruction: Some(DEFAULT_SYSTEM_INSTRUCTION.to_string()),
            wake_word: DEFAULT_WAKE_WORD.to_string(),
            sleep_phrases: DEFAULT_SLEEP_PHRASES.iter().map(ToString::to_string).collect(),
            sensitivity: Sensitivity::default(),
            handshake_timeout: Duration::from_secs(DEFAULT_HANDSHAKE_TIMEOUT_SECS),
            capture_queue: DEFAULT_CAPTURE_QUEUE,
            log_capacity: DEFAULT_LOG_CAPACITY,
        }
    }
}

impl Config {
    /// Load configuration from the environment and the config file
    ///
    /// # Errors
    ///
    /// Returns error if a value is present but invalid
    pub fn load() -> Result<Self> {
        Self::from_sources(file::load_config_file(), |key| std::env::var(key).ok())
    }

    /// Build configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if a value is present but invalid
    pub fn from_sources(fc: LiveConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        // API key (env > toml > None)
        let api_key = env("GEMINI_API_KEY")
            .or_else(|| env("API_KEY"))
            .or(fc.session.api_key)
            .filter(|k| !k.trim().is_empty())
            .map(SecretString::from);

        let endpoint = env("BEACON_LIVE_ENDPOINT")
            .or(fc.session.endpoint)
            .unwrap_or(defaults.endpoint);
        let model = env("BEACON_LIVE_MODEL")
            .or(fc.session.model)
            .unwrap_or(defaults.model);
        let voice_name = env("BEACON_LIVE_VOICE")
            .or(fc.session.voice)
            .unwrap_or(defaults.voice_name);
        let system_instruction = env("BEACON_LIVE_SYSTEM_INSTRUCTION")
            .or(fc.session.system_instruction)
            .or(defaults.system_instruction);

        let handshake_timeout = match env("BEACON_LIVE_HANDSHAKE_TIMEOUT") {
            Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
                Error::Config(format!("BEACON_LIVE_HANDSHAKE_TIMEOUT must be seconds, got {raw:?}"))
            })?,
            None => fc
                .session
                .handshake_timeout_secs
                .unwrap_or(DEFAULT_HANDSHAKE_TIMEOUT_SECS),
        };
        if handshake_timeout == 0 {
            return Err(Error::Config("handshake timeout must be at least 1s".to_string()));
        }

        // Wake word (env > toml > default)
        let wake_word = env("BEACON_LIVE_WAKE_WORD")
            .or(fc.wake.word)
            .filter(|w| !w.trim().is_empty())
            .unwrap_or(defaults.wake_word);
        let sleep_phrases = fc.wake.sleep_phrases.unwrap_or(defaults.sleep_phrases);
        let sensitivity = env("BEACON_LIVE_SENSITIVITY")
            .or(fc.wake.sensitivity)
            .map(|s| s.parse::<Sensitivity>())
            .transpose()
            .map_err(|e| Error::Config(e.to_string()))?
            .unwrap_or(defaults.sensitivity);

        let capture_queue = fc.audio.capture_queue.unwrap_or(defaults.capture_queue).max(1);
        let log_capacity = fc.console.capacity.unwrap_or(defaults.log_capacity).max(1);

        Ok(Self {
            api_key,
            endpoint,
            model,
            voice_name,
            system_instruction,
            wake_word,
            sleep_phrases,
            sensitivity,
            handshake_timeout: Duration::from_secs(handshake_timeout),
            capture_queue,
            log_capacity,
        })
    }
}
