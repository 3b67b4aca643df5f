//! Wake word detection on live transcription
//!
//! The remote session transcribes the microphone stream; each transcription
//! fragment is checked here for sleep phrases and the wake word. Sleep
//! phrases always win over the wake word within a single utterance.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Default wake word
pub const DEFAULT_WAKE_WORD: &str = "jarvis";

/// Default phrases that put the assistant back to sleep
pub const DEFAULT_SLEEP_PHRASES: &[&str] = &["go to sleep", "standby"];

/// How strictly the wake word must match
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sensitivity {
    /// Utterance must be the wake word, or start with it as a word
    Low,
    /// Wake word, or "hey" + wake word, anywhere in the utterance
    #[default]
    Medium,
    /// Wake word anywhere in the utterance
    High,
}

impl Sensitivity {
    /// All levels, in declaration order
    pub const ALL: [Self; 3] = [Self::Low, Self::Medium, Self::High];

    /// Wire name of the level
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

impl std::str::FromStr for Sensitivity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(Error::InvalidArgument(format!(
                "sensitivity must be Low, Medium or High, got {other:?}"
            ))),
        }
    }
}

impl std::fmt::Display for Sensitivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the conversation loop is engaged
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum WakeState {
    /// Waiting for the wake word
    #[default]
    Asleep,
    /// In a conversation, no wake word needed
    Awake,
}

impl WakeState {
    /// Check if awake
    #[must_use]
    pub const fn is_awake(self) -> bool {
        matches!(self, Self::Awake)
    }
}

impl std::fmt::Display for WakeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Asleep => write!(f, "asleep"),
            Self::Awake => write!(f, "awake"),
        }
    }
}

/// A change of wake state caused by one utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeTransition {
    /// A sleep phrase was heard
    Sleep,
    /// The wake word was heard while asleep
    Wake,
}

impl WakeTransition {
    /// State after the transition
    #[must_use]
    pub const fn target(self) -> WakeState {
        match self {
            Self::Sleep => WakeState::Asleep,
            Self::Wake => WakeState::Awake,
        }
    }
}

/// Detects wake words and sleep phrases in transcribed text
#[derive(Debug, Clone)]
pub struct WakeWordDetector {
    wake_word: String,
    greeting: String,
    sleep_phrases: Vec<String>,
}

impl Default for WakeWordDetector {
    fn default() -> Self {
        Self {
            wake_word: DEFAULT_WAKE_WORD.to_string(),
            greeting: format!("hey {DEFAULT_WAKE_WORD}"),
            sleep_phrases: DEFAULT_SLEEP_PHRASES.iter().map(ToString::to_string).collect(),
        }
    }
}

impl WakeWordDetector {
    /// Create a detector for `wake_word` and the given sleep phrases
    ///
    /// Both are normalized to trimmed lower case. Blank sleep phrases are
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the wake word is blank
    pub fn new(wake_word: &str, sleep_phrases: Vec<String>) -> Result<Self> {
        let wake_word = wake_word.trim().to_lowercase();
        if wake_word.is_empty() {
            return Err(Error::Config("wake word must not be blank".to_string()));
        }

        let sleep_phrases: Vec<String> = sleep_phrases
            .into_iter()
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();

        tracing::debug!(wake_word, sleep_phrases = ?sleep_phrases, "wake word detector initialized");

        Ok(Self {
            greeting: format!("hey {wake_word}"),
            wake_word,
            sleep_phrases,
        })
    }

    /// Check one utterance and return the resulting transition, if any
    ///
    /// A sleep phrase always yields `Sleep`, even when already asleep. The
    /// wake word only yields `Wake` when currently asleep.
    #[must_use]
    pub fn evaluate(
        &self,
        transcript: &str,
        sensitivity: Sensitivity,
        state: WakeState,
    ) -> Option<WakeTransition> {
        let text = transcript.trim().to_lowercase();

        if self.is_sleep_command(&text) {
            tracing::debug!(transcript, "sleep phrase detected");
            return Some(WakeTransition::Sleep);
        }

        if self.is_triggered(&text, sensitivity) && !state.is_awake() {
            tracing::info!(wake_word = %self.wake_word, %sensitivity, transcript, "wake word detected");
            return Some(WakeTransition::Wake);
        }

        None
    }

    /// Whether normalized text contains a sleep phrase
    #[must_use]
    pub fn is_sleep_command(&self, text: &str) -> bool {
        self.sleep_phrases.iter().any(|p| text.contains(p.as_str()))
    }

    /// Whether normalized text contains the wake word at this sensitivity
    #[must_use]
    pub fn is_triggered(&self, text: &str, sensitivity: Sensitivity) -> bool {
        match sensitivity {
            Sensitivity::High => text.contains(&self.wake_word),
            Sensitivity::Medium => {
                text.contains(&self.wake_word) || text.contains(&self.greeting)
            }
            Sensitivity::Low => {
                text == self.wake_word
                    || text
                        .strip_prefix(self.wake_word.as_str())
                        .is_some_and(|rest| rest.starts_with(' '))
            }
        }
    }

    /// Get the configured wake word
    #[must_use]
    pub fn wake_word(&self) -> &str {
        &self.wake_word
    }
}
