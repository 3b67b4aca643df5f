//! Realtime conversational session transport
//!
//! Speaks the bidirectional `BidiGenerateContent` WebSocket protocol:
//! a `setup` handshake, streamed PCM input, and server content carrying
//! transcription, tool calls, interruptions and synthesized speech.

mod client;
pub mod protocol;

pub use client::{LiveClient, LiveLink, TransportEvent};
pub use protocol::{ClientMessage, FunctionCall, FunctionResponse, InboundEvent, ServerMessage, Setup};

use protocol::{
    Content, Empty, GenerationConfig, PrebuiltVoiceConfig, SpeechConfig, ToolDeclarations,
    VoiceConfig,
};

use crate::Config;

/// Build the setup message for a session
///
/// Requests audio responses in the configured voice, both transcription
/// streams, and offers the local tool declarations.
#[must_use]
pub fn build_setup(config: &Config) -> Setup {
    let model = if config.model.starts_with("models/") {
        config.model.clone()
    } else {
        format!("models/{}", config.model)
    };

    Setup {
        model,
        generation_config: GenerationConfig {
            response_modalities: vec!["AUDIO".to_string()],
            speech_config: SpeechConfig {
                voice_config: VoiceConfig {
                    prebuilt_voice_config: PrebuiltVoiceConfig {
                        voice_name: config.voice_name.clone(),
                    },
                },
            },
        },
        system_instruction: config
            .system_instruction
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(Content::text),
        tools: vec![ToolDeclarations {
            function_declarations: crate::session::tools::declarations(),
        }],
        input_audio_transcription: Some(Empty {}),
        output_audio_transcription: Some(Empty {}),
    }
}
