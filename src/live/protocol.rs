//! Wire types for the realtime conversational session
//!
//! Client messages are single-key JSON objects (`setup`, `realtimeInput`,
//! `toolResponse`). Server messages may carry any combination of fields;
//! [`ServerMessage::into_events`] flattens one message into the ordered
//! list of events the session handles.

use serde::{Deserialize, Serialize};

use crate::voice::{EncodedBlob, OUTPUT_SAMPLE_RATE};

/// Messages sent to the remote session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    /// First message on the socket, configures the session
    Setup(Setup),
    /// Streaming microphone audio
    RealtimeInput(RealtimeInput),
    /// Answers to tool calls
    ToolResponse(ToolResponse),
}

impl ClientMessage {
    /// Realtime input carrying one encoded frame
    #[must_use]
    pub fn audio(blob: &EncodedBlob) -> Self {
        Self::RealtimeInput(RealtimeInput {
            media_chunks: vec![MediaChunk {
                mime_type: blob.mime_type.to_string(),
                data: blob.to_base64(),
            }],
        })
    }

    /// Tool response carrying a single function response
    #[must_use]
    pub fn tool_response(response: FunctionResponse) -> Self {
        Self::ToolResponse(ToolResponse {
            function_responses: vec![response],
        })
    }

    /// Serialize to the JSON text frame
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Session configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    /// Model resource name, e.g. `models/gemini-...`
    pub model: String,
    pub generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDeclarations>,
    /// Present (as `{}`) to receive input transcription
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<Empty>,
    /// Present (as `{}`) to receive output transcription
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_audio_transcription: Option<Empty>,
}

/// Empty JSON object marker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Empty {}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    pub speech_config: SpeechConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

/// Text content, used for the system instruction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Content {
    pub parts: Vec<TextPart>,
}

impl Content {
    /// Single-part text content
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            parts: vec![TextPart { text: text.into() }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextPart {
    pub text: String,
}

/// Function declarations offered to the model
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDeclarations {
    pub function_declarations: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media_chunks: Vec<MediaChunk>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaChunk {
    pub mime_type: String,
    /// Base64 payload
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponse {
    pub function_responses: Vec<FunctionResponse>,
}

/// Result of one function call, correlated by the call id
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub response: serde_json::Value,
}

/// Any message received from the remote session
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    pub setup_complete: Option<serde_json::Value>,
    pub server_content: Option<ServerContent>,
    pub tool_call: Option<ToolCall>,
    pub go_away: Option<GoAway>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    pub model_turn: Option<ModelTurn>,
    #[serde(default)]
    pub interrupted: bool,
    #[serde(default)]
    pub turn_complete: bool,
    pub input_transcription: Option<Transcription>,
    pub output_transcription: Option<Transcription>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ModelTurn {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    pub inline_data: Option<InlineData>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: Option<String>,
    pub data: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Transcription {
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    #[serde(default)]
    pub function_calls: Vec<FunctionCall>,
}

/// A function call requested by the model
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FunctionCall {
    /// Opaque correlation id, echoed back in the response
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoAway {
    pub time_left: Option<String>,
}

/// One unit of work derived from a server message
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// Handshake acknowledged
    SetupComplete,
    /// Transcription of the user's speech
    Transcription(String),
    /// Transcription of the model's speech
    OutputTranscription(String),
    /// Function calls to dispatch, in order
    ToolCalls(Vec<FunctionCall>),
    /// The user barged in; stop speaking
    Interrupted,
    /// Base64 PCM16 speech
    Audio { data: String, sample_rate: u32 },
    /// The model finished its turn
    TurnComplete,
    /// The server will close the connection soon
    GoAway(Option<String>),
}

impl ServerMessage {
    /// Parse a JSON text frame
    ///
    /// # Errors
    ///
    /// Returns error if the text is not a server message
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Flatten into events
    ///
    /// Order: setup, transcriptions, tool calls, interruption, audio, turn
    /// completion, go-away.
    #[must_use]
    pub fn into_events(self) -> Vec<InboundEvent> {
        let mut events = Vec::new();

        if self.setup_complete.is_some() {
            events.push(InboundEvent::SetupComplete);
        }

        let content = self.server_content.unwrap_or_default();

        if let Some(text) = content.input_transcription.and_then(|t| t.text) {
            events.push(InboundEvent::Transcription(text));
        }
        if let Some(text) = content.output_transcription.and_then(|t| t.text) {
            events.push(InboundEvent::OutputTranscription(text));
        }

        if let Some(call) = self.tool_call
            && !call.function_calls.is_empty()
        {
            events.push(InboundEvent::ToolCalls(call.function_calls));
        }

        if content.interrupted {
            events.push(InboundEvent::Interrupted);
        }

        let parts = content.model_turn.map(|t| t.parts).unwrap_or_default();
        for inline in parts.into_iter().filter_map(|p| p.inline_data) {
            let mime = inline.mime_type.as_deref().unwrap_or("audio/pcm");
            if !mime.starts_with("audio/") {
                tracing::debug!(mime, "ignoring non-audio inline data");
                continue;
            }
            events.push(InboundEvent::Audio {
                sample_rate: rate_from_mime(mime).unwrap_or(OUTPUT_SAMPLE_RATE),
                data: inline.data,
            });
        }

        if content.turn_complete {
            events.push(InboundEvent::TurnComplete);
        }

        if let Some(go_away) = self.go_away {
            events.push(InboundEvent::GoAway(go_away.time_left));
        }

        events
    }
}

/// Extract `rate=N` from a media type such as `audio/pcm;rate=24000`
fn rate_from_mime(mime: &str) -> Option<u32> {
    mime.split(';')
        .filter_map(|param| param.trim().strip_prefix("rate="))
        .find_map(|rate| rate.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_shapes() {
        let blob = crate::voice::encode_frame(&[0.0, 0.5]);
        let json: serde_json::Value =
            serde_json::from_str(&ClientMessage::audio(&blob).to_json().unwrap()).unwrap();
        assert_eq!(
            json["realtimeInput"]["mediaChunks"][0]["mimeType"],
            "audio/pcm;rate=16000"
        );
        assert_eq!(json["realtimeInput"]["mediaChunks"][0]["data"], "AAAAQA==");

        let response = ClientMessage::tool_response(FunctionResponse {
            id: Some("call-1".into()),
            name: "clearConsoleLogs".into(),
            response: serde_json::json!({ "result": "ok" }),
        });
        let json: serde_json::Value = serde_json::from_str(&response.to_json().unwrap()).unwrap();
        assert_eq!(json["toolResponse"]["functionResponses"][0]["id"], "call-1");
        assert_eq!(
            json["toolResponse"]["functionResponses"][0]["response"]["result"],
            "ok"
        );
    }

    #[test]
    fn test_full_message_event_order() {
        let message = ServerMessage::parse(
            r#"{
                "serverContent": {
                    "inputTranscription": { "text": "hey jarvis" },
                    "interrupted": true,
                    "modelTurn": { "parts": [
                        { "inlineData": { "mimeType": "audio/pcm;rate=24000", "data": "AAA=" } },
                        { "text": "thinking" }
                    ] },
                    "turnComplete": true
                },
                "toolCall": { "functionCalls": [ { "id": "1", "name": "getSystemStatus" } ] },
                "somethingNew": 42
            }"#,
        )
        .unwrap();

        let events = message.into_events();
        assert_eq!(events.len(), 5);
        assert_eq!(events[0], InboundEvent::Transcription("hey jarvis".into()));
        assert!(matches!(&events[1], InboundEvent::ToolCalls(calls) if calls[0].name == "getSystemStatus" && calls[0].args.is_empty()));
        assert_eq!(events[2], InboundEvent::Interrupted);
        assert_eq!(
            events[3],
            InboundEvent::Audio {
                data: "AAA=".into(),
                sample_rate: 24_000
            }
        );
        assert_eq!(events[4], InboundEvent::TurnComplete);
    }

    #[test]
    fn test_empty_and_setup_messages() {
        assert!(ServerMessage::parse("{}").unwrap().into_events().is_empty());
        assert_eq!(
            ServerMessage::parse(r#"{"setupComplete": {}}"#).unwrap().into_events(),
            vec![InboundEvent::SetupComplete]
        );
    }

    #[test]
    fn test_rate_from_mime() {
        assert_eq!(rate_from_mime("audio/pcm;rate=24000"), Some(24_000));
        assert_eq!(rate_from_mime("audio/pcm; rate=16000"), Some(16_000));
        assert_eq!(rate_from_mime("audio/pcm"), None);
    }
}
