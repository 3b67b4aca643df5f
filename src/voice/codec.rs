//! Linear PCM16 framing and transport encoding
//!
//! Outbound microphone audio is normalized `f32` at 16kHz and travels as
//! little-endian signed 16-bit PCM. Inbound speech arrives the same way at
//! 24kHz. Both directions are base64 text on the wire.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;

use crate::{Error, Result};

/// Sample rate for microphone capture (16kHz for speech)
pub const INPUT_SAMPLE_RATE: u32 = 16_000;

/// Sample rate of synthesized speech from the remote session
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

/// Media type attached to every outbound frame
pub const INPUT_MIME_TYPE: &str = "audio/pcm;rate=16000";

/// Scale between normalized floats and PCM16
const PCM_SCALE: f32 = 32768.0;

/// One encoded frame, ready to submit as realtime input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBlob {
    /// PCM16 little-endian payload
    pub data: Vec<u8>,
    /// Media type tag
    pub mime_type: &'static str,
}

impl EncodedBlob {
    /// Base64 text of the payload for the JSON transport
    #[must_use]
    pub fn to_base64(&self) -> String {
        to_base64(&self.data)
    }
}

/// Decoded inbound audio, one buffer per channel
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackChunk {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl PlaybackChunk {
    /// Build a mono chunk from samples
    #[must_use]
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: vec![samples],
        }
    }

    /// Sample rate the buffer is tagged with
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of channels
    #[must_use]
    pub const fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Samples of one channel
    #[must_use]
    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    /// Number of sample frames (per channel)
    #[must_use]
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Playback duration in seconds
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / f64::from(self.sample_rate)
    }

    /// Collapse to a single channel by averaging
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn into_mono(mut self) -> Vec<f32> {
        if self.channels.len() == 1 {
            return self.channels.pop().unwrap_or_default();
        }

        let count = self.channels.len() as f32;
        (0..self.frames())
            .map(|i| self.channels.iter().map(|c| c[i]).sum::<f32>() / count)
            .collect()
    }
}

/// Encode normalized samples as PCM16 little-endian
///
/// Samples are scaled by 32768 and truncated toward zero. Values beyond
/// the i16 range saturate rather than wrap, so a clipped input stays at
/// full scale with the correct sign.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn encode_frame(samples: &[f32]) -> EncodedBlob {
    let mut data = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let value = (sample * PCM_SCALE) as i16;
        data.extend_from_slice(&value.to_le_bytes());
    }

    EncodedBlob {
        data,
        mime_type: INPUT_MIME_TYPE,
    }
}

/// Decode PCM16 little-endian bytes into per-channel normalized samples
///
/// # Errors
///
/// Returns `MalformedAudio` if the byte length is not a whole number of
/// interleaved sample frames, or if `channels` is zero
pub fn decode_frame(bytes: &[u8], sample_rate: u32, channels: usize) -> Result<PlaybackChunk> {
    if channels == 0 {
        return Err(Error::MalformedAudio("channel count must be non-zero".to_string()));
    }

    let frame_bytes = 2 * channels;
    if bytes.len() % frame_bytes != 0 {
        return Err(Error::MalformedAudio(format!(
            "{} bytes is not a multiple of {frame_bytes}",
            bytes.len()
        )));
    }

    let frame_count = bytes.len() / frame_bytes;
    let mut buffers = vec![Vec::with_capacity(frame_count); channels];

    for (i, pair) in bytes.chunks_exact(2).enumerate() {
        let value = i16::from_le_bytes([pair[0], pair[1]]);
        buffers[i % channels].push(f32::from(value) / PCM_SCALE);
    }

    Ok(PlaybackChunk {
        sample_rate,
        channels: buffers,
    })
}

/// Base64-encode bytes for the transport
#[must_use]
pub fn to_base64(bytes: &[u8]) -> String {
    B64.encode(bytes)
}

/// Decode transport base64 into bytes
///
/// # Errors
///
/// Returns `MalformedAudio` if the text is not valid base64
pub fn from_base64(text: &str) -> Result<Vec<u8>> {
    B64.decode(text)
        .map_err(|e| Error::MalformedAudio(format!("invalid base64: {e}")))
}
