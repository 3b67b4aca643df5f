//! Voice processing module
//!
//! Handles PCM framing, microphone capture, gapless playback, and
//! transcript-driven wake word detection.

pub mod codec;
mod capture;
mod playback;
mod wake_word;

pub use capture::{AudioCapture, AudioFrame, CaptureEvent, FRAME_SIZE, FrameChunker, rms, samples_to_wav};
pub use codec::{
    EncodedBlob, INPUT_MIME_TYPE, INPUT_SAMPLE_RATE, OUTPUT_SAMPLE_RATE, PlaybackChunk,
    decode_frame, encode_frame,
};
pub use playback::{
    AudioSink, ChunkId, CpalSink, PlaybackEvent, PlaybackScheduler, ScheduledChunk,
};
pub use wake_word::{
    DEFAULT_SLEEP_PHRASES, DEFAULT_WAKE_WORD, Sensitivity, WakeState, WakeTransition,
    WakeWordDetector,
};
