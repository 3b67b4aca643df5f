//! Audio capture from microphone
//!
//! The input stream is cut into fixed-size frames inside the device
//! callback and handed to the session as they are produced. There is no
//! backlog: if the session falls behind, new frames are dropped rather than
//! queued.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};
use tokio::sync::mpsc;

use super::codec::INPUT_SAMPLE_RATE;
use crate::{Error, Result};

/// Samples per outbound frame (256ms at 16kHz)
pub const FRAME_SIZE: usize = 4096;

/// A block of mono microphone samples at 16kHz
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    samples: Vec<f32>,
}

impl AudioFrame {
    /// Wrap raw mono samples
    #[must_use]
    pub const fn new(samples: Vec<f32>) -> Self {
        Self { samples }
    }

    /// Frame samples
    #[must_use]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Number of samples
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the frame is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Events produced by the capture pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    /// A complete frame of audio
    Frame(AudioFrame),
    /// The input stream reported an unrecoverable error
    Fault(String),
}

/// Splits an interleaved input stream into mono frames of a fixed size
#[derive(Debug)]
pub struct FrameChunker {
    frame_size: usize,
    channels: usize,
    pending: Vec<f32>,
}

impl FrameChunker {
    /// Create a chunker for `channels` interleaved input channels
    #[must_use]
    pub fn new(frame_size: usize, channels: usize) -> Self {
        Self {
            frame_size: frame_size.max(1),
            channels: channels.max(1),
            pending: Vec::with_capacity(frame_size),
        }
    }

    /// Feed interleaved samples and return every frame they complete
    #[allow(clippy::cast_precision_loss)]
    pub fn push(&mut self, data: &[f32]) -> Vec<AudioFrame> {
        if self.channels == 1 {
            self.pending.extend_from_slice(data);
        } else {
            let scale = self.channels as f32;
            self.pending.extend(
                data.chunks(self.channels)
                    .map(|frame| frame.iter().sum::<f32>() / scale),
            );
        }

        let mut frames = Vec::new();
        while self.pending.len() >= self.frame_size {
            let rest = self.pending.split_off(self.frame_size);
            let samples = std::mem::replace(&mut self.pending, rest);
            frames.push(AudioFrame::new(samples));
        }
        frames
    }

    /// Samples waiting for the next frame boundary
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// Captures audio from the default input device
pub struct AudioCapture {
    device: Device,
    config: StreamConfig,
    events: mpsc::Sender<CaptureEvent>,
    stream: Option<Stream>,
}

impl AudioCapture {
    /// Open the default input device; frames will be sent to `events`
    ///
    /// # Errors
    ///
    /// Returns error if no input device is available or none supports 16kHz
    pub fn new(events: mpsc::Sender<CaptureEvent>) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Capture("no input device available".to_string()))?;

        let supports_rate = |c: &cpal::SupportedStreamConfigRange| {
            c.min_sample_rate() <= SampleRate(INPUT_SAMPLE_RATE)
                && c.max_sample_rate() >= SampleRate(INPUT_SAMPLE_RATE)
        };

        let supported_config = device
            .supported_input_configs()
            .map_err(|e| Error::Capture(e.to_string()))?
            .find(|c| c.channels() == 1 && supports_rate(c))
            .or_else(|| {
                // Fallback: any channel layout, downmixed in the chunker
                device
                    .supported_input_configs()
                    .ok()?
                    .find(|c| supports_rate(c))
            })
            .ok_or_else(|| Error::Capture("no suitable audio config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(INPUT_SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = INPUT_SAMPLE_RATE,
            channels = config.channels,
            "audio capture initialized"
        );

        Ok(Self {
            device,
            config,
            events,
            stream: None,
        })
    }

    /// Start capturing audio
    ///
    /// # Errors
    ///
    /// Returns error if the stream cannot be built or started, which is
    /// how a denied microphone permission surfaces
    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let mut chunker = FrameChunker::new(FRAME_SIZE, usize::from(self.config.channels));
        let frames_tx = self.events.clone();
        let fault_tx = self.events.clone();

        let stream = self
            .device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    for frame in chunker.push(data) {
                        match frames_tx.try_send(CaptureEvent::Frame(frame)) {
                            Ok(()) | Err(mpsc::error::TrySendError::Closed(_)) => {}
                            Err(mpsc::error::TrySendError::Full(_)) => {
                                tracing::trace!("session behind, dropping capture frame");
                            }
                        }
                    }
                },
                move |err| {
                    tracing::error!(error = %err, "audio capture error");
                    // Device callback thread, not a runtime worker
                    let _ = fault_tx.blocking_send(CaptureEvent::Fault(err.to_string()));
                },
                None,
            )
            .map_err(|e| Error::Capture(e.to_string()))?;

        stream.play().map_err(|e| Error::Capture(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!("audio capture started");
        Ok(())
    }

    /// Stop capturing audio and release the device stream
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("audio capture stopped");
        }
    }

    /// Get the sample rate
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        INPUT_SAMPLE_RATE
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Convert f32 samples to WAV bytes
///
/// Uses the same PCM16 conversion as outbound frames.
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        let pcm = super::codec::encode_frame(samples);
        for pair in pcm.data.chunks_exact(2) {
            writer
                .write_sample(i16::from_le_bytes([pair[0], pair[1]]))
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

/// Calculate RMS energy of audio samples
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunker_emits_fixed_frames() {
        let mut chunker = FrameChunker::new(4, 1);

        assert!(chunker.push(&[0.1, 0.2, 0.3]).is_empty());
        assert_eq!(chunker.pending(), 3);

        let frames = chunker.push(&[0.4, 0.5, 0.6, 0.7, 0.8, 0.9]);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].samples(), &[0.1, 0.2, 0.3, 0.4]);
        assert_eq!(frames[1].samples(), &[0.5, 0.6, 0.7, 0.8]);
        assert_eq!(chunker.pending(), 1);
    }

    #[test]
    fn test_chunker_downmixes_stereo() {
        let mut chunker = FrameChunker::new(2, 2);
        let frames = chunker.push(&[0.5, 0.1, -0.5, -0.1]);

        assert_eq!(frames.len(), 1);
        assert!((frames[0].samples()[0] - 0.3).abs() < 1e-6);
        assert!((frames[0].samples()[1] + 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_rms() {
        assert!(rms(&[]) < f32::EPSILON);
        assert!(rms(&[0.0; 100]) < 0.001);
        assert!(rms(&[0.5; 100]) > 0.4);
    }
}
