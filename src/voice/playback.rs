//! Gapless playback of streamed speech
//!
//! [`PlaybackScheduler`] keeps the timeline: every chunk starts at
//! `max(cursor, now)` and pushes the cursor forward by its duration, so
//! consecutive chunks play back to back in arrival order. The device side
//! sits behind [`AudioSink`]; [`CpalSink`] renders scheduled chunks against
//! a sample clock and reports completions over a channel.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream};
use tokio::sync::mpsc;

use super::codec::{OUTPUT_SAMPLE_RATE, PlaybackChunk};
use crate::{Error, Result};

/// Identifier of a scheduled chunk
pub type ChunkId = u64;

/// Events reported by an audio sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// A scheduled chunk played to its end
    Finished(ChunkId),
    /// The output stream failed
    Fault(String),
}

/// Output device that can start buffers at absolute times
pub trait AudioSink {
    /// Current position of the output clock, in seconds
    fn now(&self) -> f64;

    /// Queue `chunk` to start at `start` seconds on the output clock
    ///
    /// # Errors
    ///
    /// Returns error if the device rejects the buffer
    fn schedule(&mut self, id: ChunkId, start: f64, chunk: PlaybackChunk) -> Result<()>;

    /// Silence everything playing or queued, without completion events
    fn stop_all(&mut self);
}

/// Where a chunk landed on the timeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledChunk {
    pub id: ChunkId,
    pub start: f64,
    pub duration: f64,
}

/// Orders inbound chunks on a gapless output timeline
pub struct PlaybackScheduler<S> {
    sink: S,
    cursor: f64,
    active: HashSet<ChunkId>,
    next_id: ChunkId,
}

impl<S: AudioSink> PlaybackScheduler<S> {
    /// Create a scheduler with a zeroed timeline
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            cursor: 0.0,
            active: HashSet::new(),
            next_id: 0,
        }
    }

    /// Schedule a chunk directly after everything already queued
    ///
    /// # Errors
    ///
    /// Returns error if the sink rejects the chunk; the timeline is left
    /// untouched in that case
    pub fn enqueue(&mut self, chunk: PlaybackChunk) -> Result<ScheduledChunk> {
        let start = self.cursor.max(self.sink.now());
        let duration = chunk.duration();
        let id = self.next_id;

        self.sink.schedule(id, start, chunk)?;

        self.next_id += 1;
        self.cursor = start + duration;
        self.active.insert(id);

        tracing::trace!(id, start, duration, active = self.active.len(), "chunk scheduled");

        Ok(ScheduledChunk {
            id,
            start,
            duration,
        })
    }

    /// Record that a chunk finished playing
    ///
    /// Returns true when this completion emptied the active set. Ids that
    /// are not active (already flushed) are ignored.
    pub fn complete(&mut self, id: ChunkId) -> bool {
        if !self.active.remove(&id) {
            tracing::trace!(id, "completion for inactive chunk ignored");
            return false;
        }
        self.active.is_empty()
    }

    /// Stop all playback and restart the timeline
    ///
    /// Returns true if anything was playing or queued.
    pub fn flush(&mut self) -> bool {
        self.sink.stop_all();
        let had_active = !self.active.is_empty();
        self.active.clear();
        self.cursor = 0.0;

        tracing::debug!(had_active, "playback flushed");
        had_active
    }

    /// Whether no chunk is playing or queued
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.active.is_empty()
    }

    /// Number of chunks playing or queued
    #[must_use]
    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    /// Next earliest start time
    #[must_use]
    pub const fn cursor(&self) -> f64 {
        self.cursor
    }

    /// Access the underlying sink
    pub const fn sink(&self) -> &S {
        &self.sink
    }
}

/// A chunk waiting in the device queue
struct Queued {
    id: ChunkId,
    start_frame: u64,
    samples: Vec<f32>,
    position: usize,
}

/// State shared with the output callback
#[derive(Default)]
struct Timeline {
    /// Frames rendered since the stream started
    clock: u64,
    queue: VecDeque<Queued>,
}

impl Timeline {
    /// Produce the next mono sample and advance the clock
    fn next_sample(&mut self, events: &mpsc::UnboundedSender<PlaybackEvent>) -> f32 {
        let now = self.clock;
        self.clock += 1;

        let Some(front) = self.queue.front_mut() else {
            return 0.0;
        };

        if now < front.start_frame {
            return 0.0;
        }

        let sample = front.samples.get(front.position).copied().unwrap_or(0.0);
        front.position += 1;

        if front.position >= front.samples.len() {
            let id = front.id;
            self.queue.pop_front();
            let _ = events.send(PlaybackEvent::Finished(id));
        }

        sample
    }
}

/// Speaker output at 24kHz driven by a sample clock
pub struct CpalSink {
    timeline: Arc<Mutex<Timeline>>,
    events: mpsc::UnboundedSender<PlaybackEvent>,
    sample_rate: u32,
    _stream: Stream,
}

impl CpalSink {
    /// Open the default output device and start rendering silence
    ///
    /// # Errors
    ///
    /// Returns error if no output device supports 24kHz
    pub fn new(events: mpsc::UnboundedSender<PlaybackEvent>) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Playback("no output device available".to_string()))?;

        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::Playback(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(OUTPUT_SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(OUTPUT_SAMPLE_RATE)
            })
            .or_else(|| {
                // Fallback: try stereo
                device.supported_output_configs().ok()?.find(|c| {
                    c.channels() == 2
                        && c.min_sample_rate() <= SampleRate(OUTPUT_SAMPLE_RATE)
                        && c.max_sample_rate() >= SampleRate(OUTPUT_SAMPLE_RATE)
                })
            })
            .ok_or_else(|| Error::Playback("no suitable output config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(OUTPUT_SAMPLE_RATE))
            .config();
        let channels = usize::from(config.channels);

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = OUTPUT_SAMPLE_RATE,
            channels,
            "audio playback initialized"
        );

        let timeline = Arc::new(Mutex::new(Timeline::default()));
        let render_timeline = Arc::clone(&timeline);
        let render_events = events.clone();
        let fault_events = events.clone();

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut timeline = render_timeline
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner);

                    for frame in data.chunks_mut(channels) {
                        let sample = timeline.next_sample(&render_events);
                        for out in frame.iter_mut() {
                            *out = sample;
                        }
                    }
                },
                move |err| {
                    tracing::error!(error = %err, "audio playback error");
                    let _ = fault_events.send(PlaybackEvent::Fault(err.to_string()));
                },
                None,
            )
            .map_err(|e| Error::Playback(e.to_string()))?;

        stream.play().map_err(|e| Error::Playback(e.to_string()))?;

        Ok(Self {
            timeline,
            events,
            sample_rate: OUTPUT_SAMPLE_RATE,
            _stream: stream,
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Timeline> {
        self.timeline.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AudioSink for CpalSink {
    #[allow(clippy::cast_precision_loss)]
    fn now(&self) -> f64 {
        self.lock().clock as f64 / f64::from(self.sample_rate)
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn schedule(&mut self, id: ChunkId, start: f64, chunk: PlaybackChunk) -> Result<()> {
        if chunk.sample_rate() != self.sample_rate {
            return Err(Error::Playback(format!(
                "chunk rate {} does not match output rate {}",
                chunk.sample_rate(),
                self.sample_rate
            )));
        }

        let samples = chunk.into_mono();
        if samples.is_empty() {
            // Nothing to render, but the scheduler still expects a completion
            let _ = self.events.send(PlaybackEvent::Finished(id));
            return Ok(());
        }

        let start_frame = (start * f64::from(self.sample_rate)).round().max(0.0) as u64;
        self.lock().queue.push_back(Queued {
            id,
            start_frame,
            samples,
            position: 0,
        });
        Ok(())
    }

    fn stop_all(&mut self) {
        self.lock().queue.clear();
    }
}
