//! Collaborator interfaces held by the media element.
//!
//! The engine does no decoding, mixing or drawing of its own; it drives
//! four per-element collaborators through these traits. Decoders are
//! stateful objects with an asynchronous output callback; the mixer is a
//! buffer-playback device with a monotonic clock; the presenter is a 2-D
//! surface. Test suites plug in mock implementations, embeddings plug in
//! platform ones.

use std::sync::Arc;

use bytes::Bytes;
use mezzanine_core::{AudioConfig, FrameKind, MediaError, VideoConfig};

/// Lifecycle state of a decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    Unconfigured,
    Configured,
    Closed,
}

/// One coded frame handed to a decoder.
#[derive(Debug, Clone)]
pub struct EncodedChunk {
    pub kind: FrameKind,
    pub timestamp_us: i64,
    pub duration_us: i64,
    pub data: Bytes,
}

/// A decoded picture. The pixel payload is released when the value drops.
#[derive(Debug, Clone)]
pub struct DecodedVideo {
    pub timestamp_us: i64,
    pub duration_us: i64,
    pub display_width: u32,
    pub display_height: u32,
    pub data: Bytes,
}

impl DecodedVideo {
    pub fn end_us(&self) -> i64 {
        self.timestamp_us + self.duration_us
    }

    pub fn contains(&self, time_us: i64) -> bool {
        self.timestamp_us <= time_us && time_us < self.end_us()
    }
}

/// Decoded PCM audio with planar `f32` samples.
///
/// Planes are shared on clone so a frame can be re-stamped with a
/// different timestamp without copying samples.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub timestamp_us: i64,
    pub duration_us: i64,
    pub sample_rate: u32,
    planes: Arc<Vec<Vec<f32>>>,
}

impl DecodedAudio {
    /// Builds a frame from planar samples; the duration follows from the
    /// frame count and sample rate.
    pub fn new(timestamp_us: i64, sample_rate: u32, planes: Vec<Vec<f32>>) -> Self {
        debug_assert!(!planes.is_empty());
        debug_assert!(sample_rate > 0);
        let frames = planes.first().map(Vec::len).unwrap_or(0);
        let duration_us =
            (frames as f64 * 1_000_000.0 / sample_rate.max(1) as f64).round() as i64;
        Self {
            timestamp_us,
            duration_us: duration_us.max(1),
            sample_rate,
            planes: Arc::new(planes),
        }
    }

    pub fn channel_count(&self) -> u32 {
        self.planes.len() as u32
    }

    /// Samples per channel.
    pub fn frame_count(&self) -> u32 {
        self.planes.first().map(Vec::len).unwrap_or(0) as u32
    }

    pub fn plane(&self, channel: usize) -> &[f32] {
        &self.planes[channel]
    }

    /// The same samples under a different presentation timestamp.
    pub fn with_timestamp(&self, timestamp_us: i64) -> Self {
        Self {
            timestamp_us,
            ..self.clone()
        }
    }

    pub fn end_us(&self) -> i64 {
        self.timestamp_us + self.duration_us
    }

    pub fn contains(&self, time_us: i64) -> bool {
        self.timestamp_us <= time_us && time_us < self.end_us()
    }
}

/// Output of a video decoder, delivered through the registered callback.
pub enum VideoDecoderEvent {
    Output(DecodedVideo),
    Error(MediaError),
}

/// Output of an audio decoder, delivered through the registered callback.
pub enum AudioDecoderEvent {
    Output(DecodedAudio),
    Error(MediaError),
}

/// An AVC decoder collaborator.
///
/// Outputs arrive asynchronously via the callback registered with
/// [`set_output`](VideoDecoder::set_output); the engine matches them back
/// to submissions by timestamp.
pub trait VideoDecoder: Send {
    fn configure(&mut self, config: &VideoConfig) -> Result<(), MediaError>;
    fn decode(&mut self, chunk: EncodedChunk);
    fn reset(&mut self);
    fn state(&self) -> DecoderState;
    fn set_output(&mut self, output: Box<dyn FnMut(VideoDecoderEvent) + Send>);
}

/// An AAC decoder collaborator, symmetric to [`VideoDecoder`].
pub trait AudioDecoder: Send {
    fn configure(&mut self, config: &AudioConfig) -> Result<(), MediaError>;
    fn decode(&mut self, chunk: EncodedChunk);
    fn reset(&mut self);
    fn state(&self) -> DecoderState;
    fn set_output(&mut self, output: Box<dyn FnMut(AudioDecoderEvent) + Send>);
}

/// Identifier of a scheduled mixer buffer source.
pub type MixerNodeId = u64;

/// A PCM buffer handed to the mixer, planar `f32`.
#[derive(Debug, Clone)]
pub struct PcmBuffer {
    pub sample_rate: u32,
    pub planes: Vec<Vec<f32>>,
}

impl PcmBuffer {
    pub fn frame_count(&self) -> usize {
        self.planes.first().map(Vec::len).unwrap_or(0)
    }

    pub fn duration_seconds(&self) -> f64 {
        self.frame_count() as f64 / self.sample_rate.max(1) as f64
    }
}

/// The audio output device: schedules PCM buffers against a monotonic
/// clock and applies the element's gain.
pub trait AudioMixer: Send {
    /// The mixer's monotonic clock, in seconds.
    fn now(&self) -> f64;

    /// True while the device clock is running.
    fn is_running(&self) -> bool;

    /// Schedules `buffer` to start playing at mixer time `when`, skipping
    /// the first `offset` seconds of buffer content, at the given
    /// playback-rate magnitude.
    fn schedule(&mut self, buffer: PcmBuffer, when: f64, offset: f64, rate: f64) -> MixerNodeId;

    /// Stops a scheduled buffer source. Unknown ids are ignored.
    fn stop(&mut self, node: MixerNodeId);

    /// Master gain; muting sets it to zero.
    fn set_gain(&mut self, gain: f64);
}

/// The 2-D surface decoded pictures are drawn to.
pub trait Presenter: Send {
    fn resize(&mut self, width: u32, height: u32);
    fn draw(&mut self, frame: &DecodedVideo);
}

/// The per-element collaborator set, captured at element construction.
pub struct MediaSinks {
    pub video_decoder: Box<dyn VideoDecoder>,
    pub audio_decoder: Box<dyn AudioDecoder>,
    pub mixer: Box<dyn AudioMixer>,
    pub presenter: Box<dyn Presenter>,
}
