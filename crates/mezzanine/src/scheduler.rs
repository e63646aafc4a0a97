//! Decode queues and audio batch scheduling.
//!
//! Each media type runs a pipeline with two pools: frames submitted to the
//! decoder but not yet delivered (`in_flight`) and decoded frames awaiting
//! render (`ready`). Whenever the combined count falls under the low
//! watermark the pipeline pulls a continuation from the track buffer, up
//! to the high watermark. Decoder outputs are matched back to submissions
//! by timestamp with a duration-derived tolerance, because decoders may
//! derive output timestamps from their own monotonic bookkeeping.
//!
//! Backward playback decodes video groups in their normal key-to-delta
//! order and consumes the results in reverse; audio frames are submitted
//! in reverse rendering order under synthetic strictly-increasing
//! timestamps that are mapped back to the original presentation times on
//! delivery.

use crossbeam_channel::Receiver;
use mezzanine_core::{
    AudioConfig, CodedFrame, Direction, MediaError, TrackBuffer, TrackConfig, VideoConfig,
};

use crate::sink::{
    AudioDecoder, AudioDecoderEvent, DecodedAudio, DecodedVideo, DecoderState, EncodedChunk,
    MixerNodeId, PcmBuffer, VideoDecoder, VideoDecoderEvent,
};

/// Refill trigger: decode when fewer than this many frames are queued.
pub const DECODE_QUEUE_LOW_WATERMARK: usize = 20;

/// Refill target: stop submitting at this many queued frames.
pub const DECODE_QUEUE_HIGH_WATERMARK: usize = 30;

/// Tolerance for matching decoder output timestamps to submissions.
pub(crate) fn match_tolerance_us(duration_us: i64) -> i64 {
    (duration_us + 15) / 16
}

/// True if a frame interval has already been passed in the given playback
/// direction. A frame whose interval still contains the current position
/// is never late: the intervals are half-open, so backward lateness starts
/// strictly past the frame's own start.
pub(crate) fn is_late(timestamp_us: i64, duration_us: i64, current_us: i64, direction: Direction) -> bool {
    match direction {
        Direction::Forward => timestamp_us + duration_us <= current_us,
        Direction::Backward => timestamp_us > current_us,
    }
}

/// A frame submitted to a decoder and not yet delivered.
struct InFlight {
    submitted_us: i64,
    original_us: i64,
    duration_us: i64,
}

pub(crate) struct VideoPipeline {
    decoder: Box<dyn VideoDecoder>,
    delivery: Receiver<VideoDecoderEvent>,
    in_flight: Vec<InFlight>,
    pub(crate) ready: Vec<DecodedVideo>,
    /// The frame currently on the presenter surface.
    pub(crate) current: Option<DecodedVideo>,
    /// Presentation timestamp of the frame the next continuation starts
    /// from; for backward playback, the key frame of the last submitted
    /// group.
    last_submitted_us: Option<i64>,
    config: Option<VideoConfig>,
    error: Option<MediaError>,
}

impl VideoPipeline {
    pub(crate) fn new(mut decoder: Box<dyn VideoDecoder>) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        decoder.set_output(Box::new(move |event| {
            let _ = tx.send(event);
        }));
        Self {
            decoder,
            delivery: rx,
            in_flight: Vec::new(),
            ready: Vec::new(),
            current: None,
            last_submitted_us: None,
            config: None,
            error: None,
        }
    }

    pub(crate) fn queued(&self) -> usize {
        self.in_flight.len() + self.ready.len()
    }

    pub(crate) fn take_error(&mut self) -> Option<MediaError> {
        self.error.take()
    }

    /// Drops everything: queued submissions, decoded frames, and the
    /// continuation anchor. The decoder keeps its configuration.
    pub(crate) fn reset(&mut self) {
        self.decoder.reset();
        while self.delivery.try_recv().is_ok() {}
        let dropped = self.in_flight.len() + self.ready.len();
        if dropped > 0 {
            tracing::debug!(dropped, "video pipeline reset");
        }
        self.in_flight.clear();
        self.ready.clear();
        self.current = None;
        self.last_submitted_us = None;
    }

    /// Accepts decoder deliveries: matches them to submissions, drops
    /// stale and late frames, keeps the rest for rendering.
    pub(crate) fn pump(&mut self, current_us: i64, direction: Direction) {
        while let Ok(event) = self.delivery.try_recv() {
            match event {
                VideoDecoderEvent::Output(frame) => {
                    let matched = self.in_flight.iter().position(|entry| {
                        (frame.timestamp_us - entry.submitted_us).abs()
                            <= match_tolerance_us(entry.duration_us)
                    });
                    let Some(idx) = matched else {
                        // Not in flight: flushed by a reset that raced the
                        // decoder thread.
                        continue;
                    };
                    self.in_flight.remove(idx);
                    if is_late(frame.timestamp_us, frame.duration_us, current_us, direction) {
                        continue;
                    }
                    self.ready.push(frame);
                }
                VideoDecoderEvent::Error(err) => {
                    tracing::error!(%err, "video decoder error");
                    self.error = Some(err);
                }
            }
        }
    }

    /// Tops the queue back up to the high watermark from the track buffer.
    pub(crate) fn refill(&mut self, tb: &TrackBuffer, current_us: i64, direction: Direction) {
        if self.error.is_some() || self.queued() >= DECODE_QUEUE_LOW_WATERMARK {
            return;
        }
        let budget = DECODE_QUEUE_HIGH_WATERMARK - self.queued();

        // The continuation anchor may have been evicted by a removal.
        if let Some(last) = self.last_submitted_us {
            if !tb.contains_frame(last) {
                tracing::debug!(last, "last submitted frame evicted, reseeding");
                self.last_submitted_us = None;
            }
        }

        match self.last_submitted_us {
            None => {
                let Some(frame) = tb.find_frame_for_time(current_us) else {
                    return;
                };
                let Some((deps, config)) = tb.decode_dependencies_for_frame(&frame) else {
                    return;
                };
                let TrackConfig::Video(config) = config else {
                    return;
                };
                self.last_submitted_us = match direction {
                    Direction::Forward => deps.last().map(|f| f.timestamp_us),
                    Direction::Backward => deps.first().map(|f| f.timestamp_us),
                };
                self.submit(&deps, &config);
            }
            Some(last_us) => {
                let Some(last_frame) = tb.frame_at_timestamp(last_us) else {
                    return;
                };
                match direction {
                    Direction::Forward => {
                        let Some((frames, config)) =
                            tb.next_frames(&last_frame, budget, Direction::Forward)
                        else {
                            return;
                        };
                        let TrackConfig::Video(config) = config else {
                            return;
                        };
                        self.last_submitted_us = frames.last().map(|f| f.timestamp_us);
                        self.submit(&frames, &config);
                    }
                    Direction::Backward => {
                        // Walk one frame back to find the neighbouring
                        // group, then decode that whole group forward.
                        let Some((prev, _)) =
                            tb.next_frames(&last_frame, 1, Direction::Backward)
                        else {
                            return;
                        };
                        let Some(target) = prev.first() else { return };
                        let Some((deps, config)) = tb.decode_dependencies_for_frame(target)
                        else {
                            return;
                        };
                        let TrackConfig::Video(config) = config else {
                            return;
                        };
                        self.last_submitted_us = deps.first().map(|f| f.timestamp_us);
                        self.submit(&deps, &config);
                    }
                }
            }
        }
    }

    fn submit(&mut self, frames: &[CodedFrame], config: &VideoConfig) {
        if self.config.as_ref() != Some(config)
            || self.decoder.state() != DecoderState::Configured
        {
            if let Err(err) = self.decoder.configure(config) {
                tracing::error!(%err, "video decoder configure failed");
                self.error = Some(err);
                return;
            }
            self.config = Some(config.clone());
        }
        for frame in frames {
            self.in_flight.push(InFlight {
                submitted_us: frame.timestamp_us,
                original_us: frame.timestamp_us,
                duration_us: frame.duration_us,
            });
            self.decoder.decode(EncodedChunk {
                kind: frame.kind,
                timestamp_us: frame.timestamp_us,
                duration_us: frame.duration_us,
                data: frame.data.clone(),
            });
        }
    }

    /// Drops ready frames already passed in the playback direction.
    pub(crate) fn drop_late(&mut self, current_us: i64, direction: Direction) {
        self.ready
            .retain(|f| !is_late(f.timestamp_us, f.duration_us, current_us, direction));
    }

    /// Removes and returns the ready frame containing `current_us`.
    pub(crate) fn take_frame_for(&mut self, current_us: i64) -> Option<DecodedVideo> {
        let idx = self.ready.iter().position(|f| f.contains(current_us))?;
        Some(self.ready.remove(idx))
    }

    /// True if a decoded (ready or displayed) frame contains `time_us`.
    pub(crate) fn covers(&self, time_us: i64) -> bool {
        self.current.as_ref().is_some_and(|f| f.contains(time_us))
            || self.ready.iter().any(|f| f.contains(time_us))
    }
}

pub(crate) struct AudioPipeline {
    decoder: Box<dyn AudioDecoder>,
    delivery: Receiver<AudioDecoderEvent>,
    in_flight: Vec<InFlight>,
    /// Decoded frames awaiting batch scheduling, in rendering order.
    pub(crate) ready: Vec<DecodedAudio>,
    last_submitted_us: Option<i64>,
    config: Option<AudioConfig>,
    /// Strictly increasing submission clock for reversed input; some
    /// decoders infer output timestamps from monotonic input timestamps.
    synthetic_clock_us: i64,
    error: Option<MediaError>,
}

impl AudioPipeline {
    pub(crate) fn new(mut decoder: Box<dyn AudioDecoder>) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        decoder.set_output(Box::new(move |event| {
            let _ = tx.send(event);
        }));
        Self {
            decoder,
            delivery: rx,
            in_flight: Vec::new(),
            ready: Vec::new(),
            last_submitted_us: None,
            config: None,
            synthetic_clock_us: 0,
            error: None,
        }
    }

    pub(crate) fn queued(&self) -> usize {
        self.in_flight.len() + self.ready.len()
    }

    pub(crate) fn take_error(&mut self) -> Option<MediaError> {
        self.error.take()
    }

    pub(crate) fn reset(&mut self) {
        self.decoder.reset();
        while self.delivery.try_recv().is_ok() {}
        let dropped = self.in_flight.len() + self.ready.len();
        if dropped > 0 {
            tracing::debug!(dropped, "audio pipeline reset");
        }
        self.in_flight.clear();
        self.ready.clear();
        self.last_submitted_us = None;
        self.synthetic_clock_us = 0;
    }

    /// Accepts decoder deliveries, restoring original presentation
    /// timestamps for frames submitted under synthetic ones.
    pub(crate) fn pump(&mut self, current_us: i64, direction: Direction) {
        while let Ok(event) = self.delivery.try_recv() {
            match event {
                AudioDecoderEvent::Output(frame) => {
                    let matched = self.in_flight.iter().position(|entry| {
                        (frame.timestamp_us - entry.submitted_us).abs()
                            <= match_tolerance_us(entry.duration_us)
                    });
                    let Some(idx) = matched else {
                        continue;
                    };
                    let entry = self.in_flight.remove(idx);
                    let frame = frame.with_timestamp(entry.original_us);
                    if is_late(frame.timestamp_us, frame.duration_us, current_us, direction) {
                        continue;
                    }
                    self.ready.push(frame);
                }
                AudioDecoderEvent::Error(err) => {
                    tracing::error!(%err, "audio decoder error");
                    self.error = Some(err);
                }
            }
        }
    }

    pub(crate) fn refill(&mut self, tb: &TrackBuffer, current_us: i64, direction: Direction) {
        if self.error.is_some() || self.queued() >= DECODE_QUEUE_LOW_WATERMARK {
            return;
        }
        let budget = DECODE_QUEUE_HIGH_WATERMARK - self.queued();

        if let Some(last) = self.last_submitted_us {
            if !tb.contains_frame(last) {
                tracing::debug!(last, "last submitted frame evicted, reseeding");
                self.last_submitted_us = None;
            }
        }

        let (frames, config) = match self.last_submitted_us {
            None => {
                let Some(frame) = tb.find_frame_for_time(current_us) else {
                    return;
                };
                let Some((deps, config)) = tb.decode_dependencies_for_frame(&frame) else {
                    return;
                };
                (deps, config)
            }
            Some(last_us) => {
                let Some(last_frame) = tb.frame_at_timestamp(last_us) else {
                    return;
                };
                let Some((frames, config)) = tb.next_frames(&last_frame, budget, direction)
                else {
                    return;
                };
                (frames, config)
            }
        };
        let TrackConfig::Audio(config) = config else {
            return;
        };
        self.last_submitted_us = frames.last().map(|f| f.timestamp_us);
        self.submit(&frames, &config, direction);
    }

    fn submit(&mut self, frames: &[CodedFrame], config: &AudioConfig, direction: Direction) {
        if self.config.as_ref() != Some(config)
            || self.decoder.state() != DecoderState::Configured
        {
            if let Err(err) = self.decoder.configure(config) {
                tracing::error!(%err, "audio decoder configure failed");
                self.error = Some(err);
                return;
            }
            self.config = Some(config.clone());
        }
        for frame in frames {
            let submitted_us = match direction {
                Direction::Forward => frame.timestamp_us,
                Direction::Backward => {
                    let stamp = self.synthetic_clock_us;
                    self.synthetic_clock_us += frame.duration_us.max(1);
                    stamp
                }
            };
            self.in_flight.push(InFlight {
                submitted_us,
                original_us: frame.timestamp_us,
                duration_us: frame.duration_us,
            });
            self.decoder.decode(EncodedChunk {
                kind: frame.kind,
                timestamp_us: submitted_us,
                duration_us: frame.duration_us,
                data: frame.data.clone(),
            });
        }
    }

    pub(crate) fn drop_late(&mut self, current_us: i64, direction: Direction) {
        self.ready
            .retain(|f| !is_late(f.timestamp_us, f.duration_us, current_us, direction));
    }

    /// True if a decoded, not yet scheduled frame contains `time_us`.
    pub(crate) fn covers(&self, time_us: i64) -> bool {
        self.ready.iter().any(|f| f.contains(time_us))
    }
}

/// A PCM batch handed to the mixer, tracked for rescheduling and for
/// seek-coverage checks.
pub(crate) struct ScheduledAudio {
    pub(crate) node: MixerNodeId,
    pub(crate) start_us: i64,
    pub(crate) end_us: i64,
    pub(crate) pcm: PcmBuffer,
}

impl ScheduledAudio {
    pub(crate) fn contains(&self, time_us: i64) -> bool {
        self.start_us <= time_us && time_us < self.end_us
    }
}

/// Splits decoded frames into mixer batches: frames are batched while
/// consecutive in rendering order and identical in format.
pub(crate) fn build_batches(
    mut frames: Vec<DecodedAudio>,
    direction: Direction,
) -> Vec<Vec<DecodedAudio>> {
    match direction {
        Direction::Forward => frames.sort_by_key(|f| f.timestamp_us),
        Direction::Backward => frames.sort_by_key(|f| std::cmp::Reverse(f.timestamp_us)),
    }
    let mut batches: Vec<Vec<DecodedAudio>> = Vec::new();
    for frame in frames {
        let start_new = match batches.last().and_then(|b| b.last()) {
            None => true,
            Some(prev) => {
                let gap = match direction {
                    Direction::Forward => frame.timestamp_us - prev.end_us(),
                    Direction::Backward => prev.timestamp_us - frame.end_us(),
                };
                prev.sample_rate != frame.sample_rate
                    || prev.channel_count() != frame.channel_count()
                    || gap.abs() > match_tolerance_us(prev.duration_us)
            }
        };
        if start_new {
            batches.push(Vec::new());
        }
        if let Some(batch) = batches.last_mut() {
            batch.push(frame);
        }
    }
    batches
}

/// Concatenates one batch into a PCM buffer and its media-time range.
///
/// For backward playback the samples of each channel are reversed after
/// concatenation in time order, so the mixer plays the buffer with a
/// positive rate while media time runs down.
pub(crate) fn pcm_from_batch(
    batch: &[DecodedAudio],
    direction: Direction,
) -> (PcmBuffer, i64, i64) {
    debug_assert!(!batch.is_empty());
    let mut in_time_order: Vec<&DecodedAudio> = batch.iter().collect();
    in_time_order.sort_by_key(|f| f.timestamp_us);

    let start_us = in_time_order.first().map(|f| f.timestamp_us).unwrap_or(0);
    let end_us = in_time_order.last().map(|f| f.end_us()).unwrap_or(0);
    let channels = in_time_order
        .first()
        .map(|f| f.channel_count() as usize)
        .unwrap_or(0);
    let sample_rate = in_time_order.first().map(|f| f.sample_rate).unwrap_or(0);

    let mut planes = vec![Vec::new(); channels];
    for frame in &in_time_order {
        for (channel, plane) in planes.iter_mut().enumerate() {
            plane.extend_from_slice(frame.plane(channel));
        }
    }
    if direction == Direction::Backward {
        for plane in &mut planes {
            plane.reverse();
        }
    }
    (
        PcmBuffer {
            sample_rate,
            planes,
        },
        start_us,
        end_us,
    )
}

/// Mixer start time and intra-buffer offset for a batch, given the current
/// media position.
///
/// A batch still ahead in the playback direction is delayed by its media
/// distance scaled by the rate; a batch already entered starts now, offset
/// into its content by the amount already passed.
pub(crate) fn schedule_times(
    start_us: i64,
    end_us: i64,
    current_us: i64,
    mixer_now: f64,
    rate_magnitude: f64,
    direction: Direction,
) -> (f64, f64) {
    let delta = match direction {
        Direction::Forward => (start_us - current_us) as f64 / 1_000_000.0,
        Direction::Backward => (current_us - end_us) as f64 / 1_000_000.0,
    };
    if delta >= 0.0 {
        (mixer_now + delta / rate_magnitude, 0.0)
    } else {
        (mixer_now, -delta)
    }
}
