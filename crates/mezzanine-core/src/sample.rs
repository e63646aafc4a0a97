//! Coded-frame data model: parser output records, queued frames, and the
//! group-of-pictures structure the video track buffer is built around.

use bytes::Bytes;

pub const MICROS_PER_SECOND: i64 = 1_000_000;

/// Converts a floating-point seconds value to integer microseconds.
///
/// All internal timestamp arithmetic is in microseconds; seconds appear only
/// at the public `buffered`/`currentTime` boundaries.
pub fn seconds_to_micros(seconds: f64) -> i64 {
    (seconds * MICROS_PER_SECOND as f64).floor() as i64
}

pub fn micros_to_seconds(micros: i64) -> f64 {
    micros as f64 / MICROS_PER_SECOND as f64
}

/// One coded frame as emitted by the segment parser.
///
/// Timestamps are in ticks at the track's timescale; `cts` is the
/// presentation time, `dts` the decode time. Immutable once emitted.
#[derive(Debug, Clone)]
pub struct Sample {
    pub track_id: u32,
    pub timescale: u32,
    pub dts: i64,
    pub cts: i64,
    pub duration: u32,
    pub data: Bytes,
    pub is_sync: bool,
}

impl Sample {
    /// Presentation timestamp in microseconds, rounded.
    pub fn timestamp_us(&self) -> i64 {
        ticks_to_micros(self.cts, self.timescale)
    }

    /// Decode timestamp in microseconds, rounded.
    pub fn decode_timestamp_us(&self) -> i64 {
        ticks_to_micros(self.dts, self.timescale)
    }

    /// Duration in microseconds, rounded.
    pub fn duration_us(&self) -> i64 {
        ticks_to_micros(self.duration as i64, self.timescale)
    }
}

fn ticks_to_micros(ticks: i64, timescale: u32) -> i64 {
    debug_assert!(timescale > 0);
    ((ticks as f64) * MICROS_PER_SECOND as f64 / timescale as f64).round() as i64
}

/// Whether a frame can be decoded without prior frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Random-access point; depends on no other frame
    Key,
    /// Depends on the preceding frames of its group
    Delta,
}

/// A coded frame queued in a track buffer, timestamps in microseconds.
#[derive(Debug, Clone)]
pub struct CodedFrame {
    pub timestamp_us: i64,
    pub duration_us: i64,
    pub data: Bytes,
    pub kind: FrameKind,
}

impl CodedFrame {
    pub fn from_sample(sample: &Sample) -> Self {
        Self {
            timestamp_us: sample.timestamp_us(),
            duration_us: sample.duration_us().max(1),
            data: sample.data.clone(),
            kind: if sample.is_sync {
                FrameKind::Key
            } else {
                FrameKind::Delta
            },
        }
    }

    /// End of the frame's presentation interval, exclusive.
    pub fn end_us(&self) -> i64 {
        self.timestamp_us + self.duration_us
    }

    /// Returns true if `time_us` falls inside `[timestamp, timestamp + duration)`.
    pub fn contains(&self, time_us: i64) -> bool {
        self.timestamp_us <= time_us && time_us < self.end_us()
    }
}

/// A key frame and the delta frames that depend on it.
///
/// Frames are kept in presentation order; the first frame is always the key.
/// `end_us` is the maximum frame end, which can exceed the start of a later
/// frame when presentation order differs from decode order.
#[derive(Debug, Clone)]
pub struct GroupOfPictures {
    pub start_us: i64,
    pub end_us: i64,
    pub frames: Vec<CodedFrame>,
    pub config: VideoConfig,
}

impl GroupOfPictures {
    pub fn new(key: CodedFrame, config: VideoConfig) -> Self {
        debug_assert_eq!(key.kind, FrameKind::Key);
        Self {
            start_us: key.timestamp_us,
            end_us: key.end_us(),
            frames: vec![key],
            config,
        }
    }

    /// True if `time_us` falls inside `[start, end)`.
    pub fn contains(&self, time_us: i64) -> bool {
        self.start_us <= time_us && time_us < self.end_us
    }
}

/// Playback direction derived from the sign of the playback rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    pub fn from_rate(rate: f64) -> Self {
        if rate < 0.0 {
            Direction::Backward
        } else {
            Direction::Forward
        }
    }
}

/// Media type of a track or source buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
}

/// Decoder configuration for an AVC video track.
///
/// `description` carries the `avcC` body (the AVCDecoderConfigurationRecord)
/// from the first `avc1` sample entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoConfig {
    pub codec: String,
    pub description: Bytes,
    pub coded_width: u32,
    pub coded_height: u32,
}

/// Decoder configuration for an AAC audio track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioConfig {
    pub codec: String,
    pub sample_rate: u32,
    pub channel_count: u32,
    pub description: Option<Bytes>,
}

/// Latest codec configuration of a track, by media type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackConfig {
    Audio(AudioConfig),
    Video(VideoConfig),
}

impl TrackConfig {
    pub fn kind(&self) -> MediaKind {
        match self {
            TrackConfig::Audio(_) => MediaKind::Audio,
            TrackConfig::Video(_) => MediaKind::Video,
        }
    }

    pub fn codec(&self) -> &str {
        match self {
            TrackConfig::Audio(c) => &c.codec,
            TrackConfig::Video(c) => &c.codec,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_microsecond_conversion() {
        let sample = Sample {
            track_id: 1,
            timescale: 30_000,
            dts: 1001,
            cts: 2002,
            duration: 1001,
            data: Bytes::new(),
            is_sync: true,
        };
        // 1001 / 30000 s = 33366.67 us, rounded to 33367.
        assert_eq!(sample.decode_timestamp_us(), 33_367);
        assert_eq!(sample.timestamp_us(), 66_733);
        assert_eq!(sample.duration_us(), 33_367);
    }

    #[test]
    fn test_coded_frame_containment() {
        let frame = CodedFrame {
            timestamp_us: 1_000,
            duration_us: 500,
            data: Bytes::new(),
            kind: FrameKind::Key,
        };
        assert!(frame.contains(1_000));
        assert!(frame.contains(1_499));
        assert!(!frame.contains(1_500));
        assert!(!frame.contains(999));
    }

    #[test]
    fn test_direction_from_rate() {
        assert_eq!(Direction::from_rate(1.0), Direction::Forward);
        assert_eq!(Direction::from_rate(0.0), Direction::Forward);
        assert_eq!(Direction::from_rate(-0.5), Direction::Backward);
    }
}
