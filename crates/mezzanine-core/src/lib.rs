//! Ingestion and storage core of the mezzanine playback engine.
//!
//! This crate implements the buffering half of a miniature HTML5 media
//! engine: an incremental fragmented-MP4 segment parser, per-track
//! GOP-aware coded-frame storage, the source-buffer ingress contract and
//! the media-source state machine, together with the time-range algebra,
//! event observers and the serialized task queue the whole engine runs on.
//!
//! The playback half (media clock, decode scheduler and the element
//! facade) lives in the `mezzanine` crate.

pub mod error;
pub mod events;
#[cfg(any(test, feature = "test-fixtures"))]
pub mod fixture;
pub mod media_source;
pub mod sample;
pub mod segment;
pub mod source_buffer;
pub mod task;
pub mod time_ranges;
pub mod track_buffer;

pub use error::{EndOfStreamError, MediaError};
pub use events::{queue_event, MediaElementEvent, MediaSourceEvent, Observers, SourceBufferEvent};
pub use media_source::{MediaHost, MediaSource, ReadyState};
pub use sample::{
    micros_to_seconds, seconds_to_micros, AudioConfig, CodedFrame, Direction, FrameKind,
    GroupOfPictures, MediaKind, Sample, TrackConfig, VideoConfig, MICROS_PER_SECOND,
};
pub use segment::{ParserEvent, SegmentParser, StreamInfo, TrackInfo};
pub use source_buffer::SourceBuffer;
pub use task::TaskQueue;
pub use time_ranges::{TimeRange, TimeRanges, RANGE_MERGE_TOLERANCE};
pub use track_buffer::TrackBuffer;
