//! The media source: a multiplex of source buffers with a three-state
//! lifecycle, the duration, and the element-level buffered report.
//!
//! A media source is created detached (`Closed`). Attaching it to a media
//! element moves it to `Open` and allows source buffers to be added;
//! `end_of_stream` moves it to `Ended`; detaching closes it again and drops
//! every source buffer together with its coded frames.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::error::{EndOfStreamError, MediaError};
use crate::events::{queue_event, MediaSourceEvent, Observers};
use crate::sample::{AudioConfig, MediaKind, VideoConfig};
use crate::source_buffer::SourceBuffer;
use crate::task::TaskQueue;
use crate::time_ranges::TimeRanges;
use crate::track_buffer::TrackBuffer;

/// Lifecycle state of a media source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    /// Detached from any element; no source buffers may exist
    Closed,
    /// Attached and accepting appends
    Open,
    /// All data appended; buffered ranges are stretched to the highest end
    Ended,
}

/// The element-side half of the attachment.
///
/// The media source holds only a weak reference; callbacks mark state on
/// the element, which re-evaluates itself on its own queued tasks so that
/// element events always follow the buffer events that caused them.
pub trait MediaHost: Send + Sync {
    /// Current playback position in seconds.
    fn current_time(&self) -> f64;

    /// True if the element ready state is above `Metadata`.
    fn ready_state_above_metadata(&self) -> bool;

    /// First initialization segment produced at least one active track.
    fn on_metadata(&self);

    /// Buffered media changed; `appended` is false for removals.
    fn on_buffered_changed(&self, appended: bool);

    /// A removal covered the current playback position.
    fn on_stalled(&self);

    fn on_duration_changed(&self, duration: f64);

    /// `end_of_stream` completed without error.
    fn on_stream_ended(&self);

    fn supports_video(&self, config: &VideoConfig) -> bool {
        config.codec.starts_with("avc1.")
    }

    fn supports_audio(&self, config: &AudioConfig) -> bool {
        config.codec.starts_with("mp4a.")
    }
}

/// Cloneable handle to a media source.
#[derive(Clone)]
pub struct MediaSource {
    inner: Arc<MediaSourceInner>,
}

pub(crate) struct MediaSourceInner {
    ready_state: Mutex<ReadyState>,
    /// NaN while closed or until the first initialization segment.
    duration: Mutex<f64>,
    source_buffers: Mutex<Vec<SourceBuffer>>,
    host: Mutex<Option<Weak<dyn MediaHost>>>,
    end_of_stream_error: Mutex<Option<EndOfStreamError>>,
    events: Arc<Observers<MediaSourceEvent>>,
    tasks: TaskQueue,
}

impl MediaSource {
    pub fn new(tasks: TaskQueue) -> Self {
        Self {
            inner: Arc::new(MediaSourceInner {
                ready_state: Mutex::new(ReadyState::Closed),
                duration: Mutex::new(f64::NAN),
                source_buffers: Mutex::new(Vec::new()),
                host: Mutex::new(None),
                end_of_stream_error: Mutex::new(None),
                events: Observers::new(),
                tasks,
            }),
        }
    }

    pub fn ready_state(&self) -> ReadyState {
        *self.inner.ready_state.lock()
    }

    /// Duration in seconds; NaN while closed or unknown.
    pub fn duration(&self) -> f64 {
        if self.ready_state() == ReadyState::Closed {
            f64::NAN
        } else {
            *self.inner.duration.lock()
        }
    }

    /// Registers an observer for media source events.
    pub fn subscribe(&self, handler: impl FnMut(MediaSourceEvent) + Send + 'static) {
        self.inner.events.subscribe(handler);
    }

    /// Sets the presentation duration.
    ///
    /// Requires the source to be open with no update in flight; the value
    /// must be a non-negative number.
    pub fn set_duration(&self, duration: f64) -> Result<(), MediaError> {
        if duration.is_nan() || duration < 0.0 {
            return Err(MediaError::InvalidRange(format!(
                "duration must be a non-negative number, got {duration}"
            )));
        }
        if self.ready_state() != ReadyState::Open {
            return Err(MediaError::InvalidState(
                "duration can only be set while open".to_string(),
            ));
        }
        if self.inner.any_updating() {
            return Err(MediaError::InvalidState(
                "a source buffer is updating".to_string(),
            ));
        }
        self.inner.duration_change(duration);
        Ok(())
    }

    /// Creates a source buffer for the given MIME type.
    pub fn add_source_buffer(&self, mime: &str) -> Result<SourceBuffer, MediaError> {
        let kind = Self::parse_mime(mime)?;
        if self.ready_state() != ReadyState::Open {
            return Err(MediaError::InvalidState(
                "media source is not open".to_string(),
            ));
        }
        let mut buffers = self.inner.source_buffers.lock();
        if buffers.iter().any(|sb| sb.kind() == kind) {
            return Err(MediaError::QuotaExceeded(format!(
                "a {kind:?} source buffer already exists"
            )));
        }
        let buffer = SourceBuffer::new(kind, Arc::downgrade(&self.inner), self.inner.tasks.clone());
        buffers.push(buffer.clone());
        Ok(buffer)
    }

    fn parse_mime(mime: &str) -> Result<MediaKind, MediaError> {
        if mime.starts_with("audio/mp4") {
            Ok(MediaKind::Audio)
        } else if mime.starts_with("video/mp4") {
            Ok(MediaKind::Video)
        } else {
            Err(MediaError::UnsupportedType(mime.to_string()))
        }
    }

    /// Signals that the application has appended all data.
    pub fn end_of_stream(&self, error: Option<EndOfStreamError>) -> Result<(), MediaError> {
        if self.ready_state() != ReadyState::Open {
            return Err(MediaError::InvalidState(
                "media source is not open".to_string(),
            ));
        }
        if self.inner.any_updating() {
            return Err(MediaError::InvalidState(
                "a source buffer is updating".to_string(),
            ));
        }
        self.inner.end_of_stream_internal(error);
        Ok(())
    }

    pub fn source_buffers(&self) -> Vec<SourceBuffer> {
        self.inner.source_buffers.lock().clone()
    }

    pub fn is_ended(&self) -> bool {
        self.ready_state() == ReadyState::Ended
    }

    pub fn end_of_stream_error(&self) -> Option<EndOfStreamError> {
        *self.inner.end_of_stream_error.lock()
    }

    /// Element-level buffered ranges: the intersection of every source
    /// buffer's buffered ranges, clamped to the overall highest end. When
    /// ended, the final range of each source buffer reaches the highest end.
    pub fn buffered(&self) -> TimeRanges {
        self.inner.buffered()
    }

    /// Highest buffered end across all source buffers, in seconds.
    pub fn highest_buffered_end(&self) -> f64 {
        self.inner.highest_buffered_end()
    }

    /// The first video track buffer across the source buffers, if any.
    pub fn video_track_buffer(&self) -> Option<Arc<Mutex<TrackBuffer>>> {
        self.inner.track_buffer_of_kind(MediaKind::Video)
    }

    /// The first audio track buffer across the source buffers, if any.
    pub fn audio_track_buffer(&self) -> Option<Arc<Mutex<TrackBuffer>>> {
        self.inner.track_buffer_of_kind(MediaKind::Audio)
    }

    /// Attaches this media source to an element.
    ///
    /// Moves `Closed → Open` and queues `sourceopen`.
    pub fn attach(&self, host: Weak<dyn MediaHost>) -> Result<(), MediaError> {
        let mut state = self.inner.ready_state.lock();
        if *state != ReadyState::Closed {
            return Err(MediaError::InvalidState(
                "media source is already attached".to_string(),
            ));
        }
        *state = ReadyState::Open;
        drop(state);
        *self.inner.host.lock() = Some(host);
        queue_event(
            &self.inner.tasks,
            &self.inner.events,
            MediaSourceEvent::SourceOpen,
        );
        Ok(())
    }

    /// Detaches from the element: closes the source, resets the duration,
    /// and drops every source buffer together with its coded frames.
    pub fn detach(&self) {
        *self.inner.ready_state.lock() = ReadyState::Closed;
        *self.inner.duration.lock() = f64::NAN;
        *self.inner.host.lock() = None;
        *self.inner.end_of_stream_error.lock() = None;
        let buffers = std::mem::take(&mut *self.inner.source_buffers.lock());
        for buffer in &buffers {
            buffer.mark_removed();
        }
        tracing::debug!(
            buffers = buffers.len(),
            "media source detached, source buffers dropped"
        );
        queue_event(
            &self.inner.tasks,
            &self.inner.events,
            MediaSourceEvent::SourceClose,
        );
    }
}

impl MediaSourceInner {
    pub(crate) fn ready_state(&self) -> ReadyState {
        *self.ready_state.lock()
    }

    pub(crate) fn duration_seconds(&self) -> f64 {
        *self.duration.lock()
    }

    pub(crate) fn host(&self) -> Option<Arc<dyn MediaHost>> {
        self.host.lock().as_ref().and_then(Weak::upgrade)
    }

    pub(crate) fn any_updating(&self) -> bool {
        self.source_buffers.lock().iter().any(|sb| sb.updating())
    }

    /// Reopens an ended source; appends while ended transparently resume.
    pub(crate) fn open_if_ended(&self) {
        let mut state = self.ready_state.lock();
        if *state == ReadyState::Ended {
            *state = ReadyState::Open;
            drop(state);
            *self.end_of_stream_error.lock() = None;
            queue_event(&self.tasks, &self.events, MediaSourceEvent::SourceOpen);
        }
    }

    /// Stores a changed duration and notifies the element.
    pub(crate) fn duration_change(&self, duration: f64) {
        {
            let mut current = self.duration.lock();
            let unchanged = *current == duration || (current.is_nan() && duration.is_nan());
            if unchanged {
                return;
            }
            *current = duration;
        }
        if let Some(host) = self.host() {
            host.on_duration_changed(duration);
        }
    }

    pub(crate) fn end_of_stream_internal(&self, error: Option<EndOfStreamError>) {
        *self.ready_state.lock() = ReadyState::Ended;
        *self.end_of_stream_error.lock() = error;

        if error.is_none() {
            // The duration grows to cover everything buffered, but an
            // explicitly larger duration is kept.
            let highest = self.highest_buffered_end();
            let duration = self.duration_seconds();
            if duration.is_nan() || highest > duration {
                self.duration_change(highest);
            }
            if let Some(host) = self.host() {
                host.on_stream_ended();
            }
        }
        queue_event(&self.tasks, &self.events, MediaSourceEvent::SourceEnded);
    }

    pub(crate) fn highest_buffered_end(&self) -> f64 {
        self.source_buffers
            .lock()
            .iter()
            .map(|sb| sb.highest_buffered_end())
            .fold(0.0, f64::max)
    }

    pub(crate) fn buffered(&self) -> TimeRanges {
        let buffers = self.source_buffers.lock();
        if buffers.is_empty() {
            return TimeRanges::new();
        }
        let ended = *self.ready_state.lock() == ReadyState::Ended;
        let highest = buffers
            .iter()
            .map(|sb| sb.highest_buffered_end())
            .fold(0.0, f64::max);

        let mut out: Option<TimeRanges> = None;
        for sb in buffers.iter() {
            let ranges = sb.buffered_internal(ended.then_some(highest));
            out = Some(match out {
                Some(acc) => acc.intersect(&ranges),
                None => ranges,
            });
        }
        out.unwrap_or_default()
            .intersect(&TimeRanges::from_range(0.0, highest))
    }

    fn track_buffer_of_kind(&self, kind: MediaKind) -> Option<Arc<Mutex<TrackBuffer>>> {
        self.source_buffers
            .lock()
            .iter()
            .flat_map(|sb| sb.track_buffers())
            .find(|tb| tb.lock().kind() == kind)
    }
}

/// Stretches the final range of `ranges` out to `end`.
pub(crate) fn stretch_last_range(ranges: &TimeRanges, end: f64) -> TimeRanges {
    let mut out = TimeRanges::new();
    let count = ranges.len();
    for (i, range) in ranges.iter().enumerate() {
        let range_end = if i + 1 == count && end > range.end {
            end
        } else {
            range.end
        };
        out.add(range.start, range_end, 0.0);
    }
    out
}
