//! Per-media-type ingress: byte staging, parser pump, coded-frame
//! processing, and range removal.
//!
//! A source buffer accepts at most one append or removal at a time; the
//! work itself runs as a queued task so callers observe the documented
//! `updatestart → update/error → updateend` lifecycle. Parse and
//! initialization failures run the append-error path, which ends the whole
//! stream with a decode error.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::error::{EndOfStreamError, MediaError};
use crate::events::{queue_event, Observers, SourceBufferEvent};
use crate::media_source::{stretch_last_range, MediaHost, MediaSourceInner, ReadyState};
use crate::sample::{seconds_to_micros, MediaKind, Sample, TrackConfig};
use crate::segment::{ParserEvent, SegmentParser, StreamInfo, TrackInfo};
use crate::task::TaskQueue;
use crate::time_ranges::TimeRanges;
use crate::track_buffer::TrackBuffer;

/// Cloneable handle to a source buffer.
#[derive(Clone)]
pub struct SourceBuffer {
    inner: Arc<SourceBufferInner>,
}

struct SourceBufferInner {
    kind: MediaKind,
    parent: Weak<MediaSourceInner>,
    state: Mutex<SourceBufferState>,
    updating: AtomicBool,
    removed: AtomicBool,
    events: Arc<Observers<SourceBufferEvent>>,
    tasks: TaskQueue,
}

struct SourceBufferState {
    parser: SegmentParser,
    track_buffers: Vec<Arc<Mutex<TrackBuffer>>>,
    first_init_received: bool,
    /// Bumped by `abort` and detach; queued work from an older generation
    /// is skipped when it runs.
    generation: u64,
}

impl SourceBuffer {
    pub(crate) fn new(kind: MediaKind, parent: Weak<MediaSourceInner>, tasks: TaskQueue) -> Self {
        Self {
            inner: Arc::new(SourceBufferInner {
                kind,
                parent,
                state: Mutex::new(SourceBufferState {
                    parser: SegmentParser::new(),
                    track_buffers: Vec::new(),
                    first_init_received: false,
                    generation: 0,
                }),
                updating: AtomicBool::new(false),
                removed: AtomicBool::new(false),
                events: Observers::new(),
                tasks,
            }),
        }
    }

    pub fn kind(&self) -> MediaKind {
        self.inner.kind
    }

    /// True while an append or removal is in flight.
    pub fn updating(&self) -> bool {
        self.inner.updating.load(Ordering::SeqCst)
    }

    /// Registers an observer for update lifecycle events.
    pub fn subscribe(&self, handler: impl FnMut(SourceBufferEvent) + Send + 'static) {
        self.inner.events.subscribe(handler);
    }

    /// Stages bytes and schedules the parse.
    ///
    /// Appending to an ended media source reopens it. Fails when the buffer
    /// has been removed, is already updating, or is detached.
    pub fn append_buffer(&self, data: &[u8]) -> Result<(), MediaError> {
        let parent = self.inner.ensure_idle()?;
        parent.open_if_ended();

        let generation = {
            let mut state = self.inner.state.lock();
            state.parser.push(data);
            state.generation
        };
        self.inner.updating.store(true, Ordering::SeqCst);
        queue_event(
            &self.inner.tasks,
            &self.inner.events,
            SourceBufferEvent::UpdateStart,
        );

        let inner = Arc::clone(&self.inner);
        self.inner
            .tasks
            .queue(move || inner.run_append(generation));
        Ok(())
    }

    /// Schedules removal of coded frames in `[start, end)` seconds.
    ///
    /// The removal end of each track snaps by the random-access rule so a
    /// group is never left without its tail's dependencies; afterwards
    /// every track requires a sync frame before further appends.
    pub fn remove(&self, start: f64, end: f64) -> Result<(), MediaError> {
        let parent = self.inner.ensure_idle()?;
        let duration = parent.duration_seconds();
        if !(start >= 0.0 && start <= duration) {
            return Err(MediaError::InvalidRange(format!(
                "remove start {start} outside [0, {duration}]"
            )));
        }
        if !(end > start) {
            return Err(MediaError::InvalidRange(format!(
                "remove end {end} must exceed start {start}"
            )));
        }
        parent.open_if_ended();

        let generation = self.inner.state.lock().generation;
        self.inner.updating.store(true, Ordering::SeqCst);
        queue_event(
            &self.inner.tasks,
            &self.inner.events,
            SourceBufferEvent::UpdateStart,
        );

        let inner = Arc::clone(&self.inner);
        self.inner
            .tasks
            .queue(move || inner.run_remove(generation, start, end));
        Ok(())
    }

    /// Discards staged bytes and aborts an in-flight append.
    pub fn abort(&self) -> Result<(), MediaError> {
        if self.inner.removed.load(Ordering::SeqCst) {
            return Err(MediaError::InvalidState(
                "source buffer was removed".to_string(),
            ));
        }
        let parent = self.inner.parent()?;
        if parent.ready_state() != ReadyState::Open {
            return Err(MediaError::InvalidState(
                "media source is not open".to_string(),
            ));
        }
        {
            let mut state = self.inner.state.lock();
            state.generation += 1;
            state.parser.reset();
        }
        if self.inner.updating.swap(false, Ordering::SeqCst) {
            queue_event(
                &self.inner.tasks,
                &self.inner.events,
                SourceBufferEvent::Abort,
            );
            queue_event(
                &self.inner.tasks,
                &self.inner.events,
                SourceBufferEvent::UpdateEnd,
            );
        }
        Ok(())
    }

    /// Buffered ranges of this source buffer: the intersection of its track
    /// buffers' ranges. With an ended parent the last range of each track
    /// stretches to the overall highest end.
    pub fn buffered(&self) -> TimeRanges {
        let Some(parent) = self.inner.parent.upgrade() else {
            return TimeRanges::new();
        };
        let ended_to = (parent.ready_state() == ReadyState::Ended)
            .then(|| parent.highest_buffered_end());
        self.buffered_internal(ended_to)
    }

    pub(crate) fn buffered_internal(&self, ended_to: Option<f64>) -> TimeRanges {
        let state = self.inner.state.lock();
        if state.track_buffers.is_empty() {
            return TimeRanges::new();
        }
        let mut out: Option<TimeRanges> = None;
        let mut highest = 0.0f64;
        for tb in &state.track_buffers {
            let tb = tb.lock();
            let mut ranges = tb.ranges().clone();
            highest = highest.max(tb.buffered_end());
            if let Some(h) = ended_to {
                ranges = stretch_last_range(&ranges, h);
            }
            out = Some(match out {
                Some(acc) => acc.intersect(&ranges),
                None => ranges,
            });
        }
        let clamp_end = ended_to.unwrap_or(highest);
        out.unwrap_or_default()
            .intersect(&TimeRanges::from_range(0.0, clamp_end))
    }

    /// Highest end across this buffer's track ranges, in seconds.
    pub fn highest_buffered_end(&self) -> f64 {
        self.inner
            .state
            .lock()
            .track_buffers
            .iter()
            .map(|tb| tb.lock().buffered_end())
            .fold(0.0, f64::max)
    }

    /// The track buffers owned by this source buffer.
    pub fn track_buffers(&self) -> Vec<Arc<Mutex<TrackBuffer>>> {
        self.inner.state.lock().track_buffers.clone()
    }

    /// Severs the buffer from its media source and drops its coded frames.
    pub(crate) fn mark_removed(&self) {
        self.inner.removed.store(true, Ordering::SeqCst);
        self.inner.updating.store(false, Ordering::SeqCst);
        let mut state = self.inner.state.lock();
        state.generation += 1;
        state.track_buffers.clear();
        state.parser.reset();
    }
}

impl SourceBufferInner {
    fn parent(&self) -> Result<Arc<MediaSourceInner>, MediaError> {
        self.parent
            .upgrade()
            .ok_or_else(|| MediaError::InvalidState("media source detached".to_string()))
    }

    fn host(&self) -> Option<Arc<dyn MediaHost>> {
        self.parent.upgrade().and_then(|p| p.host())
    }

    fn ensure_idle(&self) -> Result<Arc<MediaSourceInner>, MediaError> {
        if self.removed.load(Ordering::SeqCst) {
            return Err(MediaError::InvalidState(
                "source buffer was removed".to_string(),
            ));
        }
        if self.updating.load(Ordering::SeqCst) {
            return Err(MediaError::InvalidState(
                "source buffer is updating".to_string(),
            ));
        }
        self.parent()
    }

    fn run_append(&self, generation: u64) {
        let result = {
            let mut state = self.state.lock();
            if state.generation != generation {
                return;
            }
            match state.parser.parse() {
                Err(err) => Err(err),
                Ok(events) => {
                    let mut result = Ok(());
                    for event in events {
                        result = match event {
                            ParserEvent::InitSegment(info) => {
                                self.init_segment_received(&mut state, info)
                            }
                            ParserEvent::MediaSegment(samples) => {
                                self.process_coded_frames(&mut state, &samples)
                            }
                        };
                        if result.is_err() {
                            break;
                        }
                    }
                    result
                }
            }
        };

        match result {
            Ok(()) => {
                self.updating.store(false, Ordering::SeqCst);
                queue_event(&self.tasks, &self.events, SourceBufferEvent::Update);
                queue_event(&self.tasks, &self.events, SourceBufferEvent::UpdateEnd);
                if let Some(host) = self.host() {
                    self.tasks.queue(move || host.on_buffered_changed(true));
                }
            }
            Err(err) => self.append_error(err),
        }
    }

    fn run_remove(&self, generation: u64, start: f64, end: f64) {
        let host = self.host();
        {
            let state = self.state.lock();
            if state.generation != generation {
                return;
            }
            let duration = self
                .parent
                .upgrade()
                .map(|p| p.duration_seconds())
                .unwrap_or(f64::NAN);
            let start_us = seconds_to_micros(start);
            let end_us = if end.is_finite() {
                seconds_to_micros(end)
            } else {
                i64::MAX
            };
            let duration_us = if duration.is_finite() {
                seconds_to_micros(duration)
            } else {
                i64::MAX
            };

            for tb_arc in &state.track_buffers {
                let mut tb = tb_arc.lock();
                let rap = tb.random_access_point_at_or_after(end_us);
                // With no later sync frame the removal reaches whichever is
                // further: the duration or the track's buffered end (the
                // duration may have been truncated below buffered data).
                let fallback = duration_us.max(seconds_to_micros(tb.buffered_end()));
                let remove_end_us = end_us.min(rap.unwrap_or(fallback));
                tb.remove_samples(start_us, remove_end_us);
                tb.require_random_access_point();
                drop(tb);

                if let Some(host) = &host {
                    let t_us = seconds_to_micros(host.current_time());
                    if start_us <= t_us && t_us < remove_end_us && host.ready_state_above_metadata()
                    {
                        host.on_stalled();
                    }
                }
            }
        }
        self.updating.store(false, Ordering::SeqCst);
        queue_event(&self.tasks, &self.events, SourceBufferEvent::Update);
        queue_event(&self.tasks, &self.events, SourceBufferEvent::UpdateEnd);
        if let Some(host) = self.host() {
            self.tasks.queue(move || host.on_buffered_changed(false));
        }
    }

    /// Parse or initialization failure: reset the parser, finish the update
    /// with an error, and end the stream as a decode failure.
    fn append_error(&self, err: MediaError) {
        tracing::error!(%err, "append error");
        self.state.lock().parser.reset();
        self.updating.store(false, Ordering::SeqCst);
        queue_event(&self.tasks, &self.events, SourceBufferEvent::Error);
        queue_event(&self.tasks, &self.events, SourceBufferEvent::UpdateEnd);
        if let Some(parent) = self.parent.upgrade() {
            parent.end_of_stream_internal(Some(EndOfStreamError::Decode));
        }
    }

    fn init_segment_received(
        &self,
        state: &mut SourceBufferState,
        info: StreamInfo,
    ) -> Result<(), MediaError> {
        let parent = self.parent()?;
        let host = parent.host();

        if parent.duration_seconds().is_nan() {
            let duration = if info.duration == 0.0 {
                f64::INFINITY
            } else {
                info.duration
            };
            parent.duration_change(duration);
        }
        if info.is_empty() {
            return Err(MediaError::Init(
                "initialization segment has no audio or video tracks".to_string(),
            ));
        }
        self.check_support(&host, &info)?;

        if !state.first_init_received {
            for track in info.audio_tracks.iter().chain(info.video_tracks.iter()) {
                state.track_buffers.push(Arc::new(Mutex::new(TrackBuffer::new(
                    track.id,
                    track.config.clone(),
                ))));
            }
            state.first_init_received = true;
            tracing::debug!(
                audio = info.audio_tracks.len(),
                video = info.video_tracks.len(),
                "first initialization segment received"
            );
            if let Some(host) = &host {
                host.on_metadata();
            }
        } else {
            self.reconfigure_tracks(state, &info)?;
        }
        Ok(())
    }

    fn check_support(
        &self,
        host: &Option<Arc<dyn MediaHost>>,
        info: &StreamInfo,
    ) -> Result<(), MediaError> {
        for track in &info.video_tracks {
            let TrackConfig::Video(config) = &track.config else {
                continue;
            };
            let supported = match host {
                Some(host) => host.supports_video(config),
                None => config.codec.starts_with("avc1."),
            };
            if !supported {
                return Err(MediaError::Init(format!(
                    "unsupported video codec {}",
                    config.codec
                )));
            }
        }
        for track in &info.audio_tracks {
            let TrackConfig::Audio(config) = &track.config else {
                continue;
            };
            let supported = match host {
                Some(host) => host.supports_audio(config),
                None => config.codec.starts_with("mp4a."),
            };
            if !supported {
                return Err(MediaError::Init(format!(
                    "unsupported audio codec {}",
                    config.codec
                )));
            }
        }
        Ok(())
    }

    /// Subsequent initialization segments must describe the same track
    /// structure; the existing track buffers pick up the new configs and
    /// wait for a sync frame.
    fn reconfigure_tracks(
        &self,
        state: &mut SourceBufferState,
        info: &StreamInfo,
    ) -> Result<(), MediaError> {
        let audio_buffers: Vec<_> = state
            .track_buffers
            .iter()
            .filter(|tb| tb.lock().kind() == MediaKind::Audio)
            .cloned()
            .collect();
        let video_buffers: Vec<_> = state
            .track_buffers
            .iter()
            .filter(|tb| tb.lock().kind() == MediaKind::Video)
            .cloned()
            .collect();

        if audio_buffers.len() != info.audio_tracks.len()
            || video_buffers.len() != info.video_tracks.len()
        {
            return Err(MediaError::Init(
                "track counts changed across initialization segments".to_string(),
            ));
        }
        check_track_ids(&audio_buffers, &info.audio_tracks)?;
        check_track_ids(&video_buffers, &info.video_tracks)?;

        for (tb, track) in audio_buffers.iter().zip(&info.audio_tracks) {
            tb.lock().reconfigure(track.config.clone());
        }
        for (tb, track) in video_buffers.iter().zip(&info.video_tracks) {
            tb.lock().reconfigure(track.config.clone());
        }
        for tb in &state.track_buffers {
            tb.lock().require_random_access_point();
        }
        Ok(())
    }

    /// The coded-frame-processing loop for one media segment.
    fn process_coded_frames(
        &self,
        state: &mut SourceBufferState,
        samples: &[Sample],
    ) -> Result<(), MediaError> {
        for sample in samples {
            let Some(tb_arc) = state
                .track_buffers
                .iter()
                .find(|tb| tb.lock().track_id() == sample.track_id)
                .cloned()
            else {
                tracing::warn!(
                    track_id = sample.track_id,
                    "dropping sample for unknown track"
                );
                continue;
            };

            let dts = sample.decode_timestamp_us();
            let discontinuity = {
                let tb = tb_arc.lock();
                match (tb.last_decode_dts_us(), tb.last_frame_duration_us()) {
                    (Some(last_dts), last_dur) => {
                        let limit = 2 * last_dur.unwrap_or_else(|| sample.duration_us().max(1));
                        dts < last_dts || dts - last_dts > limit
                    }
                    (None, _) => false,
                }
            };
            if discontinuity {
                tracing::debug!(
                    track_id = sample.track_id,
                    dts,
                    "decode discontinuity, requiring random access point on all tracks"
                );
                for tb in &state.track_buffers {
                    tb.lock().require_random_access_point();
                }
            }

            let mut tb = tb_arc.lock();
            if tb.need_random_access_point() {
                if !sample.is_sync {
                    continue;
                }
                tb.clear_need_random_access_point();
            }
            tb.append_sample(sample);
        }
        Ok(())
    }
}

fn check_track_ids(
    buffers: &[Arc<Mutex<TrackBuffer>>],
    tracks: &[TrackInfo],
) -> Result<(), MediaError> {
    if buffers.len() <= 1 {
        return Ok(());
    }
    for (tb, track) in buffers.iter().zip(tracks) {
        if tb.lock().track_id() != track.id {
            return Err(MediaError::Init(
                "track ids changed across initialization segments".to_string(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{self, SampleSpec, TrackSpec};
    use crate::media_source::MediaSource;

    fn video_track() -> TrackSpec {
        TrackSpec::Video {
            id: 1,
            timescale: 1_000,
            width: 640,
            height: 360,
        }
    }

    struct NoHost;

    impl MediaHost for NoHost {
        fn current_time(&self) -> f64 {
            0.0
        }
        fn ready_state_above_metadata(&self) -> bool {
            false
        }
        fn on_metadata(&self) {}
        fn on_buffered_changed(&self, _appended: bool) {}
        fn on_stalled(&self) {}
        fn on_duration_changed(&self, _duration: f64) {}
        fn on_stream_ended(&self) {}
    }

    fn setup() -> (MediaSource, SourceBuffer, TaskQueue, Arc<dyn MediaHost>) {
        let tasks = TaskQueue::new();
        let source = MediaSource::new(tasks.clone());
        // A do-nothing host: codec support falls back to the prefix check.
        let host: Arc<dyn MediaHost> = Arc::new(NoHost);
        source.attach(Arc::downgrade(&host)).unwrap();
        let sb = source.add_source_buffer("video/mp4").unwrap();
        (source, sb, tasks, host)
    }

    fn event_log(sb: &SourceBuffer) -> Arc<Mutex<Vec<SourceBufferEvent>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        sb.subscribe(move |e| sink.lock().push(e));
        log
    }

    fn append_all(sb: &SourceBuffer, tasks: &TaskQueue, bytes: &[u8]) {
        sb.append_buffer(bytes).unwrap();
        tasks.run();
    }

    /// 20 video frames of 200 ms each, sync every 5th: four groups over
    /// [0, 4) seconds.
    fn four_second_stream() -> Vec<u8> {
        let mut bytes = fixture::init_segment(1_000, 4_000, &[video_track()]);
        bytes.extend_from_slice(&fixture::media_segment(
            1,
            0,
            &fixture::sample_run(20, 200, 5),
        ));
        bytes
    }

    #[test]
    fn test_append_fires_update_lifecycle_in_order() {
        let (_source, sb, tasks, _host) = setup();
        let log = event_log(&sb);

        append_all(&sb, &tasks, &four_second_stream());
        assert_eq!(
            *log.lock(),
            vec![
                SourceBufferEvent::UpdateStart,
                SourceBufferEvent::Update,
                SourceBufferEvent::UpdateEnd,
            ]
        );
        assert!(!sb.updating());
    }

    #[test]
    fn test_append_builds_buffered_ranges() {
        let (source, sb, tasks, _host) = setup();
        append_all(&sb, &tasks, &four_second_stream());

        let buffered = sb.buffered();
        assert_eq!(buffered.len(), 1);
        assert_eq!(buffered.start(0), 0.0);
        assert!((buffered.end(0) - 4.0).abs() < 1e-9);
        assert_eq!(source.duration(), 4.0);
    }

    #[test]
    fn test_append_while_updating_is_invalid() {
        let (_source, sb, _tasks, _host) = setup();
        sb.append_buffer(&four_second_stream()).unwrap();
        assert!(sb.updating());
        assert!(matches!(
            sb.append_buffer(&[0u8]),
            Err(MediaError::InvalidState(_))
        ));
    }

    #[test]
    fn test_split_append_equals_single_append() {
        let (_source, sb, tasks, _host) = setup();
        let bytes = four_second_stream();
        let mid = bytes.len() / 2;
        append_all(&sb, &tasks, &bytes[..mid]);
        append_all(&sb, &tasks, &bytes[mid..]);

        let buffered = sb.buffered();
        assert_eq!(buffered.len(), 1);
        assert!((buffered.end(0) - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_bytes_run_append_error() {
        let (source, sb, tasks, _host) = setup();
        let log = event_log(&sb);
        append_all(&sb, &tasks, &four_second_stream());
        log.lock().clear();

        // An mdat with no preceding moof violates the byte-stream format.
        let mut mdat = Vec::new();
        mdat.extend_from_slice(&12u32.to_be_bytes());
        mdat.extend_from_slice(b"mdat");
        mdat.extend_from_slice(b"xxxx");
        sb.append_buffer(&mdat).unwrap();
        tasks.run();

        let events = log.lock();
        assert!(events.contains(&SourceBufferEvent::Error));
        assert_eq!(events.last(), Some(&SourceBufferEvent::UpdateEnd));
        assert_eq!(source.ready_state(), ReadyState::Ended);
        assert_eq!(
            source.end_of_stream_error(),
            Some(EndOfStreamError::Decode)
        );
    }

    #[test]
    fn test_remove_validates_range() {
        let (_source, sb, tasks, _host) = setup();
        append_all(&sb, &tasks, &four_second_stream());

        assert!(matches!(
            sb.remove(-1.0, 2.0),
            Err(MediaError::InvalidRange(_))
        ));
        assert!(matches!(
            sb.remove(2.0, 2.0),
            Err(MediaError::InvalidRange(_))
        ));
        sb.remove(0.0, f64::INFINITY).unwrap();
        tasks.run();
        assert!(sb.buffered().is_empty());
    }

    #[test]
    fn test_remove_snaps_to_random_access_point() {
        let (_source, sb, tasks, _host) = setup();
        append_all(&sb, &tasks, &four_second_stream());

        // Groups start at 0, 1, 2, 3 s. Removing [0.5, 1.7) resolves its
        // end to min(1.7, rap_after(1.7) = 2.0) = 1.7, dropping the frames
        // from 0.5 inside the first group (dependent tail) and the second
        // group's head.
        sb.remove(0.5, 1.7).unwrap();
        tasks.run();

        let buffered = sb.buffered();
        assert_eq!(buffered.len(), 2);
        assert!((buffered.end(0) - 0.6).abs() < 1e-9);
        assert!((buffered.start(1) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_abort_discards_staged_append() {
        let (_source, sb, tasks, _host) = setup();
        let log = event_log(&sb);
        let bytes = four_second_stream();

        sb.append_buffer(&bytes[..100]).unwrap();
        sb.abort().unwrap();
        tasks.run();

        let events = log.lock().clone();
        assert_eq!(
            events,
            vec![
                SourceBufferEvent::UpdateStart,
                SourceBufferEvent::Abort,
                SourceBufferEvent::UpdateEnd,
            ]
        );
        drop(events);
        assert!(!sb.updating());

        // A full append afterwards works from a clean slate.
        append_all(&sb, &tasks, &bytes);
        assert_eq!(sb.buffered().len(), 1);
    }

    #[test]
    fn test_ended_append_reopens_source() {
        let (source, sb, tasks, _host) = setup();
        append_all(&sb, &tasks, &four_second_stream());
        source.end_of_stream(None).unwrap();
        assert_eq!(source.ready_state(), ReadyState::Ended);

        let more = fixture::media_segment(1, 4_000, &fixture::sample_run(5, 200, 5));
        append_all(&sb, &tasks, &more);
        assert_eq!(source.ready_state(), ReadyState::Open);
        assert!((sb.buffered().end(0) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_discontinuity_requires_random_access_point() {
        let (_source, sb, tasks, _host) = setup();
        let mut bytes = fixture::init_segment(1_000, 0, &[video_track()]);
        bytes.extend_from_slice(&fixture::media_segment(
            1,
            0,
            &fixture::sample_run(5, 200, 5),
        ));
        append_all(&sb, &tasks, &bytes);

        // Jump forward by 10 s: the first samples are deltas and must be
        // dropped until the sync frame that follows.
        let jump = vec![
            SampleSpec::new(200, false, 16),
            SampleSpec::new(200, false, 16),
            SampleSpec::new(200, true, 16),
            SampleSpec::new(200, false, 16),
        ];
        append_all(&sb, &tasks, &fixture::media_segment(1, 10_000, &jump));

        let buffered = sb.buffered();
        assert_eq!(buffered.len(), 2);
        // The surviving second range starts at the sync frame, 10.4 s.
        assert!((buffered.start(1) - 10.4).abs() < 1e-9);
    }

    #[test]
    fn test_buffered_stretches_when_ended() {
        let (source, sb, tasks, _host) = setup();
        append_all(&sb, &tasks, &four_second_stream());
        // A second disjoint chunk leaves a gap before 8 s.
        append_all(
            &sb,
            &tasks,
            &fixture::media_segment(1, 8_000, &fixture::sample_run(5, 200, 5)),
        );
        let before = sb.buffered();
        assert_eq!(before.len(), 2);

        source.end_of_stream(None).unwrap();
        let after = sb.buffered();
        assert_eq!(after.len(), 2);
        assert!((after.end(1) - 9.0).abs() < 1e-9);
        assert_eq!(source.duration(), 9.0);
    }
}
