//! The media element facade.
//!
//! Exposes the `HTMLMediaElement`-shaped surface (play/pause, seeking,
//! rate, volume, ready state, the named event sequence) and drives the
//! decode pipelines from the animation tick. The element owns the four
//! collaborator sinks and holds a shared reference to the attached media
//! source; the media source holds only a weak `MediaHost` reference back,
//! so detaching severs both directions.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use mezzanine_core::{
    micros_to_seconds, queue_event, seconds_to_micros, Direction, EndOfStreamError,
    MediaElementEvent, MediaError, MediaHost, MediaSource, Observers, TaskQueue, TimeRanges,
    RANGE_MERGE_TOLERANCE,
};

use crate::clock::MediaClock;
use crate::scheduler::{
    build_batches, pcm_from_batch, schedule_times, AudioPipeline, ScheduledAudio, VideoPipeline,
};
use crate::sink::{AudioMixer, MediaSinks, Presenter};

/// Minimum wall-clock spacing between `timeupdate` events, in seconds.
const TIMEUPDATE_INTERVAL: f64 = 0.015;

/// Buffered look-ahead required for `FutureData`, in seconds.
const FUTURE_DATA_LOOKAHEAD: f64 = 0.1;

/// The element's readiness ladder. `EnoughData` is defined but never
/// entered; buffering signalling is left to the adaptive-bitrate driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ElementReadyState {
    Nothing,
    Metadata,
    CurrentData,
    FutureData,
    EnoughData,
}

/// Outcome handle returned by [`MediaElement::play`].
///
/// Resolves when playback actually starts (`playing`), rejects with an
/// abort error when playback is paused, ends, or detaches first.
#[derive(Clone)]
pub struct PlayPromise {
    state: Arc<Mutex<PlayPromiseState>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayPromiseState {
    Pending,
    Resolved,
    Rejected(MediaError),
}

impl PlayPromise {
    fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(PlayPromiseState::Pending)),
        }
    }

    pub fn state(&self) -> PlayPromiseState {
        self.state.lock().clone()
    }

    pub fn is_pending(&self) -> bool {
        *self.state.lock() == PlayPromiseState::Pending
    }

    fn resolve(&self) {
        let mut state = self.state.lock();
        if *state == PlayPromiseState::Pending {
            *state = PlayPromiseState::Resolved;
        }
    }

    fn reject(&self, err: MediaError) {
        let mut state = self.state.lock();
        if *state == PlayPromiseState::Pending {
            *state = PlayPromiseState::Rejected(err);
        }
    }
}

/// A pending seek. Starting a new seek replaces the previous state, which
/// is what aborts a superseded wait; the decoder resets flush any frames
/// the old seek was waiting on.
struct SeekState {
    target_us: i64,
}

struct Playback {
    media_source: Option<MediaSource>,
    clock: MediaClock,
    ready_state: ElementReadyState,
    paused: bool,
    seeking: bool,
    ended: bool,
    muted: bool,
    volume: f64,
    /// Mirror of the media source duration; NaN while unknown.
    duration: f64,
    played: TimeRanges,
    video: VideoPipeline,
    audio: AudioPipeline,
    mixer: Box<dyn AudioMixer>,
    presenter: Box<dyn Presenter>,
    scheduled_audio: Vec<ScheduledAudio>,
    /// False after a pause or reset stopped the mixer nodes; scheduled
    /// batches are re-issued when playback resumes.
    audio_nodes_active: bool,
    seek: Option<SeekState>,
    pending_plays: Vec<PlayPromise>,
    last_timeupdate_wall: Option<f64>,
    loadeddata_fired: bool,
    playing_emitted: bool,
    video_dims: Option<(u32, u32)>,
}

/// Flag mailbox written by media-source callbacks and drained on the
/// element's own tasks, so element events always follow the buffer events
/// that caused them.
#[derive(Default)]
struct HostSignals {
    metadata: bool,
    stalled: bool,
    current_time: f64,
    above_metadata: bool,
}

pub(crate) struct ElementInner {
    self_ref: Weak<ElementInner>,
    playback: Mutex<Playback>,
    signals: Mutex<HostSignals>,
    events: Arc<Observers<MediaElementEvent>>,
    tasks: TaskQueue,
}

/// The HTML-shaped media element.
pub struct MediaElement {
    inner: Arc<ElementInner>,
}

impl MediaElement {
    /// Builds an element around its four collaborators. `tasks` must be
    /// the same queue the media source runs on.
    pub fn new(sinks: MediaSinks, tasks: TaskQueue) -> Self {
        let MediaSinks {
            video_decoder,
            audio_decoder,
            mixer,
            presenter,
        } = sinks;
        let inner = Arc::new_cyclic(|self_ref| ElementInner {
            self_ref: self_ref.clone(),
            playback: Mutex::new(Playback {
                media_source: None,
                clock: MediaClock::new(),
                ready_state: ElementReadyState::Nothing,
                paused: true,
                seeking: false,
                ended: false,
                muted: false,
                volume: 1.0,
                duration: f64::NAN,
                played: TimeRanges::new(),
                video: VideoPipeline::new(video_decoder),
                audio: AudioPipeline::new(audio_decoder),
                mixer,
                presenter,
                scheduled_audio: Vec::new(),
                audio_nodes_active: false,
                seek: None,
                pending_plays: Vec::new(),
                last_timeupdate_wall: None,
                loadeddata_fired: false,
                playing_emitted: false,
                video_dims: None,
            }),
            signals: Mutex::new(HostSignals::default()),
            events: Observers::new(),
            tasks,
        });
        Self { inner }
    }

    /// Registers an observer for element events.
    pub fn subscribe(&self, handler: impl FnMut(MediaElementEvent) + Send + 'static) {
        self.inner.events.subscribe(handler);
    }

    /// Attaches or detaches a media source.
    ///
    /// Detaching drops all coded-frame storage, resets playback, and fires
    /// `emptied`.
    pub fn set_src_object(&self, source: Option<MediaSource>) {
        let mut p = self.inner.playback.lock();
        if let Some(old) = p.media_source.take() {
            old.detach();
            self.inner.reset_playback(&mut p);
            queue_event(&self.inner.tasks, &self.inner.events, MediaElementEvent::Emptied);
        }
        if let Some(source) = source {
            let weak: Weak<dyn MediaHost> = self.inner.self_ref.clone();
            match source.attach(weak) {
                Ok(()) => p.media_source = Some(source),
                Err(err) => tracing::error!(%err, "media source attach failed"),
            }
        }
        self.inner.update_mirrors(&p);
    }

    /// Requests playback. The returned promise resolves on `playing`.
    pub fn play(&self) -> PlayPromise {
        let promise = PlayPromise::new();
        let mut p = self.inner.playback.lock();
        if p.media_source.is_none() {
            promise.reject(MediaError::InvalidState("no media attached".to_string()));
            return promise;
        }
        if p.ended && Direction::from_rate(p.clock.rate()) == Direction::Forward {
            // Replay from the start.
            self.inner.seek_internal(&mut p, 0.0);
        }
        if p.ended {
            // Backward playback that ran down to zero cannot resume
            // without a seek or a direction change; resolving here would
            // report playback that can never advance.
            promise.reject(MediaError::Aborted("playback ended".to_string()));
            return promise;
        }
        if p.paused {
            p.paused = false;
            queue_event(&self.inner.tasks, &self.inner.events, MediaElementEvent::Play);
            p.pending_plays.push(promise.clone());
            if p.ready_state >= ElementReadyState::FutureData {
                self.inner.emit_playing(&mut p);
            } else {
                queue_event(
                    &self.inner.tasks,
                    &self.inner.events,
                    MediaElementEvent::Waiting,
                );
            }
        } else if p.ready_state >= ElementReadyState::FutureData {
            promise.resolve();
        } else {
            p.pending_plays.push(promise.clone());
        }
        self.inner.update_mirrors(&p);
        promise
    }

    /// Pauses playback; pending play promises reject with an abort error.
    pub fn pause(&self) {
        let mut p = self.inner.playback.lock();
        if p.paused {
            return;
        }
        p.paused = true;
        p.playing_emitted = false;
        queue_event(&self.inner.tasks, &self.inner.events, MediaElementEvent::Pause);
        for play in p.pending_plays.drain(..) {
            play.reject(MediaError::Aborted(
                "pause() before playback started".to_string(),
            ));
        }
        self.inner.stop_audio_nodes(&mut p);
        self.inner.update_mirrors(&p);
    }

    pub fn current_time(&self) -> f64 {
        self.inner.playback.lock().clock.current_seconds()
    }

    /// Seeks when metadata is known; before that it only repositions the
    /// default playback start.
    pub fn set_current_time(&self, seconds: f64) {
        let mut p = self.inner.playback.lock();
        if p.ready_state == ElementReadyState::Nothing || p.media_source.is_none() {
            p.clock.set_current_us(seconds_to_micros(seconds.max(0.0)));
            self.inner.update_mirrors(&p);
            return;
        }
        self.inner.seek_internal(&mut p, seconds);
        self.inner.update_mirrors(&p);
    }

    pub fn duration(&self) -> f64 {
        self.inner.playback.lock().duration
    }

    pub fn buffered(&self) -> TimeRanges {
        self.inner
            .playback
            .lock()
            .media_source
            .as_ref()
            .map(MediaSource::buffered)
            .unwrap_or_default()
    }

    /// Everything between zero and the duration is seekable.
    pub fn seekable(&self) -> TimeRanges {
        let duration = self.duration();
        if duration.is_nan() {
            TimeRanges::new()
        } else {
            TimeRanges::from_range(0.0, duration)
        }
    }

    pub fn played(&self) -> TimeRanges {
        self.inner.playback.lock().played.clone()
    }

    pub fn paused(&self) -> bool {
        self.inner.playback.lock().paused
    }

    pub fn seeking(&self) -> bool {
        self.inner.playback.lock().seeking
    }

    pub fn ended(&self) -> bool {
        self.inner.playback.lock().ended
    }

    pub fn ready_state(&self) -> ElementReadyState {
        self.inner.playback.lock().ready_state
    }

    pub fn video_width(&self) -> u32 {
        self.inner.playback.lock().video_dims.map(|d| d.0).unwrap_or(0)
    }

    pub fn video_height(&self) -> u32 {
        self.inner.playback.lock().video_dims.map(|d| d.1).unwrap_or(0)
    }

    pub fn playback_rate(&self) -> f64 {
        self.inner.playback.lock().clock.rate()
    }

    /// Changes the signed playback rate.
    ///
    /// A sign flip voids both decode queues; a magnitude change
    /// reschedules the live audio batches.
    pub fn set_playback_rate(&self, rate: f64) {
        let mut p = self.inner.playback.lock();
        let old = p.clock.rate();
        if rate == old {
            return;
        }
        let flipped = Direction::from_rate(rate) != Direction::from_rate(old);
        p.clock.set_rate(rate);
        if flipped {
            tracing::debug!(old, rate, "playback direction flipped");
            p.video.reset();
            p.audio.reset();
            self.inner.stop_audio_nodes(&mut p);
            p.scheduled_audio.clear();
            p.ended = false;
        } else if rate != 0.0 {
            let current_us = p.clock.current_us();
            self.inner.reschedule_audio(&mut p, current_us);
        }
        queue_event(
            &self.inner.tasks,
            &self.inner.events,
            MediaElementEvent::RateChange,
        );
        self.inner.update_mirrors(&p);
    }

    pub fn volume(&self) -> f64 {
        self.inner.playback.lock().volume
    }

    pub fn set_volume(&self, volume: f64) {
        let mut p = self.inner.playback.lock();
        p.volume = volume.clamp(0.0, 1.0);
        let gain = if p.muted { 0.0 } else { p.volume };
        p.mixer.set_gain(gain);
        queue_event(
            &self.inner.tasks,
            &self.inner.events,
            MediaElementEvent::VolumeChange,
        );
    }

    pub fn muted(&self) -> bool {
        self.inner.playback.lock().muted
    }

    pub fn set_muted(&self, muted: bool) {
        let mut p = self.inner.playback.lock();
        p.muted = muted;
        let gain = if muted { 0.0 } else { p.volume };
        p.mixer.set_gain(gain);
        queue_event(
            &self.inner.tasks,
            &self.inner.events,
            MediaElementEvent::VolumeChange,
        );
    }

    /// The animation tick: runs queued tasks, advances the clock, keeps
    /// the decode queues topped up, renders, and schedules audio.
    ///
    /// `wall_now` is the embedder's monotonic clock in seconds.
    pub fn tick(&self, wall_now: f64) {
        self.inner.tasks.run();
        {
            let mut p = self.inner.playback.lock();
            self.inner.step(&mut p, wall_now);
        }
        self.inner.tasks.run();
    }
}

impl ElementInner {
    fn queue(&self, event: MediaElementEvent) {
        queue_event(&self.tasks, &self.events, event);
    }

    /// One animation tick with the playback state locked.
    fn step(&self, p: &mut Playback, wall_now: f64) {
        let direction = Direction::from_rate(p.clock.rate());

        // Accept decoder deliveries first so coverage checks below see
        // everything decoded so far.
        let current_us = p.clock.current_us();
        p.video.pump(current_us, direction);
        p.audio.pump(current_us, direction);
        if let Some(err) = p.video.take_error().or_else(|| p.audio.take_error()) {
            self.handle_decode_error(p, err);
        }

        let audio_now = p.mixer.is_running().then(|| p.mixer.now());
        let potentially_playing = !p.paused
            && !p.ended
            && p.ready_state >= ElementReadyState::FutureData
            && p.media_source.is_some();

        if potentially_playing && !p.seeking {
            self.advance_clock(p, wall_now, audio_now);
        } else {
            p.clock.hold(wall_now, audio_now);
        }
        let current_us = p.clock.current_us();

        // Keep the decode queues topped up even while paused or seeking;
        // readiness and seek completion depend on decoded frames. Sitting
        // exactly on the end of an ended stream seeds from the content
        // just below it, since no frame interval contains the end point.
        let refill_us = if self.at_stream_end(p, current_us) {
            (current_us - 1).max(0)
        } else {
            current_us
        };
        if let Some(ms) = p.media_source.clone() {
            if let Some(tb) = ms.video_track_buffer() {
                let tb = tb.lock();
                p.video.refill(&tb, refill_us, direction);
            }
            if let Some(tb) = ms.audio_track_buffer() {
                let tb = tb.lock();
                p.audio.refill(&tb, refill_us, direction);
            }
        }
        p.video.pump(current_us, direction);
        p.audio.pump(current_us, direction);

        self.render_video(p, current_us, direction);

        if potentially_playing && !p.seeking && p.clock.rate() != 0.0 {
            if !p.audio_nodes_active && !p.scheduled_audio.is_empty() {
                self.reschedule_audio(p, current_us);
            }
            p.audio_nodes_active = true;
            self.schedule_audio_batches(p, current_us, direction);
        }
        self.prune_scheduled_audio(p, current_us, direction);

        self.evaluate_ready_state(p);
        self.check_seek_complete(p);

        if potentially_playing && !p.seeking {
            let due = p
                .last_timeupdate_wall
                .map(|last| wall_now - last >= TIMEUPDATE_INTERVAL)
                .unwrap_or(true);
            if due {
                p.last_timeupdate_wall = Some(wall_now);
                self.queue(MediaElementEvent::TimeUpdate);
            }
        }

        self.evaluate_ended(p);
        self.update_mirrors(p);
    }

    /// Advances the media clock and clamps it to the buffered range that
    /// contained the previous position; `played` grows by the traversed
    /// interval.
    fn advance_clock(&self, p: &mut Playback, wall_now: f64, audio_now: Option<f64>) {
        let before_us = p.clock.current_us();
        let buffered = p
            .media_source
            .as_ref()
            .map(MediaSource::buffered)
            .unwrap_or_default();
        p.clock.advance(wall_now, audio_now);

        match buffered.find(micros_to_seconds(before_us)) {
            Some(range) => {
                let start_us = seconds_to_micros(range.start).min(before_us);
                let end_us = seconds_to_micros(range.end).max(before_us);
                p.clock.clamp_current(start_us, end_us);
            }
            None => {
                // Outside buffered data the position holds still.
                p.clock.clamp_current(before_us, before_us);
            }
        }

        let after_us = p.clock.current_us();
        let (lo, hi) = (before_us.min(after_us), before_us.max(after_us));
        if hi > lo {
            p.played.add(
                micros_to_seconds(lo),
                micros_to_seconds(hi),
                RANGE_MERGE_TOLERANCE,
            );
        }
    }

    /// Draws the decoded frame containing the current position, resizing
    /// the surface when the display dimensions change.
    fn render_video(&self, p: &mut Playback, current_us: i64, direction: Direction) {
        p.video.drop_late(current_us, direction);
        let Some(frame) = p.video.take_frame_for(current_us) else {
            return;
        };
        let dims = (frame.display_width, frame.display_height);
        if p.video_dims != Some(dims) {
            p.presenter.resize(dims.0, dims.1);
            p.video_dims = Some(dims);
            if p.ready_state > ElementReadyState::Nothing {
                self.queue(MediaElementEvent::Resize);
            }
        }
        p.presenter.draw(&frame);
        p.video.current = Some(frame);
    }

    /// Consumes decoded audio into mixer batches.
    fn schedule_audio_batches(&self, p: &mut Playback, current_us: i64, direction: Direction) {
        if p.audio.ready.is_empty() {
            return;
        }
        let rate = p.clock.rate().abs();
        let now = p.mixer.now();
        let frames = std::mem::take(&mut p.audio.ready);
        for batch in build_batches(frames, direction) {
            let (pcm, start_us, end_us) = pcm_from_batch(&batch, direction);
            let (when, offset) =
                schedule_times(start_us, end_us, current_us, now, rate, direction);
            let node = p.mixer.schedule(pcm.clone(), when, offset, rate);
            p.scheduled_audio.push(ScheduledAudio {
                node,
                start_us,
                end_us,
                pcm,
            });
        }
    }

    /// Stops and re-issues every tracked batch against the current rate
    /// and position.
    fn reschedule_audio(&self, p: &mut Playback, current_us: i64) {
        let rate = p.clock.rate().abs();
        if rate == 0.0 {
            return;
        }
        let direction = Direction::from_rate(p.clock.rate());
        let now = p.mixer.now();
        for record in &mut p.scheduled_audio {
            p.mixer.stop(record.node);
            let (when, offset) =
                schedule_times(record.start_us, record.end_us, current_us, now, rate, direction);
            record.node = p.mixer.schedule(record.pcm.clone(), when, offset, rate);
        }
        p.audio_nodes_active = true;
    }

    /// Forgets batches fully behind the current position.
    fn prune_scheduled_audio(&self, p: &mut Playback, current_us: i64, direction: Direction) {
        p.scheduled_audio.retain(|s| match direction {
            Direction::Forward => s.end_us > current_us,
            Direction::Backward => s.start_us < current_us,
        });
    }

    fn stop_audio_nodes(&self, p: &mut Playback) {
        for record in &p.scheduled_audio {
            p.mixer.stop(record.node);
        }
        p.audio_nodes_active = false;
    }

    fn handle_decode_error(&self, p: &mut Playback, err: MediaError) {
        tracing::error!(%err, "decoder failure ends the stream");
        self.queue(MediaElementEvent::Error);
        if let Some(ms) = &p.media_source {
            if let Err(eos_err) = ms.end_of_stream(Some(EndOfStreamError::Decode)) {
                tracing::debug!(%eos_err, "end_of_stream after decode error not possible");
            }
        }
    }

    fn seek_internal(&self, p: &mut Playback, seconds: f64) {
        let upper = if p.duration.is_finite() {
            p.duration
        } else {
            f64::MAX
        };
        let target = seconds.clamp(0.0, upper.max(0.0));
        let target_us = seconds_to_micros(target);
        tracing::debug!(target, "seek");

        p.seeking = true;
        p.ended = false;
        p.seek = Some(SeekState { target_us });
        p.video.reset();
        p.audio.reset();
        self.stop_audio_nodes(p);
        p.scheduled_audio.clear();
        p.clock.set_current_us(target_us);
        if p.ready_state > ElementReadyState::Metadata {
            p.ready_state = ElementReadyState::Metadata;
            p.playing_emitted = false;
        }
        self.queue(MediaElementEvent::Seeking);
    }

    /// A seek finishes once the element is back at `FutureData` and both
    /// decoders produced a frame containing the target. A seek to the very
    /// end of an ended stream completes against the content just below it.
    fn check_seek_complete(&self, p: &mut Playback) {
        let Some(seek) = &p.seek else {
            return;
        };
        let target_us = seek.target_us;
        let Some(ms) = p.media_source.clone() else {
            return;
        };
        let at_end = self.at_stream_end(p, target_us);
        let probe_us = if at_end {
            (target_us - 1).max(0)
        } else {
            target_us
        };
        let video_ok = ms.video_track_buffer().is_none() || p.video.covers(probe_us);
        let audio_ok = ms.audio_track_buffer().is_none()
            || p.audio.covers(probe_us)
            || p.scheduled_audio.iter().any(|s| s.contains(probe_us));
        let ready = p.ready_state >= ElementReadyState::FutureData || at_end;
        if ready && video_ok && audio_ok {
            p.seek = None;
            p.seeking = false;
            self.queue(MediaElementEvent::TimeUpdate);
            self.queue(MediaElementEvent::Seeked);
        }
    }

    /// True if `time_us` sits at or past the duration of an ended stream.
    fn at_stream_end(&self, p: &Playback, time_us: i64) -> bool {
        p.duration.is_finite()
            && time_us >= seconds_to_micros(p.duration)
            && p.media_source.as_ref().is_some_and(MediaSource::is_ended)
    }

    fn evaluate_ready_state(&self, p: &mut Playback) {
        if p.ready_state == ElementReadyState::Nothing {
            return;
        }
        let Some(ms) = p.media_source.clone() else {
            return;
        };
        let t_us = p.clock.current_us();
        let t = micros_to_seconds(t_us);
        let duration_us = if p.duration.is_finite() {
            seconds_to_micros(p.duration)
        } else {
            i64::MAX
        };
        if ms.is_ended() && t_us >= duration_us {
            // Holding at the very end; the level reached stays.
            return;
        }

        let buffered = ms.buffered();
        let have_current = buffered.find(t).is_some();
        let has_video = ms.video_track_buffer().is_some();
        let has_audio = ms.audio_track_buffer().is_some();
        // Backward playback renders the content just below the position,
        // so coverage is checked on that side of the half-open intervals.
        let coverage_us = match Direction::from_rate(p.clock.rate()) {
            Direction::Forward => t_us,
            Direction::Backward => (t_us - 1).max(0),
        };
        let decoded_ok = (!has_video || p.video.covers(coverage_us))
            && (!has_audio
                || p.audio.covers(coverage_us)
                || p.scheduled_audio.iter().any(|s| s.contains(coverage_us)));
        let lookahead_end = if ms.is_ended() {
            (t + FUTURE_DATA_LOOKAHEAD).min(p.duration)
        } else {
            t + FUTURE_DATA_LOOKAHEAD
        };
        let have_future = have_current
            && decoded_ok
            && (lookahead_end <= t || buffered.contains_range(t, lookahead_end));

        let new_state = if have_future {
            ElementReadyState::FutureData
        } else if have_current {
            ElementReadyState::CurrentData
        } else {
            ElementReadyState::Metadata
        };
        self.transition_ready_state(p, new_state);
    }

    fn transition_ready_state(&self, p: &mut Playback, new_state: ElementReadyState) {
        let old = p.ready_state;
        if new_state == old {
            return;
        }
        p.ready_state = new_state;
        tracing::debug!(?old, ?new_state, "ready state changed");

        if new_state > old {
            if old < ElementReadyState::CurrentData
                && new_state >= ElementReadyState::CurrentData
                && !p.loadeddata_fired
            {
                p.loadeddata_fired = true;
                self.queue(MediaElementEvent::LoadedData);
            }
            if old < ElementReadyState::FutureData && new_state >= ElementReadyState::FutureData {
                self.queue(MediaElementEvent::CanPlay);
                self.queue(MediaElementEvent::CanPlayThrough);
                if !p.paused && !p.ended {
                    self.emit_playing(p);
                }
            }
        } else if old >= ElementReadyState::FutureData
            && new_state < ElementReadyState::FutureData
            && !p.paused
        {
            p.playing_emitted = false;
            self.queue(MediaElementEvent::Waiting);
        }
    }

    fn emit_playing(&self, p: &mut Playback) {
        if p.ended {
            // An ended element never reports `playing`; pending promises
            // are rejected by the ended paths instead.
            return;
        }
        if !p.playing_emitted {
            p.playing_emitted = true;
            self.queue(MediaElementEvent::Playing);
        }
        for play in p.pending_plays.drain(..) {
            play.resolve();
        }
    }

    fn evaluate_ended(&self, p: &mut Playback) {
        if p.ready_state < ElementReadyState::Metadata || p.ended {
            return;
        }
        let Some(ms) = p.media_source.clone() else {
            return;
        };
        match Direction::from_rate(p.clock.rate()) {
            Direction::Forward => {
                if !p.duration.is_finite() || !ms.is_ended() {
                    return;
                }
                let duration_us = seconds_to_micros(p.duration);
                if p.clock.current_us() >= duration_us {
                    tracing::debug!("playback reached the end of the stream");
                    p.ended = true;
                    self.queue(MediaElementEvent::TimeUpdate);
                    if !p.paused {
                        p.paused = true;
                        self.queue(MediaElementEvent::Pause);
                    }
                    p.playing_emitted = false;
                    self.queue(MediaElementEvent::Ended);
                    for play in p.pending_plays.drain(..) {
                        play.reject(MediaError::Aborted("playback ended".to_string()));
                    }
                    self.stop_audio_nodes(p);
                }
            }
            Direction::Backward => {
                if p.clock.current_us() == 0 {
                    p.ended = true;
                    self.queue(MediaElementEvent::TimeUpdate);
                    for play in p.pending_plays.drain(..) {
                        play.reject(MediaError::Aborted("playback ended".to_string()));
                    }
                }
            }
        }
    }

    /// Clears everything playback-related; used on detach.
    fn reset_playback(&self, p: &mut Playback) {
        p.video.reset();
        p.audio.reset();
        self.stop_audio_nodes(p);
        p.scheduled_audio.clear();
        p.ready_state = ElementReadyState::Nothing;
        p.duration = f64::NAN;
        p.played = TimeRanges::new();
        p.clock.set_current_us(0);
        p.seek = None;
        p.seeking = false;
        p.ended = false;
        p.loadeddata_fired = false;
        p.playing_emitted = false;
        p.video_dims = None;
        p.paused = true;
        for play in p.pending_plays.drain(..) {
            play.reject(MediaError::Aborted("media source detached".to_string()));
        }
        let mut signals = self.signals.lock();
        *signals = HostSignals::default();
    }

    fn update_mirrors(&self, p: &Playback) {
        let mut signals = self.signals.lock();
        signals.current_time = p.clock.current_seconds();
        signals.above_metadata = p.ready_state > ElementReadyState::Metadata;
    }

    /// Runs on the task queue after an append or removal completed.
    fn buffered_changed(&self, appended: bool) {
        let (metadata, stalled) = {
            let mut signals = self.signals.lock();
            let out = (signals.metadata, signals.stalled);
            signals.metadata = false;
            signals.stalled = false;
            out
        };
        let mut p = self.playback.lock();
        if metadata && p.ready_state == ElementReadyState::Nothing && p.media_source.is_some() {
            if let Some(ms) = &p.media_source {
                p.duration = ms.duration();
            }
            p.ready_state = ElementReadyState::Metadata;
            self.queue(MediaElementEvent::LoadedMetadata);
        }
        if stalled && p.ready_state > ElementReadyState::Metadata {
            p.ready_state = ElementReadyState::Metadata;
            p.playing_emitted = false;
            self.queue(MediaElementEvent::Waiting);
        }
        self.evaluate_ready_state(&mut p);
        if appended && p.ready_state >= ElementReadyState::Metadata {
            self.queue(MediaElementEvent::Progress);
        }
        self.update_mirrors(&p);
    }

    fn handle_duration_changed(&self, duration: f64) {
        self.queue(MediaElementEvent::DurationChange);
        let mut p = self.playback.lock();
        p.duration = duration;
        let current = p.clock.current_seconds();
        if duration.is_finite() && current > duration && p.ready_state > ElementReadyState::Nothing
        {
            self.seek_internal(&mut p, duration);
        }
        self.update_mirrors(&p);
    }

    fn handle_stream_ended(&self) {
        let mut p = self.playback.lock();
        if let Some(ms) = &p.media_source {
            p.duration = ms.duration();
        }
        self.evaluate_ready_state(&mut p);
        self.update_mirrors(&p);
    }
}

impl MediaHost for ElementInner {
    fn current_time(&self) -> f64 {
        self.signals.lock().current_time
    }

    fn ready_state_above_metadata(&self) -> bool {
        self.signals.lock().above_metadata
    }

    fn on_metadata(&self) {
        self.signals.lock().metadata = true;
    }

    fn on_buffered_changed(&self, appended: bool) {
        // Already running as a queued task; handle inline.
        self.buffered_changed(appended);
    }

    fn on_stalled(&self) {
        self.signals.lock().stalled = true;
    }

    fn on_duration_changed(&self, duration: f64) {
        // May be called mid-append with buffer locks held; defer.
        if let Some(inner) = self.self_ref.upgrade() {
            self.tasks
                .queue(move || inner.handle_duration_changed(duration));
        }
    }

    fn on_stream_ended(&self) {
        if let Some(inner) = self.self_ref.upgrade() {
            self.tasks.queue(move || inner.handle_stream_ended());
        }
    }
}
