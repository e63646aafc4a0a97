//! Per-track ordered storage of coded frames.
//!
//! Audio tracks keep a flat list of frames sorted by presentation timestamp.
//! Video tracks group frames into groups of pictures keyed on their sync
//! frame: decode dependencies never cross a group boundary, which is what
//! makes removal and random access tractable. Frames inside a group stay in
//! append (decode) order.

use crate::sample::{
    micros_to_seconds, CodedFrame, Direction, FrameKind, GroupOfPictures, MediaKind, Sample,
    TrackConfig,
};
use crate::time_ranges::{TimeRanges, RANGE_MERGE_TOLERANCE};

/// Maximum presentation gap, in microseconds, across which two video groups
/// are considered temporally adjacent for continuation.
const GOP_ADJACENCY_TOLERANCE_US: i64 = 1;

/// Per-track store of coded frames with time-range bookkeeping.
pub struct TrackBuffer {
    kind: MediaKind,
    track_id: u32,
    config: TrackConfig,
    /// Audio frames, sorted by presentation timestamp.
    frames: Vec<CodedFrame>,
    /// Video groups of pictures, sorted by start timestamp.
    gops: Vec<GroupOfPictures>,
    /// Index of the group currently receiving delta frames.
    current_gop: Option<usize>,
    last_decode_dts_us: Option<i64>,
    last_frame_duration_us: Option<i64>,
    highest_end_us: i64,
    need_random_access_point: bool,
    /// Buffered ranges in seconds, merged with [`RANGE_MERGE_TOLERANCE`].
    ranges: TimeRanges,
}

impl TrackBuffer {
    pub fn new(track_id: u32, config: TrackConfig) -> Self {
        Self {
            kind: config.kind(),
            track_id,
            config,
            frames: Vec::new(),
            gops: Vec::new(),
            current_gop: None,
            last_decode_dts_us: None,
            last_frame_duration_us: None,
            highest_end_us: 0,
            need_random_access_point: true,
            ranges: TimeRanges::new(),
        }
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn track_id(&self) -> u32 {
        self.track_id
    }

    pub fn config(&self) -> &TrackConfig {
        &self.config
    }

    pub fn ranges(&self) -> &TimeRanges {
        &self.ranges
    }

    pub fn last_decode_dts_us(&self) -> Option<i64> {
        self.last_decode_dts_us
    }

    pub fn last_frame_duration_us(&self) -> Option<i64> {
        self.last_frame_duration_us
    }

    pub fn highest_end_us(&self) -> i64 {
        self.highest_end_us
    }

    /// Highest buffered end according to the surviving ranges, in seconds.
    pub fn buffered_end(&self) -> f64 {
        self.ranges.last().map(|r| r.end).unwrap_or(0.0)
    }

    pub fn need_random_access_point(&self) -> bool {
        self.need_random_access_point
    }

    pub fn clear_need_random_access_point(&mut self) {
        self.need_random_access_point = false;
    }

    pub fn is_empty(&self) -> bool {
        match self.kind {
            MediaKind::Audio => self.frames.is_empty(),
            MediaKind::Video => self.gops.is_empty(),
        }
    }

    /// Inserts one parsed frame.
    ///
    /// Out-of-order presentation timestamps are accepted; a frame with a
    /// timestamp already present is dropped silently.
    pub fn append_sample(&mut self, sample: &Sample) {
        let frame = CodedFrame::from_sample(sample);
        let frame_end = frame.end_us();
        let (start_s, end_s) = (
            micros_to_seconds(frame.timestamp_us),
            micros_to_seconds(frame_end),
        );

        let inserted = match self.kind {
            MediaKind::Audio => self.insert_audio_frame(frame),
            MediaKind::Video => self.insert_video_frame(frame),
        };
        if !inserted {
            return;
        }

        self.ranges.add(start_s, end_s, RANGE_MERGE_TOLERANCE);
        self.last_decode_dts_us = Some(sample.decode_timestamp_us());
        self.last_frame_duration_us = Some(sample.duration_us().max(1));
        self.highest_end_us = self.highest_end_us.max(frame_end);
    }

    fn insert_audio_frame(&mut self, frame: CodedFrame) -> bool {
        match self
            .frames
            .binary_search_by_key(&frame.timestamp_us, |f| f.timestamp_us)
        {
            Ok(_) => false, // duplicate timestamp
            Err(pos) => {
                self.frames.insert(pos, frame);
                true
            }
        }
    }

    fn insert_video_frame(&mut self, frame: CodedFrame) -> bool {
        let start_new_gop = frame.kind == FrameKind::Key || self.current_gop.is_none();
        if start_new_gop {
            if frame.kind != FrameKind::Key {
                // A delta with no open group cannot be decoded; the caller
                // gates these out via the random-access flag, so dropping
                // here is a safety net.
                tracing::warn!(
                    track_id = self.track_id,
                    timestamp_us = frame.timestamp_us,
                    "dropping delta frame with no open group"
                );
                return false;
            }
            if self.gops.iter().any(|g| g.start_us == frame.timestamp_us) {
                return false; // duplicate group
            }
            let config = match &self.config {
                TrackConfig::Video(c) => c.clone(),
                TrackConfig::Audio(_) => unreachable!("video track with audio config"),
            };
            let gop = GroupOfPictures::new(frame, config);
            let pos = self
                .gops
                .binary_search_by_key(&gop.start_us, |g| g.start_us)
                .unwrap_or_else(|e| e);
            self.gops.insert(pos, gop);
            self.current_gop = Some(pos);
            true
        } else {
            // Appending to the open group keeps decode order.
            let idx = self.current_gop.unwrap_or(0);
            let gop = &mut self.gops[idx];
            if gop
                .frames
                .iter()
                .any(|f| f.timestamp_us == frame.timestamp_us)
            {
                return false;
            }
            gop.end_us = gop.end_us.max(frame.end_us());
            gop.frames.push(frame);
            true
        }
    }

    /// Marks the track as needing a sync frame before further appends and
    /// clears the decode-continuity bookkeeping. For video the open group is
    /// closed so the next sync frame starts a fresh one.
    pub fn require_random_access_point(&mut self) {
        self.last_decode_dts_us = None;
        self.last_frame_duration_us = None;
        self.highest_end_us = 0;
        self.need_random_access_point = true;
        self.current_gop = None;
    }

    /// Replaces the stored codec configuration.
    ///
    /// For video the open group is closed so frames after the change attach
    /// to a group that records the new configuration.
    pub fn reconfigure(&mut self, config: TrackConfig) {
        debug_assert_eq!(config.kind(), self.kind);
        self.config = config;
        if self.kind == MediaKind::Video {
            self.current_gop = None;
        }
    }

    /// Finds the frame whose presentation interval contains `time_us`.
    pub fn find_frame_for_time(&self, time_us: i64) -> Option<CodedFrame> {
        match self.kind {
            MediaKind::Audio => self.frames.iter().find(|f| f.contains(time_us)).cloned(),
            MediaKind::Video => {
                let gop = self.gops.iter().find(|g| g.contains(time_us))?;
                gop.frames.iter().find(|f| f.contains(time_us)).cloned()
            }
        }
    }

    /// The frame with exactly this presentation timestamp, if stored.
    pub fn frame_at_timestamp(&self, timestamp_us: i64) -> Option<CodedFrame> {
        match self.kind {
            MediaKind::Audio => self
                .frames
                .binary_search_by_key(&timestamp_us, |f| f.timestamp_us)
                .ok()
                .map(|i| self.frames[i].clone()),
            MediaKind::Video => self
                .locate_video_frame(timestamp_us)
                .map(|(g, f)| self.gops[g].frames[f].clone()),
        }
    }

    /// True if a frame with exactly this presentation timestamp is stored.
    pub fn contains_frame(&self, timestamp_us: i64) -> bool {
        match self.kind {
            MediaKind::Audio => self
                .frames
                .binary_search_by_key(&timestamp_us, |f| f.timestamp_us)
                .is_ok(),
            MediaKind::Video => self.locate_video_frame(timestamp_us).is_some(),
        }
    }

    /// The frames that must be fed to a decoder, in decode order, for
    /// `frame` to come out: the frame itself for audio, the group prefix up
    /// to and including the frame for video.
    pub fn decode_dependencies_for_frame(
        &self,
        frame: &CodedFrame,
    ) -> Option<(Vec<CodedFrame>, TrackConfig)> {
        match self.kind {
            MediaKind::Audio => {
                if !self.contains_frame(frame.timestamp_us) {
                    return None;
                }
                Some((vec![frame.clone()], self.config.clone()))
            }
            MediaKind::Video => {
                let (gop_idx, frame_idx) = self.locate_video_frame(frame.timestamp_us)?;
                let gop = &self.gops[gop_idx];
                Some((
                    gop.frames[..=frame_idx].to_vec(),
                    TrackConfig::Video(gop.config.clone()),
                ))
            }
        }
    }

    /// Returns up to `max_count` frames following `last` in rendering order,
    /// together with the configuration they decode under.
    ///
    /// Video continuation crosses a group boundary only when the neighbour
    /// group is temporally adjacent (gap of at most 1 microsecond) and
    /// shares the configuration; `None` means no guaranteed continuation
    /// (end of buffer, a gap, or `last` no longer stored).
    pub fn next_frames(
        &self,
        last: &CodedFrame,
        max_count: usize,
        direction: Direction,
    ) -> Option<(Vec<CodedFrame>, TrackConfig)> {
        if max_count == 0 {
            return None;
        }
        match self.kind {
            MediaKind::Audio => self.next_audio_frames(last, max_count, direction),
            MediaKind::Video => self.next_video_frames(last, max_count, direction),
        }
    }

    fn next_audio_frames(
        &self,
        last: &CodedFrame,
        max_count: usize,
        direction: Direction,
    ) -> Option<(Vec<CodedFrame>, TrackConfig)> {
        let pos = self
            .frames
            .binary_search_by_key(&last.timestamp_us, |f| f.timestamp_us)
            .ok()?;
        let mut out = Vec::new();
        let mut prev = self.frames[pos].clone();
        for step in 1..=max_count {
            let next = match direction {
                Direction::Forward => self.frames.get(pos + step),
                Direction::Backward => pos.checked_sub(step).map(|i| &self.frames[i]),
            }?
            .clone();
            // Audio frames are independently decodable but a continuation
            // must not silently cross a removal gap.
            let gap = match direction {
                Direction::Forward => next.timestamp_us - prev.end_us(),
                Direction::Backward => prev.timestamp_us - next.end_us(),
            };
            if gap.abs() > audio_adjacency_tolerance_us(prev.duration_us) {
                break;
            }
            prev = next.clone();
            out.push(next);
        }
        if out.is_empty() {
            None
        } else {
            Some((out, self.config.clone()))
        }
    }

    fn next_video_frames(
        &self,
        last: &CodedFrame,
        max_count: usize,
        direction: Direction,
    ) -> Option<(Vec<CodedFrame>, TrackConfig)> {
        let (mut gop_idx, frame_idx) = self.locate_video_frame(last.timestamp_us)?;
        let config = self.gops[gop_idx].config.clone();
        let mut out = Vec::new();
        let mut cursor = Some(frame_idx);

        while out.len() < max_count {
            let gop = &self.gops[gop_idx];
            match direction {
                Direction::Forward => {
                    let next_idx = cursor.map(|i| i + 1).unwrap_or(0);
                    if next_idx < gop.frames.len() {
                        out.push(gop.frames[next_idx].clone());
                        cursor = Some(next_idx);
                        continue;
                    }
                    // Group exhausted; only continue into a temporally
                    // adjacent neighbour with the same configuration.
                    let next_gop = gop_idx + 1;
                    if next_gop >= self.gops.len() {
                        break;
                    }
                    let neighbour = &self.gops[next_gop];
                    if (neighbour.start_us - gop.end_us).abs() > GOP_ADJACENCY_TOLERANCE_US
                        || neighbour.config != config
                    {
                        break;
                    }
                    gop_idx = next_gop;
                    cursor = None;
                }
                Direction::Backward => {
                    let next_idx = match cursor {
                        Some(0) => None,
                        Some(i) => Some(i - 1),
                        None => gop.frames.len().checked_sub(1),
                    };
                    if let Some(i) = next_idx {
                        out.push(gop.frames[i].clone());
                        cursor = Some(i);
                        continue;
                    }
                    if gop_idx == 0 {
                        break;
                    }
                    let neighbour = &self.gops[gop_idx - 1];
                    if (gop.start_us - neighbour.end_us).abs() > GOP_ADJACENCY_TOLERANCE_US
                        || neighbour.config != config
                    {
                        break;
                    }
                    gop_idx -= 1;
                    cursor = None;
                }
            }
        }

        if out.is_empty() {
            None
        } else {
            Some((out, TrackConfig::Video(config)))
        }
    }

    /// Earliest random-access point at or after `time_us`: a group start for
    /// video, any frame start for audio.
    pub fn random_access_point_at_or_after(&self, time_us: i64) -> Option<i64> {
        match self.kind {
            MediaKind::Audio => self
                .frames
                .iter()
                .find(|f| f.timestamp_us >= time_us)
                .map(|f| f.timestamp_us),
            MediaKind::Video => self
                .gops
                .iter()
                .find(|g| g.start_us >= time_us)
                .map(|g| g.start_us),
        }
    }

    /// Removes frames whose presentation timestamp falls in
    /// `[start_us, end_us)`.
    ///
    /// For video, a group whose first in-range frame is not the group start
    /// is truncated from that frame onward: later frames of the same group
    /// depend on the removed deltas and are dropped even when they lie
    /// outside the interval. Ranges are rebuilt from the survivors.
    pub fn remove_samples(&mut self, start_us: i64, end_us: i64) {
        let in_range = |ts: i64| start_us <= ts && ts < end_us;
        let mut removed = 0usize;

        match self.kind {
            MediaKind::Audio => {
                let before = self.frames.len();
                self.frames.retain(|f| !in_range(f.timestamp_us));
                removed = before - self.frames.len();
            }
            MediaKind::Video => {
                for gop in &mut self.gops {
                    let Some(first_hit) = gop
                        .frames
                        .iter()
                        .position(|f| in_range(f.timestamp_us))
                    else {
                        continue;
                    };
                    removed += gop.frames.len() - first_hit;
                    gop.frames.truncate(first_hit);
                    gop.end_us = gop
                        .frames
                        .iter()
                        .map(CodedFrame::end_us)
                        .max()
                        .unwrap_or(gop.start_us);
                }
                self.gops.retain(|g| !g.frames.is_empty());
                self.current_gop = None;
            }
        }

        if removed > 0 {
            tracing::debug!(
                track_id = self.track_id,
                start_us,
                end_us,
                removed,
                "removed coded frames"
            );
        }
        self.rebuild_ranges();
    }

    fn rebuild_ranges(&mut self) {
        let mut ranges = TimeRanges::new();
        let mut highest = 0i64;
        let mut add = |frame: &CodedFrame| {
            ranges.add(
                micros_to_seconds(frame.timestamp_us),
                micros_to_seconds(frame.end_us()),
                RANGE_MERGE_TOLERANCE,
            );
            highest = highest.max(frame.end_us());
        };
        match self.kind {
            MediaKind::Audio => self.frames.iter().for_each(&mut add),
            MediaKind::Video => {
                for gop in &self.gops {
                    gop.frames.iter().for_each(&mut add);
                }
            }
        }
        self.ranges = ranges;
        self.highest_end_us = highest;
    }

    fn locate_video_frame(&self, timestamp_us: i64) -> Option<(usize, usize)> {
        for (gop_idx, gop) in self.gops.iter().enumerate() {
            if let Some(frame_idx) = gop
                .frames
                .iter()
                .position(|f| f.timestamp_us == timestamp_us)
            {
                return Some((gop_idx, frame_idx));
            }
        }
        None
    }
}

/// Adjacency tolerance for audio continuation, derived from the frame
/// duration the same way decode-output matching tolerance is.
fn audio_adjacency_tolerance_us(duration_us: i64) -> i64 {
    (duration_us + 15) / 16
}
