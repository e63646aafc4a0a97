//! Incremental fragmented-MP4 segment parsing.
//!
//! Appended bytes land in a staging buffer; each parse pass decodes as many
//! complete top-level boxes as are available and leaves the rest staged.
//! `ftyp` and `moov` form the initialization segment, each `moof`/`mdat`
//! pair forms a media segment yielding per-track [`Sample`] records. Every
//! other box type is skipped.

use std::io::Cursor;

use bytes::{Buf, Bytes, BytesMut};
use mp4_atom::{Any, Atom, DecodeMaybe, Moof, Moov, Trak};

use crate::error::MediaError;
use crate::sample::{AudioConfig, MediaKind, Sample, TrackConfig, VideoConfig};

/// Stream-level description extracted from a `moov` box.
#[derive(Debug, Clone)]
pub struct StreamInfo {
    /// Presentation duration in seconds; `0.0` when the movie header leaves
    /// it unknown.
    pub duration: f64,
    pub audio_tracks: Vec<TrackInfo>,
    pub video_tracks: Vec<TrackInfo>,
}

impl StreamInfo {
    pub fn track_by_id(&self, id: u32) -> Option<&TrackInfo> {
        self.audio_tracks
            .iter()
            .chain(self.video_tracks.iter())
            .find(|t| t.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.audio_tracks.is_empty() && self.video_tracks.is_empty()
    }
}

/// One track as described by the initialization segment.
#[derive(Debug, Clone)]
pub struct TrackInfo {
    pub id: u32,
    pub timescale: u32,
    pub config: TrackConfig,
}

impl TrackInfo {
    pub fn kind(&self) -> MediaKind {
        self.config.kind()
    }
}

/// Output of a parse pass, in byte-stream order.
pub enum ParserEvent {
    /// A complete `ftyp` + `moov` initialization segment was consumed.
    InitSegment(StreamInfo),
    /// A complete `moof` + `mdat` media segment was consumed.
    MediaSegment(Vec<Sample>),
}

/// Incremental parser state. One instance lives per source buffer.
pub struct SegmentParser {
    /// Bytes appended but not yet consumed by a complete box.
    staging: BytesMut,
    /// Raw `ftyp` bytes held until the matching `moov` arrives.
    init_staging: BytesMut,
    /// The raw initialization segment (`ftyp` + `moov`), kept so media
    /// segments remain self-describing after an abort.
    init_segment: Option<Bytes>,
    moov: Option<Moov>,
    moof: Option<Moof>,
    moof_size: usize,
}

impl SegmentParser {
    pub fn new() -> Self {
        Self {
            staging: BytesMut::new(),
            init_staging: BytesMut::new(),
            init_segment: None,
            moov: None,
            moof: None,
            moof_size: 0,
        }
    }

    /// Appends input bytes to the staging buffer.
    pub fn push(&mut self, data: &[u8]) {
        self.staging.extend_from_slice(data);
    }

    pub fn has_init_segment(&self) -> bool {
        self.moov.is_some()
    }

    pub fn init_segment_bytes(&self) -> Option<Bytes> {
        self.init_segment.clone()
    }

    /// Number of staged bytes not yet consumed.
    pub fn staged_len(&self) -> usize {
        self.staging.len()
    }

    /// Discards staged input and any half-consumed media segment.
    ///
    /// The decoded initialization segment is kept: appends after an abort
    /// resume at the next complete box boundary.
    pub fn reset(&mut self) {
        self.staging.clear();
        self.moof = None;
        self.moof_size = 0;
    }

    /// Consumes as many complete boxes as the staging buffer holds.
    ///
    /// Returns the segments completed by this pass; an incomplete trailing
    /// box stays staged for the next append. A malformed byte stream fails
    /// with [`MediaError::Parse`].
    pub fn parse(&mut self) -> Result<Vec<ParserEvent>, MediaError> {
        // The cursor needs the staging buffer while handlers need `self`,
        // so the buffer is taken out for the duration of the pass.
        let mut staging = std::mem::take(&mut self.staging);
        let result = self.parse_staged(&mut staging);
        self.staging = staging;
        result
    }

    fn parse_staged(&mut self, staging: &mut BytesMut) -> Result<Vec<ParserEvent>, MediaError> {
        let mut events = Vec::new();
        let mut position = 0usize;
        let mut cursor = Cursor::new(&mut *staging);

        loop {
            let atom = match Any::decode_maybe(&mut cursor) {
                Ok(Some(atom)) => atom,
                Ok(None) => break,
                Err(err) => return Err(MediaError::Parse(err.to_string())),
            };
            let atom_start = position;
            let size = cursor.position() as usize - position;
            position = cursor.position() as usize;

            match atom {
                Any::Ftyp(_) | Any::Styp(_) => {
                    let data = cursor.get_ref().as_ref();
                    self.init_staging
                        .extend_from_slice(&data[atom_start..position]);
                }
                Any::Moov(moov) => {
                    let info = stream_info_from_moov(&moov)?;
                    let data = cursor.get_ref().as_ref();
                    self.init_staging
                        .extend_from_slice(&data[atom_start..position]);
                    self.init_segment = Some(std::mem::take(&mut self.init_staging).freeze());
                    self.moov = Some(moov);
                    events.push(ParserEvent::InitSegment(info));
                }
                Any::Moof(moof) => {
                    if self.moof.is_some() {
                        return Err(MediaError::Parse(
                            "two moof boxes without an mdat".to_string(),
                        ));
                    }
                    self.moof = Some(moof);
                    self.moof_size = size;
                }
                Any::Mdat(mdat) => {
                    let header_size = size - mdat.data.len();
                    let samples = self.extract_samples(Bytes::from(mdat.data), header_size)?;
                    events.push(ParserEvent::MediaSegment(samples));
                }
                _ => {
                    tracing::debug!(size, "skipping unhandled box");
                }
            }
        }

        cursor.into_inner().advance(position);
        Ok(events)
    }

    /// Walks the pending `moof`'s track fragments and cuts samples out of
    /// the `mdat` payload.
    fn extract_samples(
        &mut self,
        mdat: Bytes,
        header_size: usize,
    ) -> Result<Vec<Sample>, MediaError> {
        let moov = self
            .moov
            .as_ref()
            .ok_or_else(|| MediaError::Parse("mdat before moov".to_string()))?;
        let moof = self
            .moof
            .take()
            .ok_or_else(|| MediaError::Parse("mdat before moof".to_string()))?;

        let mut samples = Vec::new();

        for traf in &moof.traf {
            let track_id = traf.tfhd.track_id;
            let trak = moov
                .trak
                .iter()
                .find(|trak| trak.tkhd.track_id == track_id)
                .ok_or_else(|| {
                    MediaError::Parse(format!("fragment for unknown track {track_id}"))
                })?;
            let trex = moov
                .mvex
                .as_ref()
                .and_then(|mvex| mvex.trex.iter().find(|trex| trex.track_id == track_id));

            let default_duration =
                trex.map(|trex| trex.default_sample_duration).unwrap_or_default();
            let default_size = trex.map(|trex| trex.default_sample_size).unwrap_or_default();
            let default_flags =
                trex.map(|trex| trex.default_sample_flags).unwrap_or_default();

            let tfdt = traf
                .tfdt
                .as_ref()
                .ok_or_else(|| MediaError::Parse("missing tfdt box".to_string()))?;
            let mut dts = tfdt.base_media_decode_time as i64;
            let timescale = trak.mdia.mdhd.timescale;
            let is_video = trak.mdia.hdlr.handler == b"vide".into();

            if traf.trun.is_none() {
                return Err(MediaError::Parse("missing trun box".to_string()));
            }

            let mut offset = traf.tfhd.base_data_offset.unwrap_or_default() as usize;
            for trun in &traf.trun {
                let tfhd = &traf.tfhd;
                if let Some(data_offset) = trun.data_offset {
                    let base_offset = tfhd.base_data_offset.unwrap_or_default() as usize;
                    let data_offset: usize = data_offset
                        .try_into()
                        .map_err(|_| MediaError::Parse("negative data offset".to_string()))?;
                    if data_offset < self.moof_size + header_size {
                        return Err(MediaError::Parse("data offset inside moof".to_string()));
                    }
                    // The offset is relative to the start of the moof, not
                    // the mdat payload.
                    offset = base_offset + data_offset - self.moof_size - header_size;
                }

                for entry in &trun.entries {
                    let flags = entry
                        .flags
                        .unwrap_or(tfhd.default_sample_flags.unwrap_or(default_flags));
                    let duration = entry
                        .duration
                        .unwrap_or(tfhd.default_sample_duration.unwrap_or(default_duration));
                    let size = entry
                        .size
                        .unwrap_or(tfhd.default_sample_size.unwrap_or(default_size))
                        as usize;

                    if offset + size > mdat.len() {
                        return Err(MediaError::Parse("sample outside mdat".to_string()));
                    }

                    let is_sync = if is_video {
                        let depends_on_none = (flags >> 24) & 0x3 == 0x2;
                        let non_sync = (flags >> 16) & 0x1 == 0x1;
                        depends_on_none && !non_sync
                    } else {
                        true
                    };

                    samples.push(Sample {
                        track_id,
                        timescale,
                        dts,
                        cts: dts + entry.cts.unwrap_or_default() as i64,
                        duration,
                        data: mdat.slice(offset..offset + size),
                        is_sync,
                    });

                    dts += duration as i64;
                    offset += size;
                }
            }
        }

        Ok(samples)
    }
}

impl Default for SegmentParser {
    fn default() -> Self {
        Self::new()
    }
}

fn stream_info_from_moov(moov: &Moov) -> Result<StreamInfo, MediaError> {
    let timescale = moov.mvhd.timescale.max(1) as f64;
    let duration = moov.mvhd.duration as f64 / timescale;

    let mut audio_tracks = Vec::new();
    let mut video_tracks = Vec::new();

    for trak in &moov.trak {
        let id = trak.tkhd.track_id;
        let timescale = trak.mdia.mdhd.timescale;
        let handler = &trak.mdia.hdlr.handler;

        if *handler == b"vide".into() {
            video_tracks.push(TrackInfo {
                id,
                timescale,
                config: TrackConfig::Video(video_config_from_trak(trak)?),
            });
        } else if *handler == b"soun".into() {
            audio_tracks.push(TrackInfo {
                id,
                timescale,
                config: TrackConfig::Audio(audio_config_from_trak(trak)?),
            });
        } else {
            tracing::debug!(track_id = id, "skipping track with unhandled handler");
        }
    }

    Ok(StreamInfo {
        duration,
        audio_tracks,
        video_tracks,
    })
}

fn video_config_from_trak(trak: &Trak) -> Result<VideoConfig, MediaError> {
    let stsd = &trak.mdia.minf.stbl.stsd;
    let codec = stsd
        .codecs
        .first()
        .ok_or_else(|| MediaError::Init("video track without a sample entry".to_string()))?;

    match codec {
        mp4_atom::Codec::Avc1(avc1) => {
            let avcc = &avc1.avcc;
            let mut description = Vec::new();
            avcc.encode_body(&mut description)
                .map_err(|err| MediaError::Parse(err.to_string()))?;

            Ok(VideoConfig {
                codec: format!(
                    "avc1.{:02x}{:02x}{:02x}",
                    avcc.avc_profile_indication,
                    avcc.profile_compatibility,
                    avcc.avc_level_indication
                ),
                description: Bytes::from(description),
                coded_width: avc1.visual.width as u32,
                coded_height: avc1.visual.height as u32,
            })
        }
        other => Err(MediaError::Init(format!(
            "unsupported video codec: {other:?}"
        ))),
    }
}

fn audio_config_from_trak(trak: &Trak) -> Result<AudioConfig, MediaError> {
    let stsd = &trak.mdia.minf.stbl.stsd;
    let codec = stsd
        .codecs
        .first()
        .ok_or_else(|| MediaError::Init("audio track without a sample entry".to_string()))?;

    match codec {
        mp4_atom::Codec::Mp4a(mp4a) => {
            let desc = &mp4a.esds.es_desc.dec_config;
            if desc.object_type_indication != 0x40 {
                return Err(MediaError::Init(format!(
                    "unsupported audio object type {:#x}",
                    desc.object_type_indication
                )));
            }
            Ok(AudioConfig {
                codec: format!("mp4a.40.{}", desc.dec_specific.profile),
                sample_rate: mp4a.audio.sample_rate.integer() as u32,
                channel_count: mp4a.audio.channel_count as u32,
                description: None,
            })
        }
        other => Err(MediaError::Init(format!(
            "unsupported audio codec: {other:?}"
        ))),
    }
}
