//! Byte-level fragmented-MP4 fixtures for tests.
//!
//! Hand-writes minimal but standards-shaped init segments (`ftyp` + `moov`)
//! and media segments (`moof` + `mdat`) so parser and playback tests can
//! exercise the real byte-stream path. Available to dependent crates via
//! the `test-fixtures` feature.

/// One track to describe in a generated init segment.
#[derive(Debug, Clone)]
pub enum TrackSpec {
    Video {
        id: u32,
        timescale: u32,
        width: u16,
        height: u16,
    },
    Audio {
        id: u32,
        timescale: u32,
        channels: u16,
    },
}

impl TrackSpec {
    fn id(&self) -> u32 {
        match self {
            TrackSpec::Video { id, .. } | TrackSpec::Audio { id, .. } => *id,
        }
    }
}

/// One sample in a generated media segment.
#[derive(Debug, Clone)]
pub struct SampleSpec {
    pub duration: u32,
    pub is_sync: bool,
    pub payload: Vec<u8>,
}

impl SampleSpec {
    pub fn new(duration: u32, is_sync: bool, payload_len: usize) -> Self {
        Self {
            duration,
            is_sync,
            payload: vec![0xA5; payload_len.max(1)],
        }
    }
}

fn plain_box(out: &mut Vec<u8>, kind: &[u8; 4], body: &[u8]) {
    out.extend_from_slice(&((8 + body.len()) as u32).to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(body);
}

fn full_box(out: &mut Vec<u8>, kind: &[u8; 4], version: u8, flags: u32, body: &[u8]) {
    let mut b = Vec::with_capacity(4 + body.len());
    b.extend_from_slice(&(((version as u32) << 24) | (flags & 0x00FF_FFFF)).to_be_bytes());
    b.extend_from_slice(body);
    plain_box(out, kind, &b);
}

const UNITY_MATRIX: [u32; 9] = [0x0001_0000, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000];

/// A complete `ftyp` + `moov` initialization segment.
pub fn init_segment(movie_timescale: u32, movie_duration: u32, tracks: &[TrackSpec]) -> Vec<u8> {
    let mut out = ftyp();
    let mut moov_body = mvhd(movie_timescale, movie_duration, tracks);
    for track in tracks {
        moov_body.extend_from_slice(&trak(track));
    }
    moov_body.extend_from_slice(&mvex(tracks));
    plain_box(&mut out, b"moov", &moov_body);
    out
}

/// A complete `moof` + `mdat` media segment for one track.
///
/// Per-sample durations, sizes and sync flags are written explicitly; the
/// decode timeline starts at `base_decode_time` in track timescale ticks.
pub fn media_segment(track_id: u32, base_decode_time: u64, samples: &[SampleSpec]) -> Vec<u8> {
    let sample_count = samples.len() as u32;
    let trun_size = 12 + 4 + 4 + sample_count * 12;
    let tfdt_size = 20u32;
    let tfhd_size = 16u32;
    let traf_size = 8 + tfhd_size + tfdt_size + trun_size;
    let mfhd_size = 16u32;
    let moof_size = 8 + mfhd_size + traf_size;

    let payload_len: usize = samples.iter().map(|s| s.payload.len()).sum();
    let data_offset = moof_size as i32 + 8;

    let mut out = Vec::new();
    // moof
    {
        let mut moof_body = Vec::new();
        full_box(&mut moof_body, b"mfhd", 0, 0, &1u32.to_be_bytes());
        {
            let mut traf_body = Vec::new();
            // tfhd with default-base-is-moof
            full_box(&mut traf_body, b"tfhd", 0, 0x02_0000, &track_id.to_be_bytes());
            // tfdt version 1
            full_box(
                &mut traf_body,
                b"tfdt",
                1,
                0,
                &base_decode_time.to_be_bytes(),
            );
            // trun: data-offset + duration + size + flags per sample
            {
                let mut b = Vec::new();
                b.extend_from_slice(&sample_count.to_be_bytes());
                b.extend_from_slice(&data_offset.to_be_bytes());
                for sample in samples {
                    b.extend_from_slice(&sample.duration.to_be_bytes());
                    b.extend_from_slice(&(sample.payload.len() as u32).to_be_bytes());
                    let flags: u32 = if sample.is_sync {
                        0x0200_0000 // depends on no other sample
                    } else {
                        0x0101_0000 // depends on another sample, non-sync
                    };
                    b.extend_from_slice(&flags.to_be_bytes());
                }
                full_box(&mut traf_body, b"trun", 0, 0x000701, &b);
            }
            plain_box(&mut moof_body, b"traf", &traf_body);
        }
        plain_box(&mut out, b"moof", &moof_body);
    }
    // mdat
    out.extend_from_slice(&((8 + payload_len) as u32).to_be_bytes());
    out.extend_from_slice(b"mdat");
    for sample in samples {
        out.extend_from_slice(&sample.payload);
    }
    out
}

/// A run of uniformly sized, uniformly timed samples where every
/// `gop_length`-th sample is a sync frame.
pub fn sample_run(count: usize, duration: u32, gop_length: usize) -> Vec<SampleSpec> {
    (0..count)
        .map(|i| SampleSpec::new(duration, gop_length != 0 && i % gop_length == 0, 16))
        .collect()
}

fn ftyp() -> Vec<u8> {
    let mut out = Vec::new();
    let mut body = Vec::new();
    body.extend_from_slice(b"isom");
    body.extend_from_slice(&0x200u32.to_be_bytes());
    body.extend_from_slice(b"isom");
    body.extend_from_slice(b"iso5");
    plain_box(&mut out, b"ftyp", &body);
    out
}

fn mvhd(timescale: u32, duration: u32, tracks: &[TrackSpec]) -> Vec<u8> {
    let next_track_id = tracks.iter().map(TrackSpec::id).max().unwrap_or(0) + 1;
    let mut out = Vec::new();
    let mut body = Vec::new();
    body.extend_from_slice(&0u32.to_be_bytes()); // creation_time
    body.extend_from_slice(&0u32.to_be_bytes()); // modification_time
    body.extend_from_slice(&timescale.to_be_bytes());
    body.extend_from_slice(&duration.to_be_bytes());
    body.extend_from_slice(&0x0001_0000u32.to_be_bytes()); // rate 1.0
    body.extend_from_slice(&0x0100u16.to_be_bytes()); // volume 1.0
    body.extend_from_slice(&[0u8; 10]); // reserved
    for v in UNITY_MATRIX {
        body.extend_from_slice(&v.to_be_bytes());
    }
    body.extend_from_slice(&[0u8; 24]); // pre_defined
    body.extend_from_slice(&next_track_id.to_be_bytes());
    full_box(&mut out, b"mvhd", 0, 0, &body);
    out
}

fn trak(track: &TrackSpec) -> Vec<u8> {
    let mut out = Vec::new();
    let mut body = tkhd(track);
    body.extend_from_slice(&mdia(track));
    plain_box(&mut out, b"trak", &body);
    out
}

fn tkhd(track: &TrackSpec) -> Vec<u8> {
    let (width, height, volume) = match track {
        TrackSpec::Video { width, height, .. } => {
            ((*width as u32) << 16, (*height as u32) << 16, 0u16)
        }
        TrackSpec::Audio { .. } => (0, 0, 0x0100),
    };
    let mut out = Vec::new();
    let mut body = Vec::new();
    body.extend_from_slice(&0u32.to_be_bytes()); // creation_time
    body.extend_from_slice(&0u32.to_be_bytes()); // modification_time
    body.extend_from_slice(&track.id().to_be_bytes());
    body.extend_from_slice(&0u32.to_be_bytes()); // reserved
    body.extend_from_slice(&0u32.to_be_bytes()); // duration
    body.extend_from_slice(&[0u8; 8]); // reserved
    body.extend_from_slice(&0u16.to_be_bytes()); // layer
    body.extend_from_slice(&0u16.to_be_bytes()); // alternate_group
    body.extend_from_slice(&volume.to_be_bytes());
    body.extend_from_slice(&0u16.to_be_bytes()); // reserved
    for v in UNITY_MATRIX {
        body.extend_from_slice(&v.to_be_bytes());
    }
    body.extend_from_slice(&width.to_be_bytes());
    body.extend_from_slice(&height.to_be_bytes());
    full_box(&mut out, b"tkhd", 0, 0x3, &body);
    out
}

fn mdia(track: &TrackSpec) -> Vec<u8> {
    let timescale = match track {
        TrackSpec::Video { timescale, .. } | TrackSpec::Audio { timescale, .. } => *timescale,
    };
    let (handler, name): (&[u8; 4], &[u8]) = match track {
        TrackSpec::Video { .. } => (b"vide", b"VideoHandler\0"),
        TrackSpec::Audio { .. } => (b"soun", b"SoundHandler\0"),
    };

    let mut out = Vec::new();
    let mut body = Vec::new();
    {
        let mut b = Vec::new();
        b.extend_from_slice(&0u32.to_be_bytes());
        b.extend_from_slice(&0u32.to_be_bytes());
        b.extend_from_slice(&timescale.to_be_bytes());
        b.extend_from_slice(&0u32.to_be_bytes());
        b.extend_from_slice(&0x55C4u16.to_be_bytes()); // language: und
        b.extend_from_slice(&0u16.to_be_bytes());
        full_box(&mut body, b"mdhd", 0, 0, &b);
    }
    {
        let mut b = Vec::new();
        b.extend_from_slice(&0u32.to_be_bytes());
        b.extend_from_slice(handler);
        b.extend_from_slice(&[0u8; 12]);
        b.extend_from_slice(name);
        full_box(&mut body, b"hdlr", 0, 0, &b);
    }
    body.extend_from_slice(&minf(track));
    plain_box(&mut out, b"mdia", &body);
    out
}

fn minf(track: &TrackSpec) -> Vec<u8> {
    let mut out = Vec::new();
    let mut body = Vec::new();
    match track {
        TrackSpec::Video { .. } => {
            let mut b = Vec::new();
            b.extend_from_slice(&0u16.to_be_bytes()); // graphics_mode
            b.extend_from_slice(&[0u8; 6]); // opcolor
            full_box(&mut body, b"vmhd", 0, 0x1, &b);
        }
        TrackSpec::Audio { .. } => {
            full_box(&mut body, b"smhd", 0, 0, &[0u8; 4]);
        }
    }
    {
        let mut dref_body = Vec::new();
        dref_body.extend_from_slice(&1u32.to_be_bytes());
        full_box(&mut dref_body, b"url ", 0, 0x1, &[]);
        let mut dinf_body = Vec::new();
        full_box(&mut dinf_body, b"dref", 0, 0, &dref_body);
        plain_box(&mut body, b"dinf", &dinf_body);
    }
    body.extend_from_slice(&stbl(track));
    plain_box(&mut out, b"minf", &body);
    out
}

fn stbl(track: &TrackSpec) -> Vec<u8> {
    let mut out = Vec::new();
    let mut body = Vec::new();
    {
        let mut stsd_body = Vec::new();
        stsd_body.extend_from_slice(&1u32.to_be_bytes());
        match track {
            TrackSpec::Video { width, height, .. } => {
                stsd_body.extend_from_slice(&avc1(*width, *height));
            }
            TrackSpec::Audio {
                timescale,
                channels,
                ..
            } => {
                stsd_body.extend_from_slice(&mp4a(*timescale, *channels));
            }
        }
        full_box(&mut body, b"stsd", 0, 0, &stsd_body);
    }
    for kind in [b"stts", b"stsc", b"stco"] {
        full_box(&mut body, kind, 0, 0, &0u32.to_be_bytes());
    }
    {
        let mut b = Vec::new();
        b.extend_from_slice(&0u32.to_be_bytes()); // sample_size
        b.extend_from_slice(&0u32.to_be_bytes()); // sample_count
        full_box(&mut body, b"stsz", 0, 0, &b);
    }
    plain_box(&mut out, b"stbl", &body);
    out
}

fn avc1(width: u16, height: u16) -> Vec<u8> {
    // High profile, level 4.0; the codec string derives from these bytes.
    let sps: &[u8] = &[0x67, 0x64, 0x00, 0x28, 0xAC, 0xD9, 0x40];
    let pps: &[u8] = &[0x68, 0xEB, 0xEC, 0xB2, 0x2C];

    let mut out = Vec::new();
    let mut body = Vec::new();
    body.extend_from_slice(&[0u8; 6]); // reserved
    body.extend_from_slice(&1u16.to_be_bytes()); // data_reference_index
    body.extend_from_slice(&0u16.to_be_bytes()); // pre_defined
    body.extend_from_slice(&0u16.to_be_bytes()); // reserved
    body.extend_from_slice(&[0u8; 12]); // pre_defined
    body.extend_from_slice(&width.to_be_bytes());
    body.extend_from_slice(&height.to_be_bytes());
    body.extend_from_slice(&0x0048_0000u32.to_be_bytes()); // horiz dpi
    body.extend_from_slice(&0x0048_0000u32.to_be_bytes()); // vert dpi
    body.extend_from_slice(&0u32.to_be_bytes()); // reserved
    body.extend_from_slice(&1u16.to_be_bytes()); // frame_count
    body.extend_from_slice(&[0u8; 32]); // compressor name
    body.extend_from_slice(&0x0018u16.to_be_bytes()); // depth
    body.extend_from_slice(&(-1i16).to_be_bytes()); // pre_defined
    {
        let mut b = Vec::new();
        b.push(1); // configuration_version
        b.push(sps[1]); // profile_idc
        b.push(sps[2]); // profile_compatibility
        b.push(sps[3]); // level_idc
        b.push(0xFF); // 4-byte NAL lengths
        b.push(0xE1); // one SPS
        b.extend_from_slice(&(sps.len() as u16).to_be_bytes());
        b.extend_from_slice(sps);
        b.push(1); // one PPS
        b.extend_from_slice(&(pps.len() as u16).to_be_bytes());
        b.extend_from_slice(pps);
        plain_box(&mut body, b"avcC", &b);
    }
    plain_box(&mut out, b"avc1", &body);
    out
}

fn mp4a(sample_rate: u32, channels: u16) -> Vec<u8> {
    let mut out = Vec::new();
    let mut body = Vec::new();
    body.extend_from_slice(&[0u8; 6]); // reserved
    body.extend_from_slice(&1u16.to_be_bytes()); // data_reference_index
    body.extend_from_slice(&[0u8; 8]); // reserved
    body.extend_from_slice(&channels.to_be_bytes());
    body.extend_from_slice(&16u16.to_be_bytes()); // sample_size
    body.extend_from_slice(&0u32.to_be_bytes()); // pre_defined + reserved
    body.extend_from_slice(&((sample_rate as u16).to_be_bytes())); // 16.16 high
    body.extend_from_slice(&0u16.to_be_bytes()); // 16.16 low
    full_box(&mut body, b"esds", 0, 0, &esds_contents());
    plain_box(&mut out, b"mp4a", &body);
    out
}

fn esds_contents() -> Vec<u8> {
    // AudioSpecificConfig: AAC-LC, 48 kHz, stereo.
    let asc = [0x11u8, 0x90];
    let mut buf = Vec::new();
    let dec_config_len = 13 + 2 + asc.len();
    let es_desc_len = 3 + (2 + dec_config_len) + (2 + 1);
    buf.push(0x03); // ES_Descriptor
    buf.push(es_desc_len as u8);
    buf.extend_from_slice(&[0x00, 0x01]); // ES_ID
    buf.push(0x00); // priority
    buf.push(0x04); // DecoderConfigDescriptor
    buf.push(dec_config_len as u8);
    buf.push(0x40); // objectTypeIndication: MPEG-4 audio
    buf.push(0x15); // streamType: audio
    buf.extend_from_slice(&[0x00, 0x00, 0x00]); // bufferSizeDB
    buf.extend_from_slice(&128_000u32.to_be_bytes()); // maxBitrate
    buf.extend_from_slice(&128_000u32.to_be_bytes()); // avgBitrate
    buf.push(0x05); // DecoderSpecificInfo
    buf.push(asc.len() as u8);
    buf.extend_from_slice(&asc);
    buf.push(0x06); // SLConfigDescriptor
    buf.push(0x01);
    buf.push(0x02);
    buf
}

fn mvex(tracks: &[TrackSpec]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut body = Vec::new();
    for track in tracks {
        let mut b = Vec::new();
        b.extend_from_slice(&track.id().to_be_bytes());
        b.extend_from_slice(&1u32.to_be_bytes()); // default_sample_description_index
        b.extend_from_slice(&0u32.to_be_bytes()); // default_sample_duration
        b.extend_from_slice(&0u32.to_be_bytes()); // default_sample_size
        b.extend_from_slice(&0u32.to_be_bytes()); // default_sample_flags
        full_box(&mut body, b"trex", 0, 0, &b);
    }
    plain_box(&mut out, b"mvex", &body);
    out
}
