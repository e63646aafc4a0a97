//! The playback half of the mezzanine media engine.
//!
//! Builds on [`mezzanine_core`]'s buffering (segment parsing, track
//! buffers, source buffers, media source) and adds what it takes to play:
//! the media clock, watermark-driven decode pipelines for video and audio,
//! batch scheduling against an audio mixer, and the `HTMLMediaElement`-
//! shaped facade with its event sequence. Signed playback rates are
//! first-class: negative rates decode video groups forward and consume
//! them in reverse, and feed audio to the decoder under synthetic
//! timestamps so it can be rendered sample-reversed.
//!
//! Decoders, the mixer and the drawing surface are collaborators behind
//! the traits in [`sink`]; the embedder supplies them per element.

pub mod clock;
pub mod element;
pub mod scheduler;
pub mod sink;

pub use clock::MediaClock;
pub use element::{ElementReadyState, MediaElement, PlayPromise, PlayPromiseState};
pub use scheduler::{DECODE_QUEUE_HIGH_WATERMARK, DECODE_QUEUE_LOW_WATERMARK};
pub use sink::{
    AudioDecoder, AudioDecoderEvent, AudioMixer, DecodedAudio, DecodedVideo, DecoderState,
    EncodedChunk, MediaSinks, MixerNodeId, PcmBuffer, Presenter, VideoDecoder, VideoDecoderEvent,
};

pub use mezzanine_core as core;
pub use mezzanine_core::{
    EndOfStreamError, MediaElementEvent, MediaError, MediaSource, MediaSourceEvent, ReadyState,
    SourceBuffer, SourceBufferEvent, TaskQueue, TimeRange, TimeRanges,
};
