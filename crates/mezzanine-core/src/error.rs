//! Error types shared across the engine.

use std::fmt;

/// Errors surfaced by the buffering and playback APIs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    /// Operation performed in the wrong state (removed buffer, busy update,
    /// wrong ready state)
    InvalidState(String),
    /// MIME type is empty or not a supported `audio/mp4` / `video/mp4` type
    UnsupportedType(String),
    /// No further source buffers can be accepted
    QuotaExceeded(String),
    /// Numeric argument out of range (negative/NaN duration, bad remove range)
    InvalidRange(String),
    /// The byte stream violates the fragmented-MP4 format
    Parse(String),
    /// Initialization segment is unusable (no tracks, unsupported codec,
    /// mismatched track structure)
    Init(String),
    /// A decoder reported failure
    Decode(String),
    /// The operation was superseded or cancelled
    Aborted(String),
}

impl fmt::Display for MediaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaError::InvalidState(msg) => write!(f, "invalid state: {msg}"),
            MediaError::UnsupportedType(msg) => write!(f, "unsupported type: {msg}"),
            MediaError::QuotaExceeded(msg) => write!(f, "quota exceeded: {msg}"),
            MediaError::InvalidRange(msg) => write!(f, "invalid range: {msg}"),
            MediaError::Parse(msg) => write!(f, "parse error: {msg}"),
            MediaError::Init(msg) => write!(f, "initialization error: {msg}"),
            MediaError::Decode(msg) => write!(f, "decode error: {msg}"),
            MediaError::Aborted(msg) => write!(f, "aborted: {msg}"),
        }
    }
}

impl std::error::Error for MediaError {}

/// Error kind passed to `MediaSource::end_of_stream`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndOfStreamError {
    /// The fetch layer failed to deliver more data
    Network,
    /// Parsing or decoding the appended data failed
    Decode,
}

impl fmt::Display for EndOfStreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndOfStreamError::Network => write!(f, "network"),
            EndOfStreamError::Decode => write!(f, "decode"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MediaError::UnsupportedType("text/plain".to_string());
        assert!(err.to_string().contains("unsupported type"));
        assert!(err.to_string().contains("text/plain"));
    }
}
