//! Error types for the stem mixer.
//!
//! Mirrors the teacher crate's per-concern error enums composed into one
//! top-level type, so each failure carries the context it was raised with
//! instead of being flattened to a string at the call site.

use thiserror::Error;

/// Errors raised while fetching a stem's audio payload (spec §6, §7).
#[derive(Debug, Error)]
pub enum FetchError {
    /// All retry attempts were exhausted without a 2xx response.
    #[error("fetch failed after {attempts} attempt(s): {reason}")]
    Exhausted { attempts: u32, reason: String },

    /// A transport-level error occurred (connection refused, timeout, etc).
    #[error("transport error: {0}")]
    Transport(String),
}

/// Errors raised while decoding a stem's Vorbis payload (spec §6, §7).
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The decoder produced fewer or more samples than `2 * samples` expected.
    #[error("decode produced {produced} samples, expected exactly {expected}")]
    ShortBuffer { produced: usize, expected: usize },

    /// The underlying codec rejected the stream as corrupt or unsupported.
    #[error("codec error: {0}")]
    Codec(String),
}

/// Errors raised while rasterizing or encoding a waveform (spec §7: "logged,
/// do not affect `data_ready`").
#[derive(Debug, Error)]
pub enum WaveformError {
    /// The PNG encoder rejected the rasterized image.
    #[error("PNG encode failed: {0}")]
    Encode(String),
}

/// Top-level error type for the stem mixer crate.
#[derive(Debug, Error)]
pub enum StemMixerError {
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("waveform error: {0}")]
    Waveform(#[from] WaveformError),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, StemMixerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_error_displays_attempts_and_reason() {
        let err = FetchError::Exhausted {
            attempts: 4,
            reason: "HTTP 503".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "fetch failed after 4 attempt(s): HTTP 503"
        );
    }

    #[test]
    fn decode_error_displays_sample_counts() {
        let err = DecodeError::ShortBuffer {
            produced: 900,
            expected: 1000,
        };
        assert_eq!(
            err.to_string(),
            "decode produced 900 samples, expected exactly 1000"
        );
    }

    #[test]
    fn top_level_wraps_via_from() {
        let err: StemMixerError = FetchError::Transport("refused".to_string()).into();
        assert!(matches!(err, StemMixerError::Fetch(_)));
    }
}
