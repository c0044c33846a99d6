//! # Ingestion Error Types
//!
//! Error taxonomy for the incremental audio decoding pipeline.
//!
//! Three families matter to callers:
//! - Transient conditions ([`IngestError::NeedMoreData`]) never escape the
//!   pipeline; they drive internal retries as more bytes arrive.
//! - Format/codec conditions are fatal for the session and reach the
//!   completion callback exactly once.
//! - Upstream conditions (pipe failure, I/O) are fatal before readiness and
//!   normal end-of-stream after it.

use thiserror::Error;

/// Errors that can occur while ingesting and decoding an audio byte stream.
#[derive(Error, Debug)]
pub enum IngestError {
    // ========================================================================
    // Transient Conditions
    // ========================================================================
    /// The buffered bytes are not yet sufficient for the attempted step.
    ///
    /// This is flow control, not a failure: the operation is retried after
    /// the next batch of bytes arrives from the upstream pipe.
    #[error("not enough buffered data yet")]
    NeedMoreData,

    // ========================================================================
    // Format/Codec Errors
    // ========================================================================
    /// The container cannot be understood even with more data available.
    #[error("unsupported or invalid container format: {0}")]
    InvalidFormat(String),

    /// The container was parsed but holds no decodable audio track.
    #[error("no audio track found in container")]
    NoAudioTrack,

    /// No decoder is registered for the selected track's codec.
    #[error("unsupported codec: {0}")]
    UnsupportedCodec(String),

    /// Too many consecutive packets failed to decode.
    #[error("corrupted audio stream: {0}")]
    CorruptedStream(String),

    /// The codec reported an unrecoverable internal error.
    #[error("decoder error: {0}")]
    DecoderError(String),

    // ========================================================================
    // Resampling Errors
    // ========================================================================
    /// Sample rate / channel layout conversion failed.
    #[error("resampling error: {0}")]
    ResampleError(String),

    // ========================================================================
    // Upstream Errors
    // ========================================================================
    /// The byte-producing pipe failed or closed before decoding could start.
    #[error("upstream source failed: {0}")]
    SourceError(String),

    /// I/O error surfaced by the pipe or the decode session.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Internal invariant violation (should not occur in normal operation).
    #[error("internal error: {0}")]
    Internal(String),
}

impl IngestError {
    /// Returns `true` if this condition is retried internally and never
    /// reported through the completion callback.
    pub fn is_transient(&self) -> bool {
        matches!(self, IngestError::NeedMoreData)
    }

    /// Returns `true` if this error is a container/codec format problem.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            IngestError::InvalidFormat(_)
                | IngestError::NoAudioTrack
                | IngestError::UnsupportedCodec(_)
        )
    }
}

/// Result type for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(IngestError::NeedMoreData.is_transient());
        assert!(!IngestError::InvalidFormat("bad".into()).is_transient());
        assert!(!IngestError::SourceError("pipe".into()).is_transient());
    }

    #[test]
    fn format_classification() {
        assert!(IngestError::InvalidFormat("bad".into()).is_format_error());
        assert!(IngestError::NoAudioTrack.is_format_error());
        assert!(IngestError::UnsupportedCodec("midi".into()).is_format_error());
        assert!(!IngestError::NeedMoreData.is_format_error());
        assert!(!IngestError::CorruptedStream("x".into()).is_format_error());
    }

    #[test]
    fn io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        let err: IngestError = io.into();
        assert!(matches!(err, IngestError::IoError(_)));
        assert!(format!("{err}").contains("gone"));
    }
}
