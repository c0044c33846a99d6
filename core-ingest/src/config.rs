//! # Ingestion Configuration
//!
//! Configuration for the incremental decoding pipeline: the fixed target
//! format demanded by the downstream encoder, and tunables for pipe reads,
//! resampling granularity, and decode-error tolerance.

use serde::{Deserialize, Serialize};

/// Pipeline configuration.
///
/// The target format is supplied at construction and never negotiated: the
/// downstream lossy encoder dictates it (see [`IngestConfig::voice_chat`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Target sample rate in Hz handed to the encoder.
    ///
    /// Default: 48 000 Hz.
    #[serde(default = "default_target_sample_rate")]
    pub target_sample_rate: u32,

    /// Target channel count (1 = mono, 2 = stereo).
    ///
    /// Default: 2.
    #[serde(default = "default_target_channels")]
    pub target_channels: u16,

    /// Duration of one output [`AudioFrame`](crate::pipeline::AudioFrame)
    /// in milliseconds.
    ///
    /// Default: 20 ms, the common unit for voice encoders.
    #[serde(default = "default_frame_duration_ms")]
    pub frame_duration_ms: u32,

    /// Size of each asynchronous pipe read in bytes.
    ///
    /// Default: 4096.
    #[serde(default = "default_pipe_chunk_bytes")]
    pub pipe_chunk_bytes: usize,

    /// Input frames processed per resampler block.
    ///
    /// Larger blocks improve FFT efficiency at the cost of latency.
    /// Default: 1024.
    #[serde(default = "default_resample_chunk_frames")]
    pub resample_chunk_frames: usize,

    /// Consecutive undecodable packets tolerated before the stream is
    /// declared corrupted.
    ///
    /// Default: 10.
    #[serde(default = "default_max_consecutive_decode_errors")]
    pub max_consecutive_decode_errors: usize,

    /// Optional container extension hint (e.g. `"webm"`, `"mp3"`) passed to
    /// the probe when the upstream downloader knows the format.
    ///
    /// Default: none (auto-detect).
    #[serde(default)]
    pub container_hint: Option<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: default_target_sample_rate(),
            target_channels: default_target_channels(),
            frame_duration_ms: default_frame_duration_ms(),
            pipe_chunk_bytes: default_pipe_chunk_bytes(),
            resample_chunk_frames: default_resample_chunk_frames(),
            max_consecutive_decode_errors: default_max_consecutive_decode_errors(),
            container_hint: None,
        }
    }
}

impl IngestConfig {
    /// Configuration matching a real-time voice encoder (Opus-style):
    /// 48 kHz stereo, 20 ms frames.
    pub fn voice_chat() -> Self {
        Self::default()
    }

    /// Configuration for narrowband telephony output: 8 kHz mono.
    pub fn telephony() -> Self {
        Self {
            target_sample_rate: 8000,
            target_channels: 1,
            ..Default::default()
        }
    }

    /// Number of target-format frames in one output [`AudioFrame`]
    /// (one frame = one sample per channel).
    ///
    /// [`AudioFrame`]: crate::pipeline::AudioFrame
    pub fn frame_len(&self) -> usize {
        (self.target_sample_rate as usize * self.frame_duration_ms as usize) / 1000
    }

    /// Number of interleaved samples in one output frame.
    pub fn frame_samples(&self) -> usize {
        self.frame_len() * self.target_channels as usize
    }
}

fn default_target_sample_rate() -> u32 {
    48_000
}

fn default_target_channels() -> u16 {
    2
}

fn default_frame_duration_ms() -> u32 {
    20
}

fn default_pipe_chunk_bytes() -> usize {
    4096
}

fn default_resample_chunk_frames() -> usize {
    1024
}

fn default_max_consecutive_decode_errors() -> usize {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_voice_chat() {
        let config = IngestConfig::default();
        assert_eq!(config.target_sample_rate, 48_000);
        assert_eq!(config.target_channels, 2);
        assert_eq!(config.frame_duration_ms, 20);
        assert_eq!(config.frame_len(), 960);
        assert_eq!(config.frame_samples(), 1920);
    }

    #[test]
    fn telephony_preset() {
        let config = IngestConfig::telephony();
        assert_eq!(config.target_sample_rate, 8000);
        assert_eq!(config.target_channels, 1);
        assert_eq!(config.frame_len(), 160);
        assert_eq!(config.frame_samples(), 160);
    }

    #[test]
    fn serde_defaults_fill_missing_fields() {
        let config: IngestConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.target_sample_rate, 48_000);
        assert_eq!(config.pipe_chunk_bytes, 4096);
        assert_eq!(config.max_consecutive_decode_errors, 10);
        assert!(config.container_hint.is_none());
    }

    #[test]
    fn serde_round_trip() {
        let mut config = IngestConfig::telephony();
        config.container_hint = Some("wav".to_string());
        let json = serde_json::to_string(&config).unwrap();
        let back: IngestConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.target_sample_rate, 8000);
        assert_eq!(back.container_hint.as_deref(), Some("wav"));
    }
}
