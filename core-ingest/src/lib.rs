//! # Media Ingestion Module
//!
//! Incremental audio decoding for live playback: consume a media container
//! as its bytes arrive from a fetch subprocess, and serve fixed-duration
//! PCM frames to a voice encoder the moment enough of the stream has been
//! decoded.
//!
//! ## Overview
//!
//! This module handles:
//! - Buffering a still-downloading byte stream behind a seekable reader
//! - Opportunistic decoder construction retried as bytes arrive
//! - Demux/decode/resample into a fixed target format (48 kHz stereo by
//!   default, 20 ms frames)
//! - Subprocess lifecycle for the fetch command feeding the pipe
//!
//! ## Flow
//!
//! [`TrackSource`] spawns the fetch command and pumps its stdout into an
//! [`IngestPipeline`]. The pipeline retries opening a decode session
//! ([`StreamDecoder`]) against the growing [`InputBuffer`] until the
//! container parses, then converts decoded frames through a
//! [`FrameResampler`] and packages them into [`AudioFrame`]s on demand.

pub mod config;
pub mod decoder;
pub mod error;
pub mod input;
pub mod pipeline;
pub mod source;

pub use config::IngestConfig;
pub use decoder::{DecodedFrame, FrameResampler, InputSpec, StreamDecoder};
pub use error::{IngestError, Result};
pub use input::{InputBuffer, InputReader};
pub use pipeline::{
    AudioFrame, CompletionCallback, IngestPipeline, NextFrame, ReadinessState,
};
pub use source::TrackSource;
