//! # Decode Session Internals
//!
//! Container/codec session management ([`StreamDecoder`]) and target-format
//! conversion ([`FrameResampler`]).

pub mod resampler;
pub mod stream_decoder;

pub use resampler::FrameResampler;
pub use stream_decoder::{DecodedFrame, InputSpec, StreamDecoder};
