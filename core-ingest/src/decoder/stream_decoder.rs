//! # Stream Decoder
//!
//! Owns one container/codec session over a growing byte buffer: probes the
//! container, selects the best audio track, opens its codec, and serves
//! decoded frames one pull at a time.
//!
//! Construction may fail simply because the buffer does not yet hold enough
//! bytes; that surfaces as the retryable [`IngestError::NeedMoreData`] and
//! the caller re-runs *all* steps against a fresh cursor once more bytes
//! arrive. The decode library offers no way to resume a half-failed probe,
//! so no partial state survives between attempts.

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units;
use tracing::{debug, info, warn};

use crate::error::{IngestError, Result};
use crate::input::InputBuffer;
use crate::pipeline::ReadinessState;

/// Audio format discovered from the decoded stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSpec {
    pub sample_rate: u32,
    pub channels: u16,
}

/// One decoded unit of PCM, converted to owned interleaved f32 immediately
/// (the codec's own buffer is only valid until the next pull).
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    /// Interleaved samples in `[-1.0, 1.0]`.
    pub samples: Vec<f32>,
    /// Format of this frame as reported by the codec.
    pub spec: InputSpec,
}

impl DecodedFrame {
    /// Sample count per channel.
    pub fn frames(&self) -> usize {
        if self.spec.channels == 0 {
            0
        } else {
            self.samples.len() / self.spec.channels as usize
        }
    }
}

/// Container/codec session with a pull-based frame interface.
pub struct StreamDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    buffer: InputBuffer,
    max_consecutive_errors: usize,
    finished: bool,
}

impl StreamDecoder {
    /// Attempt to open a decode session against the buffered bytes.
    ///
    /// Runs, in order: attach the byte source, probe the container and its
    /// stream metadata, select the best audio track, open its codec.
    /// `state` is advanced as each step succeeds so the orchestrator can
    /// report how far an attempt got; the caller resets it on failure.
    ///
    /// # Errors
    ///
    /// [`IngestError::NeedMoreData`] when a step failed only because the
    /// buffer is still incomplete; format errors otherwise.
    pub fn open(
        buffer: &InputBuffer,
        container_hint: Option<&str>,
        max_consecutive_errors: usize,
        state: &mut ReadinessState,
    ) -> Result<Self> {
        let mut hint = Hint::new();
        if let Some(ext) = container_hint {
            hint.with_extension(ext);
        }

        let mss = MediaSourceStream::new(Box::new(buffer.reader()), Default::default());
        *state = ReadinessState::OpenedInput;

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| classify_open_error(e, buffer))?;
        *state = ReadinessState::FoundStreamInfo;

        let format = probed.format;
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(IngestError::NoAudioTrack)?;
        let track_id = track.id;
        *state = ReadinessState::FoundBestStream;
        debug!(track_id, "selected audio track");

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| match e {
                SymphoniaError::Unsupported(what) => IngestError::UnsupportedCodec(what.to_string()),
                other => IngestError::DecoderError(other.to_string()),
            })?;
        *state = ReadinessState::OpenedDecoder;

        info!(
            track_id,
            sample_rate = ?track.codec_params.sample_rate,
            channels = ?track.codec_params.channels.map(|c| c.count()),
            "decode session opened"
        );

        Ok(Self {
            format,
            decoder,
            track_id,
            buffer: buffer.clone(),
            max_consecutive_errors,
            finished: false,
        })
    }

    /// Pull the next decoded frame.
    ///
    /// Reads demuxed packets (skipping tracks other than the selected one),
    /// feeds them to the codec, and returns one decoded frame as owned
    /// interleaved f32 samples.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(frame))`: one decoded frame, in container order
    /// - `Ok(None)`: end of stream; the codec has been flushed and every
    ///   subsequent call keeps returning `None`
    /// - `Err(NeedMoreData)`: the delivered bytes ran out mid-stream while
    ///   the upstream pipe is still open
    ///
    /// Undecodable packets are skipped up to the configured consecutive
    /// cap, after which the stream is reported corrupted.
    pub fn next_frame(&mut self) -> Result<Option<DecodedFrame>> {
        if self.finished {
            return Ok(None);
        }

        let mut consecutive_errors = 0;
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    if !self.buffer.is_closed() {
                        return Err(IngestError::NeedMoreData);
                    }
                    // Demux exhausted for good: tell the codec no further
                    // input will arrive so it releases buffered frames.
                    let _ = self.decoder.finalize();
                    self.finished = true;
                    debug!("demux exhausted, decode session finished");
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => {
                    return Err(IngestError::DecoderError(
                        "track list changed mid-stream".to_string(),
                    ));
                }
                Err(e) => {
                    return Err(IngestError::DecoderError(format!("packet read: {e}")));
                }
            };

            // Packets for other streams are skipped without touching codec state.
            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    let input_spec = InputSpec {
                        sample_rate: spec.rate,
                        channels: spec.channels.count() as u16,
                    };
                    if decoded.frames() == 0 {
                        return Ok(Some(DecodedFrame {
                            samples: Vec::new(),
                            spec: input_spec,
                        }));
                    }
                    let capacity = units::Duration::from(decoded.capacity() as u64);
                    let mut sample_buf = SampleBuffer::<f32>::new(capacity, spec);
                    sample_buf.copy_interleaved_ref(decoded);
                    return Ok(Some(DecodedFrame {
                        samples: sample_buf.samples().to_vec(),
                        spec: input_spec,
                    }));
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    consecutive_errors += 1;
                    warn!(
                        consecutive_errors,
                        "skipping undecodable packet: {e}"
                    );
                    if consecutive_errors >= self.max_consecutive_errors {
                        return Err(IngestError::CorruptedStream(format!(
                            "{consecutive_errors} consecutive packets failed: {e}"
                        )));
                    }
                    continue;
                }
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    if !self.buffer.is_closed() {
                        return Err(IngestError::NeedMoreData);
                    }
                    let _ = self.decoder.finalize();
                    self.finished = true;
                    return Ok(None);
                }
                Err(e) => {
                    return Err(IngestError::DecoderError(format!("decode: {e}")));
                }
            }
        }
    }

    /// Returns `true` once end-of-stream has been reported.
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

/// Map a probe-stage failure onto the retryable/fatal split.
///
/// An unexpected EOF while the buffer is still open only means the header
/// bytes have not all arrived; anything else is a genuine format problem.
fn classify_open_error(e: SymphoniaError, buffer: &InputBuffer) -> IngestError {
    match e {
        SymphoniaError::IoError(io) if io.kind() == std::io::ErrorKind::UnexpectedEof => {
            if buffer.is_closed() {
                IngestError::InvalidFormat("stream ended before container was parseable".into())
            } else {
                IngestError::NeedMoreData
            }
        }
        SymphoniaError::IoError(io) => IngestError::IoError(io),
        SymphoniaError::Unsupported(what) => IngestError::InvalidFormat(what.to_string()),
        SymphoniaError::DecodeError(what) => IngestError::InvalidFormat(what.to_string()),
        other => IngestError::DecoderError(other.to_string()),
    }
}
