//! # Incremental Ingestion Pipeline
//!
//! The orchestrator tying the pieces together: an append-only byte buffer
//! fed by the upstream pipe, a readiness state machine that retries decoder
//! construction as bytes arrive, and a synchronous pull interface handing
//! fixed-duration frames to the downstream encoder.
//!
//! The push side ([`push_bytes`](IngestPipeline::push_bytes) /
//! [`finish_input`](IngestPipeline::finish_input)) is driven by the event
//! loop that owns the pipe; the pull side ([`next`](IngestPipeline::next))
//! is driven by the encoder. The pull side never performs I/O: it consults
//! only already-buffered bytes and reports "not ready" rather than waiting
//! for data.

use tracing::{debug, error, info, warn};

use crate::config::IngestConfig;
use crate::decoder::{FrameResampler, StreamDecoder};
use crate::error::{IngestError, Result};
use crate::input::InputBuffer;

/// Construction progress of the decode session.
///
/// Mirrors the construction steps one-for-one. Strictly forward-progressing
/// within a single attempt; any failure resets to [`Start`](Self::Start) and
/// the next byte arrival re-runs every step from scratch (the decode library
/// cannot resume a partially failed open).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessState {
    Start,
    OpenedInput,
    FoundStreamInfo,
    FoundBestStream,
    OpenedDecoder,
    Ready,
}

/// One fixed-duration slice of target-format PCM.
///
/// Samples are interleaved f32 in `[-1.0, 1.0]` at the configured target
/// rate and channel count. Ownership transfers to the caller.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFrame {
    /// Sample count per channel.
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    /// Convert to interleaved signed 16-bit, the layout taken by common
    /// lossy voice encoders.
    pub fn as_i16(&self) -> Vec<i16> {
        self.samples
            .iter()
            .map(|&s| (s.clamp(-1.0, 1.0) * 32767.0) as i16)
            .collect()
    }
}

/// Result of one pull from the pipeline.
#[derive(Debug)]
pub enum NextFrame {
    /// Decoding is not possible yet (construction incomplete, or decoding
    /// momentarily outran the delivered bytes). Try again after more bytes
    /// arrive.
    NotReady,
    /// One frame of target-format PCM. The final frame of a stream may be
    /// shorter than the configured duration.
    Frame(AudioFrame),
    /// End of stream, or the pipeline failed fatally (the completion
    /// callback disambiguates). Sticky: every further pull returns this.
    Finished,
}

/// One-shot completion/error notification.
///
/// Invoked at most once per pipeline lifetime: with `Err` on fatal failure,
/// with `Ok` at the first transition to [`NextFrame::Finished`].
pub type CompletionCallback = Box<dyn FnOnce(Result<()>) + Send>;

/// The incremental decoding pipeline.
pub struct IngestPipeline {
    config: IngestConfig,
    buffer: InputBuffer,
    state: ReadinessState,
    decoder: Option<StreamDecoder>,
    resampler: Option<FrameResampler>,
    /// Target-format samples produced but not yet packaged into frames.
    /// Survives session teardown: these samples are already accounted for.
    pending: Vec<f32>,
    /// Position in the canonical output stream: samples ever accepted into
    /// `pending` (monotonic across session rebuilds).
    accounted: u64,
    /// Samples of rebuilt-session output to drop so the emitted stream
    /// continues exactly where the torn-down session left off.
    skip: u64,
    callback: Option<CompletionCallback>,
    fatal: bool,
    flushed: bool,
    finished: bool,
}

impl IngestPipeline {
    pub fn new(config: IngestConfig, callback: CompletionCallback) -> Self {
        Self {
            config,
            buffer: InputBuffer::new(),
            state: ReadinessState::Start,
            decoder: None,
            resampler: None,
            pending: Vec::new(),
            accounted: 0,
            skip: 0,
            callback: Some(callback),
            fatal: false,
            flushed: false,
            finished: false,
        }
    }

    /// Current construction progress.
    pub fn state(&self) -> ReadinessState {
        self.state
    }

    /// Returns `true` once the decode session is open and pulls can produce
    /// frames.
    pub fn is_ready(&self) -> bool {
        self.state == ReadinessState::Ready
    }

    /// Bytes buffered so far.
    pub fn buffered_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// Append a batch of bytes arriving from the upstream pipe. While the
    /// decode session is not yet open, attempt construction again.
    ///
    /// Transient "not enough data" failures are silent; the next batch
    /// retries. Fatal format errors fire the completion callback once and
    /// stop all further attempts.
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        if self.fatal || self.finished {
            return;
        }
        self.buffer.append(bytes);
        if self.state != ReadinessState::Ready {
            self.try_open();
        }
    }

    /// Mark the byte stream complete: the pipe closed and no more bytes
    /// will ever arrive.
    ///
    /// If construction has not succeeded yet, one final attempt runs; with
    /// the buffer closed, failure is now fatal (the bytes that exist are
    /// all there will ever be).
    pub fn finish_input(&mut self) {
        if self.fatal || self.finished {
            return;
        }
        self.buffer.close();
        debug!(bytes = self.buffer.len(), "input complete");
        if self.state != ReadinessState::Ready {
            self.try_open();
        }
    }

    /// Report an upstream pipe read failure.
    ///
    /// No more bytes can ever complete construction, so this is fatal for
    /// the source regardless of progress.
    pub fn fail_upstream(&mut self, reason: String) {
        if self.fatal || self.finished {
            return;
        }
        self.buffer.close();
        self.fail(IngestError::SourceError(reason));
    }

    /// Pull the next fixed-duration frame.
    ///
    /// Synchronous and I/O-free: decodes and resamples from the bytes
    /// already buffered, or reports [`NextFrame::NotReady`] when they do
    /// not suffice. Never returns data before the session is ready; after
    /// end-of-stream keeps returning [`NextFrame::Finished`].
    pub fn next(&mut self) -> NextFrame {
        if self.fatal || self.finished {
            return NextFrame::Finished;
        }
        if self.state != ReadinessState::Ready {
            return NextFrame::NotReady;
        }

        let frame_samples = self.config.frame_samples();
        while self.pending.len() < frame_samples && !self.flushed {
            let decoder = self
                .decoder
                .as_mut()
                .expect("ready state implies an open decoder");
            match decoder.next_frame() {
                Ok(Some(decoded)) => {
                    if self.resampler.is_none() {
                        // The input format is only authoritative once the
                        // first frame has actually decoded.
                        match FrameResampler::new(
                            decoded.spec,
                            self.config.target_sample_rate,
                            self.config.target_channels,
                            self.config.resample_chunk_frames,
                        ) {
                            Ok(rs) => self.resampler = Some(rs),
                            Err(e) => {
                                self.fail(e);
                                return NextFrame::Finished;
                            }
                        }
                    }
                    let resampler = self
                        .resampler
                        .as_mut()
                        .expect("constructed above when absent");
                    match resampler.resample(&decoded) {
                        Ok(produced) => accept_samples(
                            &mut self.pending,
                            &mut self.skip,
                            &mut self.accounted,
                            produced,
                        ),
                        Err(e) => {
                            self.fail(e);
                            return NextFrame::Finished;
                        }
                    }
                }
                Ok(None) => {
                    // Genuine end of stream: drain the resampler tail.
                    if let Some(resampler) = self.resampler.as_mut() {
                        match resampler.flush() {
                            Ok(produced) => accept_samples(
                                &mut self.pending,
                                &mut self.skip,
                                &mut self.accounted,
                                produced,
                            ),
                            Err(e) => {
                                self.fail(e);
                                return NextFrame::Finished;
                            }
                        }
                    }
                    self.flushed = true;
                }
                Err(IngestError::NeedMoreData) => {
                    // Decoding outran the delivered bytes. Tear the session
                    // down; the next push rebuilds it from byte zero and
                    // already-emitted output is skipped by count, so the
                    // emitted stream is identical to uninterrupted decoding.
                    debug!(
                        accounted = self.accounted,
                        "decode outran delivery, resetting session"
                    );
                    self.decoder = None;
                    self.resampler = None;
                    self.state = ReadinessState::Start;
                    self.skip = self.accounted;
                    return NextFrame::NotReady;
                }
                Err(e) => {
                    self.fail(e);
                    return NextFrame::Finished;
                }
            }
        }

        if self.pending.len() >= frame_samples {
            let samples: Vec<f32> = self.pending.drain(..frame_samples).collect();
            return NextFrame::Frame(self.package(samples));
        }

        // Flushed with less than a full frame left: emit the short tail
        // first, then complete.
        if !self.pending.is_empty() {
            let samples = std::mem::take(&mut self.pending);
            self.finished = true;
            self.complete_ok();
            return NextFrame::Frame(self.package(samples));
        }

        self.finished = true;
        self.complete_ok();
        NextFrame::Finished
    }

    fn package(&self, samples: Vec<f32>) -> AudioFrame {
        AudioFrame {
            samples,
            sample_rate: self.config.target_sample_rate,
            channels: self.config.target_channels,
        }
    }

    /// Run one full construction attempt against the buffered bytes.
    fn try_open(&mut self) {
        let mut state = ReadinessState::Start;
        match StreamDecoder::open(
            &self.buffer,
            self.config.container_hint.as_deref(),
            self.config.max_consecutive_decode_errors,
            &mut state,
        ) {
            Ok(decoder) => {
                self.decoder = Some(decoder);
                self.state = ReadinessState::Ready;
                info!(bytes = self.buffer.len(), "decode pipeline ready");
            }
            Err(IngestError::NeedMoreData) => {
                // Retry from scratch on the next arrival; the library may
                // need more bytes than previously available to pass a stage
                // it already failed.
                debug!(
                    bytes = self.buffer.len(),
                    reached = ?state,
                    "construction attempt needs more data"
                );
                self.state = ReadinessState::Start;
            }
            Err(e) => {
                warn!(reached = ?state, "construction failed: {e}");
                self.state = ReadinessState::Start;
                self.fail(e);
            }
        }
    }

    /// Fatal path: report once, stop producing.
    fn fail(&mut self, err: IngestError) {
        error!("pipeline failed: {err}");
        self.fatal = true;
        self.decoder = None;
        self.resampler = None;
        self.pending.clear();
        if let Some(cb) = self.callback.take() {
            cb(Err(err));
        }
    }

    fn complete_ok(&mut self) {
        info!(samples = self.accounted, "stream complete");
        self.decoder = None;
        self.resampler = None;
        if let Some(cb) = self.callback.take() {
            cb(Ok(()));
        }
    }
}

/// Append produced samples to the pending queue, dropping the prefix a
/// rebuilt session re-produces.
fn accept_samples(pending: &mut Vec<f32>, skip: &mut u64, accounted: &mut u64, samples: &[f32]) {
    let mut samples = samples;
    if *skip > 0 {
        let n = (*skip as usize).min(samples.len());
        samples = &samples[n..];
        *skip -= n as u64;
    }
    pending.extend_from_slice(samples);
    *accounted += samples.len() as u64;
}
