//! # Frame Resampler
//!
//! Converts decoded frames (whatever rate/layout the codec discovered) into
//! the fixed target format the downstream encoder demands.
//!
//! Channel layout is converted first (mono↔stereo mixing), then sample rate
//! through an FFT resampler working in fixed input blocks. Because blocks
//! are fixed, a call may legally produce zero output samples while input
//! accumulates; callers treat that as "feed the next frame". All output
//! allocations are reused across calls and only ever grown.

use rubato::{FftFixedInOut, Resampler};
use tracing::debug;

use crate::decoder::stream_decoder::{DecodedFrame, InputSpec};
use crate::error::{IngestError, Result};

/// Converts decoded frames to the target sample rate and channel count.
///
/// Configured once with the discovered input format; the input format of
/// every subsequent frame must match it.
pub struct FrameResampler {
    input: InputSpec,
    target_rate: u32,
    target_channels: u16,
    chunk_frames: usize,
    /// `None` when input and target rates match (channel mix only).
    resampler: Option<FftFixedInOut<f32>>,
    /// Per-channel pending input, already mixed to the target layout.
    fifo: Vec<Vec<f32>>,
    /// Reused per-channel resampler output. Grown, never shrunk.
    planar_out: Vec<Vec<f32>>,
    /// Reused interleaved output handed to the caller. Grown, never shrunk.
    out: Vec<f32>,
    out_len: usize,
}

impl FrameResampler {
    /// Build a converter from the discovered input format to the target.
    pub fn new(
        input: InputSpec,
        target_rate: u32,
        target_channels: u16,
        chunk_frames: usize,
    ) -> Result<Self> {
        if input.channels == 0 || target_channels == 0 {
            return Err(IngestError::Internal(
                "channel count of zero".to_string(),
            ));
        }
        let chunk_frames = chunk_frames.max(1);

        let resampler = if input.sample_rate != target_rate {
            let fft = FftFixedInOut::<f32>::new(
                input.sample_rate as usize,
                target_rate as usize,
                chunk_frames,
                target_channels as usize,
            )
            .map_err(|e| IngestError::ResampleError(e.to_string()))?;
            Some(fft)
        } else {
            None
        };

        debug!(
            in_rate = input.sample_rate,
            in_channels = input.channels,
            out_rate = target_rate,
            out_channels = target_channels,
            "resampler configured"
        );

        Ok(Self {
            input,
            target_rate,
            target_channels,
            chunk_frames,
            resampler,
            fifo: vec![Vec::new(); target_channels as usize],
            planar_out: vec![Vec::new(); target_channels as usize],
            out: Vec::new(),
            out_len: 0,
        })
    }

    /// The input format this converter was configured for.
    pub fn input_spec(&self) -> InputSpec {
        self.input
    }

    /// Convert one decoded frame, returning the produced target-format
    /// samples (interleaved). The returned slice borrows an internal buffer
    /// valid until the next call.
    ///
    /// May produce fewer samples than the rate ratio implies, including
    /// zero, while the fixed-block resampler accumulates input. A
    /// zero-sample input frame yields an empty slice and is not an error.
    pub fn resample(&mut self, frame: &DecodedFrame) -> Result<&[f32]> {
        self.out_len = 0;
        if frame.samples.is_empty() {
            return Ok(&[]);
        }
        if frame.spec != self.input {
            return Err(IngestError::ResampleError(format!(
                "input format changed mid-stream: {:?} != {:?}",
                frame.spec, self.input
            )));
        }

        self.mix_into_fifo(&frame.samples);
        self.drain_fifo(false)?;
        Ok(&self.out[..self.out_len])
    }

    /// Drain everything still buffered at end-of-stream.
    ///
    /// The final fixed block is zero-padded, so up to one block of trailing
    /// silence can follow the real samples (the documented latency of the
    /// block resampler).
    pub fn flush(&mut self) -> Result<&[f32]> {
        self.out_len = 0;
        self.drain_fifo(true)?;
        Ok(&self.out[..self.out_len])
    }

    /// Mix interleaved input samples to the target channel layout and append
    /// to the per-channel FIFO.
    fn mix_into_fifo(&mut self, samples: &[f32]) {
        let in_ch = self.input.channels as usize;
        let out_ch = self.target_channels as usize;
        let frames = samples.len() / in_ch;

        for f in 0..frames {
            let base = f * in_ch;
            if in_ch == out_ch {
                for ch in 0..out_ch {
                    self.fifo[ch].push(samples[base + ch]);
                }
            } else if in_ch == 1 {
                // Upmix: duplicate the mono sample.
                for ch in 0..out_ch {
                    self.fifo[ch].push(samples[base]);
                }
            } else {
                // Downmix: average all input channels.
                let sum: f32 = samples[base..base + in_ch].iter().sum();
                let mixed = sum / in_ch as f32;
                for ch in 0..out_ch {
                    self.fifo[ch].push(mixed);
                }
            }
        }
    }

    /// Move FIFO contents through the resampler (or straight through when
    /// no rate change is needed) into the interleaved output buffer.
    fn drain_fifo(&mut self, pad_tail: bool) -> Result<()> {
        let out_ch = self.target_channels as usize;

        let Some(resampler) = self.resampler.as_mut() else {
            // Passthrough: interleave the whole FIFO, exact sample counts.
            let frames = self.fifo[0].len();
            reserve_out(&mut self.out, self.out_len + frames * out_ch);
            for f in 0..frames {
                for ch in 0..out_ch {
                    self.out[self.out_len] = self.fifo[ch][f];
                    self.out_len += 1;
                }
            }
            for ch in self.fifo.iter_mut() {
                ch.clear();
            }
            return Ok(());
        };

        loop {
            let needed = resampler.input_frames_next();
            if self.fifo[0].len() < needed {
                if pad_tail && !self.fifo[0].is_empty() {
                    // Zero-pad the final partial block so it drains.
                    for ch in self.fifo.iter_mut() {
                        ch.resize(needed, 0.0);
                    }
                } else {
                    break;
                }
            }

            let out_frames_bound = resampler.output_frames_next();
            for plane in self.planar_out.iter_mut() {
                if plane.len() < out_frames_bound {
                    plane.resize(out_frames_bound, 0.0);
                }
            }

            let input: Vec<&[f32]> = self.fifo.iter().map(|ch| &ch[..needed]).collect();
            let (consumed, produced) = resampler
                .process_into_buffer(&input, &mut self.planar_out, None)
                .map_err(|e| IngestError::ResampleError(e.to_string()))?;

            for ch in self.fifo.iter_mut() {
                ch.drain(..consumed);
            }

            reserve_out(&mut self.out, self.out_len + produced * out_ch);
            for f in 0..produced {
                for ch in 0..out_ch {
                    self.out[self.out_len] = self.planar_out[ch][f];
                    self.out_len += 1;
                }
            }
        }

        Ok(())
    }
}

/// Grow-only capacity management for the interleaved output buffer.
fn reserve_out(out: &mut Vec<f32>, required: usize) {
    if out.len() < required {
        out.resize(required, 0.0);
    }
}
