//! End-to-end pipeline tests over generated PCM WAV streams, covering
//! incremental delivery, aggressive pulling, and completion reporting.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use core_ingest::{
    CompletionCallback, IngestConfig, IngestPipeline, NextFrame, ReadinessState,
};

/// Generate a complete PCM S16LE WAV byte stream carrying a 440 Hz tone.
fn make_wav(seconds: f64, sample_rate: u32, channels: u16) -> Vec<u8> {
    let frames = (seconds * sample_rate as f64) as usize;
    let mut data = Vec::with_capacity(frames * channels as usize * 2);
    for i in 0..frames {
        let t = i as f64 / sample_rate as f64;
        let s = (t * 440.0 * 2.0 * std::f64::consts::PI).sin() * 0.5;
        let v = (s * 32767.0) as i16;
        for _ in 0..channels {
            data.extend_from_slice(&v.to_le_bytes());
        }
    }

    let byte_rate = sample_rate * channels as u32 * 2;
    let block_align = channels * 2;
    let mut wav = Vec::with_capacity(44 + data.len());
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + data.len() as u32).to_le_bytes());
    wav.extend_from_slice(b"WAVE");
    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&channels.to_le_bytes());
    wav.extend_from_slice(&sample_rate.to_le_bytes());
    wav.extend_from_slice(&byte_rate.to_le_bytes());
    wav.extend_from_slice(&block_align.to_le_bytes());
    wav.extend_from_slice(&16u16.to_le_bytes());
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&(data.len() as u32).to_le_bytes());
    wav.extend_from_slice(&data);
    wav
}

/// Honor `RUST_LOG` when debugging a failing test.
fn init_logs() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn completion_counters() -> (CompletionCallback, Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let ok = Arc::new(AtomicUsize::new(0));
    let err = Arc::new(AtomicUsize::new(0));
    let (ok2, err2) = (ok.clone(), err.clone());
    let cb: CompletionCallback = Box::new(move |result| {
        match result {
            Ok(()) => ok2.fetch_add(1, Ordering::SeqCst),
            Err(_) => err2.fetch_add(1, Ordering::SeqCst),
        };
    });
    (cb, ok, err)
}

/// Pull until the pipeline reports `Finished`, collecting every emitted
/// sample and asserting frame sizing along the way.
fn drain_to_end(pipeline: &mut IngestPipeline, config: &IngestConfig) -> Vec<f32> {
    let mut collected = Vec::new();
    let mut short_frames = 0;
    loop {
        match pipeline.next() {
            NextFrame::Frame(frame) => {
                assert_eq!(frame.sample_rate, config.target_sample_rate);
                assert_eq!(frame.channels, config.target_channels);
                assert!(frame.samples.len() <= config.frame_samples());
                if frame.samples.len() < config.frame_samples() {
                    // Only the final frame may be short.
                    short_frames += 1;
                    assert_eq!(short_frames, 1);
                }
                collected.extend_from_slice(&frame.samples);
            }
            NextFrame::Finished => return collected,
            NextFrame::NotReady => panic!("pipeline stalled with the stream fully delivered"),
        }
    }
}

/// Pull everything currently decodable, stopping at `NotReady`. Returns
/// `true` when the stream finished.
fn drain_available(pipeline: &mut IngestPipeline, out: &mut Vec<f32>) -> bool {
    loop {
        match pipeline.next() {
            NextFrame::Frame(frame) => out.extend_from_slice(&frame.samples),
            NextFrame::NotReady => return false,
            NextFrame::Finished => return true,
        }
    }
}

#[test]
fn whole_stream_at_once_decodes_to_target_format() {
    init_logs();
    let config = IngestConfig::default();
    let (cb, ok, err) = completion_counters();
    let mut pipeline = IngestPipeline::new(config.clone(), cb);

    // 0.5 s of mono 8 kHz becomes 0.5 s of stereo 48 kHz.
    pipeline.push_bytes(&make_wav(0.5, 8000, 1));
    pipeline.finish_input();
    assert!(pipeline.is_ready());

    let samples = drain_to_end(&mut pipeline, &config);
    let ideal = (48_000 / 2) * 2; // 0.5 s of stereo frames, in samples
    assert!(samples.len() >= ideal, "{} < {ideal}", samples.len());
    // Up to one zero-padded resampler block of trailing silence.
    let pad_bound = config.resample_chunk_frames * 6 * 2 * 2;
    assert!(samples.len() <= ideal + pad_bound, "{}", samples.len());

    assert_eq!(ok.load(Ordering::SeqCst), 1);
    assert_eq!(err.load(Ordering::SeqCst), 0);
}

#[test]
fn chunked_delivery_matches_all_at_once_exactly() {
    let config = IngestConfig::default();
    let wav = make_wav(0.5, 8000, 1);

    let (cb, _, _) = completion_counters();
    let mut reference = IngestPipeline::new(config.clone(), cb);
    reference.push_bytes(&wav);
    reference.finish_input();
    let expected = drain_to_end(&mut reference, &config);

    // Same stream in 4 KiB slices, pulled only at the end.
    let (cb, ok, _) = completion_counters();
    let mut pipeline = IngestPipeline::new(config.clone(), cb);
    for chunk in wav.chunks(4096) {
        pipeline.push_bytes(chunk);
    }
    pipeline.finish_input();
    let samples = drain_to_end(&mut pipeline, &config);

    assert_eq!(samples, expected);
    assert_eq!(ok.load(Ordering::SeqCst), 1);
}

#[test]
fn aggressive_pulling_between_chunks_matches_all_at_once_exactly() {
    init_logs();
    // Pulling harder than delivery forces decode to outrun the buffer and
    // exercises the teardown/rebuild path; the emitted stream must still be
    // identical to uninterrupted decoding.
    let config = IngestConfig::default();
    let wav = make_wav(0.5, 8000, 1);

    let (cb, _, _) = completion_counters();
    let mut reference = IngestPipeline::new(config.clone(), cb);
    reference.push_bytes(&wav);
    reference.finish_input();
    let expected = drain_to_end(&mut reference, &config);

    let (cb, ok, err) = completion_counters();
    let mut pipeline = IngestPipeline::new(config.clone(), cb);
    let mut samples = Vec::new();
    let mut finished = false;
    for chunk in wav.chunks(1024) {
        pipeline.push_bytes(chunk);
        finished = drain_available(&mut pipeline, &mut samples);
    }
    if !finished {
        pipeline.finish_input();
        finished = drain_available(&mut pipeline, &mut samples);
    }
    assert!(finished);

    assert_eq!(samples, expected);
    assert_eq!(ok.load(Ordering::SeqCst), 1);
    assert_eq!(err.load(Ordering::SeqCst), 0);
}

#[test]
fn two_second_track_in_four_chunks_yields_two_seconds_of_output() {
    let config = IngestConfig::default();
    let wav = make_wav(2.0, 8000, 1);
    let (cb, ok, _) = completion_counters();
    let mut pipeline = IngestPipeline::new(config.clone(), cb);

    let chunk_len = wav.len().div_ceil(4);
    let mut samples = Vec::new();
    for chunk in wav.chunks(chunk_len) {
        pipeline.push_bytes(chunk);
        drain_available(&mut pipeline, &mut samples);
    }
    pipeline.finish_input();
    assert!(drain_available(&mut pipeline, &mut samples));

    let ideal = 2 * 48_000 * 2;
    let pad_bound = config.resample_chunk_frames * 6 * 2 * 2;
    assert!(samples.len() >= ideal, "{} < {ideal}", samples.len());
    assert!(samples.len() <= ideal + pad_bound, "{}", samples.len());
    assert_eq!(ok.load(Ordering::SeqCst), 1);
}

#[test]
fn no_frames_before_readiness() {
    let (cb, _, _) = completion_counters();
    let mut pipeline = IngestPipeline::new(IngestConfig::default(), cb);

    // A RIFF preamble alone cannot open a session.
    pipeline.push_bytes(b"RIFF\x24\x00\x00\x00WAVE");
    assert!(!pipeline.is_ready());
    assert_eq!(pipeline.state(), ReadinessState::Start);
    assert!(matches!(pipeline.next(), NextFrame::NotReady));
}

#[test]
fn finished_is_sticky_and_late_pushes_are_ignored() {
    let config = IngestConfig::default();
    let (cb, ok, _) = completion_counters();
    let mut pipeline = IngestPipeline::new(config.clone(), cb);

    pipeline.push_bytes(&make_wav(0.1, 8000, 1));
    pipeline.finish_input();
    drain_to_end(&mut pipeline, &config);

    for _ in 0..3 {
        assert!(matches!(pipeline.next(), NextFrame::Finished));
    }
    pipeline.push_bytes(&make_wav(0.1, 8000, 1));
    assert!(matches!(pipeline.next(), NextFrame::Finished));
    assert_eq!(ok.load(Ordering::SeqCst), 1);
}

#[test]
fn malformed_stream_reports_error_once_and_never_readies() {
    let (cb, ok, err) = completion_counters();
    let mut pipeline = IngestPipeline::new(IngestConfig::default(), cb);

    // Plausible length of garbage, delivered in pieces like a real pipe.
    for _ in 0..8 {
        pipeline.push_bytes(&[0xA5; 512]);
        assert!(!pipeline.is_ready());
    }
    pipeline.finish_input();

    assert_eq!(err.load(Ordering::SeqCst), 1);
    assert_eq!(ok.load(Ordering::SeqCst), 0);
    assert!(matches!(pipeline.next(), NextFrame::Finished));
}

#[test]
fn pipe_closing_after_a_few_bytes_is_fatal() {
    let (cb, _, err) = completion_counters();
    let mut pipeline = IngestPipeline::new(IngestConfig::default(), cb);
    pipeline.push_bytes(&[0x00; 10]);
    pipeline.finish_input();
    assert_eq!(err.load(Ordering::SeqCst), 1);
    assert!(!pipeline.is_ready());
}

#[test]
fn stereo_input_passes_through_at_matching_rate() {
    // 48 kHz stereo input needs no resampling; sample counts are exact.
    let config = IngestConfig::default();
    let (cb, ok, _) = completion_counters();
    let mut pipeline = IngestPipeline::new(config.clone(), cb);

    pipeline.push_bytes(&make_wav(0.25, 48_000, 2));
    pipeline.finish_input();
    let samples = drain_to_end(&mut pipeline, &config);

    assert_eq!(samples.len(), 12_000 * 2);
    assert_eq!(ok.load(Ordering::SeqCst), 1);
}

#[test]
fn telephony_preset_downmixes_and_downsamples() {
    let config = IngestConfig::telephony();
    let (cb, ok, _) = completion_counters();
    let mut pipeline = IngestPipeline::new(config.clone(), cb);

    // 1 s of 48 kHz stereo down to 8 kHz mono.
    pipeline.push_bytes(&make_wav(1.0, 48_000, 2));
    pipeline.finish_input();
    let samples = drain_to_end(&mut pipeline, &config);

    let ideal = 8000;
    assert!(samples.len() >= ideal, "{} < {ideal}", samples.len());
    let pad_bound = config.resample_chunk_frames * 4;
    assert!(samples.len() <= ideal + pad_bound, "{}", samples.len());
    assert_eq!(ok.load(Ordering::SeqCst), 1);
}
