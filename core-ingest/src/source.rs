//! # Subprocess Track Source
//!
//! Runs an external fetch command (a downloader writing a media container
//! to stdout), pumps its pipe into an [`IngestPipeline`], and exposes the
//! pipeline's pull interface.
//!
//! The pump is a background task issuing fixed-size reads; each completed
//! read is pushed as one batch, read EOF becomes
//! [`finish_input`](IngestPipeline::finish_input), and a read error becomes
//! a fatal upstream failure. Dropping the source aborts the pump and kills
//! the child process.

use std::process::Stdio;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use crate::pipeline::{CompletionCallback, IngestPipeline, NextFrame, ReadinessState};

/// One playing track: the fetch subprocess plus its decoding pipeline.
pub struct TrackSource {
    pipeline: Arc<Mutex<IngestPipeline>>,
    pump: Option<JoinHandle<()>>,
    child: Option<Child>,
}

impl TrackSource {
    /// Spawn `command`, capture its stdout, and start decoding it.
    ///
    /// The command's stdout is re-piped; stdin is closed. The child is
    /// killed when the source is dropped.
    pub fn spawn(
        mut command: Command,
        config: IngestConfig,
        callback: CompletionCallback,
    ) -> Result<Self> {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .kill_on_drop(true);
        let mut child = command.spawn()?;
        let stdout = child.stdout.take().ok_or_else(|| {
            IngestError::SourceError("child process has no stdout pipe".to_string())
        })?;

        let chunk = config.pipe_chunk_bytes;
        let pipeline = Arc::new(Mutex::new(IngestPipeline::new(config, callback)));
        let pump = tokio::spawn(pump_pipe(stdout, Arc::clone(&pipeline), chunk));

        Ok(Self {
            pipeline,
            pump: Some(pump),
            child: Some(child),
        })
    }

    /// Decode from an already-open byte stream instead of a subprocess.
    pub fn from_reader<R>(reader: R, config: IngestConfig, callback: CompletionCallback) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let chunk = config.pipe_chunk_bytes;
        let pipeline = Arc::new(Mutex::new(IngestPipeline::new(config, callback)));
        let pump = tokio::spawn(pump_pipe(reader, Arc::clone(&pipeline), chunk));

        Self {
            pipeline,
            pump: Some(pump),
            child: None,
        }
    }

    /// Pull the next frame. See [`IngestPipeline::next`].
    pub fn next(&self) -> NextFrame {
        self.pipeline.lock().next()
    }

    /// Construction progress of the decode session.
    pub fn state(&self) -> ReadinessState {
        self.pipeline.lock().state()
    }

    /// Returns `true` once pulls can produce frames.
    pub fn is_ready(&self) -> bool {
        self.pipeline.lock().is_ready()
    }

    /// Bytes received from the pipe so far.
    pub fn buffered_bytes(&self) -> usize {
        self.pipeline.lock().buffered_bytes()
    }
}

impl Drop for TrackSource {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.start_kill() {
                warn!("failed to kill fetch subprocess: {e}");
            }
        }
    }
}

/// Read the pipe in fixed-size chunks until EOF or error.
async fn pump_pipe<R>(mut reader: R, pipeline: Arc<Mutex<IngestPipeline>>, chunk: usize)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; chunk.max(1)];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                debug!("pipe closed");
                pipeline.lock().finish_input();
                return;
            }
            Ok(n) => {
                pipeline.lock().push_bytes(&buf[..n]);
            }
            Err(e) => {
                pipeline.lock().fail_upstream(format!("pipe read: {e}"));
                return;
            }
        }
    }
}
