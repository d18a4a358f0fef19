//! # Audio Output Seam
//!
//! The scheduler talks to the output device through the `AudioOutput` trait:
//! a monotonic playback clock, a schedule-at-time primitive returning a
//! cancellable handle, and a stop primitive that tolerates handles that have
//! already finished. The production implementation sits on rodio with one
//! sink per scheduled chunk; tests use a mock with a manually advanced clock.

use crate::error::AppError;
use crate::playback::decoder::DecodedChunk;
use rodio::{OutputStream, OutputStreamHandle, Sink, Source};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// The playback device as the scheduler sees it.
pub trait AudioOutput {
    /// Current position of the playback clock. Monotonic, starts near zero
    /// when the output is created.
    fn position(&self) -> Duration;

    /// Schedule `chunk` to begin playing at `start` on this clock. Returns a
    /// handle usable with `stop`.
    fn schedule(&mut self, chunk: DecodedChunk, start: Duration) -> Result<u64, AppError>;

    /// Forcibly stop a scheduled playback. Stopping a handle that already
    /// finished (or never existed) is a no-op, not an error.
    fn stop(&mut self, handle: u64);
}

/// Plays scheduled chunks on the default output device.
///
/// Each handle owns its own `rodio::Sink`; the start offset is realized by
/// delay-padding the source, which keeps scheduling off the async runtime
/// entirely.
pub struct RodioOutput {
    _stream: OutputStream,
    handle: OutputStreamHandle,
    started: Instant,
    sinks: HashMap<u64, Sink>,
    next_id: u64,
}

impl RodioOutput {
    /// Open the default output device.
    pub fn new() -> Result<Self, AppError> {
        let (stream, handle) = OutputStream::try_default()
            .map_err(|e| AppError::Playback(format!("No output device: {}", e)))?;
        Ok(Self {
            _stream: stream,
            handle,
            started: Instant::now(),
            sinks: HashMap::new(),
            next_id: 0,
        })
    }
}

impl AudioOutput for RodioOutput {
    fn position(&self) -> Duration {
        self.started.elapsed()
    }

    fn schedule(&mut self, chunk: DecodedChunk, start: Duration) -> Result<u64, AppError> {
        let sink = Sink::try_new(&self.handle)
            .map_err(|e| AppError::Playback(format!("Sink creation failed: {}", e)))?;

        let delay = start.saturating_sub(self.position());
        let source =
            rodio::buffer::SamplesBuffer::new(chunk.channels, chunk.sample_rate, chunk.samples)
                .delay(delay);
        sink.append(source);

        let id = self.next_id;
        self.next_id += 1;
        self.sinks.insert(id, sink);
        debug!("Scheduled chunk {} with {:?} delay", id, delay);
        Ok(id)
    }

    fn stop(&mut self, handle: u64) {
        // Removing the sink drops it after stop; a missing handle means the
        // chunk already finished and was pruned.
        if let Some(sink) = self.sinks.remove(&handle) {
            sink.stop();
        }
    }
}
