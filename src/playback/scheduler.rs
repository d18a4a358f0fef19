//! # Playback Scheduling
//!
//! Plays an arbitrarily-ordered stream of audio chunks back-to-back with no
//! audible gap and no overlap, while supporting instantaneous full
//! cancellation (barge-in).
//!
//! ## Algorithm:
//! A monotonic `next_free` cursor marks the first unclaimed instant on the
//! playback clock, initialized to the clock's current position on first use.
//! Each arriving chunk is decoded, scheduled at
//! `max(next_free, now + lookahead)` (the lookahead absorbs decode and
//! scheduling jitter), and the cursor advances past the chunk's duration.
//! On a hard stop every live handle is cancelled and the cursor resets to the
//! *current* clock position (not zero) so the next chunk plays immediately
//! instead of at a stale future offset.

use crate::playback::decoder::{decode_chunk, DecodedChunk};
use crate::playback::output::AudioOutput;
use std::time::Duration;
use tracing::{debug, warn};

/// A scheduled chunk still considered live.
#[derive(Debug, Clone)]
struct LiveHandle {
    id: u64,
    ends_at: Duration,
}

/// Schedules decoded chunks for gapless sequential playback on an
/// `AudioOutput`. Owned exclusively by the session event loop.
pub struct PlaybackScheduler<O: AudioOutput> {
    output: O,
    lookahead: Duration,
    fallback_sample_rate: u32,
    /// First unclaimed instant on the playback clock. `None` until the first
    /// chunk arrives (or after construction/stop resets it lazily).
    next_free: Option<Duration>,
    live: Vec<LiveHandle>,
}

impl<O: AudioOutput> PlaybackScheduler<O> {
    pub fn new(output: O, lookahead: Duration, fallback_sample_rate: u32) -> Self {
        Self {
            output,
            lookahead,
            fallback_sample_rate,
            next_free: None,
            live: Vec::new(),
        }
    }

    /// Decode and schedule one inbound chunk.
    ///
    /// Returns whether the chunk was scheduled. A chunk that fails to decode
    /// or schedule is logged and dropped; one bad chunk must not stop the
    /// stream.
    pub fn enqueue(&mut self, bytes: &[u8]) -> bool {
        let chunk = match decode_chunk(bytes, self.fallback_sample_rate) {
            Ok(chunk) => chunk,
            Err(err) => {
                warn!("Dropping undecodable audio chunk ({} bytes): {}", bytes.len(), err);
                return false;
            }
        };
        self.schedule_decoded(chunk)
    }

    fn schedule_decoded(&mut self, chunk: DecodedChunk) -> bool {
        let now = self.output.position();
        self.prune_finished(now);

        let next_free = self.next_free.unwrap_or(now);
        let start = next_free.max(now + self.lookahead);
        let duration = chunk.duration();

        let id = match self.output.schedule(chunk, start) {
            Ok(id) => id,
            Err(err) => {
                warn!("Dropping unschedulable audio chunk: {}", err);
                return false;
            }
        };

        self.next_free = Some(start + duration);
        self.live.push(LiveHandle {
            id,
            ends_at: start + duration,
        });
        debug!(
            "Chunk {} scheduled at {:?} for {:?}, cursor now {:?}",
            id, start, duration, self.next_free
        );
        true
    }

    /// Hard stop: cancel every live handle and reset the cursor to the
    /// current clock position. Idempotent: stopping with nothing scheduled
    /// is a no-op.
    pub fn stop_all(&mut self) {
        let count = self.live.len();
        for handle in self.live.drain(..) {
            // Already-finished handles are tolerated by the output.
            self.output.stop(handle.id);
        }
        self.next_free = Some(self.output.position());
        if count > 0 {
            debug!("Playback stopped, {} handle(s) cancelled", count);
        }
    }

    /// Number of handles still considered live, after dropping naturally
    /// finished ones.
    pub fn active_handles(&mut self) -> usize {
        let now = self.output.position();
        self.prune_finished(now);
        self.live.len()
    }

    /// Handles whose playback interval has passed remove themselves from the
    /// live set to bound memory; the output is told so it can release the
    /// underlying resource.
    fn prune_finished(&mut self, now: Duration) {
        let mut i = 0;
        while i < self.live.len() {
            if self.live[i].ends_at <= now {
                let handle = self.live.swap_remove(i);
                self.output.stop(handle.id);
            } else {
                i += 1;
            }
        }
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut O {
        &mut self.output
    }
}
