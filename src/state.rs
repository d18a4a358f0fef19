//! # Session Metrics
//!
//! Lightweight in-process counters for one session. The dispatcher and the
//! event loop increment these as frames flow through; the teardown path logs
//! a snapshot so a dead session leaves a usable trace.
//!
//! ## Thread Safety:
//! Counters are atomics so the handful of spawned tasks (channel readers,
//! prune timers) could share them, but in practice all increments happen on
//! the session event loop.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one session's lifetime.
#[derive(Debug, Default)]
pub struct SessionMetrics {
    binary_frames: AtomicU64,
    text_frames: AtomicU64,
    chunks_scheduled: AtomicU64,
    chunks_dropped: AtomicU64,
    parse_failures: AtomicU64,
    unknown_tags: AtomicU64,
    interrupts_sent: AtomicU64,
    tool_events: AtomicU64,
    relay_broadcasts: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub binary_frames: u64,
    pub text_frames: u64,
    pub chunks_scheduled: u64,
    pub chunks_dropped: u64,
    pub parse_failures: u64,
    pub unknown_tags: u64,
    pub interrupts_sent: u64,
    pub tool_events: u64,
    pub relay_broadcasts: u64,
}

impl SessionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_binary_frame(&self) {
        self.binary_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_text_frame(&self) {
        self.text_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_chunk_scheduled(&self) {
        self.chunks_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_chunk_dropped(&self) {
        self.chunks_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_parse_failure(&self) {
        self.parse_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unknown_tag(&self) {
        self.unknown_tags.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_interrupt_sent(&self) {
        self.interrupts_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tool_event(&self) {
        self.tool_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_relay_broadcast(&self) {
        self.relay_broadcasts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            binary_frames: self.binary_frames.load(Ordering::Relaxed),
            text_frames: self.text_frames.load(Ordering::Relaxed),
            chunks_scheduled: self.chunks_scheduled.load(Ordering::Relaxed),
            chunks_dropped: self.chunks_dropped.load(Ordering::Relaxed),
            parse_failures: self.parse_failures.load(Ordering::Relaxed),
            unknown_tags: self.unknown_tags.load(Ordering::Relaxed),
            interrupts_sent: self.interrupts_sent.load(Ordering::Relaxed),
            tool_events: self.tool_events.load(Ordering::Relaxed),
            relay_broadcasts: self.relay_broadcasts.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = SessionMetrics::new();
        metrics.record_binary_frame();
        metrics.record_binary_frame();
        metrics.record_text_frame();
        metrics.record_interrupt_sent();

        let snap = metrics.snapshot();
        assert_eq!(snap.binary_frames, 2);
        assert_eq!(snap.text_frames, 1);
        assert_eq!(snap.interrupts_sent, 1);
        assert_eq!(snap.unknown_tags, 0);
    }
}
