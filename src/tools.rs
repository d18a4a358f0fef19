//! # Tool Invocation Tracking
//!
//! Maintains the lifecycle of zero or more concurrently announced tool calls
//! (start → progress → end), independent of the primary turn state.
//!
//! ## Correlation:
//! No server-issued id is guaranteed unique across concurrent calls of the
//! same tool, so invocations are keyed by name + start timestamp and
//! progress/end events match the most recent unresolved entry for that name.
//! This is best-effort by design, not a strict unique-id join.
//!
//! ## Active-set pruning:
//! A finished invocation stays in the active set for a short linger period so
//! consumers can show a completion flash; its transcript entry is permanent.

use crate::transcript::Transcript;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Lifecycle status of one tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolStatus {
    Running,
    Succeeded,
    Failed,
}

impl ToolStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolStatus::Running => "running",
            ToolStatus::Succeeded => "succeeded",
            ToolStatus::Failed => "failed",
        }
    }
}

/// One announced tool call.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub name: String,
    /// Start instant; together with `name` this is the correlation key.
    pub started_at: Instant,
    pub started_wall: DateTime<Utc>,
    pub status: ToolStatus,
    /// Last known progress percentage.
    pub progress_pct: Option<u8>,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub elapsed_ms: Option<f64>,
    /// Index of this invocation's transcript entry.
    pub entry_index: usize,
    /// When a terminal status was reached; drives active-set pruning.
    resolved_at: Option<Instant>,
}

/// Tracks the set of currently interesting tool invocations. Owned
/// exclusively by the session event loop.
pub struct ToolTracker {
    active: Vec<ToolInvocation>,
    linger: Duration,
}

impl ToolTracker {
    pub fn new(linger: Duration) -> Self {
        Self {
            active: Vec::new(),
            linger,
        }
    }

    /// A `tool_start` frame arrived: record the invocation and append its
    /// placeholder transcript entry.
    pub fn on_start(&mut self, name: &str, now: Instant, transcript: &mut Transcript) {
        let entry_index = transcript.push_tool(name, format!("{}: running...", name));
        debug!("Tool started: {}", name);
        self.active.push(ToolInvocation {
            name: name.to_string(),
            started_at: now,
            started_wall: Utc::now(),
            status: ToolStatus::Running,
            progress_pct: None,
            result: None,
            error: None,
            elapsed_ms: None,
            entry_index,
            resolved_at: None,
        });
    }

    /// A `tool_progress` frame arrived: update the most recent running
    /// invocation of that name. Unmatched progress is logged and dropped.
    pub fn on_progress(
        &mut self,
        name: &str,
        pct: Option<u8>,
        note: Option<&str>,
        transcript: &mut Transcript,
    ) {
        let Some(inv) = self.latest_running_mut(name) else {
            warn!("Progress for unknown tool '{}' ignored", name);
            return;
        };
        inv.progress_pct = pct;
        let text = match (pct, note) {
            (Some(pct), Some(note)) => format!("{}: {}% ({})", name, pct, note),
            (Some(pct), None) => format!("{}: {}%", name, pct),
            (None, Some(note)) => format!("{}: {}", name, note),
            (None, None) => format!("{}: in progress", name),
        };
        let entry_index = inv.entry_index;
        transcript.set_text(entry_index, text);
    }

    /// A `tool_end` frame arrived: set the terminal status, rewrite the
    /// transcript entry with a summary, and stamp the invocation for pruning.
    ///
    /// Returns whether an invocation was resolved, so the caller only
    /// schedules a prune when there is something to prune.
    pub fn on_end(
        &mut self,
        name: &str,
        status: &str,
        result: Option<Value>,
        error: Option<String>,
        elapsed_ms: Option<f64>,
        now: Instant,
        transcript: &mut Transcript,
    ) -> bool {
        let Some(inv) = self.latest_running_mut(name) else {
            warn!("End event for unknown tool '{}' ignored", name);
            return false;
        };
        let succeeded = status.eq_ignore_ascii_case("success");
        inv.status = if succeeded { ToolStatus::Succeeded } else { ToolStatus::Failed };
        inv.result = result;
        inv.error = error;
        inv.elapsed_ms = elapsed_ms;
        inv.resolved_at = Some(now);

        let elapsed = elapsed_ms.map(|ms| format!(" in {:.0} ms", ms)).unwrap_or_default();
        let text = if succeeded {
            format!("{}: succeeded{}", name, elapsed)
        } else {
            let reason = inv.error.as_deref().unwrap_or("unknown error");
            format!("{}: failed{} ({})", name, elapsed, reason)
        };
        let entry_index = inv.entry_index;
        transcript.set_text(entry_index, text);
        debug!("Tool finished: {} ({})", name, status);
        true
    }

    /// Drop invocations that reached a terminal status at least the linger
    /// period ago. Transcript entries are untouched.
    pub fn prune(&mut self, now: Instant) {
        let linger = self.linger;
        self.active.retain(|inv| match inv.resolved_at {
            Some(resolved) => now.duration_since(resolved) < linger,
            None => true,
        });
    }

    /// Session teardown: forget everything currently tracked.
    pub fn clear(&mut self) {
        self.active.clear();
    }

    pub fn active(&self) -> &[ToolInvocation] {
        &self.active
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn running_count(&self) -> usize {
        self.active
            .iter()
            .filter(|inv| inv.status == ToolStatus::Running)
            .count()
    }

    /// Most recent unresolved invocation matching `name`.
    fn latest_running_mut(&mut self, name: &str) -> Option<&mut ToolInvocation> {
        self.active
            .iter_mut()
            .rev()
            .find(|inv| inv.status == ToolStatus::Running && inv.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> ToolTracker {
        ToolTracker::new(Duration::from_millis(2000))
    }

    /// start → progress(50) → end(success) yields exactly one transcript
    /// entry transitioning placeholder → 50% → success summary, and the
    /// active set empties after the linger delay.
    #[test]
    fn test_tool_correlation_scenario() {
        let mut tools = tracker();
        let mut transcript = Transcript::new();
        let t0 = Instant::now();

        tools.on_start("lookup", t0, &mut transcript);
        assert_eq!(transcript.len(), 1);
        assert!(transcript.entries()[0].text.contains("running"));

        tools.on_progress("lookup", Some(50), None, &mut transcript);
        assert_eq!(transcript.len(), 1);
        assert!(transcript.entries()[0].text.contains("50%"));

        tools.on_end(
            "lookup",
            "success",
            Some(serde_json::json!({"rows": 3})),
            None,
            Some(120.0),
            t0 + Duration::from_millis(120),
            &mut transcript,
        );
        assert_eq!(transcript.len(), 1);
        assert!(transcript.entries()[0].text.contains("succeeded"));
        assert_eq!(tools.active_count(), 1);

        // Still lingering just before the delay elapses, gone after.
        tools.prune(t0 + Duration::from_millis(1000));
        assert_eq!(tools.active_count(), 1);
        tools.prune(t0 + Duration::from_millis(120) + Duration::from_millis(2000));
        assert_eq!(tools.active_count(), 0);
        assert_eq!(transcript.len(), 1);
    }

    /// Two concurrent invocations of the same tool: events match the most
    /// recent unresolved entry.
    #[test]
    fn test_same_name_concurrent_matching() {
        let mut tools = tracker();
        let mut transcript = Transcript::new();
        let t0 = Instant::now();

        tools.on_start("lookup", t0, &mut transcript);
        tools.on_start("lookup", t0 + Duration::from_millis(10), &mut transcript);
        assert_eq!(tools.running_count(), 2);

        // Progress lands on the second (most recent) invocation.
        tools.on_progress("lookup", Some(80), None, &mut transcript);
        assert!(transcript.entries()[1].text.contains("80%"));
        assert!(transcript.entries()[0].text.contains("running"));

        // First end resolves the most recent; second end falls through to the
        // older one.
        tools.on_end("lookup", "success", None, None, None, t0, &mut transcript);
        assert_eq!(tools.running_count(), 1);
        tools.on_end("lookup", "error", None, Some("timeout".to_string()), None, t0, &mut transcript);
        assert_eq!(tools.running_count(), 0);
        assert!(transcript.entries()[0].text.contains("failed"));
    }

    #[test]
    fn test_unmatched_events_are_ignored() {
        let mut tools = tracker();
        let mut transcript = Transcript::new();

        tools.on_progress("ghost", Some(10), None, &mut transcript);
        let resolved =
            tools.on_end("ghost", "success", None, None, None, Instant::now(), &mut transcript);
        assert!(!resolved);
        assert!(transcript.is_empty());
        assert_eq!(tools.active_count(), 0);
    }

    #[test]
    fn test_failure_summary_includes_error() {
        let mut tools = tracker();
        let mut transcript = Transcript::new();
        let t0 = Instant::now();

        tools.on_start("escalate", t0, &mut transcript);
        tools.on_end(
            "escalate",
            "error",
            None,
            Some("no agents available".to_string()),
            Some(45.0),
            t0,
            &mut transcript,
        );
        let text = &transcript.entries()[0].text;
        assert!(text.contains("failed"));
        assert!(text.contains("no agents available"));
    }

    #[test]
    fn test_clear_empties_active_set() {
        let mut tools = tracker();
        let mut transcript = Transcript::new();
        tools.on_start("lookup", Instant::now(), &mut transcript);
        tools.clear();
        assert_eq!(tools.active_count(), 0);
    }
}
