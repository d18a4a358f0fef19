//! # Message Dispatch
//!
//! Classifies each inbound channel frame and routes it to the playback
//! scheduler, the tool tracker, or the turn state machine.
//!
//! ## Dispatch rules, in priority order:
//! 1. Binary payload → scheduler, verbatim
//! 2. Unparseable text → logged, discarded
//! 3. Streaming-text tag → turn machine, partial update
//! 4. Final-text/status tags → turn machine, finalizing update
//! 5. Tool lifecycle tags → tool tracker
//! 6. Untagged relay broadcast → foreign-speaker transcript entry
//! 7. Anything else → logged, no state change
//!
//! Dispatch is a pure routing step: synchronous, non-blocking, and every
//! downstream handler returns without suspending. Unknown tags must never
//! crash it.

use crate::playback::output::AudioOutput;
use crate::protocol::{ChannelOrigin, InboundFrame, RelayBroadcast, ServerFrame};
use crate::session::SessionCore;
use crate::transcript::Speaker;
use std::time::Instant;
use tracing::warn;

/// What the session loop needs to know after routing one frame.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// A tool reached a terminal status; schedule an active-set prune.
    pub tool_resolved: bool,
    /// The agent sent an `exit` frame; stop the session after this frame.
    pub exit_requested: bool,
}

/// Route one inbound frame into the session's components.
pub fn dispatch<O: AudioOutput>(
    core: &mut SessionCore<O>,
    origin: ChannelOrigin,
    frame: InboundFrame,
) -> DispatchOutcome {
    let mut outcome = DispatchOutcome::default();

    match frame {
        InboundFrame::Audio(bytes) => {
            core.metrics.record_binary_frame();
            if core.scheduler.enqueue(&bytes) {
                core.metrics.record_chunk_scheduled();
            } else {
                core.metrics.record_chunk_dropped();
            }
        }
        InboundFrame::Text(text) => {
            core.metrics.record_text_frame();
            dispatch_text(core, origin, &text, &mut outcome);
        }
    }

    outcome
}

fn dispatch_text<O: AudioOutput>(
    core: &mut SessionCore<O>,
    origin: ChannelOrigin,
    text: &str,
    outcome: &mut DispatchOutcome,
) {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(err) => {
            core.metrics.record_parse_failure();
            warn!("Discarding malformed frame on {} channel: {}", origin.as_str(), err);
            return;
        }
    };

    // Tagged records carry a `type`; relay broadcasts do not.
    if value.get("type").is_some() {
        match serde_json::from_value::<ServerFrame>(value.clone()) {
            Ok(frame) => route_server_frame(core, frame, outcome),
            Err(_) => {
                let tag = value
                    .get("type")
                    .and_then(|t| t.as_str())
                    .unwrap_or("<non-string>");
                core.metrics.record_unknown_tag();
                warn!("Ignoring unrecognized frame tag '{}' on {} channel", tag, origin.as_str());
            }
        }
        return;
    }

    match serde_json::from_value::<RelayBroadcast>(value) {
        Ok(broadcast) => {
            core.metrics.record_relay_broadcast();
            core.transcript
                .push_final(Speaker::Foreign(broadcast.sender), broadcast.message);
        }
        Err(_) => {
            core.metrics.record_unknown_tag();
            warn!("Ignoring untagged frame of unknown shape on {} channel", origin.as_str());
        }
    }
}

fn route_server_frame<O: AudioOutput>(
    core: &mut SessionCore<O>,
    frame: ServerFrame,
    outcome: &mut DispatchOutcome,
) {
    match frame {
        ServerFrame::AssistantStreaming { content } => {
            core.turn.on_assistant_streaming(&content, &mut core.transcript);
        }
        ServerFrame::AssistantFinal { content } => {
            core.turn.on_assistant_final(&content, &mut core.transcript);
        }
        ServerFrame::Status { message } => {
            core.turn.on_assistant_final(&message, &mut core.transcript);
        }
        ServerFrame::Exit { message } => {
            core.turn.on_assistant_final(&message, &mut core.transcript);
            outcome.exit_requested = true;
        }
        ServerFrame::RelayInterrupt { sender, message } => {
            core.metrics.record_relay_broadcast();
            core.transcript.push_final(Speaker::Foreign(sender), message);
        }
        ServerFrame::ToolStart { tool, .. } => {
            core.metrics.record_tool_event();
            core.tools.on_start(&tool, Instant::now(), &mut core.transcript);
        }
        ServerFrame::ToolProgress { tool, pct, note } => {
            core.metrics.record_tool_event();
            core.tools
                .on_progress(&tool, pct, note.as_deref(), &mut core.transcript);
        }
        ServerFrame::ToolEnd { tool, status, result, error, elapsed_ms } => {
            core.metrics.record_tool_event();
            outcome.tool_resolved = core.tools.on_end(
                &tool,
                &status,
                result,
                error,
                elapsed_ms,
                Instant::now(),
                &mut core.transcript,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::playback::output::mock::MockOutput;
    use crate::turn::TurnState;

    fn core() -> SessionCore<MockOutput> {
        let config = AppConfig::default();
        let mut core = SessionCore::new(&config, MockOutput::new());
        core.turn.start_listening();
        core.turn.set_channel_open(true);
        core
    }

    fn text_frame(json: &str) -> InboundFrame {
        InboundFrame::Text(json.to_string())
    }

    #[test]
    fn test_binary_routes_to_scheduler() {
        let mut core = core();
        dispatch(&mut core, ChannelOrigin::Primary, InboundFrame::Audio(vec![0u8; 3200]));

        assert_eq!(core.scheduler.active_handles(), 1);
        let snap = core.metrics.snapshot();
        assert_eq!(snap.binary_frames, 1);
        assert_eq!(snap.chunks_scheduled, 1);
    }

    #[test]
    fn test_streaming_then_final_yields_one_utterance() {
        let mut core = core();
        for fragment in ["Hel", "Hello", "Hello wor"] {
            let json = format!(r#"{{"type": "assistant_streaming", "content": "{}"}}"#, fragment);
            dispatch(&mut core, ChannelOrigin::Primary, text_frame(&json));
        }
        assert_eq!(core.turn.state(), TurnState::AssistantStreaming);

        dispatch(
            &mut core,
            ChannelOrigin::Primary,
            text_frame(r#"{"type": "assistant", "content": "Hello world"}"#),
        );

        assert_eq!(core.turn.state(), TurnState::Listening);
        assert_eq!(core.transcript.len(), 1);
        assert_eq!(core.transcript.entries()[0].text, "Hello world");
    }

    /// `{"type": "future_feature"}` must not throw, must not alter state, and
    /// must be counted as observably logged.
    #[test]
    fn test_unknown_tag_robustness() {
        let mut core = core();
        let state_before = core.turn.state();

        let outcome = dispatch(
            &mut core,
            ChannelOrigin::Primary,
            text_frame(r#"{"type": "future_feature"}"#),
        );

        assert_eq!(outcome, DispatchOutcome::default());
        assert_eq!(core.turn.state(), state_before);
        assert!(core.transcript.is_empty());
        assert_eq!(core.tools.active_count(), 0);
        assert_eq!(core.scheduler.active_handles(), 0);
        assert_eq!(core.metrics.snapshot().unknown_tags, 1);
    }

    #[test]
    fn test_malformed_text_discarded() {
        let mut core = core();
        dispatch(&mut core, ChannelOrigin::Primary, text_frame("{not json"));

        assert_eq!(core.metrics.snapshot().parse_failures, 1);
        assert!(core.transcript.is_empty());
    }

    #[test]
    fn test_tool_lifecycle_via_dispatch() {
        let mut core = core();
        dispatch(
            &mut core,
            ChannelOrigin::Primary,
            text_frame(r#"{"type": "tool_start", "tool": "lookup", "callId": "c1"}"#),
        );
        dispatch(
            &mut core,
            ChannelOrigin::Primary,
            text_frame(r#"{"type": "tool_progress", "tool": "lookup", "pct": 50}"#),
        );
        let outcome = dispatch(
            &mut core,
            ChannelOrigin::Primary,
            text_frame(
                r#"{"type": "tool_end", "tool": "lookup", "status": "success", "elapsed_ms": 120}"#,
            ),
        );

        assert!(outcome.tool_resolved);
        assert_eq!(core.transcript.len(), 1);
        assert!(core.transcript.entries()[0].text.contains("succeeded"));
        assert_eq!(core.metrics.snapshot().tool_events, 3);
    }

    /// Tool frames may interleave with streaming text without touching the
    /// primary turn state.
    #[test]
    fn test_tool_frames_leave_turn_state_alone() {
        let mut core = core();
        dispatch(
            &mut core,
            ChannelOrigin::Primary,
            text_frame(r#"{"type": "assistant_streaming", "content": "Checking"}"#),
        );
        dispatch(
            &mut core,
            ChannelOrigin::Primary,
            text_frame(r#"{"type": "tool_start", "tool": "lookup"}"#),
        );
        assert_eq!(core.turn.state(), TurnState::AssistantStreaming);
        assert_eq!(core.transcript.len(), 2);
    }

    #[test]
    fn test_relay_broadcast_becomes_foreign_entry() {
        let mut core = core();
        dispatch(
            &mut core,
            ChannelOrigin::Relay,
            text_frame(r#"{"message": "Call connected", "sender": "system"}"#),
        );

        assert_eq!(core.transcript.len(), 1);
        assert_eq!(
            core.transcript.entries()[0].kind,
            crate::transcript::EntryKind::Speech(Speaker::Foreign("system".to_string()))
        );
        assert_eq!(core.metrics.snapshot().relay_broadcasts, 1);
    }

    /// A `tool_end` that matches no running invocation must not ask the loop
    /// to schedule a prune.
    #[test]
    fn test_unmatched_tool_end_schedules_no_prune() {
        let mut core = core();
        let outcome = dispatch(
            &mut core,
            ChannelOrigin::Primary,
            text_frame(r#"{"type": "tool_end", "tool": "ghost", "status": "success"}"#),
        );

        assert!(!outcome.tool_resolved);
        assert_eq!(core.tools.active_count(), 0);
    }

    /// An interrupt broadcast from the bridged call lands in the transcript
    /// as a foreign speaker, leaving the turn state alone.
    #[test]
    fn test_relay_interrupt_becomes_foreign_entry() {
        let mut core = core();
        let state_before = core.turn.state();
        dispatch(
            &mut core,
            ChannelOrigin::Relay,
            text_frame(r#"{"type": "interrupt", "sender": "caller", "message": "wait"}"#),
        );

        assert_eq!(core.turn.state(), state_before);
        assert_eq!(
            core.transcript.entries()[0].kind,
            crate::transcript::EntryKind::Speech(Speaker::Foreign("caller".to_string()))
        );
    }

    /// Relay frames carrying tool tags hit the same tool pipeline as the
    /// primary channel.
    #[test]
    fn test_relay_tool_frames_share_pipeline() {
        let mut core = core();
        dispatch(
            &mut core,
            ChannelOrigin::Relay,
            text_frame(r#"{"type": "tool_start", "tool": "authenticate_user"}"#),
        );
        assert_eq!(core.tools.active_count(), 1);
    }

    #[test]
    fn test_exit_frame_requests_stop() {
        let mut core = core();
        let outcome = dispatch(
            &mut core,
            ChannelOrigin::Primary,
            text_frame(r#"{"type": "exit", "message": "Goodbye."}"#),
        );

        assert!(outcome.exit_requested);
        assert_eq!(core.transcript.entries()[0].text, "Goodbye.");
        assert_eq!(core.turn.state(), TurnState::Listening);
    }
}
