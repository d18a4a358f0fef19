//! # Turn State Machine
//!
//! The conversation authority: decides who holds the floor, when to send an
//! interrupt, and how streamed assistant text becomes discrete utterances.
//!
//! ## State loop:
//! `Idle → Listening → AwaitingResponse → AssistantStreaming → Listening`,
//! with an unconditional drop back to `Idle` on stop or channel closure.
//! Tool activity is orthogonal and never touches the primary state.
//!
//! ## Barge-in:
//! Every non-empty interim recognition fragment is a potential barge-in
//! trigger. If the channel is open and at least the debounce window has
//! elapsed since the last interrupt, an interrupt is emitted regardless of
//! whether the agent is actually speaking. The remote side is responsible for
//! ignoring spurious interrupts; this is a deliberate simplification that
//! keeps round-trip decision logic off the client and bounds interrupt volume
//! under rapid partial updates.

use crate::transcript::{Speaker, Transcript};
use std::time::{Duration, Instant};
use tracing::debug;

/// Primary conversation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    /// No session activity; recognition is not being consumed.
    Idle,
    /// Consuming recognition callbacks, waiting for the user to finish.
    Listening,
    /// User input sent; waiting for the agent's first fragment.
    AwaitingResponse,
    /// Assistant text is streaming in.
    AssistantStreaming,
}

impl TurnState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnState::Idle => "idle",
            TurnState::Listening => "listening",
            TurnState::AwaitingResponse => "awaiting_response",
            TurnState::AssistantStreaming => "assistant_streaming",
        }
    }
}

/// Outbound actions the state machine asks the session to perform. The engine
/// itself never touches I/O, so every handler returns without suspending.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnAction {
    /// Send `{"type": "interrupt"}` on the primary channel.
    SendInterrupt,
    /// Send the finalized user utterance as the next conversational input.
    SendUserText(String),
}

/// The turn-taking engine. Owned exclusively by the session event loop;
/// single-threaded by construction.
pub struct TurnEngine {
    state: TurnState,
    channel_open: bool,
    /// When the last interrupt was sent, for debouncing. The signal itself is
    /// not retained.
    last_interrupt: Option<Instant>,
    debounce: Duration,
}

impl TurnEngine {
    pub fn new(debounce: Duration) -> Self {
        Self {
            state: TurnState::Idle,
            channel_open: false,
            last_interrupt: None,
            debounce,
        }
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    /// The session tells the engine whether the primary channel is usable;
    /// the barge-in gate consults this.
    pub fn set_channel_open(&mut self, open: bool) {
        self.channel_open = open;
    }

    /// Session start: begin consuming recognition callbacks.
    ///
    /// ## State Transition:
    /// Idle → Listening
    pub fn start_listening(&mut self) {
        self.state = TurnState::Listening;
    }

    /// An interim (non-final) recognition fragment arrived.
    ///
    /// The fragment opens (or replaces) the streaming User entry, so the
    /// user's turn exists in the transcript from its first fragment.
    /// Returns `SendInterrupt` when the fragment is non-empty, the channel is
    /// open, and the debounce window has elapsed. Known race, kept by design:
    /// the interrupt fires on speech onset, not on confirmed floor ownership.
    pub fn on_interim(
        &mut self,
        text: &str,
        now: Instant,
        transcript: &mut Transcript,
    ) -> Option<TurnAction> {
        if self.state == TurnState::Idle {
            return None;
        }
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        transcript.upsert_streaming(Speaker::User, text);
        if !self.channel_open {
            return None;
        }
        if let Some(last) = self.last_interrupt {
            if now.duration_since(last) < self.debounce {
                return None;
            }
        }
        self.last_interrupt = Some(now);
        debug!("Speech onset detected, emitting interrupt");
        Some(TurnAction::SendInterrupt)
    }

    /// A final recognition result arrived: freeze the user's streaming
    /// utterance (or append one if no interim preceded it) and hand the
    /// floor to the agent.
    ///
    /// ## State Transition:
    /// Listening/AssistantStreaming/AwaitingResponse → AwaitingResponse
    pub fn on_final(&mut self, text: &str, transcript: &mut Transcript) -> Option<TurnAction> {
        if self.state == TurnState::Idle {
            return None;
        }
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        transcript.finalize_streaming(Speaker::User, text);
        self.state = TurnState::AwaitingResponse;
        Some(TurnAction::SendUserText(text.to_string()))
    }

    /// Streaming assistant text: append/replace the trailing assistant
    /// utterance and hold the floor for the agent.
    pub fn on_assistant_streaming(&mut self, content: &str, transcript: &mut Transcript) {
        if self.state == TurnState::Idle {
            return;
        }
        transcript.upsert_streaming(Speaker::Assistant, content);
        self.state = TurnState::AssistantStreaming;
    }

    /// Terminal assistant message: freeze the streaming utterance and return
    /// the floor to the user.
    ///
    /// ## State Transition:
    /// AssistantStreaming/AwaitingResponse → Listening
    pub fn on_assistant_final(&mut self, content: &str, transcript: &mut Transcript) {
        if self.state == TurnState::Idle {
            return;
        }
        transcript.finalize_streaming(Speaker::Assistant, content);
        self.state = TurnState::Listening;
    }

    /// Unconditional reset, from any state.
    ///
    /// ## State Transition:
    /// * → Idle
    pub fn reset(&mut self) {
        self.state = TurnState::Idle;
        self.channel_open = false;
        self.last_interrupt = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> TurnEngine {
        let mut e = TurnEngine::new(Duration::from_millis(1000));
        e.start_listening();
        e.set_channel_open(true);
        e
    }

    /// Interims at t, t+200ms, t+400ms send one interrupt; t+1100ms sends a
    /// second one.
    #[test]
    fn test_interrupt_debounce() {
        let mut e = engine();
        let mut transcript = Transcript::new();
        let t0 = Instant::now();

        assert_eq!(
            e.on_interim("hey", t0, &mut transcript),
            Some(TurnAction::SendInterrupt)
        );
        assert_eq!(
            e.on_interim("hey th", t0 + Duration::from_millis(200), &mut transcript),
            None
        );
        assert_eq!(
            e.on_interim("hey the", t0 + Duration::from_millis(400), &mut transcript),
            None
        );
        assert_eq!(
            e.on_interim("hey there", t0 + Duration::from_millis(1100), &mut transcript),
            Some(TurnAction::SendInterrupt)
        );
    }

    #[test]
    fn test_no_interrupt_for_empty_or_closed() {
        let mut e = engine();
        let mut transcript = Transcript::new();
        let t0 = Instant::now();
        assert_eq!(e.on_interim("   ", t0, &mut transcript), None);
        assert!(transcript.is_empty());

        e.set_channel_open(false);
        assert_eq!(e.on_interim("hello", t0, &mut transcript), None);
    }

    /// Interim fragments open one streaming User entry and keep replacing
    /// its text; the final result freezes it in place. Debounced fragments
    /// still update the entry.
    #[test]
    fn test_interims_stream_into_one_user_entry() {
        let mut e = engine();
        let mut transcript = Transcript::new();
        let t0 = Instant::now();

        e.on_interim("re", t0, &mut transcript);
        e.on_interim("refill my", t0 + Duration::from_millis(200), &mut transcript);
        assert_eq!(transcript.len(), 1);
        assert!(transcript.entries()[0].streaming);
        assert_eq!(transcript.entries()[0].text, "refill my");

        e.on_final("refill my prescription", &mut transcript);
        assert_eq!(transcript.len(), 1);
        assert!(!transcript.entries()[0].streaming);
        assert_eq!(transcript.entries()[0].text, "refill my prescription");
        assert_eq!(
            transcript.entries()[0].kind,
            crate::transcript::EntryKind::Speech(Speaker::User)
        );
    }

    #[test]
    fn test_final_transitions_to_awaiting() {
        let mut e = engine();
        let mut transcript = Transcript::new();

        let action = e.on_final("  refill my prescription ", &mut transcript);
        assert_eq!(
            action,
            Some(TurnAction::SendUserText("refill my prescription".to_string()))
        );
        assert_eq!(e.state(), TurnState::AwaitingResponse);
        assert_eq!(transcript.len(), 1);

        // Empty finals are ignored and do not move the state.
        assert_eq!(e.on_final("", &mut transcript), None);
        assert_eq!(e.state(), TurnState::AwaitingResponse);
    }

    #[test]
    fn test_assistant_stream_and_finalize_loop() {
        let mut e = engine();
        let mut transcript = Transcript::new();

        e.on_final("hello", &mut transcript);
        e.on_assistant_streaming("Hel", &mut transcript);
        assert_eq!(e.state(), TurnState::AssistantStreaming);
        e.on_assistant_streaming("Hello wor", &mut transcript);
        e.on_assistant_final("Hello world", &mut transcript);

        assert_eq!(e.state(), TurnState::Listening);
        // User final + one assistant utterance.
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.entries()[1].text, "Hello world");
    }

    #[test]
    fn test_reset_from_any_state() {
        let mut e = engine();
        let mut transcript = Transcript::new();
        e.on_final("hi", &mut transcript);
        e.on_assistant_streaming("answer", &mut transcript);

        e.reset();
        assert_eq!(e.state(), TurnState::Idle);

        // Idle ignores everything until the next session starts.
        assert_eq!(e.on_interim("more speech", Instant::now(), &mut transcript), None);
        e.on_assistant_streaming("stale fragment", &mut transcript);
        assert_eq!(e.state(), TurnState::Idle);
    }
}
