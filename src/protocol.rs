//! # Wire Protocol
//!
//! Frame types exchanged with the remote agent over the conversation channels.
//!
//! ## Message Format:
//! - **Server → Client**: JSON text frames tagged by a `type` field, plus raw
//!   binary frames carrying encoded audio (no header framing beyond the
//!   transport's own message boundary).
//! - **Client → Server**: `{"type": "interrupt"}` and `{"text": "..."}`.
//! - **Relay**: tool-tagged frames identical to the primary channel, or
//!   untagged `{"message": ..., "sender": ...}` broadcasts from the bridged
//!   call, which become foreign-speaker transcript entries.
//!
//! Unknown tags must never crash dispatch; the dispatcher inspects the `type`
//! field before attempting a typed parse so forward-compatible frames are
//! logged and dropped instead of erroring.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which channel an inbound frame arrived on.
///
/// Frames on a single channel are delivered in send order; across the two
/// channels no ordering is guaranteed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrigin {
    /// The main conversation channel, opened when a session starts.
    Primary,
    /// The optional relay channel, opened when a phone call is bridged in.
    Relay,
}

impl ChannelOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelOrigin::Primary => "primary",
            ChannelOrigin::Relay => "relay",
        }
    }
}

/// A raw inbound frame before classification.
#[derive(Debug, Clone)]
pub enum InboundFrame {
    /// Encoded audio payload, forwarded verbatim to the playback scheduler.
    Audio(Vec<u8>),
    /// Structured payload, parsed and routed by tag.
    Text(String),
}

/// Structured frames recognized from the remote agent.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ServerFrame {
    /// Partial assistant text; replaces the trailing streaming utterance.
    #[serde(rename = "assistant_streaming")]
    AssistantStreaming { content: String },

    /// Final assistant text; closes the streaming utterance.
    #[serde(rename = "assistant")]
    AssistantFinal { content: String },

    /// Status line from the agent (greetings, notices); terminal for the turn.
    #[serde(rename = "status")]
    Status { message: String },

    /// The agent is ending the conversation.
    #[serde(rename = "exit")]
    Exit { message: String },

    /// Relay-side interrupt broadcast: someone on the bridged call spoke over
    /// the agent. Becomes a foreign-speaker transcript entry.
    #[serde(rename = "interrupt")]
    RelayInterrupt {
        #[serde(default = "default_sender")]
        sender: String,
        message: String,
    },

    /// A tool invocation was announced.
    #[serde(rename = "tool_start")]
    ToolStart {
        tool: String,
        #[serde(rename = "callId")]
        call_id: Option<String>,
        #[serde(default)]
        args: Option<Value>,
    },

    /// Progress update for a running tool.
    #[serde(rename = "tool_progress")]
    ToolProgress {
        tool: String,
        pct: Option<u8>,
        #[serde(default)]
        note: Option<String>,
    },

    /// Terminal event for a tool invocation.
    #[serde(rename = "tool_end")]
    ToolEnd {
        tool: String,
        status: String,
        #[serde(default)]
        result: Option<Value>,
        #[serde(default)]
        error: Option<String>,
        #[serde(default)]
        elapsed_ms: Option<f64>,
    },
}

/// Untagged broadcast from the relay channel: a transcript line attributed to
/// a foreign speaker on the bridged call.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayBroadcast {
    pub message: String,
    #[serde(default = "default_sender")]
    pub sender: String,
}

fn default_sender() -> String {
    "system".to_string()
}

/// Messages sent to the remote agent.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    /// Barge-in signal. Debounced by the turn state machine; the remote side
    /// ignores interrupts when it has nothing to interrupt.
    Interrupt,
    /// A finalized user utterance, the next conversational input.
    UserText(String),
}

impl OutboundMessage {
    /// Serialize to the wire form.
    pub fn to_json(&self) -> String {
        match self {
            OutboundMessage::Interrupt => serde_json::json!({ "type": "interrupt" }).to_string(),
            OutboundMessage::UserText(text) => serde_json::json!({ "text": text }).to_string(),
        }
    }
}

/// Request body for the out-of-band call-initiation POST.
#[derive(Debug, Serialize)]
pub struct CallRequest {
    pub target_number: String,
}

/// Response body from a successful call initiation.
#[derive(Debug, Deserialize)]
pub struct CallResponse {
    #[serde(rename = "callId")]
    pub call_id: String,
}
