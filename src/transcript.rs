//! # Conversation Transcript
//!
//! The ordered record of everything said (or done) during a session.
//!
//! ## Streaming-replace invariant:
//! At most one streaming entry exists per speaker-turn. A new streaming chunk
//! for the same turn replaces the prior partial text of the last streaming
//! entry rather than appending a new one; the terminal message for the turn
//! freezes it. Tool events may interleave with streaming text, so the lookup
//! scans backwards for the matching streaming entry instead of assuming it is
//! the last entry.

use chrono::{DateTime, Utc};

/// Who produced a speech entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Speaker {
    User,
    Assistant,
    /// A participant on the bridged call, labeled by the relay's sender field.
    Foreign(String),
}

/// What kind of entry this is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    /// A conversational turn by a speaker.
    Speech(Speaker),
    /// A tool-originated observability line, not a speaker turn.
    Tool(String),
}

/// One line of the transcript.
#[derive(Debug, Clone)]
pub struct TranscriptEntry {
    pub kind: EntryKind,
    /// Mutable while `streaming` is set, frozen afterwards.
    pub text: String,
    pub streaming: bool,
    pub at: DateTime<Utc>,
}

/// The ordered transcript of a session. Entries are never removed; tool
/// entries stay even after the tracker prunes its active set.
#[derive(Debug, Default)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a finalized (non-streaming) speech entry.
    pub fn push_final(&mut self, speaker: Speaker, text: impl Into<String>) {
        self.entries.push(TranscriptEntry {
            kind: EntryKind::Speech(speaker),
            text: text.into(),
            streaming: false,
            at: Utc::now(),
        });
    }

    /// Append or replace the streaming entry for `speaker`.
    ///
    /// If a streaming entry for this speaker already exists it gets the new
    /// text; otherwise a fresh streaming entry is appended.
    pub fn upsert_streaming(&mut self, speaker: Speaker, text: impl Into<String>) {
        let text = text.into();
        if let Some(entry) = self.streaming_entry_mut(&speaker) {
            entry.text = text;
            return;
        }
        self.entries.push(TranscriptEntry {
            kind: EntryKind::Speech(speaker),
            text,
            streaming: true,
            at: Utc::now(),
        });
    }

    /// Finalize the streaming entry for `speaker` with its terminal text.
    ///
    /// If no streaming entry exists (the terminal message arrived without any
    /// partials) a frozen entry is appended instead.
    pub fn finalize_streaming(&mut self, speaker: Speaker, text: impl Into<String>) {
        let text = text.into();
        if let Some(entry) = self.streaming_entry_mut(&speaker) {
            entry.text = text;
            entry.streaming = false;
            return;
        }
        self.push_final(speaker, text);
    }

    /// Append a tool-originated entry; returns its index so the tool tracker
    /// can rewrite it on progress and completion.
    pub fn push_tool(&mut self, name: impl Into<String>, text: impl Into<String>) -> usize {
        self.entries.push(TranscriptEntry {
            kind: EntryKind::Tool(name.into()),
            text: text.into(),
            streaming: false,
            at: Utc::now(),
        });
        self.entries.len() - 1
    }

    /// Rewrite the text of an existing entry (tool progress/end updates).
    pub fn set_text(&mut self, index: usize, text: impl Into<String>) {
        if let Some(entry) = self.entries.get_mut(index) {
            entry.text = text.into();
        }
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn streaming_entry_mut(&mut self, speaker: &Speaker) -> Option<&mut TranscriptEntry> {
        self.entries
            .iter_mut()
            .rev()
            .find(|e| e.streaming && e.kind == EntryKind::Speech(speaker.clone()))
    }
}
