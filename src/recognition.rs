//! # Speech Recognition Seam
//!
//! The recognition engine is an external collaborator: this client only
//! consumes its interim/final callbacks. The `SpeechRecognizer` trait adapts
//! whatever engine is in use (cloud speech SDK, local model, test stub) to a
//! plain event stream the session loop can merge with channel traffic.

use crate::error::AppError;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;
use tracing::debug;

/// One recognition callback.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionEvent {
    pub text: String,
    /// Interim results are potential barge-in triggers; final results become
    /// user utterances.
    pub is_final: bool,
}

/// A source of recognition events for locally captured speech.
pub trait SpeechRecognizer: Send {
    /// Start emitting events into `events`. A failure here is a session-start
    /// failure: the session must not be left partially running.
    fn start(&mut self, events: mpsc::UnboundedSender<RecognitionEvent>) -> Result<(), AppError>;

    /// Stop emitting. Must be safe to call more than once.
    fn stop(&mut self);
}

/// Development recognizer that reads lines from stdin.
///
/// Each typed line stands in for one interim fragment (the barge-in trigger)
/// followed by the final result, which is how a streaming engine delivers a
/// short utterance.
#[derive(Debug, Default)]
pub struct ConsoleRecognizer {
    task: Option<JoinHandle<()>>,
}

impl ConsoleRecognizer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SpeechRecognizer for ConsoleRecognizer {
    fn start(&mut self, events: mpsc::UnboundedSender<RecognitionEvent>) -> Result<(), AppError> {
        if self.task.is_some() {
            return Err(AppError::Recognition("recognizer already started".to_string()));
        }

        let task = tokio::spawn(async move {
            let reader = tokio::io::BufReader::new(tokio::io::stdin());
            let mut lines = LinesStream::new(reader.lines());
            while let Some(Ok(line)) = lines.next().await {
                let text = line.trim().to_string();
                if text.is_empty() {
                    continue;
                }
                let interim = RecognitionEvent { text: text.clone(), is_final: false };
                if events.send(interim).is_err() {
                    break;
                }
                if events.send(RecognitionEvent { text, is_final: true }).is_err() {
                    break;
                }
            }
            debug!("Console recognizer input ended");
        });

        self.task = Some(task);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
