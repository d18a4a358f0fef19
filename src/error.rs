//! # Error Handling
//!
//! Custom error types for the voice client and how they propagate.
//!
//! ## Error Categories:
//! - **Transient**: malformed frames, bad audio chunks, unknown tags. These are
//!   absorbed (logged and counted) at the point of detection and never become
//!   `AppError`s.
//! - **Session-fatal**: channel loss, recognizer start failure. These are
//!   `AppError`s and always force a full session teardown.
//! - **Caller-facing**: call-initiation failures are returned to the caller of
//!   the initiation action without touching the active session.

use std::fmt;

/// Errors that can end a session or fail an operation outright.
///
/// ## Propagation policy:
/// Component-local failures (decode, parse) are swallowed where they happen.
/// Everything that surfaces as an `AppError` means some resource could not be
/// acquired or was lost, and partial session state must not be left running.
#[derive(Debug)]
pub enum AppError {
    /// Configuration file or environment variable problems
    Config(String),

    /// WebSocket channel failures (connect, send, unexpected close)
    Channel(String),

    /// Speech recognition engine failed to start
    Recognition(String),

    /// Audio output device or scheduling failures
    Playback(String),

    /// Outbound message could not be serialized
    Serialize(String),

    /// Out-of-band call initiation failed
    Call(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Channel(msg) => write!(f, "Channel error: {}", msg),
            AppError::Recognition(msg) => write!(f, "Recognition error: {}", msg),
            AppError::Playback(msg) => write!(f, "Playback error: {}", msg),
            AppError::Serialize(msg) => write!(f, "Serialization error: {}", msg),
            AppError::Call(msg) => write!(f, "Call initiation error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

/// Convert WebSocket protocol errors into channel errors.
impl From<tokio_tungstenite::tungstenite::Error> for AppError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        AppError::Channel(err.to_string())
    }
}

/// Convert configuration loading errors.
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

/// Convert outbound serialization errors.
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialize(err.to_string())
    }
}

/// Convert HTTP errors from the call-initiation request.
impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Call(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AppError::Channel("connection reset".to_string());
        assert_eq!(err.to_string(), "Channel error: connection reset");

        let err = AppError::Call("HTTP 502".to_string());
        assert!(err.to_string().contains("Call initiation"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: AppError = json_err.into();
        assert!(matches!(err, AppError::Serialize(_)));
    }
}
