//! # Configuration Management
//!
//! Loads application configuration from multiple sources:
//! - Built-in defaults
//! - TOML configuration file (config.toml, optional)
//! - Environment variables (with APP_ prefix)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Environment variables (APP_AGENT_ENDPOINT, APP_AUDIO_LOOKAHEAD_MS, ...)
//! 2. Configuration file (config.toml)
//! 3. Default values (defined in the Default impl)
//!
//! `AGENT_URL` is honored as a bare override for the primary endpoint, the way
//! deployment platforms hand out connection strings without a prefix scheme.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Main application configuration containing all settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub audio: AudioConfig,
    pub turn: TurnConfig,
}

/// Remote agent connectivity settings.
///
/// ## Fields:
/// - `endpoint`: WebSocket URL of the primary conversation channel
/// - `relay_endpoint`: WebSocket URL of the relay channel used when a phone
///   call is bridged into the conversation
/// - `call_endpoint`: HTTP URL for the out-of-band call-initiation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub endpoint: String,
    pub relay_endpoint: String,
    pub call_endpoint: String,
}

/// Audio playback settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Scheduling lookahead in milliseconds. Absorbs decode/schedule jitter so
    /// a chunk never gets a start time that is already in the past.
    pub lookahead_ms: u64,

    /// Sample rate assumed for headerless PCM16 chunks (Hz).
    pub fallback_sample_rate: u32,
}

/// Turn-taking tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnConfig {
    /// Minimum gap between outbound interrupt signals, in milliseconds.
    pub interrupt_debounce_ms: u64,

    /// How long a finished tool invocation stays in the active set, in
    /// milliseconds, so consumers can show a completion flash.
    pub tool_linger_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            agent: AgentConfig {
                endpoint: "ws://127.0.0.1:8000/realtime".to_string(),
                relay_endpoint: "ws://127.0.0.1:8000/relay".to_string(),
                call_endpoint: "http://127.0.0.1:8000/call".to_string(),
            },
            audio: AudioConfig {
                lookahead_ms: 50,
                fallback_sample_rate: 16000,
            },
            turn: TurnConfig {
                interrupt_debounce_ms: 1000,
                tool_linger_ms: 2000,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, config.toml, and the environment.
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        // Deployment platforms commonly hand the endpoint over unprefixed.
        if let Ok(url) = env::var("AGENT_URL") {
            settings = settings.set_override("agent.endpoint", url)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    pub fn validate(&self) -> Result<()> {
        if !self.agent.endpoint.starts_with("ws://") && !self.agent.endpoint.starts_with("wss://") {
            return Err(anyhow::anyhow!(
                "Agent endpoint must be a ws:// or wss:// URL, got '{}'",
                self.agent.endpoint
            ));
        }

        if !self.agent.relay_endpoint.starts_with("ws://")
            && !self.agent.relay_endpoint.starts_with("wss://")
        {
            return Err(anyhow::anyhow!(
                "Relay endpoint must be a ws:// or wss:// URL, got '{}'",
                self.agent.relay_endpoint
            ));
        }

        if self.audio.fallback_sample_rate == 0 {
            return Err(anyhow::anyhow!("Fallback sample rate cannot be 0"));
        }

        // A lookahead beyond a second would delay every chunk audibly.
        if self.audio.lookahead_ms >= 1000 {
            return Err(anyhow::anyhow!(
                "Playback lookahead must be under 1000 ms, got {}",
                self.audio.lookahead_ms
            ));
        }

        if self.turn.interrupt_debounce_ms == 0 {
            return Err(anyhow::anyhow!("Interrupt debounce must be greater than 0"));
        }

        Ok(())
    }

    /// Playback scheduling lookahead as a `Duration`.
    pub fn lookahead(&self) -> Duration {
        Duration::from_millis(self.audio.lookahead_ms)
    }

    /// Interrupt debounce window as a `Duration`.
    pub fn interrupt_debounce(&self) -> Duration {
        Duration::from_millis(self.turn.interrupt_debounce_ms)
    }

    /// Active-set retention for finished tool invocations as a `Duration`.
    pub fn tool_linger(&self) -> Duration {
        Duration::from_millis(self.turn.tool_linger_ms)
    }
}
