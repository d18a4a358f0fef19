//! # Voice Agent Client - Main Application Entry Point
//!
//! Interactive client for a real-time voice conversation with a remote agent.
//! It connects the local pieces (speech recognition, audio playback, the turn
//! state machine) to the agent's conversation channel and runs a single
//! session until the user stops it, the agent says goodbye, or the channel
//! drops.
//!
//! ## Application Architecture:
//! - **config**: configuration management (TOML file + environment variables)
//! - **error**: custom error types and propagation policy
//! - **protocol**: wire frames for the conversation channels
//! - **channel**: WebSocket channel lifecycle and outbound framing
//! - **recognition**: speech recognition seam and the console recognizer
//! - **turn**: the turn-taking state machine (who holds the floor)
//! - **transcript**: the ordered conversation record
//! - **tools**: remote tool-invocation tracking
//! - **playback**: audio decode, output device, gapless scheduling
//! - **dispatch**: routes inbound frames to the right component
//! - **session**: the single-threaded event loop that owns everything
//! - **state**: per-session metrics counters

mod channel;
mod config;
mod dispatch;
mod error;
mod playback;
mod protocol;
mod recognition;
mod session;
mod state;
mod tools;
mod transcript;
mod turn;

use anyhow::Result;
use config::AppConfig;
use playback::RodioOutput;
use recognition::ConsoleRecognizer;
use session::Session;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// The main application entry point.
///
/// ## What this function does:
/// 1. Loads configuration from config.toml and environment variables
/// 2. Sets up structured logging
/// 3. Opens the audio output device and the agent channel
/// 4. Runs the session event loop until it ends
///
/// The session (and its playback stream) lives on the main task: the audio
/// output handle is not `Send`, and the single-threaded session model does
/// not need it to be.
#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting voice-agent-client v{}", env!("CARGO_PKG_VERSION"));
    info!("Agent endpoint: {}", config.agent.endpoint);

    let output = RodioOutput::new()?;
    let recognizer = Box::new(ConsoleRecognizer::new());

    let (session, handle) = Session::start(config, recognizer, output).await?;

    // Ctrl+C maps to a normal session stop; teardown runs inside the loop.
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, stopping session");
            handle.stop();
        }
    });

    session.run().await;

    info!("Session ended");
    Ok(())
}

/// Initialize the tracing (logging) system for the application.
///
/// ## Environment Variables:
/// - `RUST_LOG`: controls what gets logged (e.g., "debug", "voice_agent_client=debug")
/// - If not set, defaults to "voice_agent_client=debug"
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voice_agent_client=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}
