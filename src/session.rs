//! # Session Event Loop
//!
//! One session is one continuous conversation. All component state (turn
//! machine, tool tracker, playback scheduler, transcript) is owned by a
//! single `SessionCore` and mutated only from the event loop in `run`, so no
//! locking is needed anywhere in the pipeline.
//!
//! ## Event sources, merged into one queue:
//! - recognition callbacks (interim and final results)
//! - inbound frames from the primary and relay channels
//! - control requests from a `SessionHandle` (stop, bridge a call)
//! - completions of spawned work (call bridging, tool active-set pruning)
//!
//! The loop itself never suspends on I/O: channel pumps, call initiation,
//! and prune timers all run on their own tasks and report back as events.
//!
//! ## Teardown:
//! Stop, agent exit, and channel closure all converge on the same path:
//! recognition halted, playback hard-stopped, tools cleared, turn state reset
//! to idle, channels closed. Exactly one of these runs per session.

use crate::channel::{initiate_call, ChannelHandle};
use crate::config::AppConfig;
use crate::dispatch::dispatch;
use crate::error::AppError;
use crate::playback::output::AudioOutput;
use crate::playback::scheduler::PlaybackScheduler;
use crate::protocol::{ChannelOrigin, InboundFrame, OutboundMessage};
use crate::recognition::{RecognitionEvent, SpeechRecognizer};
use crate::state::SessionMetrics;
use crate::tools::ToolTracker;
use crate::transcript::Transcript;
use crate::turn::{TurnAction, TurnEngine};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Everything that can wake the session event loop.
#[derive(Debug)]
pub enum SessionEvent {
    /// Interim or final recognition result for locally captured speech.
    Recognition(RecognitionEvent),
    /// An inbound frame from one of the conversation channels.
    Frame(ChannelOrigin, InboundFrame),
    /// A channel closed, cleanly or not.
    ChannelClosed(ChannelOrigin),
    /// Bridge a phone call into the conversation.
    StartCall { target_number: String },
    /// A bridging attempt finished: either an open relay channel or the
    /// initiation/connect error.
    CallBridged(Result<ChannelHandle, AppError>),
    /// A finished tool's linger window elapsed; drop it from the active set.
    PruneTools,
    /// Explicit user stop.
    Stop,
}

/// The session's component state, mutated only from the event loop.
pub struct SessionCore<O: AudioOutput> {
    pub turn: TurnEngine,
    pub tools: ToolTracker,
    pub scheduler: PlaybackScheduler<O>,
    pub transcript: Transcript,
    pub metrics: Arc<SessionMetrics>,
}

impl<O: AudioOutput> SessionCore<O> {
    pub fn new(config: &AppConfig, output: O) -> Self {
        Self {
            turn: TurnEngine::new(config.interrupt_debounce()),
            tools: ToolTracker::new(config.tool_linger()),
            scheduler: PlaybackScheduler::new(
                output,
                config.lookahead(),
                config.audio.fallback_sample_rate,
            ),
            transcript: Transcript::new(),
            metrics: Arc::new(SessionMetrics::new()),
        }
    }

    /// Reset every component: turn state to idle, playback hard-stopped,
    /// active tools cleared. The transcript is kept; it is the session's
    /// permanent record.
    pub fn teardown(&mut self) {
        self.turn.reset();
        self.scheduler.stop_all();
        self.tools.clear();
    }
}

/// Cloneable control surface for a running session.
#[derive(Clone)]
pub struct SessionHandle {
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionHandle {
    /// Request a stop. A no-op once the session has already ended.
    pub fn stop(&self) {
        let _ = self.events.send(SessionEvent::Stop);
    }

    /// Request that a phone call be bridged into the conversation.
    pub fn start_call(&self, target_number: impl Into<String>) {
        let _ = self.events.send(SessionEvent::StartCall {
            target_number: target_number.into(),
        });
    }
}

/// A running conversation session.
pub struct Session<O: AudioOutput> {
    id: Uuid,
    config: AppConfig,
    core: SessionCore<O>,
    recognizer: Box<dyn SpeechRecognizer>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    primary: Option<ChannelHandle>,
    relay: Option<ChannelHandle>,
}

impl<O: AudioOutput> Session<O> {
    /// Open the primary channel, start the recognizer, and hand back the
    /// session plus a control handle.
    ///
    /// Startup is all-or-nothing: if the recognizer fails to start the
    /// already-open channel is closed and nothing is left running.
    pub async fn start(
        config: AppConfig,
        mut recognizer: Box<dyn SpeechRecognizer>,
        output: O,
    ) -> Result<(Self, SessionHandle), AppError> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let primary = ChannelHandle::connect(
            &config.agent.endpoint,
            ChannelOrigin::Primary,
            events_tx.clone(),
        )
        .await?;

        let (rec_tx, mut rec_rx) = mpsc::unbounded_channel();
        if let Err(err) = recognizer.start(rec_tx) {
            primary.close();
            return Err(err);
        }
        let forward = events_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = rec_rx.recv().await {
                if forward.send(SessionEvent::Recognition(event)).is_err() {
                    break;
                }
            }
        });

        let mut core = SessionCore::new(&config, output);
        core.turn.start_listening();
        core.turn.set_channel_open(true);

        let id = Uuid::new_v4();
        info!("Session {} started against {}", id, config.agent.endpoint);

        let handle = SessionHandle {
            events: events_tx.clone(),
        };
        let session = Self {
            id,
            config,
            core,
            recognizer,
            events_tx,
            events_rx,
            primary: Some(primary),
            relay: None,
        };
        Ok((session, handle))
    }

    /// Run the event loop until the session ends. Consumes the session; the
    /// teardown path has run by the time this returns.
    pub async fn run(mut self) {
        while let Some(event) = self.events_rx.recv().await {
            match event {
                SessionEvent::Recognition(result) => self.on_recognition(result),
                SessionEvent::Frame(origin, frame) => {
                    let outcome = dispatch(&mut self.core, origin, frame);
                    if outcome.tool_resolved {
                        self.schedule_tool_prune();
                    }
                    if outcome.exit_requested {
                        info!("Session {} ending: agent said goodbye", self.id);
                        self.teardown();
                        break;
                    }
                }
                SessionEvent::ChannelClosed(origin) => {
                    warn!(
                        "Session {} ending: {} channel closed",
                        self.id,
                        origin.as_str()
                    );
                    self.teardown();
                    break;
                }
                SessionEvent::StartCall { target_number } => {
                    self.bridge_call(target_number);
                }
                SessionEvent::CallBridged(Ok(relay)) => {
                    if self.relay.is_some() {
                        warn!("Session {} already has a bridged call", self.id);
                        relay.close();
                    } else {
                        info!("Session {} relay channel open", self.id);
                        self.relay = Some(relay);
                    }
                }
                SessionEvent::CallBridged(Err(err)) => {
                    error!("Session {} call bridging failed: {}", self.id, err);
                }
                SessionEvent::PruneTools => {
                    self.core.tools.prune(Instant::now());
                }
                SessionEvent::Stop => {
                    info!("Session {} ending: stop requested", self.id);
                    self.teardown();
                    break;
                }
            }
        }
    }

    /// Route one recognition callback through the turn machine.
    ///
    /// An interim fragment hard-stops local playback immediately; the
    /// interrupt signal to the remote side is debounced separately. Neither
    /// waits on the other.
    fn on_recognition(&mut self, result: RecognitionEvent) {
        if result.is_final {
            if let Some(TurnAction::SendUserText(text)) =
                self.core.turn.on_final(&result.text, &mut self.core.transcript)
            {
                debug!("Session {} user utterance: {}", self.id, text);
                self.send_primary(&OutboundMessage::UserText(text));
            }
            return;
        }

        if !result.text.trim().is_empty() {
            self.core.scheduler.stop_all();
        }
        if let Some(TurnAction::SendInterrupt) = self.core.turn.on_interim(
            &result.text,
            Instant::now(),
            &mut self.core.transcript,
        ) {
            self.send_primary(&OutboundMessage::Interrupt);
            self.core.metrics.record_interrupt_sent();
        }
    }

    fn send_primary(&self, message: &OutboundMessage) {
        if let Some(primary) = &self.primary {
            if let Err(err) = primary.send(message) {
                // The reader task reports the closure; nothing to do here.
                warn!("Session {} outbound send failed: {}", self.id, err);
            }
        }
    }

    fn schedule_tool_prune(&self) {
        let events = self.events_tx.clone();
        let linger = self.config.tool_linger();
        tokio::spawn(async move {
            tokio::time::sleep(linger).await;
            let _ = events.send(SessionEvent::PruneTools);
        });
    }

    /// Initiate an outbound call and open the relay channel, off-loop.
    ///
    /// The HTTP POST and the relay dial run on their own task and post a
    /// `CallBridged` completion back into the queue, so a slow or hung call
    /// endpoint cannot stall frame dispatch, barge-in, or teardown. Failures
    /// are reported as events and leave the primary session untouched.
    fn bridge_call(&mut self, target_number: String) {
        if self.relay.is_some() {
            warn!("Session {} already has a bridged call", self.id);
            return;
        }
        let events = self.events_tx.clone();
        let call_endpoint = self.config.agent.call_endpoint.clone();
        let relay_endpoint = self.config.agent.relay_endpoint.clone();
        let id = self.id;
        tokio::spawn(async move {
            let result = match initiate_call(&call_endpoint, &target_number).await {
                Ok(call_id) => {
                    info!("Session {} initiated call {}", id, call_id);
                    ChannelHandle::connect(&relay_endpoint, ChannelOrigin::Relay, events.clone())
                        .await
                }
                Err(err) => Err(err),
            };
            let _ = events.send(SessionEvent::CallBridged(result));
        });
    }

    fn teardown(&mut self) {
        self.recognizer.stop();
        self.core.teardown();
        if let Some(primary) = self.primary.take() {
            primary.close();
        }
        if let Some(relay) = self.relay.take() {
            relay.close();
        }
        info!(
            "Session {} closed: {:?}",
            self.id,
            self.core.metrics.snapshot()
        );
    }
}
