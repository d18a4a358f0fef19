//! # Conversation Channels
//!
//! WebSocket adapters for the two conversation channels. Each open channel
//! runs a reader task (inbound frames become session events) and a writer task
//! (outbound messages drain from an unbounded queue), so the session event
//! loop never blocks on the socket.
//!
//! ## Lifecycle:
//! A channel that closes for any reason, clean or not, emits exactly one
//! `ChannelClosed` event and goes quiet. A deliberate `close()` aborts the
//! reader first so the teardown it already belongs to is not re-triggered.

use crate::error::AppError;
use crate::protocol::{CallRequest, CallResponse, ChannelOrigin, InboundFrame, OutboundMessage};
use crate::session::SessionEvent;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

/// One open conversation channel.
#[derive(Debug)]
pub struct ChannelHandle {
    origin: ChannelOrigin,
    outbound: mpsc::UnboundedSender<Message>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl ChannelHandle {
    /// Connect to `url` and start pumping frames into `events`.
    pub async fn connect(
        url: &str,
        origin: ChannelOrigin,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Result<Self, AppError> {
        let (socket, _response) = connect_async(url).await?;
        info!("Connected {} channel to {}", origin.as_str(), url);

        let (mut sink, mut stream) = socket.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

        let writer = tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                if let Err(err) = sink.send(message).await {
                    warn!("Outbound send failed, writer stopping: {}", err);
                    break;
                }
            }
        });

        let pong_tx = outbound_tx.clone();
        let reader = tokio::spawn(async move {
            loop {
                let frame = match stream.next().await {
                    Some(Ok(Message::Binary(bytes))) => InboundFrame::Audio(bytes),
                    Some(Ok(Message::Text(text))) => InboundFrame::Text(text),
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = pong_tx.send(Message::Pong(payload));
                        continue;
                    }
                    Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => continue,
                    Some(Ok(Message::Close(_))) => {
                        debug!("{} channel closed by remote", origin.as_str());
                        let _ = events.send(SessionEvent::ChannelClosed(origin));
                        break;
                    }
                    Some(Err(err)) => {
                        warn!("{} channel read error: {}", origin.as_str(), err);
                        let _ = events.send(SessionEvent::ChannelClosed(origin));
                        break;
                    }
                    None => {
                        debug!("{} channel stream ended", origin.as_str());
                        let _ = events.send(SessionEvent::ChannelClosed(origin));
                        break;
                    }
                };
                if events.send(SessionEvent::Frame(origin, frame)).is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            origin,
            outbound: outbound_tx,
            reader,
            writer,
        })
    }

    pub fn origin(&self) -> ChannelOrigin {
        self.origin
    }

    /// Queue an outbound message. Fails only if the writer task is gone,
    /// which the reader will have reported as a channel closure already.
    pub fn send(&self, message: &OutboundMessage) -> Result<(), AppError> {
        self.outbound
            .send(Message::Text(message.to_json()))
            .map_err(|_| AppError::Channel("channel writer is gone".to_string()))
    }

    /// Deliberate close: best-effort close frame, then stop both pumps. The
    /// reader is aborted so this close does not masquerade as a remote one.
    pub fn close(self) {
        let _ = self.outbound.send(Message::Close(None));
        self.reader.abort();
        // Dropping the handle drops the outbound sender; the writer drains
        // the close frame and exits on its own.
        drop(self.writer);
    }
}

/// Ask the backend to bridge a phone call into the conversation. Out-of-band
/// HTTP, independent of the channel sockets.
pub async fn initiate_call(endpoint: &str, target_number: &str) -> Result<String, AppError> {
    let request = CallRequest {
        target_number: target_number.to_string(),
    };
    let response = reqwest::Client::new()
        .post(endpoint)
        .json(&request)
        .send()
        .await?;

    if !response.status().is_success() {
        error!("Call initiation rejected with HTTP {}", response.status());
        return Err(AppError::Call(format!(
            "call endpoint returned HTTP {}",
            response.status()
        )));
    }

    let body: CallResponse = response.json().await?;
    info!("Call {} initiated to {}", body.call_id, target_number);
    Ok(body.call_id)
}
