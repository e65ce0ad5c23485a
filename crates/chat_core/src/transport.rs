//! Real-time transport: one Socket.IO session over a WebSocket.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chat_shared::{
    domain::{ConversationId, UserId},
    protocol::{InboundEvent, MessagePayload, OutboundEvent},
};
use futures::{stream::SplitStream, SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::{
    net::TcpStream,
    sync::{broadcast, mpsc, Mutex},
    task::JoinHandle,
    time::timeout,
};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    config::ClientSettings,
    error::ClientError,
    socketio::{self, Packet},
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const DISCONNECT_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Connection lifecycle events carry the `attempt` passed to
/// [`TransportSession::connect`], so a caller can tell a superseded
/// connection's outcome from the current one's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected {
        attempt: u64,
    },
    Disconnected {
        attempt: u64,
    },
    ConnectionFailed {
        attempt: u64,
        reason: String,
    },
    MessageReceived(MessagePayload),
    PresenceChanged {
        user_id: UserId,
        online: bool,
    },
    TypingReceived {
        conversation_id: Option<ConversationId>,
        sender_id: UserId,
    },
    ServerError(String),
}

#[async_trait]
pub trait TransportSession: Send + Sync {
    /// Replaces any open session with a new one. Overlapping calls run one
    /// after another. Outcome arrives as `Connected` or `ConnectionFailed`.
    async fn connect(&self, attempt: u64, token: &str);
    /// Idempotent.
    async fn disconnect(&self);
    /// Fire-and-forget; dropped when not connected.
    async fn send(&self, event: OutboundEvent);
    fn subscribe(&self) -> broadcast::Receiver<TransportEvent>;
}

struct ActiveConnection {
    generation: u64,
    attempt: u64,
    outbound: mpsc::UnboundedSender<WsMessage>,
    reader_task: JoinHandle<()>,
    writer_task: JoinHandle<()>,
}

#[derive(Default)]
struct ConnectionSlot {
    generation: u64,
    active: Option<ActiveConnection>,
}

pub struct SocketIoTransport {
    endpoint: Url,
    connect_timeout: Duration,
    events: broadcast::Sender<TransportEvent>,
    connection: Arc<Mutex<ConnectionSlot>>,
    connect_turn: Mutex<()>,
}

impl SocketIoTransport {
    pub fn new(endpoint: Url, connect_timeout: Duration) -> Self {
        let (events, _) = broadcast::channel(1024);
        Self {
            endpoint,
            connect_timeout,
            events,
            connection: Arc::new(Mutex::new(ConnectionSlot::default())),
            connect_turn: Mutex::new(()),
        }
    }

    pub fn from_settings(settings: &ClientSettings) -> Result<Self, ClientError> {
        Ok(Self::new(
            settings.realtime_endpoint()?,
            settings.connect_timeout(),
        ))
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub async fn is_connected(&self) -> bool {
        self.connection.lock().await.active.is_some()
    }

    async fn handshake(&self, token: &str) -> Result<WsStream, String> {
        let (mut ws, _) = connect_async(self.endpoint.as_str())
            .await
            .map_err(|err| format!("failed to connect websocket {}: {err}", self.endpoint))?;

        match next_packet(&mut ws).await? {
            Packet::Open(info) => debug!(
                sid = %info.sid,
                ping_interval = info.ping_interval,
                "transport: engine.io session opened"
            ),
            other => return Err(format!("expected engine.io open packet, got {other:?}")),
        }

        let connect = Packet::Connect(Some(json!({ "token": token })));
        ws.send(WsMessage::Text(connect.encode()))
            .await
            .map_err(|err| format!("failed to send connect packet: {err}"))?;

        loop {
            match next_packet(&mut ws).await? {
                Packet::Connect(_) => return Ok(ws),
                Packet::ConnectError(data) => return Err(connect_error_reason(&data)),
                Packet::Ping => ws
                    .send(WsMessage::Text(Packet::Pong.encode()))
                    .await
                    .map_err(|err| format!("failed to answer ping: {err}"))?,
                Packet::Noop => {}
                other => return Err(format!("unexpected packet during handshake: {other:?}")),
            }
        }
    }

    /// Returns the connection it displaced, if any.
    async fn install(&self, attempt: u64, ws: WsStream) -> Option<ActiveConnection> {
        let (mut sink, stream) = ws.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<WsMessage>();

        let writer_task = tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                let closing = matches!(frame, WsMessage::Close(_));
                if let Err(err) = sink.send(frame).await {
                    warn!("transport: websocket send failed: {err}");
                    break;
                }
                if closing {
                    break;
                }
            }
        });

        // Held across the reader spawn so the reader cannot observe the slot
        // before this connection is installed.
        let mut slot = self.connection.lock().await;
        slot.generation += 1;
        let generation = slot.generation;
        let reader_task = tokio::spawn(read_loop(
            stream,
            outbound.clone(),
            self.events.clone(),
            Arc::clone(&self.connection),
            generation,
            attempt,
        ));
        slot.active.replace(ActiveConnection {
            generation,
            attempt,
            outbound,
            reader_task,
            writer_task,
        })
    }

    async fn close(&self, active: ActiveConnection) {
        active.reader_task.abort();
        let _ = active
            .outbound
            .send(WsMessage::Text(Packet::Disconnect.encode()));
        let _ = active.outbound.send(WsMessage::Close(None));
        drop(active.outbound);
        let _ = timeout(DISCONNECT_FLUSH_TIMEOUT, active.writer_task).await;

        info!(
            generation = active.generation,
            attempt = active.attempt,
            "transport: disconnected"
        );
        let _ = self.events.send(TransportEvent::Disconnected {
            attempt: active.attempt,
        });
    }
}

#[async_trait]
impl TransportSession for SocketIoTransport {
    async fn connect(&self, attempt: u64, token: &str) {
        let _turn = self.connect_turn.lock().await;
        self.disconnect().await;

        let outcome = match timeout(self.connect_timeout, self.handshake(token)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(format!(
                "connection timed out after {}s",
                self.connect_timeout.as_secs()
            )),
        };

        match outcome {
            Ok(ws) => {
                if let Some(displaced) = self.install(attempt, ws).await {
                    self.close(displaced).await;
                }
                info!(endpoint = %self.endpoint, attempt, "transport: connected");
                let _ = self.events.send(TransportEvent::Connected { attempt });
            }
            Err(reason) => {
                warn!(endpoint = %self.endpoint, attempt, "transport: connection failed: {reason}");
                let _ = self
                    .events
                    .send(TransportEvent::ConnectionFailed { attempt, reason });
            }
        }
    }

    async fn disconnect(&self) {
        let Some(active) = self.connection.lock().await.active.take() else {
            return;
        };
        self.close(active).await;
    }

    async fn send(&self, event: OutboundEvent) {
        let name = event.name();
        let data = match event.payload() {
            Ok(data) => data,
            Err(err) => {
                warn!(event = name, "transport: failed to encode outbound payload: {err}");
                return;
            }
        };
        let frame = Packet::Event {
            name: name.to_string(),
            data,
        }
        .encode();

        let slot = self.connection.lock().await;
        match slot.active.as_ref() {
            Some(active) => {
                if active.outbound.send(WsMessage::Text(frame)).is_err() {
                    warn!(event = name, "transport: writer closed, outbound event dropped");
                }
            }
            None => debug!(event = name, "transport: not connected, outbound event dropped"),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }
}

async fn next_packet(ws: &mut WsStream) -> Result<Packet, String> {
    while let Some(frame) = ws.next().await {
        match frame.map_err(|err| format!("websocket receive failed: {err}"))? {
            WsMessage::Text(text) => {
                return socketio::decode(&text).map_err(|err| err.to_string());
            }
            WsMessage::Close(_) => break,
            _ => {}
        }
    }
    Err("connection closed during handshake".to_string())
}

fn connect_error_reason(data: &Value) -> String {
    data.get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| data.to_string())
}

async fn read_loop(
    mut stream: SplitStream<WsStream>,
    outbound: mpsc::UnboundedSender<WsMessage>,
    events: broadcast::Sender<TransportEvent>,
    connection: Arc<Mutex<ConnectionSlot>>,
    generation: u64,
    attempt: u64,
) {
    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => continue,
            Err(err) => {
                warn!("transport: websocket receive failed: {err}");
                break;
            }
        };
        match socketio::decode(&text) {
            Ok(Packet::Ping) => {
                let _ = outbound.send(WsMessage::Text(Packet::Pong.encode()));
            }
            Ok(Packet::Event { name, data }) => {
                let Some(event) = translate_event(&name, data) else {
                    continue;
                };
                if !is_current(&connection, generation).await {
                    debug!(generation, "transport: reader outlived its connection");
                    return;
                }
                let _ = events.send(event);
            }
            Ok(Packet::Disconnect | Packet::Close) => break,
            Ok(other) => debug!(packet = ?other, "transport: ignoring packet"),
            Err(err) => warn!("transport: dropping undecodable frame: {err}"),
        }
    }

    let mut slot = connection.lock().await;
    if slot
        .active
        .as_ref()
        .is_some_and(|active| active.generation == generation)
    {
        if let Some(active) = slot.active.take() {
            active.writer_task.abort();
        }
        drop(slot);
        info!(generation, attempt, "transport: connection closed by peer");
        let _ = events.send(TransportEvent::Disconnected { attempt });
    }
}

async fn is_current(connection: &Mutex<ConnectionSlot>, generation: u64) -> bool {
    connection
        .lock()
        .await
        .active
        .as_ref()
        .is_some_and(|active| active.generation == generation)
}

/// Maps a named server event onto a transport event. Unknown names and
/// payloads that do not match their wire type are dropped.
pub(crate) fn translate_event(name: &str, data: Value) -> Option<TransportEvent> {
    match InboundEvent::from_event(name, data) {
        Ok(Some(InboundEvent::MessageReceived(message))) => {
            Some(TransportEvent::MessageReceived(message))
        }
        Ok(Some(InboundEvent::UserOnline(presence))) => Some(TransportEvent::PresenceChanged {
            user_id: presence.user_id,
            online: true,
        }),
        Ok(Some(InboundEvent::UserOffline(presence))) => Some(TransportEvent::PresenceChanged {
            user_id: presence.user_id,
            online: false,
        }),
        Ok(Some(InboundEvent::Typing(notice))) => Some(TransportEvent::TypingReceived {
            conversation_id: notice.conversation_id,
            sender_id: notice.sender_id,
        }),
        Ok(Some(InboundEvent::Error(err))) => Some(TransportEvent::ServerError(err.message)),
        Ok(None) => {
            debug!(event = name, "transport: ignoring unhandled event");
            None
        }
        Err(err) => {
            warn!(event = name, "transport: dropping malformed event payload: {err}");
            None
        }
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
