//! Engine.IO v4 / Socket.IO v5 text framing for a single client on the
//! default namespace over a WebSocket.

use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInfo {
    pub sid: String,
    #[serde(default)]
    pub ping_interval: u64,
    #[serde(default)]
    pub ping_timeout: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Open(OpenInfo),
    Close,
    Ping,
    Pong,
    Noop,
    Connect(Option<Value>),
    Disconnect,
    Event { name: String, data: Value },
    ConnectError(Value),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("empty frame")]
    Empty,
    #[error("unknown engine.io packet type {0:?}")]
    UnknownEnginePacket(char),
    #[error("unknown socket.io packet type {0:?}")]
    UnknownSocketPacket(char),
    #[error("unsupported packet type {0:?}")]
    Unsupported(char),
    #[error("malformed packet payload: {0}")]
    Payload(String),
}

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        Self::Payload(err.to_string())
    }
}

impl Packet {
    pub fn encode(&self) -> String {
        match self {
            Self::Open(info) => format!(
                "0{}",
                json!({
                    "sid": info.sid,
                    "upgrades": [],
                    "pingInterval": info.ping_interval,
                    "pingTimeout": info.ping_timeout,
                })
            ),
            Self::Close => "1".to_string(),
            Self::Ping => "2".to_string(),
            Self::Pong => "3".to_string(),
            Self::Noop => "6".to_string(),
            Self::Connect(None) => "40".to_string(),
            Self::Connect(Some(data)) => format!("40{data}"),
            Self::Disconnect => "41".to_string(),
            Self::Event { name, data } => {
                format!("42{}", Value::Array(vec![Value::String(name.clone()), data.clone()]))
            }
            Self::ConnectError(data) => format!("44{data}"),
        }
    }
}

pub fn decode(frame: &str) -> Result<Packet, CodecError> {
    let mut chars = frame.chars();
    let kind = chars.next().ok_or(CodecError::Empty)?;
    let rest = chars.as_str();
    match kind {
        '0' => Ok(Packet::Open(serde_json::from_str(rest)?)),
        '1' => Ok(Packet::Close),
        '2' => Ok(Packet::Ping),
        '3' => Ok(Packet::Pong),
        '4' => decode_socket_packet(rest),
        '5' => Err(CodecError::Unsupported(kind)),
        '6' => Ok(Packet::Noop),
        other => Err(CodecError::UnknownEnginePacket(other)),
    }
}

fn decode_socket_packet(body: &str) -> Result<Packet, CodecError> {
    let mut chars = body.chars();
    let kind = chars.next().ok_or(CodecError::Empty)?;
    let mut rest = chars.as_str();

    // namespace, then optional ack id
    if rest.starts_with('/') {
        rest = rest.split_once(',').map_or("", |(_, tail)| tail);
    }
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_digit());

    match kind {
        '0' => {
            if rest.is_empty() {
                Ok(Packet::Connect(None))
            } else {
                Ok(Packet::Connect(Some(serde_json::from_str(rest)?)))
            }
        }
        '1' => Ok(Packet::Disconnect),
        '2' => {
            let mut values = serde_json::from_str::<Vec<Value>>(rest)?.into_iter();
            let name = match values.next() {
                Some(Value::String(name)) => name,
                _ => return Err(CodecError::Payload("event without a name".to_string())),
            };
            let data = values.next().unwrap_or(Value::Null);
            Ok(Packet::Event { name, data })
        }
        '4' => {
            if rest.is_empty() {
                Ok(Packet::ConnectError(Value::Null))
            } else {
                Ok(Packet::ConnectError(serde_json::from_str(rest)?))
            }
        }
        '3' | '5' | '6' => Err(CodecError::Unsupported(kind)),
        other => Err(CodecError::UnknownSocketPacket(other)),
    }
}

#[cfg(test)]
#[path = "tests/socketio_tests.rs"]
mod tests;
