//! Socket.IO v4 packets carried over an Engine.IO v4 WebSocket transport.
//!
//! Only the subset the chat client needs is modelled: the Engine.IO
//! heartbeat/lifecycle packets and the Socket.IO connect, disconnect,
//! event and connect-error packets on the default namespace.
//!
//! Text encoding, one packet per WebSocket frame:
//!
//! ```text
//! 0{"sid":..}      engine open          40{"sessionId":..}  socket connect (+auth)
//! 1                engine close         41                  socket disconnect
//! 2 / 3            ping / pong          42["event",data]    socket event
//! 6                noop                 44{"message":..}    socket connect error
//! ```

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::value::RawValue;

use crate::constants::EventName;
use crate::messages::{ConnectErrorData, HandshakeData};

/// Errors from packet decoding.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("empty packet")]
    Empty,

    #[error("unsupported packet type: {0}")]
    UnsupportedType(String),

    #[error("malformed packet: {0}")]
    Malformed(String),
}

/// A decoded Engine.IO / Socket.IO packet.
#[derive(Debug, Clone)]
pub enum Packet {
    /// Engine.IO handshake sent by the server when the transport opens.
    Open(HandshakeData),
    /// Engine.IO transport close.
    Close,
    Ping,
    Pong,
    Noop,
    /// Socket.IO namespace connect. Client side carries the auth object,
    /// server side carries `{"sid": ..}`.
    Connect(Option<Box<RawValue>>),
    /// Socket.IO namespace disconnect.
    Disconnect,
    /// Socket.IO event with its first argument.
    Event {
        event: EventName,
        data: Option<Box<RawValue>>,
    },
    /// Socket.IO connect refusal.
    ConnectError(String),
}

impl Packet {
    /// Creates an event packet with an optional payload.
    pub fn event<T: Serialize>(event: EventName, data: Option<&T>) -> Result<Self, ProtocolError> {
        Ok(Packet::Event {
            event,
            data: to_raw(data)?,
        })
    }

    /// Creates a connect packet carrying `auth`.
    pub fn connect<T: Serialize>(auth: &T) -> Result<Self, ProtocolError> {
        Ok(Packet::Connect(to_raw(Some(auth))?))
    }

    /// Deserializes the event payload into the given type.
    ///
    /// Returns `Ok(None)` for packets that are not events or carry no data.
    pub fn parse_data<T: DeserializeOwned>(&self) -> Result<Option<T>, ProtocolError> {
        match self {
            Packet::Event {
                data: Some(raw), ..
            } => Ok(Some(serde_json::from_str(raw.get())?)),
            _ => Ok(None),
        }
    }

    /// Encodes the packet as a WebSocket text frame.
    pub fn encode(&self) -> String {
        match self {
            Packet::Open(hs) => {
                format!("0{}", serde_json::to_string(hs).unwrap_or_else(|_| "{}".into()))
            }
            Packet::Close => "1".into(),
            Packet::Ping => "2".into(),
            Packet::Pong => "3".into(),
            Packet::Noop => "6".into(),
            Packet::Connect(None) => "40".into(),
            Packet::Connect(Some(auth)) => format!("40{}", auth.get()),
            Packet::Disconnect => "41".into(),
            Packet::Event { event, data } => {
                let name = serde_json::Value::String(event.as_str().into());
                match data {
                    Some(raw) => format!("42[{name},{}]", raw.get()),
                    None => format!("42[{name}]"),
                }
            }
            Packet::ConnectError(message) => {
                let body = serde_json::json!({ "message": message });
                format!("44{body}")
            }
        }
    }

    /// Decodes a WebSocket text frame.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let mut chars = text.chars();
        let engine_type = chars.next().ok_or(ProtocolError::Empty)?;
        let rest = chars.as_str();

        match engine_type {
            '0' => Ok(Packet::Open(serde_json::from_str(rest)?)),
            '1' => Ok(Packet::Close),
            '2' => Ok(Packet::Ping),
            '3' => Ok(Packet::Pong),
            '6' => Ok(Packet::Noop),
            '4' => decode_socket_packet(rest),
            other => Err(ProtocolError::UnsupportedType(other.to_string())),
        }
    }
}

fn to_raw<T: Serialize>(data: Option<&T>) -> Result<Option<Box<RawValue>>, ProtocolError> {
    match data {
        Some(d) => {
            let json = serde_json::to_string(d)?;
            Ok(Some(RawValue::from_string(json)?))
        }
        None => Ok(None),
    }
}

/// Decodes the Socket.IO packet inside an Engine.IO message.
fn decode_socket_packet(text: &str) -> Result<Packet, ProtocolError> {
    let mut chars = text.chars();
    let socket_type = chars.next().ok_or(ProtocolError::Empty)?;
    let body = strip_ack_id(strip_namespace(chars.as_str()));

    match socket_type {
        '0' => {
            if body.is_empty() {
                Ok(Packet::Connect(None))
            } else {
                Ok(Packet::Connect(Some(RawValue::from_string(body.to_string())?)))
            }
        }
        '1' => Ok(Packet::Disconnect),
        '2' => decode_event(body),
        '4' => {
            let message = match serde_json::from_str::<ConnectErrorData>(body) {
                Ok(data) => data.message,
                // Older servers send a bare string.
                Err(_) => serde_json::from_str::<String>(body)?,
            };
            Ok(Packet::ConnectError(message))
        }
        other => Err(ProtocolError::UnsupportedType(format!("4{other}"))),
    }
}

/// Strips a `/namespace,` prefix. Only the default namespace is used.
fn strip_namespace(text: &str) -> &str {
    if text.starts_with('/') {
        match text.find(',') {
            Some(idx) => &text[idx + 1..],
            None => "",
        }
    } else {
        text
    }
}

/// Strips a numeric ack id preceding the JSON body.
fn strip_ack_id(text: &str) -> &str {
    text.trim_start_matches(|c: char| c.is_ascii_digit())
}

fn decode_event(body: &str) -> Result<Packet, ProtocolError> {
    let args: Vec<Box<RawValue>> = serde_json::from_str(body)?;
    let mut args = args.into_iter();
    let name = args
        .next()
        .ok_or_else(|| ProtocolError::Malformed("event without a name".into()))?;
    let event: EventName = serde_json::from_str(name.get())?;
    Ok(Packet::Event {
        event,
        data: args.next(),
    })
}
