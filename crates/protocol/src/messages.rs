use serde::{Deserialize, Serialize};

use crate::constants::DEVICE_DESKTOP;

// ---------------------------------------------------------------------------
// Room participants
// ---------------------------------------------------------------------------

/// A participant of the room as tracked by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub device: String,
}

/// Greeting sent by the server right after a successful connect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Welcome {
    pub user: User,
    #[serde(default)]
    pub all_users: Vec<User>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub server_url: String,
}

// ---------------------------------------------------------------------------
// Chat messages
// ---------------------------------------------------------------------------

/// Metadata announcing a file this client can serve on request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMeta {
    pub file_id: String,
    pub file_name: String,
    pub file_size: u64,
    #[serde(default)]
    pub file_type: String,
}

/// Body of a relayed chat message, tagged by the `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MessageBody {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "file-meta")]
    File(FileMeta),
    /// Forward compatibility: unknown message kinds deserialize here.
    #[serde(other)]
    Unknown,
}

/// A chat message as broadcast by the server (and echoed locally).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Millisecond timestamp assigned by the sender of the message.
    pub id: u64,
    #[serde(default)]
    pub sender_id: String,
    #[serde(default = "unknown_sender")]
    pub sender_name: String,
    #[serde(default = "default_color")]
    pub sender_color: String,
    #[serde(default = "default_device")]
    pub sender_device: String,
    #[serde(flatten)]
    pub body: MessageBody,
}

impl ChatMessage {
    /// Builds a message authored by `sender`, filling blank profile fields
    /// the same way the server does for anonymous senders.
    pub fn from_user(id: u64, sender: &User, body: MessageBody) -> Self {
        Self {
            id,
            sender_id: sender.id.clone(),
            sender_name: non_empty_or(&sender.name, unknown_sender),
            sender_color: non_empty_or(&sender.color, default_color),
            sender_device: non_empty_or(&sender.device, default_device),
            body,
        }
    }

    /// Returns the file offer carried by this message, if any.
    pub fn file(&self) -> Option<&FileMeta> {
        match &self.body {
            MessageBody::File(meta) => Some(meta),
            _ => None,
        }
    }

    /// Returns the text carried by this message, if any.
    pub fn text(&self) -> Option<&str> {
        match &self.body {
            MessageBody::Text { text } => Some(text),
            _ => None,
        }
    }
}

fn non_empty_or(value: &str, fallback: fn() -> String) -> String {
    if value.is_empty() {
        fallback()
    } else {
        value.to_string()
    }
}

fn unknown_sender() -> String {
    "Unknown".into()
}

fn default_color() -> String {
    "#999".into()
}

fn default_device() -> String {
    DEVICE_DESKTOP.into()
}

// ---------------------------------------------------------------------------
// Transfers
// ---------------------------------------------------------------------------

/// Server request to stream a previously offered file to the upload endpoint.
///
/// `end` is inclusive. A missing `end` means "until the end of the file".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartUpload {
    pub file_id: String,
    pub transfer_id: String,
    #[serde(default)]
    pub offset: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<u64>,
}

// ---------------------------------------------------------------------------
// Connection payloads
// ---------------------------------------------------------------------------

/// Auth object sent with the Socket.IO connect packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectAuth {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_code: Option<String>,
}

/// Engine.IO open packet payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeData {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Milliseconds between server pings.
    pub ping_interval: u64,
    /// Milliseconds the server waits for a pong.
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: u64,
}

/// Payload of a Socket.IO connect error packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectErrorData {
    pub message: String,
}
