use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Engine.IO protocol revision spoken by the room server.
pub const ENGINE_IO_VERSION: u8 = 4;

/// Path the Socket.IO server is mounted on.
pub const SOCKET_IO_PATH: &str = "/socket.io/";

/// Time allowed for the WebSocket upgrade plus the Socket.IO connect ack.
pub const WS_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Ping interval assumed until the server's open packet says otherwise.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_millis(25_000);

/// Ping timeout assumed until the server's open packet says otherwise.
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_millis(20_000);

/// Maximum inbound text frame accepted by the client (1 MB, the server's
/// default `maxPayload`).
pub const WS_MAX_MESSAGE_SIZE: usize = 1_000_000;

/// Device tag the server assigns to phones and tablets.
pub const DEVICE_MOBILE: &str = "mobile";

/// Device tag the server assigns to everything else.
pub const DEVICE_DESKTOP: &str = "desktop";

/// Maximum user name length the server accepts (in characters).
pub const MAX_NAME_CHARS: usize = 24;

/// Socket.IO event names used by the chat room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventName {
    // Client -> server
    #[serde(rename = "text-message")]
    TextMessage,
    #[serde(rename = "file-meta")]
    FileMeta,
    #[serde(rename = "request-name-change")]
    RequestNameChange,

    // Server -> client
    #[serde(rename = "welcome")]
    Welcome,
    #[serde(rename = "message")]
    Message,
    #[serde(rename = "user-joined")]
    UserJoined,
    #[serde(rename = "user-left")]
    UserLeft,
    #[serde(rename = "update-user-list")]
    UpdateUserList,
    #[serde(rename = "start-upload")]
    StartUpload,
    #[serde(rename = "name-change-success")]
    NameChangeSuccess,
    #[serde(rename = "name-change-fail")]
    NameChangeFail,

    /// Forward compatibility: unknown event names deserialize here.
    #[serde(other)]
    Unknown,
}

impl EventName {
    /// Returns the wire name of the event.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::TextMessage => "text-message",
            EventName::FileMeta => "file-meta",
            EventName::RequestNameChange => "request-name-change",
            EventName::Welcome => "welcome",
            EventName::Message => "message",
            EventName::UserJoined => "user-joined",
            EventName::UserLeft => "user-left",
            EventName::UpdateUserList => "update-user-list",
            EventName::StartUpload => "start-upload",
            EventName::NameChangeSuccess => "name-change-success",
            EventName::NameChangeFail => "name-change-fail",
            EventName::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for EventName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
