//! Public types for the chat session.

use std::time::Duration;

use zher_protocol::{ChatMessage, StartUpload, User};

/// Connection state of the session.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    /// WebSocket upgrade and Socket.IO connect in progress.
    Connecting,
    /// Connected and welcomed by the server.
    Connected,
    /// Connection lost, attempting to reconnect.
    Reconnecting { attempt: u32 },
}

/// Why the socket went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The client closed the connection.
    Manual,
    /// The server disconnected the namespace. Not retried.
    ServerDisconnect,
    /// WebSocket closed, stream ended, or read error.
    TransportClose,
    /// No frame arrived within the ping interval plus ping timeout.
    PingTimeout,
}

impl DisconnectReason {
    /// Whether the session should try to reconnect.
    pub fn should_reconnect(self) -> bool {
        matches!(
            self,
            DisconnectReason::TransportClose | DisconnectReason::PingTimeout
        )
    }
}

/// Events emitted by the chat session for the UI.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Connection state changed.
    StateChanged(ConnectionState),
    /// The server greeted us; carries our profile and the room's users.
    Welcome { user: User, users: Vec<User> },
    /// A message from another participant.
    Message(ChatMessage),
    /// The user list changed.
    UsersChanged(Vec<User>),
    /// Our name change was accepted.
    NameChanged(String),
    /// Something the user must acknowledge (rejections, failures).
    Alert(String),
    /// The server asked for one of our offered files.
    UploadStarted { file_id: String, transfer_id: String },
    UploadFinished {
        file_id: String,
        transfer_id: String,
        bytes: u64,
    },
    UploadFailed {
        file_id: String,
        transfer_id: String,
        error: String,
    },
    /// Reconnection is in progress.
    Reconnecting { attempt: u32, next_retry_secs: f64 },
}

/// Outcome of applying one inbound event to the session state.
#[derive(Debug, Clone)]
pub(crate) enum Applied {
    Events(Vec<SessionEvent>),
    StartUpload(StartUpload),
}

/// Configuration for automatic reconnection with exponential backoff.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Initial delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Maximum delay between attempts (backoff cap).
    pub max_delay: Duration,
    /// Multiplier for each subsequent attempt.
    pub backoff_factor: f64,
    /// Attempts before giving up. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            backoff_factor: 2.0,
            max_attempts: None,
        }
    }
}

impl ReconnectConfig {
    /// Calculates the delay for a given attempt number (1-based),
    /// with ±25% jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exp);
        let capped = secs.min(self.max_delay.as_secs_f64());
        let jitter = capped * 0.25;
        let offset = (std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos() as f64
            / u32::MAX as f64)
            * 2.0
            - 1.0; // [-1.0, 1.0)
        let with_jitter = (capped + jitter * offset).max(0.05);
        Duration::from_secs_f64(with_jitter)
    }
}
