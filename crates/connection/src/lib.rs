//! Room connection for the zher chat client.
//!
//! Provides the Socket.IO client, the chat session state machine, and
//! automatic reconnection.

pub(crate) mod pumps;
pub(crate) mod reconnection;
pub mod session;
pub mod state;
pub mod types;
pub mod ws_client;

pub use session::{ChatSession, SessionConfig, SessionError};
pub use state::SessionState;
pub use types::{ConnectionState, DisconnectReason, ReconnectConfig, SessionEvent};
pub use ws_client::{PendingSocket, SocketClient, WsError, socket_url};
