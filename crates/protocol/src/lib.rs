//! Wire types for the zher chat room.
//!
//! Event names, payloads and the Socket.IO/Engine.IO packet codec shared by
//! the connection and transfer crates.

pub mod constants;
pub mod envelope;
pub mod messages;

// Re-export primary types for convenience.
pub use constants::EventName;
pub use envelope::{Packet, ProtocolError};
pub use messages::{
    ChatMessage, ConnectAuth, FileMeta, HandshakeData, MessageBody, StartUpload, User, Welcome,
};
