//! Room state tracked by the client and how inbound events change it.

use serde::Deserialize;
use tracing::{debug, warn};

use zher_protocol::{ChatMessage, EventName, Packet, ProtocolError, StartUpload, User, Welcome};

use crate::types::{Applied, ConnectionState, SessionEvent};

/// Snapshot of what the client knows about the room.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub users: Vec<User>,
    /// Our own profile. `None` until the first welcome.
    pub current_user: Option<User>,
    /// Shareable server URL announced in the welcome.
    pub server_url: String,
    /// Whether a name edit is in progress.
    pub editing_name: bool,
    pub connection: ConnectionState,
    /// Chat history, oldest first. Includes local echoes of our own sends.
    pub messages: Vec<ChatMessage>,
}

/// `update-user-list` arrives either as the list itself or wrapped in a
/// one-element array, depending on how the server packs its arguments.
#[derive(Deserialize)]
#[serde(untagged)]
enum UserList {
    Wrapped([Vec<User>; 1]),
    Plain(Vec<User>),
}

impl UserList {
    fn into_users(self) -> Vec<User> {
        match self {
            UserList::Wrapped([users]) => users,
            UserList::Plain(users) => users,
        }
    }
}

impl SessionState {
    /// Id of our own user, empty before the welcome.
    pub fn current_user_id(&self) -> &str {
        self.current_user.as_ref().map_or("", |u| u.id.as_str())
    }

    /// Adopts the server's greeting. A later welcome (after a reconnect)
    /// replaces the user list; an empty server URL keeps the previous one.
    pub fn apply_welcome(&mut self, welcome: Welcome) -> SessionEvent {
        self.current_user = Some(welcome.user.clone());
        self.users = welcome.all_users.clone();
        if !welcome.server_url.is_empty() {
            self.server_url = welcome.server_url;
        }
        SessionEvent::Welcome {
            user: welcome.user,
            users: welcome.all_users,
        }
    }

    /// Appends a message to the history.
    pub fn push_message(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Applies one inbound event packet.
    pub(crate) fn apply_event(
        &mut self,
        event: EventName,
        packet: &Packet,
    ) -> Result<Applied, ProtocolError> {
        let events = match event {
            EventName::Welcome => match packet.parse_data::<Welcome>()? {
                Some(welcome) => vec![self.apply_welcome(welcome)],
                None => Vec::new(),
            },
            EventName::UserJoined => {
                let Some(user) = packet.parse_data::<User>()? else {
                    return Ok(Applied::Events(Vec::new()));
                };
                if self.users.iter().any(|u| u.id == user.id) {
                    debug!(user = %user.id, "duplicate join ignored");
                    Vec::new()
                } else {
                    self.users.push(user);
                    vec![SessionEvent::UsersChanged(self.users.clone())]
                }
            }
            EventName::UserLeft => {
                let Some(id) = packet.parse_data::<String>()? else {
                    return Ok(Applied::Events(Vec::new()));
                };
                let before = self.users.len();
                self.users.retain(|u| u.id != id);
                if self.users.len() == before {
                    Vec::new()
                } else {
                    vec![SessionEvent::UsersChanged(self.users.clone())]
                }
            }
            EventName::UpdateUserList => {
                let Some(list) = packet.parse_data::<UserList>()? else {
                    return Ok(Applied::Events(Vec::new()));
                };
                self.users = list.into_users();
                let me = self
                    .users
                    .iter()
                    .find(|u| Some(u.id.as_str()) == self.current_user.as_ref().map(|c| c.id.as_str()))
                    .cloned();
                if let Some(me) = me {
                    self.current_user = Some(me);
                }
                vec![SessionEvent::UsersChanged(self.users.clone())]
            }
            EventName::Message => {
                let Some(message) = packet.parse_data::<ChatMessage>()? else {
                    return Ok(Applied::Events(Vec::new()));
                };
                if message.sender_id == self.current_user_id() {
                    debug!(id = message.id, "own message echo dropped");
                    Vec::new()
                } else {
                    self.messages.push(message.clone());
                    vec![SessionEvent::Message(message)]
                }
            }
            EventName::NameChangeSuccess => {
                let Some(name) = packet.parse_data::<String>()? else {
                    return Ok(Applied::Events(Vec::new()));
                };
                if let Some(me) = self.current_user.as_mut() {
                    me.name = name.clone();
                }
                self.editing_name = false;
                vec![SessionEvent::NameChanged(name)]
            }
            EventName::NameChangeFail => {
                let message = packet
                    .parse_data::<String>()?
                    .unwrap_or_else(|| "name change rejected".into());
                vec![SessionEvent::Alert(message)]
            }
            EventName::StartUpload => {
                return match packet.parse_data::<StartUpload>()? {
                    Some(request) => Ok(Applied::StartUpload(request)),
                    None => Ok(Applied::Events(Vec::new())),
                };
            }
            other => {
                warn!(event = %other, "unexpected event from server");
                Vec::new()
            }
        };
        Ok(Applied::Events(events))
    }
}
