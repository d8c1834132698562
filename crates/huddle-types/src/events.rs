use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::{DirectMessageResponse, MessageResponse};
use crate::models::PresenceStatus;

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, email: String },

    /// The connection was admitted to a channel room
    RoomJoined { channel_id: Uuid },

    /// The connection left (or was evicted from) a channel room
    RoomLeft { channel_id: Uuid },

    /// A message or thread reply was posted
    MessageCreated { message: MessageResponse },

    /// A message was edited, pinned, unpinned or its reply count changed
    MessageUpdated { message: MessageResponse },

    /// A message was soft-deleted
    MessageDeleted {
        id: Uuid,
        channel_id: Uuid,
        thread_id: Option<Uuid>,
    },

    /// A user's presence changed
    PresenceChanged {
        user_id: Uuid,
        status: PresenceStatus,
        last_seen: Option<DateTime<Utc>>,
    },

    /// A user started typing
    TypingStarted { channel_id: Uuid, user_id: Uuid },

    /// A user stopped typing
    TypingStopped { channel_id: Uuid, user_id: Uuid },

    /// A reaction was added to a message
    ReactionAdded {
        channel_id: Uuid,
        message_id: Uuid,
        user_id: Uuid,
        emoji: String,
    },

    /// A reaction was removed from a message
    ReactionRemoved {
        channel_id: Uuid,
        message_id: Uuid,
        user_id: Uuid,
        emoji: String,
    },

    /// A direct message, delivered to both participants
    DirectMessageCreated { message: DirectMessageResponse },

    /// A command from this connection was refused
    Error { code: String, message: String },
}

impl GatewayEvent {
    /// Returns the channel_id if this event is scoped to a channel room.
    /// Events that return `None` are global or targeted at a user.
    pub fn channel_id(&self) -> Option<Uuid> {
        match self {
            Self::MessageCreated { message } | Self::MessageUpdated { message } => {
                Some(message.channel_id)
            }
            Self::MessageDeleted { channel_id, .. }
            | Self::TypingStarted { channel_id, .. }
            | Self::TypingStopped { channel_id, .. }
            | Self::ReactionAdded { channel_id, .. }
            | Self::ReactionRemoved { channel_id, .. }
            | Self::RoomJoined { channel_id }
            | Self::RoomLeft { channel_id } => Some(*channel_id),
            _ => None,
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Subscribe to a channel's room. Requires membership.
    JoinChannel { channel_id: Uuid },

    /// Unsubscribe from a channel's room.
    LeaveChannel { channel_id: Uuid },

    /// Indicate typing in a channel
    StartTyping { channel_id: Uuid },

    /// Indicate typing stopped in a channel
    StopTyping { channel_id: Uuid },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_use_adjacent_tagging() {
        let channel_id = Uuid::new_v4();
        let raw = format!(r#"{{"type":"JoinChannel","data":{{"channel_id":"{}"}}}}"#, channel_id);
        match serde_json::from_str::<GatewayCommand>(&raw).unwrap() {
            GatewayCommand::JoinChannel { channel_id: id } => assert_eq!(id, channel_id),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn presence_is_not_room_scoped() {
        let event = GatewayEvent::PresenceChanged {
            user_id: Uuid::new_v4(),
            status: PresenceStatus::Online,
            last_seen: None,
        };
        assert_eq!(event.channel_id(), None);

        let channel_id = Uuid::new_v4();
        let typing = GatewayEvent::TypingStarted {
            channel_id,
            user_id: Uuid::new_v4(),
        };
        assert_eq!(typing.channel_id(), Some(channel_id));
    }
}
