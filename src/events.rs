//! The process-wide broadcast bus the realtime engine fans events out over:
//! a single `tokio::broadcast::Sender` shared via Rocket state, with SSE
//! consumers (`routes/stream.rs`) filtering by room.

use crate::models::{Message, PinnedMessage, Poll, PublicUser, ReactionSummary, RoomWithMembers};
use tokio::sync::broadcast;

#[derive(Debug, Clone)]
pub enum ChatEvent {
    NewMessage { room_id: String, message: Message },
    MessageEdited { room_id: String, message: Message },
    MessageDeleted { room_id: String, message: Message },
    UserStatus { room_id: String, user_id: String, status: String },
    UserTyping { room_id: String, user_id: String, is_typing: bool },
    ReadUpdated { room_id: String, user_id: String, last_read_message_id: i64 },
    RoomNameUpdated { room_id: String, name: Option<String> },
    RoomMembersUpdated { room_id: String, members: Vec<PublicUser> },
    UserProfileUpdated { room_id: String, user: PublicUser },
    PinUpdated { room_id: String, pins: Vec<PinnedMessage> },
    PollUpdated { room_id: String, poll: Poll },
    PollCreated { room_id: String, poll: Poll },
    ReactionUpdated { room_id: String, message_id: i64, reactions: Vec<ReactionSummary> },
    AdminUpdated { room_id: String, user_id: String, is_admin: bool },
    RoomUpdated { room_id: String },
    JoinedRoom { room: RoomWithMembers },
    Error { room_id: Option<String>, target_user_id: String, message: String },
}

pub struct EventBus {
    pub sender: broadcast::Sender<ChatEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1024);
        EventBus { sender }
    }

    /// Broadcast failures (no subscribers, or a single lagging subscriber)
    /// never abort the originating write.
    pub fn publish(&self, event: ChatEvent) {
        let _ = self.sender.send(event);
    }
}
