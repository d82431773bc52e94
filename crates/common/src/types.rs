// Domain types carried over the live channel.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which family of push events a topic belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TopicKind {
    /// A chat channel, keyed by channel id.
    Channel,
    /// The calendar feed bound to one event, keyed by event id.
    Calendar,
}

/// A topic the client can join or leave on the shared connection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TopicKey {
    pub kind: TopicKind,
    pub id: u64,
}

impl TopicKey {
    pub fn channel(channel_id: u64) -> Self {
        Self { kind: TopicKind::Channel, id: channel_id }
    }

    pub fn calendar(event_id: u64) -> Self {
        Self { kind: TopicKind::Calendar, id: event_id }
    }
}

impl fmt::Display for TopicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TopicKind::Channel => write!(f, "channel:{}", self.id),
            TopicKind::Calendar => write!(f, "calendar:{}", self.id),
        }
    }
}

/// Author summary embedded in chat payloads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// A chat message as pushed by the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: u64,
    pub channel_id: u64,
    pub user_id: u64,
    pub content: String,
    /// Thread parent, when this message is a reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_message_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
}

/// Payload of a `message_deleted` event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageDeleted {
    pub message_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<u64>,
}

/// A reaction that was added to a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageReaction {
    pub id: u64,
    pub message_id: u64,
    pub user_id: u64,
    pub emoji: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReactionAction {
    Remove,
}

/// A reaction toggle that removed an existing reaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReactionRemoved {
    pub action: ReactionAction,
    pub message_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<u64>,
    pub user_id: u64,
    pub emoji: String,
}

/// Payload of a `reaction` event: the server pushes either the created
/// reaction row or a removal notice carrying `action: "remove"`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ReactionEvent {
    Removed(ReactionRemoved),
    Added(MessageReaction),
}

impl ReactionEvent {
    pub fn message_id(&self) -> u64 {
        match self {
            Self::Removed(removed) => removed.message_id,
            Self::Added(added) => added.message_id,
        }
    }
}

/// Payload of a `typing` event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TypingPayload {
    pub user_id: u64,
    pub user_name: String,
    pub typing: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn topic_key_display_names_kind_and_id() {
        assert_eq!(TopicKey::channel(42).to_string(), "channel:42");
        assert_eq!(TopicKey::calendar(7).to_string(), "calendar:7");
    }

    #[test]
    fn chat_message_accepts_server_timestamps_and_embedded_user() {
        let message: ChatMessage = serde_json::from_value(json!({
            "id": 1,
            "channel_id": 42,
            "user_id": 3,
            "content": "hello",
            "created_at": "2026-03-01T09:30:00.123456+09:00",
            "updated_at": "2026-03-01T09:30:00.123456+09:00",
            "is_deleted": false,
            "user": { "id": 3, "name": "Aki", "email": "aki@example.com" }
        }))
        .expect("message should decode");

        assert_eq!(message.channel_id, 42);
        assert_eq!(message.user.as_ref().map(|u| u.name.as_str()), Some("Aki"));
        assert_eq!(
            message.created_at.map(|ts| ts.to_rfc3339()),
            Some("2026-03-01T00:30:00.123456+00:00".to_string())
        );
    }

    #[test]
    fn reaction_event_distinguishes_removal_from_added_row() {
        let removed: ReactionEvent = serde_json::from_value(json!({
            "message_id": 9, "channel_id": 42, "user_id": 3, "emoji": "👍", "action": "remove"
        }))
        .expect("removal should decode");
        assert!(matches!(removed, ReactionEvent::Removed(_)));

        let added: ReactionEvent = serde_json::from_value(json!({
            "id": 5, "message_id": 9, "user_id": 3, "emoji": "👍",
            "created_at": "2026-03-01T00:00:00Z"
        }))
        .expect("added reaction should decode");
        assert!(matches!(added, ReactionEvent::Added(_)));
        assert_eq!(added.message_id(), 9);
    }
}
