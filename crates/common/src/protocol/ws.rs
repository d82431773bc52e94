// WebSocket message types for the Sherpa live channel.
//
// Outbound frames are small control objects discriminated by `type`.
// Inbound frames share one loose envelope; the kind decides which field
// carries the payload, so decoding is a two-step affair.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::types::{
    ChatMessage, MessageDeleted, ReactionEvent, TopicKey, TopicKind, TypingPayload,
};

/// Every `type` the client may send.
pub const CLIENT_MESSAGE_TYPES: &[&str] =
    &["join", "leave", "join_calendar", "leave_calendar", "typing", "typing_stop"];

/// Every inbound kind the client understands.
pub const SERVER_EVENT_KINDS: &[&str] = &[
    "message",
    "message_updated",
    "message_deleted",
    "reaction",
    "typing",
    "calendar_update",
    "error",
];

// ── Client → Server ────────────────────────────────────────────────

/// Control messages written by the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start receiving events for a chat channel.
    Join { channel_id: u64 },
    /// Stop receiving events for a chat channel.
    Leave { channel_id: u64 },
    /// Start receiving `calendar_update` for an event.
    JoinCalendar { event_id: u64 },
    /// Stop receiving `calendar_update` for an event.
    LeaveCalendar { event_id: u64 },
    /// Ephemeral: the user started typing in a channel.
    Typing { channel_id: u64, user_name: String },
    /// Ephemeral: the user stopped typing in a channel.
    TypingStop { channel_id: u64, user_name: String },
}

impl ClientMessage {
    /// The join request for a topic.
    pub fn join(topic: TopicKey) -> Self {
        match topic.kind {
            TopicKind::Channel => Self::Join { channel_id: topic.id },
            TopicKind::Calendar => Self::JoinCalendar { event_id: topic.id },
        }
    }

    /// The leave request for a topic.
    pub fn leave(topic: TopicKey) -> Self {
        match topic.kind {
            TopicKind::Channel => Self::Leave { channel_id: topic.id },
            TopicKind::Calendar => Self::LeaveCalendar { event_id: topic.id },
        }
    }

    pub fn typing(channel_id: u64, user_name: impl Into<String>, is_typing: bool) -> Self {
        let user_name = user_name.into();
        if is_typing {
            Self::Typing { channel_id, user_name }
        } else {
            Self::TypingStop { channel_id, user_name }
        }
    }

    /// Wire name of this message's `type` field.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::Leave { .. } => "leave",
            Self::JoinCalendar { .. } => "join_calendar",
            Self::LeaveCalendar { .. } => "leave_calendar",
            Self::Typing { .. } => "typing",
            Self::TypingStop { .. } => "typing_stop",
        }
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }
}

// ── Server → Client ────────────────────────────────────────────────

/// Raw inbound frame before kind-specific decoding.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Envelope {
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(raw).map_err(ProtocolError::Json)
    }
}

/// Discriminator of inbound events. Also the key of listener slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Message,
    MessageUpdated,
    MessageDeleted,
    Reaction,
    Typing,
    CalendarUpdate,
    Error,
}

impl EventKind {
    pub const ALL: [EventKind; 7] = [
        EventKind::Message,
        EventKind::MessageUpdated,
        EventKind::MessageDeleted,
        EventKind::Reaction,
        EventKind::Typing,
        EventKind::CalendarUpdate,
        EventKind::Error,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::MessageUpdated => "message_updated",
            Self::MessageDeleted => "message_deleted",
            Self::Reaction => "reaction",
            Self::Typing => "typing",
            Self::CalendarUpdate => "calendar_update",
            Self::Error => "error",
        }
    }

    pub fn from_wire(kind: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|candidate| candidate.as_str() == kind)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully decoded inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Message(ChatMessage),
    MessageUpdated(ChatMessage),
    MessageDeleted(MessageDeleted),
    Reaction(ReactionEvent),
    Typing(TypingPayload),
    /// The calendar changed; consumers re-fetch. The payload is optional.
    CalendarUpdate(Option<Value>),
    /// Server-reported error text.
    Error(String),
}

/// Why an envelope was dropped without being treated as an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    UnknownKind(String),
    MissingPayload(EventKind),
}

/// Outcome of decoding an envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Event(ServerEvent),
    Ignored(IgnoreReason),
}

impl ServerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Message(_) => EventKind::Message,
            Self::MessageUpdated(_) => EventKind::MessageUpdated,
            Self::MessageDeleted(_) => EventKind::MessageDeleted,
            Self::Reaction(_) => EventKind::Reaction,
            Self::Typing(_) => EventKind::Typing,
            Self::CalendarUpdate(_) => EventKind::CalendarUpdate,
            Self::Error(_) => EventKind::Error,
        }
    }

    /// Parse and decode one raw text frame.
    pub fn decode_str(raw: &str) -> Result<Decoded, ProtocolError> {
        Self::decode(Envelope::parse(raw)?)
    }

    /// Decode an envelope into a typed event.
    ///
    /// Unknown kinds, and kinds whose carrying field is absent, come back as
    /// [`Decoded::Ignored`]. A carrying field with the wrong shape is an error.
    pub fn decode(envelope: Envelope) -> Result<Decoded, ProtocolError> {
        let Some(kind) = EventKind::from_wire(&envelope.kind) else {
            return Ok(Decoded::Ignored(IgnoreReason::UnknownKind(envelope.kind)));
        };

        let carried = match kind {
            EventKind::Message => envelope.message,
            EventKind::Error => envelope.error.filter(|text| !text.is_empty()).map(Value::String),
            _ => envelope.payload,
        };
        if carried.is_none() && kind != EventKind::CalendarUpdate {
            return Ok(Decoded::Ignored(IgnoreReason::MissingPayload(kind)));
        }

        let event = match kind {
            EventKind::Message => Self::Message(payload(kind, carried)?),
            EventKind::MessageUpdated => Self::MessageUpdated(payload(kind, carried)?),
            EventKind::MessageDeleted => Self::MessageDeleted(payload(kind, carried)?),
            EventKind::Reaction => Self::Reaction(payload(kind, carried)?),
            EventKind::Typing => Self::Typing(payload(kind, carried)?),
            EventKind::CalendarUpdate => Self::CalendarUpdate(carried),
            EventKind::Error => Self::Error(payload(kind, carried)?),
        };
        Ok(Decoded::Event(event))
    }
}

fn payload<T: serde::de::DeserializeOwned>(
    kind: EventKind,
    value: Option<Value>,
) -> Result<T, ProtocolError> {
    serde_json::from_value(value.unwrap_or(Value::Null))
        .map_err(|source| ProtocolError::Payload { kind, source })
}

/// Failures while encoding or decoding live channel frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed live event: {0}")]
    Json(#[source] serde_json::Error),
    #[error("invalid `{kind}` payload: {source}")]
    Payload {
        kind: EventKind,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode client message: {0}")]
    Encode(#[source] serde_json::Error),
}
