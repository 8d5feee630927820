//! Event model for upstream updates.
//!
//! Every update carries a source-assigned, monotonically increasing sequence id
//! and exactly one payload slot. The payload is decoded straight into the
//! [`EventPayload`] sum type so the notifier core never inspects structure to
//! find out what kind of event it holds.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

/// Classified kind of an event, used for subscription filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// New incoming message.
    Message,
    /// New version of a message that was edited.
    EditedMessage,
    /// New incoming channel post.
    ChannelPost,
    /// New version of a channel post that was edited.
    EditedChannelPost,
    /// Any update this crate does not model.
    Unknown,
}

impl EventKind {
    /// All kinds, in slot-precedence order.
    pub const ALL: [Self; 5] = [
        Self::Message,
        Self::EditedMessage,
        Self::ChannelPost,
        Self::EditedChannelPost,
        Self::Unknown,
    ];

    /// Wire name of the payload slot for this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::EditedMessage => "edited_message",
            Self::ChannelPost => "channel_post",
            Self::EditedChannelPost => "edited_channel_post",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user or bot.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub first_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
    #[serde(default)]
    pub can_join_groups: bool,
    #[serde(default)]
    pub can_read_all_group_messages: bool,
    #[serde(default)]
    pub supports_inline_queries: bool,
}

/// Chat category as reported by the API.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatType {
    Private,
    Group,
    Supergroup,
    Channel,
    Other,
}

/// A private chat, group, supergroup or channel.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Chat {
    /// Parsed chat type.
    #[must_use]
    pub fn chat_type(&self) -> ChatType {
        match self.kind.as_str() {
            "private" => ChatType::Private,
            "group" => ChatType::Group,
            "supergroup" => ChatType::Supergroup,
            "channel" => ChatType::Channel,
            _ => ChatType::Other,
        }
    }
}

/// A message or channel post.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub message_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_chat: Option<Chat>,
    /// Unix timestamp in seconds.
    #[serde(default)]
    pub date: i64,
    #[serde(default)]
    pub chat: Chat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forward_from_chat: Option<Chat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub via_bot: Option<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Message {
    /// Send time as a UTC timestamp, if `date` is representable.
    #[must_use]
    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.date, 0)
    }
}

/// Payload of an event, one variant per update slot.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    Message(Message),
    EditedMessage(Message),
    ChannelPost(Message),
    EditedChannelPost(Message),
    /// Slot not modelled here, or a known slot that failed to decode.
    Unknown {
        /// The slot name, when one was present.
        field: Option<String>,
        /// The raw update object without `update_id`.
        raw: Value,
    },
}

impl EventPayload {
    /// Kind used for subscription filtering.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Message(_) => EventKind::Message,
            Self::EditedMessage(_) => EventKind::EditedMessage,
            Self::ChannelPost(_) => EventKind::ChannelPost,
            Self::EditedChannelPost(_) => EventKind::EditedChannelPost,
            Self::Unknown { .. } => EventKind::Unknown,
        }
    }

    /// The message carried by this payload, if any.
    #[must_use]
    pub const fn message(&self) -> Option<&Message> {
        match self {
            Self::Message(m) | Self::EditedMessage(m) | Self::ChannelPost(m) | Self::EditedChannelPost(m) => Some(m),
            Self::Unknown { .. } => None,
        }
    }
}

/// A single upstream event.
///
/// Serializes back to the wire shape it was decoded from: `update_id` next to
/// the payload slot, or next to the raw slots of an unknown update.
///
/// # Examples
///
/// ```
/// use telenotify::{Event, EventKind};
///
/// let event: Event = serde_json::from_str(
///     r#"{"update_id": 7, "channel_post": {"message_id": 1, "chat": {"id": -100, "type": "channel"}}}"#,
/// ).unwrap();
/// assert_eq!(event.sequence_id, 7);
/// assert_eq!(event.kind(), EventKind::ChannelPost);
/// ```
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawUpdate")]
pub struct Event {
    pub sequence_id: u64,
    pub payload: EventPayload,
}

impl Event {
    /// Creates an event from its parts.
    #[must_use]
    pub const fn new(sequence_id: u64, payload: EventPayload) -> Self {
        Self { sequence_id, payload }
    }

    /// Kind used for subscription filtering.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("update_id", &self.sequence_id)?;
        match &self.payload {
            EventPayload::Message(m)
            | EventPayload::EditedMessage(m)
            | EventPayload::ChannelPost(m)
            | EventPayload::EditedChannelPost(m) => map.serialize_entry(self.kind().as_str(), m)?,
            EventPayload::Unknown { raw: Value::Object(slots), .. } => {
                for (name, slot) in slots.iter().filter(|(name, _)| name.as_str() != "update_id") {
                    map.serialize_entry(name, slot)?;
                }
            }
            EventPayload::Unknown { field, raw } => {
                if let Some(field) = field {
                    map.serialize_entry(field, raw)?;
                }
            }
        }
        map.end()
    }
}

/// Wire shape of an update before slot classification.
#[derive(Deserialize)]
struct RawUpdate {
    update_id: u64,
    #[serde(flatten)]
    slots: Map<String, Value>,
}

const SLOT_PRECEDENCE: [EventKind; 4] = [
    EventKind::Message,
    EventKind::EditedMessage,
    EventKind::ChannelPost,
    EventKind::EditedChannelPost,
];

impl From<RawUpdate> for Event {
    fn from(raw: RawUpdate) -> Self {
        let RawUpdate { update_id, slots } = raw;

        for kind in SLOT_PRECEDENCE {
            let Some(slot) = slots.get(kind.as_str()) else {
                continue;
            };
            if slot.is_null() {
                continue;
            }
            let Ok(message) = Message::deserialize(slot) else {
                return Self::new(
                    update_id,
                    EventPayload::Unknown {
                        field: Some(kind.as_str().to_string()),
                        raw: Value::Object(slots),
                    },
                );
            };
            let payload = match kind {
                EventKind::Message => EventPayload::Message(message),
                EventKind::EditedMessage => EventPayload::EditedMessage(message),
                EventKind::ChannelPost => EventPayload::ChannelPost(message),
                _ => EventPayload::EditedChannelPost(message),
            };
            return Self::new(update_id, payload);
        }

        let field = slots
            .iter()
            .find(|(_, v)| !v.is_null())
            .map(|(k, _)| k.clone());
        Self::new(
            update_id,
            EventPayload::Unknown {
                field,
                raw: Value::Object(slots),
            },
        )
    }
}
