// Backend data model (users, messages, conversation entries).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub profile_photo: Option<String>,
}

/// `senderId` / `receiverId` arrive either as a bare id or populated with the
/// user document, depending on the endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PartyRef {
    Id(String),
    User(User),
}

impl PartyRef {
    pub fn id(&self) -> &str {
        match self {
            PartyRef::Id(id) => id,
            PartyRef::User(user) => &user.id,
        }
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            PartyRef::Id(_) => None,
            PartyRef::User(user) => Some(user),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
    Audio,
    // Must stay last: it also absorbs unknown values.
    #[default]
    #[serde(other)]
    None,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::None => "none",
            MediaType::Image => "image",
            MediaType::Video => "video",
            MediaType::Audio => "audio",
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(rename = "_id")]
    pub id: String,
    pub sender_id: PartyRef,
    pub receiver_id: PartyRef,
    #[serde(default, rename = "message")]
    pub body: Option<String>,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub media_type: MediaType,
    #[serde(alias = "createdAt")]
    pub sent_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_read: bool,
    // Only present on snapshot rows (and some realtime pushes).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unread_count: Option<u32>,
}

impl Message {
    pub fn sender(&self) -> &str {
        self.sender_id.id()
    }

    pub fn receiver(&self) -> &str {
        self.receiver_id.id()
    }

    pub fn is_from(&self, user_id: &str) -> bool {
        self.sender() == user_id
    }
}

/// The other party of a one-to-one message, seen from `self_id`.
///
/// Returns `None` when `self_id` is neither sender nor receiver. A note to
/// self resolves to the receiver.
pub fn other_party<'a>(message: &'a Message, self_id: &str) -> Option<&'a PartyRef> {
    if message.sender() == self_id {
        Some(&message.receiver_id)
    } else if message.receiver() == self_id {
        Some(&message.sender_id)
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Sent,
    Received,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationEntry {
    pub peer_id: String,
    pub peer: Option<User>,
    pub last_message: Message,
    pub direction: Direction,
    pub unread_count: u32,
    pub is_read: bool,
    pub last_activity_at: DateTime<Utc>,
}

impl ConversationEntry {
    /// Derive the entry for `message` purely from its payload. The backend owns
    /// the unread counter; without one, an unread received message counts as 1.
    pub fn from_message(message: Message, self_id: &str) -> Option<Self> {
        let peer = other_party(&message, self_id)?;
        let peer_id = peer.id().to_string();
        let peer = peer.user().cloned();
        let direction = if message.is_from(self_id) {
            Direction::Sent
        } else {
            Direction::Received
        };
        let fallback_unread = match direction {
            Direction::Received if !message.is_read => 1,
            _ => 0,
        };
        Some(Self {
            peer_id,
            peer,
            direction,
            unread_count: message.unread_count.unwrap_or(fallback_unread),
            is_read: message.is_read,
            last_activity_at: message.sent_at,
            last_message: message,
        })
    }
}
