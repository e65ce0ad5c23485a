use std::{fmt, str::FromStr};

use chat_shared::{
    domain::{ConversationId, MessageId, UserId},
    protocol::{AccountSummary, MessagePayload, UserSummary},
};
use chrono::{DateTime, NaiveDateTime};
use serde::Deserialize;
use thiserror::Error;

/// Content shown in place of an image/file message whose descriptor could not
/// be parsed.
pub const FILE_FALLBACK_CONTENT: &str = "Error: Could not display received file.";
const TRANSIENT_KEY_PREFIX: &str = "temp_";
const UNKNOWN_CONVERSATION_NAME: &str = "Unknown Conversation";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub is_online: bool,
}

impl User {
    pub fn new(id: UserId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            is_online: false,
        }
    }
}

impl From<UserSummary> for User {
    fn from(value: UserSummary) -> Self {
        Self {
            id: value.id,
            username: value.username,
            is_online: value.is_online,
        }
    }
}

impl From<AccountSummary> for User {
    fn from(value: AccountSummary) -> Self {
        Self::new(value.id, value.username)
    }
}

/// Identifies a conversation in the store.
///
/// `Transient` marks a chat the user opened before any message exists; the
/// server has never seen it, so it is keyed by the other participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConversationKey {
    Persisted(ConversationId),
    Transient(UserId),
}

impl ConversationKey {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub fn persisted_id(&self) -> Option<ConversationId> {
        match self {
            Self::Persisted(id) => Some(*id),
            Self::Transient(_) => None,
        }
    }
}

impl From<ConversationId> for ConversationKey {
    fn from(value: ConversationId) -> Self {
        Self::Persisted(value)
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Persisted(id) => write!(f, "{id}"),
            Self::Transient(user_id) => write!(f, "{TRANSIENT_KEY_PREFIX}{user_id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid conversation key: {0:?}")]
pub struct ParseConversationKeyError(String);

impl FromStr for ConversationKey {
    type Err = ParseConversationKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseConversationKeyError(s.to_string());
        if let Some(rest) = s.strip_prefix(TRANSIENT_KEY_PREFIX) {
            let user_id = rest.parse::<i64>().map_err(|_| invalid())?;
            return Ok(Self::Transient(UserId(user_id)));
        }
        let id = s.parse::<i64>().map_err(|_| invalid())?;
        Ok(Self::Persisted(ConversationId(id)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    Text,
    Image,
    File,
    System,
}

impl ContentKind {
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "text" => Some(Self::Text),
            "image" => Some(Self::Image),
            "file" => Some(Self::File),
            "system" => Some(Self::System),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::File => "file",
            Self::System => "system",
        }
    }

    fn carries_file(&self) -> bool {
        matches!(self, Self::Image | Self::File)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub url: String,
    pub name: String,
    pub file_type: String,
}

#[derive(Deserialize)]
struct FileDescriptor {
    url: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, rename = "type")]
    file_type: Option<String>,
}

impl FileInfo {
    fn parse(content: &str) -> Option<Self> {
        let descriptor: FileDescriptor = serde_json::from_str(content).ok()?;
        Some(Self {
            url: descriptor.url,
            name: descriptor.name.unwrap_or_default(),
            file_type: descriptor.file_type.unwrap_or_default(),
        })
    }
}

/// A chat message as held by the store.
///
/// Fields are read-only: kind and content are settled once by
/// [`Message::from_payload`] and never re-derived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    id: MessageId,
    conversation_id: ConversationId,
    sender_id: UserId,
    kind: ContentKind,
    content: String,
    created_at: String,
    sender_username: String,
    file_info: Option<FileInfo>,
}

impl Message {
    /// Builds a message from its wire form. Never fails: image/file messages
    /// whose descriptor does not parse become `System` messages carrying
    /// [`FILE_FALLBACK_CONTENT`].
    pub fn from_payload(payload: MessagePayload) -> Self {
        let mut kind = ContentKind::from_wire(&payload.content_type).unwrap_or(ContentKind::System);
        let mut content = payload.content;
        let mut file_info = None;

        if kind.carries_file() {
            match FileInfo::parse(&content) {
                Some(info) => file_info = Some(info),
                None => {
                    kind = ContentKind::System;
                    content = FILE_FALLBACK_CONTENT.to_string();
                }
            }
        }

        Self {
            id: payload.id,
            conversation_id: payload.conversation_id,
            sender_id: payload.sender_id,
            kind,
            content,
            created_at: payload.created_at,
            sender_username: payload.sender_username.unwrap_or_default(),
            file_info,
        }
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn conversation_id(&self) -> ConversationId {
        self.conversation_id
    }

    pub fn conversation_key(&self) -> ConversationKey {
        ConversationKey::Persisted(self.conversation_id)
    }

    pub fn sender_id(&self) -> UserId {
        self.sender_id
    }

    pub fn kind(&self) -> ContentKind {
        self.kind
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn created_at(&self) -> &str {
        &self.created_at
    }

    pub fn sender_username(&self) -> &str {
        &self.sender_username
    }

    pub fn file_info(&self) -> Option<&FileInfo> {
        self.file_info.as_ref()
    }

    pub fn is_own(&self, user_id: UserId) -> bool {
        self.sender_id == user_id
    }

    /// `HH:MM` in the timestamp's own offset, or an empty string when the
    /// timestamp does not parse.
    pub fn display_time(&self) -> String {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(&self.created_at) {
            return parsed.format("%H:%M").to_string();
        }
        NaiveDateTime::parse_from_str(&self.created_at, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|parsed| parsed.format("%H:%M").to_string())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub(crate) key: ConversationKey,
    pub(crate) participants: Vec<User>,
    pub(crate) messages: Vec<Message>,
    pub(crate) last_message: Option<Message>,
}

impl Conversation {
    pub fn new(key: ConversationKey, participants: Vec<User>) -> Self {
        Self {
            key,
            participants,
            messages: Vec::new(),
            last_message: None,
        }
    }

    /// Client-only conversation between `me` and `other`, keyed by `other`.
    pub fn transient(me: User, other: User) -> Self {
        Self::new(ConversationKey::Transient(other.id), vec![me, other])
    }

    pub fn key(&self) -> ConversationKey {
        self.key
    }

    pub fn participants(&self) -> &[User] {
        &self.participants
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.last_message.as_ref()
    }

    pub fn has_participant(&self, user_id: UserId) -> bool {
        self.participants.iter().any(|user| user.id == user_id)
    }

    /// Name of the other side of the chat as seen by `self_id`.
    pub fn display_name(&self, self_id: UserId) -> &str {
        self.participants
            .iter()
            .find(|user| user.id != self_id)
            .or_else(|| self.participants.first())
            .map(|user| user.username.as_str())
            .unwrap_or(UNKNOWN_CONVERSATION_NAME)
    }
}

#[cfg(test)]
#[path = "tests/models_tests.rs"]
mod tests;
