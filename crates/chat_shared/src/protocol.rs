use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    domain::{ConversationId, MessageId, UserId},
    error::ApiError,
};

pub const EVENT_MESSAGE_SEND: &str = "message:send";
pub const EVENT_FILE_SEND: &str = "file:send";
pub const EVENT_TYPING: &str = "typing";
pub const EVENT_MESSAGE_RECEIVE: &str = "message:receive";
pub const EVENT_USER_ONLINE: &str = "status:user-online";
pub const EVENT_USER_OFFLINE: &str = "status:user-offline";
pub const EVENT_ERROR: &str = "error";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSummary {
    pub id: UserId,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: AccountSummary,
}

/// The register endpoint's success body is not fixed; both fields are
/// optional so any JSON object decodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<AccountSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub is_online: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub content_type: String,
    #[serde(default)]
    pub content: String,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_username: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub file_url: String,
    pub file_name: String,
    pub file_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessagePayload {
    pub recipient_id: UserId,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendFilePayload {
    pub recipient_id: UserId,
    pub file_url: String,
    pub file_name: String,
    pub file_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    pub recipient_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresencePayload {
    pub user_id: UserId,
}

/// Inbound typing signal. The backend relays only the sender, so the
/// conversation is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingNotice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<ConversationId>,
    pub sender_id: UserId,
}

/// Events the client emits on the real-time channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundEvent {
    SendMessage(SendMessagePayload),
    SendFile(SendFilePayload),
    Typing(TypingPayload),
}

impl OutboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SendMessage(_) => EVENT_MESSAGE_SEND,
            Self::SendFile(_) => EVENT_FILE_SEND,
            Self::Typing(_) => EVENT_TYPING,
        }
    }

    pub fn payload(&self) -> serde_json::Result<Value> {
        match self {
            Self::SendMessage(payload) => serde_json::to_value(payload),
            Self::SendFile(payload) => serde_json::to_value(payload),
            Self::Typing(payload) => serde_json::to_value(payload),
        }
    }
}

/// Events the backend pushes on the real-time channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    MessageReceived(MessagePayload),
    UserOnline(PresencePayload),
    UserOffline(PresencePayload),
    Typing(TypingNotice),
    Error(ApiError),
}

impl InboundEvent {
    /// Decodes a named event. Names this client does not handle yield `Ok(None)`.
    pub fn from_event(name: &str, data: Value) -> serde_json::Result<Option<Self>> {
        let event = match name {
            EVENT_MESSAGE_RECEIVE => Self::MessageReceived(serde_json::from_value(data)?),
            EVENT_USER_ONLINE => Self::UserOnline(serde_json::from_value(data)?),
            EVENT_USER_OFFLINE => Self::UserOffline(serde_json::from_value(data)?),
            EVENT_TYPING => Self::Typing(serde_json::from_value(data)?),
            EVENT_ERROR => Self::Error(serde_json::from_value(data)?),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
