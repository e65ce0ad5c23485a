use thiserror::Error;

/// Failures surfaced to the UI layer through session events.
///
/// Client-side validation rejects (empty credentials, blank messages,
/// self-chats) and guard drops (events for unknown conversations) are silent
/// and never produce a value of this type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("failed to connect realtime transport: {0}")]
    TransportConnect(String),
    #[error("{status}: {body}")]
    Status { status: u16, body: String },
    #[error("{0}")]
    Network(String),
    #[error("Failed to decode server response: {0}")]
    Decode(String),
    #[error("Failed to open file: {0}")]
    FileAccess(String),
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

impl ClientError {
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode(_))
    }

    /// HTTP status of a rejected request, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}
