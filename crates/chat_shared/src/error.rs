use serde::{Deserialize, Serialize};

/// Body the backend attaches to failed HTTP responses and to the socket
/// `error` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub message: String,
}
