//! Client core for the chat desktop app: session state, the conversation
//! store, the HTTP request gateway and the Socket.IO real-time transport.

pub mod config;
pub mod error;
pub mod gateway;
pub mod models;
pub mod session;
pub mod socketio;
pub mod store;
pub mod transport;

pub use config::{load_settings, ClientSettings};
pub use error::ClientError;
pub use gateway::{FileUpload, HttpGateway, RequestGateway};
pub use models::{ContentKind, Conversation, ConversationKey, FileInfo, Message, User};
pub use session::{SessionEvent, SessionFacade, SessionState};
pub use store::ConversationStore;
pub use transport::{SocketIoTransport, TransportEvent, TransportSession};
