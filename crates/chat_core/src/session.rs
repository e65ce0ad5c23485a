//! Session facade: the single entry point the UI drives.
//!
//! Network work runs on spawned tasks that each post one [`Completion`] back
//! onto an unbounded queue; transport events are forwarded into the same
//! queue. The store and session state change only while the owner drains the
//! queue with [`SessionFacade::process_next`] or
//! [`SessionFacade::process_pending`], so every mutation and every emitted
//! [`SessionEvent`] happens on the owner's context.
//!
//! Each login starts a numbered connect attempt. Attempts run one at a time
//! in order, an attempt superseded before its turn is skipped, and lifecycle
//! events from any attempt but the latest are ignored.

use std::{
    future::Future,
    path::Path,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use chat_shared::{
    domain::UserId,
    protocol::{
        LoginResponse, MessagePayload, OutboundEvent, RegisterResponse, SendFilePayload,
        SendMessagePayload, TypingPayload, UploadResponse, UserSummary,
    },
};
use tokio::{
    sync::{broadcast, mpsc, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    error::ClientError,
    gateway::{FileUpload, RequestGateway},
    models::{Conversation, ConversationKey, Message, User},
    store::ConversationStore,
    transport::{TransportEvent, TransportSession},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Anonymous,
    Connecting,
    Active,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoginSucceeded(User),
    LoginFailed(ClientError),
    RegisterSucceeded(RegisterResponse),
    RegisterFailed(ClientError),
    Connected,
    Disconnected,
    ConnectionFailed(ClientError),
    UsersFound(Vec<User>),
    UserSearchFailed(ClientError),
    ConversationAdded(Conversation),
    ConversationStarted(Conversation),
    HistoryLoaded {
        conversation: ConversationKey,
        messages: Vec<Message>,
    },
    HistoryLoadFailed {
        conversation: ConversationKey,
        error: ClientError,
    },
    UploadCompleted {
        recipient_id: UserId,
        upload: UploadResponse,
    },
    UploadFailed {
        recipient_id: UserId,
        error: ClientError,
    },
    MessageReceived(Message),
    PresenceChanged {
        user_id: UserId,
        online: bool,
    },
    /// `conversation` is `None` when the sender shares no known conversation.
    TypingReceived {
        conversation: Option<ConversationKey>,
        sender_id: UserId,
    },
    ServerError(String),
}

#[derive(Debug)]
enum Completion {
    Login(Result<LoginResponse, ClientError>),
    Register(Result<RegisterResponse, ClientError>),
    Search(Result<Vec<UserSummary>, ClientError>),
    History {
        key: ConversationKey,
        result: Result<Vec<MessagePayload>, ClientError>,
    },
    Upload {
        recipient_id: UserId,
        result: Result<UploadResponse, ClientError>,
    },
    Transport(TransportEvent),
}

/// Orders connect and close work on the transport.
#[derive(Default)]
struct ConnectGate {
    turn: Mutex<()>,
    latest: AtomicU64,
}

impl ConnectGate {
    fn is_latest(&self, attempt: u64) -> bool {
        self.latest.load(Ordering::SeqCst) == attempt
    }
}

pub struct SessionFacade {
    gateway: Arc<dyn RequestGateway>,
    transport: Arc<dyn TransportSession>,
    store: ConversationStore,
    current_user: Option<User>,
    state: SessionState,
    connect_attempt: u64,
    connect_gate: Arc<ConnectGate>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
    events: broadcast::Sender<SessionEvent>,
    forwarder: JoinHandle<()>,
}

impl SessionFacade {
    /// Must be called inside a tokio runtime; spawns the transport forwarder.
    pub fn new(gateway: Arc<dyn RequestGateway>, transport: Arc<dyn TransportSession>) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(1024);

        let mut transport_events = transport.subscribe();
        let forward_tx = completions_tx.clone();
        let forwarder = tokio::spawn(async move {
            loop {
                match transport_events.recv().await {
                    Ok(event) => {
                        if forward_tx.send(Completion::Transport(event)).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "session: transport events lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Self {
            gateway,
            transport,
            store: ConversationStore::new(),
            current_user: None,
            state: SessionState::Anonymous,
            connect_attempt: 0,
            connect_gate: Arc::new(ConnectGate::default()),
            completions_tx,
            completions_rx,
            events,
            forwarder,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn current_user(&self) -> Option<&User> {
        self.current_user.as_ref()
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn login(&self, username: &str, password: &str) {
        if username.is_empty() || password.is_empty() {
            debug!("session: login rejected, empty credentials");
            return;
        }
        let gateway = Arc::clone(&self.gateway);
        let (username, password) = (username.to_string(), password.to_string());
        self.spawn_completion(async move {
            Completion::Login(gateway.login(&username, &password).await)
        });
    }

    pub fn register(&self, username: &str, password: &str) {
        if username.is_empty() || password.is_empty() {
            debug!("session: register rejected, empty credentials");
            return;
        }
        let gateway = Arc::clone(&self.gateway);
        let (username, password) = (username.to_string(), password.to_string());
        self.spawn_completion(async move {
            Completion::Register(gateway.register(&username, &password).await)
        });
    }

    pub fn search_users(&self, query: &str) {
        let query = query.trim();
        if query.is_empty() {
            debug!("session: empty search ignored");
            return;
        }
        let gateway = Arc::clone(&self.gateway);
        let query = query.to_string();
        self.spawn_completion(async move { Completion::Search(gateway.search_users(&query).await) });
    }

    /// Inserts a server-delivered conversation. Emits only on insertion.
    pub fn add_conversation(&mut self, conversation: Conversation) -> bool {
        if !self.store.add_conversation(conversation.clone()) {
            return false;
        }
        self.emit(SessionEvent::ConversationAdded(conversation));
        true
    }

    /// Opens a local chat with `user`, reusing any conversation already
    /// shared with them. Never touches the network.
    pub fn start_conversation_with(&mut self, user: User) {
        let Some(me) = self.current_user.clone() else {
            debug!(user_id = user.id.0, "session: cannot start a conversation while logged out");
            return;
        };
        if user.id == me.id {
            debug!(user_id = user.id.0, "session: refusing conversation with self");
            return;
        }
        if let Some(existing) = self.store.conversation_with(user.id, me.id) {
            let existing = existing.clone();
            self.emit(SessionEvent::ConversationStarted(existing));
            return;
        }
        let conversation = Conversation::transient(me, user);
        self.store.add_conversation(conversation.clone());
        self.emit(SessionEvent::ConversationStarted(conversation));
    }

    pub fn load_history(&self, key: ConversationKey) {
        let ConversationKey::Persisted(conversation_id) = key else {
            debug!(conversation = %key, "session: no history for transient conversation");
            return;
        };
        let gateway = Arc::clone(&self.gateway);
        self.spawn_completion(async move {
            Completion::History {
                key,
                result: gateway.get_history(conversation_id).await,
            }
        });
    }

    pub fn select_conversation(&mut self, key: ConversationKey) {
        self.store.set_active(Some(key));
        self.load_history(key);
    }

    pub async fn send_message(&self, recipient_id: UserId, text: &str) {
        if text.trim().is_empty() {
            debug!(recipient_id = recipient_id.0, "session: blank message ignored");
            return;
        }
        self.transport
            .send(OutboundEvent::SendMessage(SendMessagePayload {
                recipient_id,
                content: text.to_string(),
            }))
            .await;
    }

    /// Reads the file now and uploads it in the background. The outcome
    /// arrives as `UploadCompleted` or `UploadFailed`.
    pub fn send_file(&self, recipient_id: UserId, path: impl AsRef<Path>) {
        let upload = match FileUpload::from_path(path) {
            Ok(upload) => upload,
            Err(error) => {
                warn!(recipient_id = recipient_id.0, "session: {error}");
                self.emit(SessionEvent::UploadFailed {
                    recipient_id,
                    error,
                });
                return;
            }
        };
        let gateway = Arc::clone(&self.gateway);
        self.spawn_completion(async move {
            Completion::Upload {
                recipient_id,
                result: gateway.upload_file(upload).await,
            }
        });
    }

    pub async fn send_file_message(&self, recipient_id: UserId, upload: &UploadResponse) {
        self.transport
            .send(OutboundEvent::SendFile(SendFilePayload {
                recipient_id,
                file_url: upload.file_url.clone(),
                file_name: upload.file_name.clone(),
                file_type: upload.file_type.clone(),
            }))
            .await;
    }

    pub async fn send_typing(&self, recipient_id: UserId) {
        self.transport
            .send(OutboundEvent::Typing(TypingPayload { recipient_id }))
            .await;
    }

    pub async fn shutdown(&mut self) {
        self.next_connect_attempt();
        self.transport.disconnect().await;
        self.state = SessionState::Anonymous;
        info!("session: shut down");
    }

    /// Waits for the next completion and applies it. Cancel-safe: a
    /// completion is either applied in full or left queued.
    pub async fn process_next(&mut self) -> bool {
        match self.completions_rx.recv().await {
            Some(completion) => {
                self.apply(completion);
                true
            }
            None => false,
        }
    }

    /// Applies every completion already queued without waiting for more.
    pub fn process_pending(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(completion) = self.completions_rx.try_recv() {
            self.apply(completion);
            applied += 1;
        }
        applied
    }

    fn spawn_completion<F>(&self, work: F)
    where
        F: Future<Output = Completion> + Send + 'static,
    {
        let tx = self.completions_tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(work.await);
        });
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn next_connect_attempt(&mut self) -> u64 {
        self.connect_attempt += 1;
        self.connect_gate
            .latest
            .store(self.connect_attempt, Ordering::SeqCst);
        self.connect_attempt
    }

    fn start_connect(&mut self, token: String) {
        let attempt = self.next_connect_attempt();
        let gate = Arc::clone(&self.connect_gate);
        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            let _turn = gate.turn.lock().await;
            if !gate.is_latest(attempt) {
                debug!(attempt, "session: connect attempt superseded before it started");
                return;
            }
            transport.connect(attempt, &token).await;
        });
    }

    /// Closes a connection that opened after the session stopped wanting
    /// one, unless a newer attempt has started since.
    fn close_stale_connection(&self) {
        let attempt = self.connect_attempt;
        let gate = Arc::clone(&self.connect_gate);
        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            let _turn = gate.turn.lock().await;
            if gate.is_latest(attempt) {
                transport.disconnect().await;
            }
        });
    }

    fn apply(&mut self, completion: Completion) {
        match completion {
            Completion::Login(Ok(response)) => {
                let user = User::from(response.user);
                self.store.clear();
                self.current_user = Some(user.clone());
                self.gateway.set_token(Some(response.token.clone()));
                self.state = SessionState::Connecting;
                info!(user_id = user.id.0, username = %user.username, "session: logged in");

                self.start_connect(response.token);
                self.emit(SessionEvent::LoginSucceeded(user));
            }
            Completion::Login(Err(error)) => {
                warn!("session: login failed: {error}");
                self.emit(SessionEvent::LoginFailed(error));
            }
            Completion::Register(Ok(response)) => {
                self.emit(SessionEvent::RegisterSucceeded(response));
            }
            Completion::Register(Err(error)) => {
                warn!("session: registration failed: {error}");
                self.emit(SessionEvent::RegisterFailed(error));
            }
            Completion::Search(Ok(users)) => {
                let users = users.into_iter().map(User::from).collect();
                self.emit(SessionEvent::UsersFound(users));
            }
            Completion::Search(Err(error)) => {
                warn!("session: user search failed: {error}");
                self.emit(SessionEvent::UserSearchFailed(error));
            }
            Completion::History { key, result: Ok(page) } => {
                let messages: Vec<Message> = page.into_iter().map(Message::from_payload).collect();
                if self.store.apply_history_page(key, messages.clone()) {
                    self.emit(SessionEvent::HistoryLoaded {
                        conversation: key,
                        messages,
                    });
                }
            }
            Completion::History {
                key,
                result: Err(error),
            } => {
                warn!(conversation = %key, "session: history load failed: {error}");
                self.emit(SessionEvent::HistoryLoadFailed {
                    conversation: key,
                    error,
                });
            }
            Completion::Upload {
                recipient_id,
                result: Ok(upload),
            } => {
                self.emit(SessionEvent::UploadCompleted {
                    recipient_id,
                    upload,
                });
            }
            Completion::Upload {
                recipient_id,
                result: Err(error),
            } => {
                warn!(recipient_id = recipient_id.0, "session: upload failed: {error}");
                self.emit(SessionEvent::UploadFailed {
                    recipient_id,
                    error,
                });
            }
            Completion::Transport(event) => self.apply_transport_event(event),
        }
    }

    fn apply_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected { attempt } => match self.state {
                SessionState::Connecting if attempt == self.connect_attempt => {
                    self.state = SessionState::Active;
                    info!(attempt, "session: realtime connection active");
                    self.emit(SessionEvent::Connected);
                }
                SessionState::Anonymous => {
                    debug!(attempt, "session: closing connection opened after shutdown");
                    self.close_stale_connection();
                }
                // The newer attempt replaces this connection when it runs.
                _ => debug!(attempt, "session: ignoring superseded connection"),
            },
            TransportEvent::Disconnected { attempt } => {
                if attempt != self.connect_attempt || self.state != SessionState::Active {
                    debug!(attempt, state = ?self.state, "session: ignoring stale disconnect");
                    return;
                }
                self.state = SessionState::Anonymous;
                info!(attempt, "session: realtime connection closed");
                self.emit(SessionEvent::Disconnected);
            }
            TransportEvent::ConnectionFailed { attempt, reason } => {
                if attempt != self.connect_attempt {
                    debug!(attempt, "session: ignoring failure of superseded attempt: {reason}");
                    return;
                }
                self.state = SessionState::Anonymous;
                self.emit(SessionEvent::ConnectionFailed(ClientError::TransportConnect(
                    reason,
                )));
            }
            TransportEvent::MessageReceived(payload) => {
                let message = Message::from_payload(payload);
                self.store.apply_incoming_message(message.clone());
                self.emit(SessionEvent::MessageReceived(message));
            }
            TransportEvent::PresenceChanged { user_id, online } => {
                self.store.set_user_online(user_id, online);
                self.emit(SessionEvent::PresenceChanged { user_id, online });
            }
            TransportEvent::TypingReceived {
                conversation_id,
                sender_id,
            } => {
                let conversation = conversation_id.map(ConversationKey::Persisted).or_else(|| {
                    self.current_user.as_ref().and_then(|me| {
                        self.store
                            .conversation_with(sender_id, me.id)
                            .map(Conversation::key)
                    })
                });
                self.emit(SessionEvent::TypingReceived {
                    conversation,
                    sender_id,
                });
            }
            TransportEvent::ServerError(message) => {
                warn!("session: server reported error: {message}");
                self.emit(SessionEvent::ServerError(message));
            }
        }
    }
}

impl Drop for SessionFacade {
    fn drop(&mut self) {
        self.forwarder.abort();
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
