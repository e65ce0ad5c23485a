use std::sync::Arc;

use anyhow::Result;
use chat_core::{
    load_settings, HttpGateway, Message, SessionEvent, SessionFacade, SocketIoTransport, User,
};
use chat_shared::domain::UserId;
use clap::Parser;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::error::RecvError,
};
use tracing::warn;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{Command, HELP};

#[derive(Parser, Debug)]
struct Args {
    /// Overrides `base_url` from client.toml / environment.
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long)]
    realtime_url: Option<String>,
    #[arg(long)]
    username: String,
    #[arg(long)]
    password: String,
    /// Register the account first, then log in.
    #[arg(long)]
    register: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let mut settings = load_settings();
    if let Some(url) = &args.server_url {
        settings.base_url = url.clone();
    }
    if let Some(url) = &args.realtime_url {
        settings.realtime_url = Some(url.clone());
    }

    let gateway = Arc::new(HttpGateway::from_settings(&settings)?);
    let transport = Arc::new(SocketIoTransport::from_settings(&settings)?);
    let mut session = SessionFacade::new(gateway, transport);
    let mut events = session.subscribe();

    if args.register {
        session.register(&args.username, &args.password);
    } else {
        session.login(&args.username, &args.password);
    }
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            applied = session.process_next() => {
                if !applied {
                    break;
                }
            }
            event = events.recv() => match event {
                Ok(event) => handle_event(&mut session, &args, event).await,
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "desktop: session events lagged"),
                Err(RecvError::Closed) => break,
            },
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match Command::parse(&line) {
                    Ok(Some(Command::Quit)) => break,
                    Ok(Some(command)) => run_command(&mut session, command).await,
                    Ok(None) => {}
                    Err(err) => println!("{err}"),
                }
            }
        }
    }

    session.shutdown().await;
    Ok(())
}

async fn run_command(session: &mut SessionFacade, command: Command) {
    match command {
        Command::Search { query } => session.search_users(&query),
        Command::Chat { user_id, username } => {
            session.start_conversation_with(User::new(user_id, username));
        }
        Command::Open { conversation } => session.select_conversation(conversation),
        Command::Send { recipient_id, text } => session.send_message(recipient_id, &text).await,
        Command::Upload { recipient_id, path } => session.send_file(recipient_id, path),
        Command::Typing { recipient_id } => session.send_typing(recipient_id).await,
        Command::List => {
            let me = self_id(session);
            for conversation in session.store().conversations() {
                println!(
                    "{:>10}  {}  ({} messages)",
                    conversation.key().to_string(),
                    conversation.display_name(me),
                    conversation.messages().len()
                );
            }
        }
        Command::Help => println!("{HELP}"),
        Command::Quit => {}
    }
}

async fn handle_event(session: &mut SessionFacade, args: &Args, event: SessionEvent) {
    match event {
        SessionEvent::LoginSucceeded(user) => {
            println!("logged in as {} (id {})", user.username, user.id);
        }
        SessionEvent::LoginFailed(err) => println!("login failed: {err}"),
        SessionEvent::RegisterSucceeded(response) => {
            println!(
                "{}",
                response.message.as_deref().unwrap_or("registration complete")
            );
            session.login(&args.username, &args.password);
        }
        SessionEvent::RegisterFailed(err) => println!("registration failed: {err}"),
        SessionEvent::Connected => println!("connected"),
        SessionEvent::Disconnected => println!("disconnected"),
        SessionEvent::ConnectionFailed(err) => println!("{err}"),
        SessionEvent::UsersFound(users) => {
            if users.is_empty() {
                println!("no users found");
            }
            for user in users {
                println!("  {:>6}  {}", user.id.to_string(), user.username);
            }
        }
        SessionEvent::UserSearchFailed(err) => println!("search failed: {err}"),
        SessionEvent::ConversationAdded(conversation)
        | SessionEvent::ConversationStarted(conversation) => {
            println!(
                "conversation {} with {}",
                conversation.key(),
                conversation.display_name(self_id(session))
            );
        }
        SessionEvent::HistoryLoaded {
            conversation,
            messages,
        } => {
            println!("-- {conversation} --");
            let me = self_id(session);
            for message in &messages {
                print_message(message, me);
            }
        }
        SessionEvent::HistoryLoadFailed {
            conversation,
            error,
        } => println!("could not load {conversation}: {error}"),
        SessionEvent::UploadCompleted {
            recipient_id,
            upload,
        } => {
            println!("uploaded {}", upload.file_name);
            session.send_file_message(recipient_id, &upload).await;
        }
        SessionEvent::UploadFailed {
            recipient_id,
            error,
        } => println!("upload for {recipient_id} failed: {error}"),
        SessionEvent::MessageReceived(message) => print_message(&message, self_id(session)),
        SessionEvent::PresenceChanged { user_id, online } => {
            println!(
                "user {user_id} is {}",
                if online { "online" } else { "offline" }
            );
        }
        SessionEvent::TypingReceived {
            conversation,
            sender_id,
        } => match conversation {
            Some(conversation) => println!("user {sender_id} is typing in {conversation}"),
            None => println!("user {sender_id} is typing"),
        },
        SessionEvent::ServerError(message) => println!("server: {message}"),
    }
}

fn self_id(session: &SessionFacade) -> UserId {
    session.current_user().map_or(UserId(0), |user| user.id)
}

fn print_message(message: &Message, me: UserId) {
    let sender = if message.is_own(me) {
        "me".to_string()
    } else if message.sender_username().is_empty() {
        message.sender_id().to_string()
    } else {
        message.sender_username().to_string()
    };
    match message.file_info() {
        Some(file) => println!(
            "[{}] {sender}: <{}> {} ({})",
            message.display_time(),
            message.kind().as_str(),
            file.name,
            file.url
        ),
        None => println!("[{}] {sender}: {}", message.display_time(), message.content()),
    }
}
