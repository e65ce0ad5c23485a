//! Commands typed at the prompt, queued onto the session.

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use chat_core::ConversationKey;
use chat_shared::domain::UserId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Search { query: String },
    Chat { user_id: UserId, username: String },
    Open { conversation: ConversationKey },
    Send { recipient_id: UserId, text: String },
    Upload { recipient_id: UserId, path: PathBuf },
    Typing { recipient_id: UserId },
    List,
    Help,
    Quit,
}

pub const HELP: &str = "\
/search <query>            find users
/chat <user id> <name>     start a conversation
/open <conversation>       select a conversation and load its history
/send <user id> <text>     send a text message
/upload <user id> <path>   upload a file and send it
/typing <user id>          send a typing signal
/list                      list conversations
/quit";

impl Command {
    /// Blank lines yield `None`.
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let (verb, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();

        let command = match verb {
            "/search" => Self::Search {
                query: rest.to_string(),
            },
            "/chat" => {
                let (id, username) = split_arg(rest, "/chat <user id> <name>")?;
                Self::Chat {
                    user_id: parse_user_id(id)?,
                    username: username.to_string(),
                }
            }
            "/open" => Self::Open {
                conversation: rest
                    .parse()
                    .with_context(|| format!("invalid conversation '{rest}'"))?,
            },
            "/send" => {
                let (id, text) = split_arg(rest, "/send <user id> <text>")?;
                Self::Send {
                    recipient_id: parse_user_id(id)?,
                    text: text.to_string(),
                }
            }
            "/upload" => {
                let (id, path) = split_arg(rest, "/upload <user id> <path>")?;
                Self::Upload {
                    recipient_id: parse_user_id(id)?,
                    path: PathBuf::from(path),
                }
            }
            "/typing" => Self::Typing {
                recipient_id: parse_user_id(rest)?,
            },
            "/list" => Self::List,
            "/help" => Self::Help,
            "/quit" | "/exit" => Self::Quit,
            other => bail!("unknown command '{other}', try /help"),
        };
        Ok(Some(command))
    }
}

fn split_arg<'a>(rest: &'a str, usage: &str) -> Result<(&'a str, &'a str)> {
    rest.split_once(' ')
        .map(|(head, tail)| (head, tail.trim_start()))
        .ok_or_else(|| anyhow!("usage: {usage}"))
}

fn parse_user_id(raw: &str) -> Result<UserId> {
    raw.trim()
        .parse::<i64>()
        .map(UserId)
        .with_context(|| format!("invalid user id '{raw}'"))
}

#[cfg(test)]
#[path = "tests/commands_tests.rs"]
mod tests;
