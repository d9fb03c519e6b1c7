//! Parsing of operator input lines.
//!
//! Keywords are case-insensitive. Argument problems are reported as
//! [`ClientError::Validation`] so nothing malformed ever reaches the server.

use crate::error::ClientError;

pub const HELP: &[&str] = &[
    "commands:",
    "  login <name>                 log in and receive direct messages on <name>",
    "  users                        list registered users",
    "  channels                     list channels",
    "  channel <name>               create a channel",
    "  subscribe <topic>            listen to a topic",
    "  unsubscribe <topic>          stop listening to a topic",
    "  topics                       show the topics this session listens to",
    "  post <topic> <message...>    publish a message (alias: publish)",
    "  help                         show this summary",
    "  exit                         leave (alias: quit)",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    Login { name: String },
    Users,
    Channels,
    CreateChannel { name: String },
    Subscribe { topic: String },
    Unsubscribe { topic: String },
    Topics,
    Publish { topic: String, message: String },
    Help,
    Exit,
    Unknown(String),
}

impl UserCommand {
    /// Parses one input line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Result<Option<Self>, ClientError> {
        let mut parts = line.split_whitespace();
        let Some(keyword) = parts.next() else {
            return Ok(None);
        };

        let command = match keyword.to_lowercase().as_str() {
            "exit" | "quit" => UserCommand::Exit,
            "help" => UserCommand::Help,
            "users" => UserCommand::Users,
            "channels" => UserCommand::Channels,
            "topics" => UserCommand::Topics,
            "login" => UserCommand::Login {
                name: required(parts.next(), "usage: login <name>")?,
            },
            "channel" => UserCommand::CreateChannel {
                name: required(parts.next(), "usage: channel <name>")?,
            },
            "subscribe" => UserCommand::Subscribe {
                topic: required(parts.next(), "usage: subscribe <topic>")?,
            },
            "unsubscribe" => UserCommand::Unsubscribe {
                topic: required(parts.next(), "usage: unsubscribe <topic>")?,
            },
            "post" | "publish" => {
                let usage = "usage: post <topic> <message>";
                let topic = required(parts.next(), usage)?;
                let message = parts.collect::<Vec<_>>().join(" ");
                if message.is_empty() {
                    return Err(ClientError::validation(usage));
                }
                UserCommand::Publish { topic, message }
            }
            _ => UserCommand::Unknown(line.trim().to_string()),
        };

        Ok(Some(command))
    }
}

fn required(argument: Option<&str>, usage: &str) -> Result<String, ClientError> {
    argument
        .map(str::to_string)
        .ok_or_else(|| ClientError::validation(usage))
}
