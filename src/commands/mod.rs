pub mod config;
pub mod dbsize;
pub mod del;
pub mod echo;
pub mod executable;
pub mod exists;
pub mod get;
pub mod info;
pub mod keys;
pub mod ping;
pub mod set;

use bytes::Bytes;
use std::{str, vec};
use thiserror::Error as ThisError;
use tracing::debug;

use crate::commands::executable::Executable;
use crate::config::ServerConfig;
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

use config::Config;
use dbsize::DBSize;
use del::Del;
use echo::Echo;
use exists::Exists;
use get::Get;
use info::Info;
use keys::Keys;
use ping::Ping;
use set::Set;

#[derive(Debug, PartialEq)]
pub enum Command {
    DBsize(DBSize),
    Del(Del),
    Exists(Exists),
    Get(Get),
    Keys(Keys),
    Set(Set),

    Config(Config),
    Echo(Echo),
    Info(Info),
    Ping(Ping),
}

impl Executable for Command {
    fn exec(self, store: Store, config: &ServerConfig) -> Result<Frame, Error> {
        match self {
            Command::Config(cmd) => cmd.exec(store, config),
            Command::DBsize(cmd) => cmd.exec(store, config),
            Command::Del(cmd) => cmd.exec(store, config),
            Command::Echo(cmd) => cmd.exec(store, config),
            Command::Exists(cmd) => cmd.exec(store, config),
            Command::Get(cmd) => cmd.exec(store, config),
            Command::Info(cmd) => cmd.exec(store, config),
            Command::Keys(cmd) => cmd.exec(store, config),
            Command::Ping(cmd) => cmd.exec(store, config),
            Command::Set(cmd) => cmd.exec(store, config),
        }
    }
}

impl TryFrom<Frame> for Command {
    type Error = CommandParserError;

    fn try_from(frame: Frame) -> Result<Self, Self::Error> {
        // Clients send commands to the Redis server as RESP arrays.
        let frames = match frame {
            Frame::Array(array) => array,
            frame => {
                return Err(CommandParserError::InvalidFrame {
                    expected: "array".to_string(),
                    actual: frame,
                })
            }
        };

        let parser = &mut CommandParser::new(frames);

        let command_name = parser.parse_command_name()?;

        let command = match &command_name[..] {
            "config" => Config::try_from(parser).map(Command::Config),
            "dbsize" => DBSize::try_from(parser).map(Command::DBsize),
            "del" => Del::try_from(parser).map(Command::Del),
            "echo" => Echo::try_from(parser).map(Command::Echo),
            "exists" => Exists::try_from(parser).map(Command::Exists),
            "get" => Get::try_from(parser).map(Command::Get),
            "info" => Info::try_from(parser).map(Command::Info),
            "keys" => Keys::try_from(parser).map(Command::Keys),
            "ping" => Ping::try_from(parser).map(Command::Ping),
            "set" => Set::try_from(parser).map(Command::Set),
            _ => Err(CommandParserError::UnknownCommand {
                command: command_name.to_uppercase(),
            }),
        };

        // Clients only ever see which command was rejected, the reason goes to the log.
        command.map_err(|err| {
            debug!("Rejected {} command: {}", command_name, err);
            CommandParserError::UnknownCommand {
                command: command_name.to_uppercase(),
            }
        })
    }
}

pub(crate) struct CommandParser {
    parts: vec::IntoIter<Frame>,
}

impl CommandParser {
    pub(crate) fn new(parts: Vec<Frame>) -> Self {
        Self {
            parts: parts.into_iter(),
        }
    }

    fn parse_command_name(&mut self) -> Result<String, CommandParserError> {
        let command_name = self
            .parts
            .next()
            .ok_or_else(|| CommandParserError::EndOfStream)?;

        match command_name {
            Frame::Simple(s) => Ok(s.to_lowercase()),
            Frame::Bulk(bytes) => str::from_utf8(&bytes[..])
                .map(|s| s.to_lowercase())
                .map_err(CommandParserError::InvalidUTF8String),
            frame => Err(CommandParserError::InvalidFrame {
                expected: "simple string".to_string(),
                actual: frame,
            }),
        }
    }

    fn next_string(&mut self) -> Result<String, CommandParserError> {
        let frame = self
            .parts
            .next()
            .ok_or_else(|| CommandParserError::EndOfStream)?;

        match frame {
            // Both `Simple` and `Bulk` representation may be strings. Strings are parsed to UTF-8.
            // While errors are stored as strings, they are considered separate types.
            Frame::Simple(s) => Ok(s),
            Frame::Bulk(bytes) => str::from_utf8(&bytes[..])
                .map(|s| s.to_string())
                .map_err(CommandParserError::InvalidUTF8String),
            frame => Err(CommandParserError::InvalidFrame {
                expected: "simple or bulk string".to_string(),
                actual: frame,
            }),
        }
    }

    fn next_integer(&mut self) -> Result<i64, CommandParserError> {
        let frame = self
            .parts
            .next()
            .ok_or_else(|| CommandParserError::EndOfStream)?;

        match frame {
            Frame::Integer(i) => Ok(i),
            Frame::Simple(string) => {
                string
                    .parse::<i64>()
                    .map_err(|_| CommandParserError::InvalidFrame {
                        expected: "parseable i64 frame".to_string(),
                        actual: Frame::Simple(string),
                    })
            }
            Frame::Bulk(bytes) => str::from_utf8(&bytes[..])
                .map_err(CommandParserError::InvalidUTF8String)?
                .parse::<i64>()
                .map_err(|_| CommandParserError::InvalidFrame {
                    expected: "parseable i64 frame".to_string(),
                    actual: Frame::Bulk(bytes),
                }),
            frame => Err(CommandParserError::InvalidFrame {
                expected: "integer".to_string(),
                actual: frame,
            }),
        }
    }

    fn next_bytes(&mut self) -> Result<Bytes, CommandParserError> {
        let frame = self
            .parts
            .next()
            .ok_or_else(|| CommandParserError::EndOfStream)?;

        match frame {
            Frame::Simple(s) => Ok(Bytes::from(s)),
            Frame::Bulk(bytes) => Ok(bytes),
            frame => Err(CommandParserError::InvalidFrame {
                expected: "simple or bulk string".to_string(),
                actual: frame,
            }),
        }
    }

    /// Collects the remaining arguments; at least one is required.
    fn remaining_bytes(&mut self) -> Result<Vec<Bytes>, CommandParserError> {
        let mut values = vec![];

        loop {
            match self.next_bytes() {
                Ok(value) => values.push(value),
                Err(CommandParserError::EndOfStream) if !values.is_empty() => break,
                Err(err) => return Err(err),
            }
        }

        Ok(values)
    }
}

#[derive(Debug, ThisError, PartialEq)]
pub enum CommandParserError {
    #[error("ERR Protocol error: expected {expected}, got {actual}")]
    InvalidFrame { expected: String, actual: Frame },
    #[error("ERR unknown or invalid command '{command}'")]
    UnknownCommand { command: String },
    #[error("ERR invalid argument '{argument}' for '{command}' command")]
    InvalidCommandArgument { command: String, argument: String },
    #[error("ERR invalid UTF-8 string")]
    InvalidUTF8String(#[from] str::Utf8Error),
    #[error("ERR wrong number of arguments")]
    EndOfStream,
}
