use bytes::Bytes;
use std::str::FromStr;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::config::{Parameter, ServerConfig};
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Only the `GET` subcommand is supported. The reply is always a two element array: the requested
/// parameter name followed by its value, or `nil` when the parameter is unknown or unset.
///
/// Ref: <https://redis.io/docs/latest/commands/config-get/>
#[derive(Debug, PartialEq)]
pub enum Config {
    Get(String),
}

impl Executable for Config {
    fn exec(self, _store: Store, config: &ServerConfig) -> Result<Frame, Error> {
        match self {
            Config::Get(name) => {
                let value = Parameter::from_str(&name)
                    .ok()
                    .and_then(|parameter| config.get(parameter))
                    .map_or(Frame::Null, |value| {
                        Frame::Bulk(Bytes::copy_from_slice(value.as_bytes()))
                    });

                Ok(Frame::Array(vec![Frame::Bulk(Bytes::from(name)), value]))
            }
        }
    }
}

impl TryFrom<&mut CommandParser> for Config {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let subcommand = parser.next_string()?;

        match subcommand.to_lowercase().as_str() {
            "get" => Ok(Config::Get(parser.next_string()?)),
            _ => Err(CommandParserError::InvalidCommandArgument {
                command: "CONFIG".to_string(),
                argument: subcommand,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Command;

    fn config() -> ServerConfig {
        ServerConfig {
            dir: Some("/tmp/redis-files".to_string()),
            dbfilename: Some("dump.rdb".to_string()),
            ..ServerConfig::default()
        }
    }

    fn config_get(name: &'static str) -> Command {
        let frame = Frame::Array(vec![
            Frame::Bulk(Bytes::from("CONFIG")),
            Frame::Bulk(Bytes::from("GET")),
            Frame::Bulk(Bytes::from(name)),
        ]);
        Command::try_from(frame).unwrap()
    }

    #[test]
    fn get_dir() {
        let cmd = config_get("dir");

        assert_eq!(cmd, Command::Config(Config::Get("dir".to_string())));

        let res = cmd.exec(Store::new(), &config()).unwrap();

        assert_eq!(
            res,
            Frame::Array(vec![
                Frame::Bulk(Bytes::from("dir")),
                Frame::Bulk(Bytes::from("/tmp/redis-files")),
            ])
        );
    }

    #[test]
    fn get_dbfilename() {
        let res = config_get("dbfilename").exec(Store::new(), &config()).unwrap();

        assert_eq!(
            res,
            Frame::Array(vec![
                Frame::Bulk(Bytes::from("dbfilename")),
                Frame::Bulk(Bytes::from("dump.rdb")),
            ])
        );
    }

    #[test]
    fn get_unknown_parameter() {
        let res = config_get("maxmemory").exec(Store::new(), &config()).unwrap();

        assert_eq!(
            res,
            Frame::Array(vec![Frame::Bulk(Bytes::from("maxmemory")), Frame::Null])
        );
    }

    #[test]
    fn get_unset_parameter() {
        let res = config_get("dir")
            .exec(Store::new(), &ServerConfig::default())
            .unwrap();

        assert_eq!(
            res,
            Frame::Array(vec![Frame::Bulk(Bytes::from("dir")), Frame::Null])
        );
    }

    #[test]
    fn unsupported_subcommand() {
        let frame = Frame::Array(vec![
            Frame::Bulk(Bytes::from("CONFIG")),
            Frame::Bulk(Bytes::from("SET")),
            Frame::Bulk(Bytes::from("dir")),
            Frame::Bulk(Bytes::from("/")),
        ]);

        assert_eq!(
            Command::try_from(frame),
            Err(CommandParserError::UnknownCommand {
                command: "CONFIG".to_string()
            })
        );
    }
}
