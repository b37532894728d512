use bytes::Bytes;
use std::time::{Duration, SystemTime};

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::config::ServerConfig;
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Set `key` to hold the string `value`. If `key` already holds a value, it is overwritten and
/// any previous time to live is discarded.
///
/// Ref: <https://redis.io/docs/latest/commands/set/>
#[derive(Debug, PartialEq)]
pub struct Set {
    pub key: Bytes,
    pub value: Bytes,
    pub ttl: Option<Ttl>,
}

#[derive(Debug, PartialEq)]
pub enum Ttl {
    Ex(u64),
    Px(u64),
}

impl Ttl {
    pub fn duration(&self) -> Duration {
        match self {
            Ttl::Ex(seconds) => Duration::from_secs(*seconds),
            Ttl::Px(millis) => Duration::from_millis(*millis),
        }
    }
}

impl Executable for Set {
    fn exec(self, store: Store, _config: &ServerConfig) -> Result<Frame, Error> {
        let mut store = store.lock();

        match self.ttl {
            Some(ttl) => {
                let Some(expires_at) = SystemTime::now().checked_add(ttl.duration()) else {
                    return Ok(Frame::Error(
                        "ERR invalid expire time in 'set' command".to_string(),
                    ));
                };
                store.set_with_expiry(self.key, self.value, expires_at);
            }
            None => store.set(self.key, self.value),
        }

        Ok(Frame::Simple("OK".to_string()))
    }
}

impl TryFrom<&mut CommandParser> for Set {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_bytes()?;
        let value = parser.next_bytes()?;

        let mut ttl = None;

        loop {
            let option = match parser.next_string() {
                Ok(option) => option,
                Err(CommandParserError::EndOfStream) => {
                    break;
                }
                Err(err) => return Err(err),
            };

            match option.to_uppercase().as_str() {
                "EX" if ttl.is_none() => {
                    ttl = Some(Ttl::Ex(positive(parser.next_integer()?)?));
                }
                "PX" if ttl.is_none() => {
                    ttl = Some(Ttl::Px(positive(parser.next_integer()?)?));
                }

                // Unexpected option
                _ => {
                    return Err(CommandParserError::InvalidCommandArgument {
                        command: "SET".to_string(),
                        argument: option,
                    })
                }
            }
        }

        Ok(Self { key, value, ttl })
    }
}

fn positive(value: i64) -> Result<u64, CommandParserError> {
    match u64::try_from(value) {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(CommandParserError::InvalidCommandArgument {
            command: "SET".to_string(),
            argument: value.to_string(),
        }),
    }
}
