use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::config::ServerConfig;
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

// https://redis.io/commands/keys
#[derive(Debug, PartialEq)]
pub struct Keys {
    pub pattern: String,
}

impl Executable for Keys {
    fn exec(self, store: Store, _config: &ServerConfig) -> Result<Frame, Error> {
        let keys = store.lock().keys(&self.pattern);
        let res = keys.into_iter().map(Frame::Bulk).collect();

        Ok(Frame::Array(res))
    }
}

impl TryFrom<&mut CommandParser> for Keys {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let pattern = parser.next_string()?;
        Ok(Self { pattern })
    }
}
