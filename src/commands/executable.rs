use crate::config::ServerConfig;
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

pub trait Executable {
    fn exec(self, store: Store, config: &ServerConfig) -> Result<Frame, Error>;
}
