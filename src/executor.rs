use std::sync::Arc;
use tracing::{debug, error};

use crate::commands::executable::Executable;
use crate::commands::Command;
use crate::config::ServerConfig;
use crate::frame::Frame;
use crate::store::Store;

/// Turns decoded requests into replies against the shared store.
///
/// Every request gets exactly one reply frame: requests that cannot be parsed into a command and
/// commands that fail while running are both answered with an error frame.
#[derive(Clone)]
pub struct Executor {
    store: Store,
    config: Arc<ServerConfig>,
}

impl Executor {
    pub fn new(store: Store, config: Arc<ServerConfig>) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn execute(&self, frame: Frame) -> Frame {
        let cmd = match Command::try_from(frame) {
            Ok(cmd) => cmd,
            Err(e) => {
                debug!("Invalid command: {}", e);
                return Frame::Error(e.to_string());
            }
        };

        debug!("Executing {:?}", cmd);

        match cmd.exec(self.store.clone(), &self.config) {
            Ok(res) => res,
            Err(e) => {
                error!("Command failed: {}", e);
                Frame::Error(format!("ERR {}", e))
            }
        }
    }
}
