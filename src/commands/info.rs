use bytes::Bytes;
use std::fmt::Write;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::config::{Role, ServerConfig};
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Server information. Replication is the only section this server reports; asking for any
/// other section returns an empty string.
///
/// Ref: <https://redis.io/docs/latest/commands/info/>
#[derive(Debug, PartialEq)]
pub struct Info {
    pub section: Option<String>,
}

impl Executable for Info {
    fn exec(self, _store: Store, config: &ServerConfig) -> Result<Frame, Error> {
        let section = self.section.as_deref().map(str::to_lowercase);

        let info = match section.as_deref() {
            None | Some("replication") | Some("all") | Some("default") | Some("everything") => {
                replication(config)?
            }
            Some(_) => String::new(),
        };

        Ok(Frame::Bulk(Bytes::from(info)))
    }
}

fn replication(config: &ServerConfig) -> Result<String, std::fmt::Error> {
    let replication = &config.replication;
    let mut info = String::from("# Replication\r\n");

    write!(info, "role:{}\r\n", replication.role)?;

    match (replication.role, &replication.master) {
        (Role::Master, _) => {
            write!(info, "master_replid:{}\r\n", replication.replid)?;
            write!(info, "master_repl_offset:{}\r\n", replication.repl_offset)?;
        }
        (Role::Slave, Some(master)) => {
            write!(info, "master_host:{}\r\n", master.host)?;
            write!(info, "master_port:{}\r\n", master.port)?;
        }
        (Role::Slave, None) => {}
    }

    Ok(info)
}

impl TryFrom<&mut CommandParser> for Info {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let section = match parser.next_string() {
            Ok(section) => Some(section),
            Err(CommandParserError::EndOfStream) => None,
            Err(e) => return Err(e),
        };

        Ok(Self { section })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Command;
    use crate::config::{ReplicaOf, Replication};

    fn info(section: Option<&'static str>, config: &ServerConfig) -> String {
        let mut frames = vec![Frame::Bulk(Bytes::from("INFO"))];
        frames.extend(section.map(|s| Frame::Bulk(Bytes::from(s))));

        let cmd = Command::try_from(Frame::Array(frames)).unwrap();
        let res = cmd.exec(Store::new(), config).unwrap();

        match res {
            Frame::Bulk(bytes) => String::from_utf8(bytes.to_vec()).unwrap(),
            frame => panic!("expected a bulk string, got {:?}", frame),
        }
    }

    #[test]
    fn replication_as_master() {
        let config = ServerConfig::default();

        let info = info(Some("replication"), &config);

        assert!(info.contains("role:master\r\n"));
        assert!(info.contains(&format!("master_replid:{}\r\n", config.replication.replid)));
        assert!(info.contains("master_repl_offset:0\r\n"));
    }

    #[test]
    fn replication_as_replica() {
        let config = ServerConfig {
            replication: Replication::replica_of(ReplicaOf {
                host: "localhost".to_string(),
                port: 6380,
            }),
            ..ServerConfig::default()
        };

        let info = info(Some("REPLICATION"), &config);

        assert!(info.contains("role:slave\r\n"));
        assert!(info.contains("master_host:localhost\r\n"));
        assert!(info.contains("master_port:6380\r\n"));
        assert!(!info.contains("master_replid"));
        assert!(!info.contains("master_repl_offset"));
    }

    #[test]
    fn without_section() {
        let info = info(None, &ServerConfig::default());

        assert!(info.starts_with("# Replication\r\n"));
    }

    #[test]
    fn unknown_section() {
        let info = info(Some("keyspace"), &ServerConfig::default());

        assert_eq!(info, "");
    }
}
