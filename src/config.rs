use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use strum_macros::{Display, EnumString};
use uuid::Uuid;

pub const DEFAULT_PORT: u16 = 6379;

/// Command line flags, the only way to configure the server.
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(version, about)]
pub struct Cli {
    /// The port to listen on
    #[arg(short, long, env = "REDLITE_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Directory holding the RDB snapshot
    #[arg(long)]
    pub dir: Option<String>,

    /// File name of the RDB snapshot inside `--dir`
    #[arg(long)]
    pub dbfilename: Option<String>,

    /// Run as a replica of "<host> <port>". Only reported through INFO, no data is replicated.
    #[arg(long, value_parser = parse_replica_of)]
    pub replicaof: Option<ReplicaOf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplicaOf {
    pub host: String,
    pub port: u16,
}

fn parse_replica_of(value: &str) -> Result<ReplicaOf, String> {
    let mut parts = value.split_whitespace();

    match (parts.next(), parts.next(), parts.next()) {
        (Some(host), Some(port), None) => {
            let port = port
                .parse()
                .map_err(|_| format!("invalid master port '{}'", port))?;

            Ok(ReplicaOf {
                host: host.to_string(),
                port,
            })
        }
        _ => Err(format!("expected \"<host> <port>\", got '{}'", value)),
    }
}

/// The replication role reported by `INFO replication`.
#[derive(Debug, Clone, Copy, PartialEq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    Master,
    Slave,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Replication {
    pub role: Role,
    pub replid: String,
    pub repl_offset: u64,
    pub master: Option<ReplicaOf>,
}

impl Replication {
    pub fn master() -> Self {
        Self {
            role: Role::Master,
            replid: generate_replid(),
            repl_offset: 0,
            master: None,
        }
    }

    pub fn replica_of(master: ReplicaOf) -> Self {
        Self {
            role: Role::Slave,
            replid: generate_replid(),
            repl_offset: 0,
            master: Some(master),
        }
    }
}

/// Parameters readable through `CONFIG GET`.
#[derive(Debug, Clone, Copy, PartialEq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Parameter {
    Dir,
    Dbfilename,
}

/// Immutable server configuration, built once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub port: u16,
    pub dir: Option<String>,
    pub dbfilename: Option<String>,
    pub replication: Replication,
}

impl ServerConfig {
    pub fn get(&self, parameter: Parameter) -> Option<&str> {
        match parameter {
            Parameter::Dir => self.dir.as_deref(),
            Parameter::Dbfilename => self.dbfilename.as_deref(),
        }
    }

    /// Full path of the snapshot file, when both halves are configured.
    pub fn snapshot_path(&self) -> Option<PathBuf> {
        match (&self.dir, &self.dbfilename) {
            (Some(dir), Some(dbfilename)) => Some(PathBuf::from(dir).join(dbfilename)),
            _ => None,
        }
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], self.port))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            dir: None,
            dbfilename: None,
            replication: Replication::master(),
        }
    }
}

impl From<Cli> for ServerConfig {
    fn from(cli: Cli) -> Self {
        let replication = match cli.replicaof {
            Some(master) => Replication::replica_of(master),
            None => Replication::master(),
        };

        Self {
            port: cli.port,
            dir: cli.dir,
            dbfilename: cli.dbfilename,
            replication,
        }
    }
}

/// Replication ids are 40 hex characters.
fn generate_replid() -> String {
    let mut replid = Uuid::new_v4().simple().to_string();
    replid.push_str(&Uuid::new_v4().simple().to_string());
    replid.truncate(40);
    replid
}
