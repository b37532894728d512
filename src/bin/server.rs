use clap::Parser;
use redlite::config::Cli;
use redlite::{server, Error};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let cli = Cli::parse();

    server::run(cli.into()).await
}
