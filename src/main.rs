use anyhow::Result;
use clap::Parser;

mod abi;
mod cli;
mod commands;
mod decoder;
mod defaults;
mod encoding;
mod entry;
mod error;
mod keystore;
mod logging;
mod macros;
mod passphrase;
mod process;
mod report;
mod rpc;
mod send;
mod signing;
mod token;
mod types;
mod util;

#[cfg(test)]
mod testutil;

use crate::cli::{Cli, Command};
use crate::logging::setup_logging;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(&cli.log_level, cli.log_json);

    match cli.cmd {
        Command::Send(args) => commands::send::run(args).await,
        Command::Call(args) => commands::call::run(args).await,
        Command::SendBatch(args) => commands::batch::run(args).await,
        Command::BatchStatus(args) => commands::status::run(args).await,
    }
}
