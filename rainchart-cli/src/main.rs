//! Binary crate for the `rainchart` command-line tool.
//!
//! This crate focuses on:
//! - Parsing CLI arguments
//! - Interactive configuration
//! - Human-friendly and JSON output of normalized series

use clap::Parser;

mod cli;
mod logging;
mod output;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cmd = cli::Cli::parse();
    logging::init_cli_logger(cmd.verbose);
    cmd.run().await
}
