//! `tar-split` binary entry point.
//!
//! Thin wrapper around the tarsplit library that:
//! 1. Parses command-line arguments
//! 2. Initializes logging on stderr, keeping stdout for archive bytes
//! 3. Runs the selected subcommand

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    match &cli.command {
        Command::Disasm(args) => commands::disasm(args),
        Command::Asm(args) => commands::asm(args),
        Command::Checksize(args) => commands::checksize(args),
    }
}

fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
