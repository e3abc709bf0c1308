//! ## maskvakt-cli
//! **Process entry point**
//! Loads configuration, installs logging and runs the monitor until
//! interrupted.

use clap::Parser;

mod commands;

use commands::Cli;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    commands::run_command(cli)
}
