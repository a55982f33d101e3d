//! ## bankers-cli
//! **Command-line driver for the banker simulation**
//!
//! Loads layered configuration, applies command-line overrides, prints the
//! state tables and exits non-zero on any failure.

use clap::Parser;

mod commands;
mod table;

use commands::Cli;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    commands::run_command(cli)
}
