//! # Config Resolver CLI
//!
//! This is the binary entry point for the `config-resolver` command-line tool.
//!
//! Its primary responsibilities are:
//! - Parsing command-line arguments using `clap`.
//! - Setting up logging and loading the resolver configuration.
//! - Executing the appropriate command based on the parsed arguments.
//!
//! The resolution logic lives in the `config_resolver` library crate; the
//! binary is a thin wrapper around it.

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    cli.execute()
}
