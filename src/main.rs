//! medley - one catalog across all your media servers
//!
//! # Usage
//!
//! ```bash
//! # List servers known to the account
//! medley servers
//!
//! # Run one sync pass (a scheduler calls this periodically)
//! medley sync
//!
//! # Browse the unified catalog
//! medley catalog --kind movie --json
//! ```

// The bin target compiles the modules directly; library-surface helpers it
// does not call are expected here
#![allow(dead_code)]

mod api;
mod cli;
mod commands;
mod config;
mod connect;
mod models;
mod store;
mod sync;
mod unify;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, ExitCode, Output};

#[tokio::main]
async fn main() {
    // Logs go to stderr so --json output on stdout stays parseable
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("medley=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let exit_code = run(cli).await;
    std::process::exit(exit_code.into());
}

/// Dispatch a CLI command and return its exit code
async fn run(cli: Cli) -> ExitCode {
    let output = Output::new(&cli);

    match cli.command {
        Command::Servers(cmd) => commands::servers_cmd(cmd, &output).await,
        Command::Resolve(cmd) => commands::resolve_cmd(cmd, &output).await,
        Command::Sync(cmd) => commands::sync_cmd(cmd, &output).await,
        Command::Catalog(cmd) => commands::catalog_cmd(cmd, &output).await,
        Command::Status(cmd) => commands::status_cmd(cmd, &output).await,
    }
}
