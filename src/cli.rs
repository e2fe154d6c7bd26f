//! CLI - Command Line Interface for medley
//!
//! Designed for automation: every operation is scriptable and all output is
//! JSON-parseable with `--json`. The periodic scheduler lives outside this
//! binary; `medley sync` is the "run one pass now" entry point it invokes.
//!
//! # Examples
//!
//! ```bash
//! # List the account's servers and their connection paths
//! medley servers --json
//!
//! # Resolve a working base URL for one server
//! medley resolve abc123def --fresh
//!
//! # Run one full sync pass with progress on stderr
//! medley sync
//!
//! # Print the unified catalog
//! medley catalog --kind movie --json
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;

// =============================================================================
// Exit Codes
// =============================================================================

/// Exit codes for CLI operations (semantic for scripting)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Success
    Success = 0,
    /// General error
    Error = 1,
    /// Invalid arguments
    InvalidArgs = 2,
    /// Network error
    NetworkError = 3,
    /// No account token configured
    NoToken = 4,
    /// Server not found or unreachable
    ServerUnavailable = 5,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

// =============================================================================
// Main CLI Structure
// =============================================================================

/// medley - one catalog across all your media servers
#[derive(Parser, Debug)]
#[command(
    name = "medley",
    version,
    about = "One catalog across all your media servers",
    long_about = "Finds a working connection to each of your media servers, \
                  keeps a local catalog in sync, and folds duplicate titles \
                  across servers into unified entries."
)]
pub struct Cli {
    /// Emit machine-readable JSON on stdout
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the account's servers and their connection candidates
    Servers(ServersCmd),
    /// Resolve a working base URL for one server
    Resolve(ResolveCmd),
    /// Run one full sync pass now
    Sync(SyncCmd),
    /// Print the unified catalog from the local store
    Catalog(CatalogCmd),
    /// Show sync completion flags and cached connections
    Status(StatusCmd),
}

#[derive(Args, Debug)]
pub struct ServersCmd {}

#[derive(Args, Debug)]
pub struct ResolveCmd {
    /// Machine identifier of the server to resolve
    pub machine_id: String,

    /// Drop any cached entry first and probe from scratch
    #[arg(long)]
    pub fresh: bool,
}

#[derive(Args, Debug)]
pub struct SyncCmd {
    /// Suppress progress output
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Args, Debug)]
pub struct CatalogCmd {
    /// Only show entries of this kind
    #[arg(short, long, value_enum)]
    pub kind: Option<KindFilter>,

    /// Only show entries merged from more than one server
    #[arg(long)]
    pub duplicates: bool,
}

#[derive(Args, Debug)]
pub struct StatusCmd {}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindFilter {
    Movie,
    Show,
}

// =============================================================================
// Output Handling
// =============================================================================

/// Output writer: human text or JSON, selected by --json
pub struct Output {
    json: bool,
}

impl Output {
    pub fn new(cli: &Cli) -> Self {
        Self { json: cli.json }
    }

    pub fn is_json(&self) -> bool {
        self.json
    }

    /// Print a serializable payload: pretty JSON in JSON mode, Display
    /// otherwise
    pub fn print<T: Serialize + std::fmt::Display>(&self, value: &T) -> anyhow::Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            println!("{}", value);
        }
        Ok(())
    }

    /// Print a list of serializable payloads
    pub fn print_list<T: Serialize + std::fmt::Display>(
        &self,
        values: &[T],
    ) -> anyhow::Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(values)?);
        } else {
            for value in values {
                println!("{}", value);
            }
        }
        Ok(())
    }

    /// Status line for humans, suppressed in JSON mode to keep stdout clean
    pub fn info(&self, msg: impl AsRef<str>) {
        if !self.json {
            eprintln!("{}", msg.as_ref());
        }
    }

    /// Report an error and pass the exit code through
    pub fn error(&self, msg: impl AsRef<str>, code: ExitCode) -> ExitCode {
        if self.json {
            let payload = serde_json::json!({ "error": msg.as_ref() });
            eprintln!("{}", payload);
        } else {
            eprintln!("Error: {}", msg.as_ref());
        }
        code
    }
}

/// Machine IDs are opaque but never empty or whitespace
pub fn validate_machine_id(id: &str) -> Result<(), String> {
    if id.trim().is_empty() {
        Err("machine id must not be empty".to_string())
    } else {
        Ok(())
    }
}
