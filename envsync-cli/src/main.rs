//! envsync: keep platform compute environments in step with their templates.
//!
//! # Usage
//!
//! ```text
//! envsync [apply] [--json]      create or revise environments
//! envsync plan [--json]         report decisions, change nothing
//! ```
//!
//! Connection and discovery settings come from flags or the environment:
//! `DOMINO_URL`, `DOMINO_API_KEY`, `DOMINO_AUTH_TOKEN`, `DOMINO_API_PROXY`,
//! `TARGET_DIRECTORY`, `LOG_LEVEL`.

mod commands;

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::run::RunArgs;
use envsync_engine::RunMode;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "envsync",
    version,
    about = "Reconcile compute environment templates against the platform",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    args: RunArgs,

    /// Log filter, e.g. `info` or `envsync_engine=debug`.
    #[arg(long, env = "LOG_LEVEL", global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Commands {
    /// Create missing environments and publish revisions for changed ones (default).
    Apply,

    /// Show what apply would do without changing anything.
    Plan,
}

impl Commands {
    fn mode(self) -> RunMode {
        match self {
            Commands::Apply => RunMode::Apply,
            Commands::Plan => RunMode::Plan,
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

fn init_logging(level: Option<&str>) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = level
        .and_then(|directive| EnvFilter::try_new(directive).ok())
        .unwrap_or_else(|| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    let mode = cli.command.unwrap_or(Commands::Apply).mode();
    cli.args.run(mode)
}
