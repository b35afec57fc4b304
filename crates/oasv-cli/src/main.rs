//! # oasv CLI entry point
//!
//! Parses command-line arguments and dispatches to subcommand handlers.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use oasv_cli::check::{run_check, CheckArgs};
use oasv_cli::request::{run_request, RequestArgs};

/// OpenAPI contract validation toolchain.
///
/// Checks documents and validates requests against them with the same
/// rules the middleware enforces.
#[derive(Parser, Debug)]
#[command(name = "oasv", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load a document and list its routes.
    Check(CheckArgs),

    /// Validate a single request against a document.
    Request(RequestArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG wins unless verbosity is requested explicitly.
    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Check(args) => run_check(&args),
        Commands::Request(args) => run_request(&args),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(2)
        }
    }
}
