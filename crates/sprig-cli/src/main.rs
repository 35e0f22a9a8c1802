//! # sprig
//!
//! Restores the packages a project tree depends on into the local package
//! cache.
//!
//! This is the entry point for the `sprig` binary. It parses the command
//! line, sets up logging and the panic hook, and dispatches to the command
//! handlers.

use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tracing::{debug, error};

mod commands;
mod output;

use commands::restore::RestoreArgs;
use commands::CommandContext;
use output::errors::ErrorFormatter;

/// Package restore for sprig projects
#[derive(Parser)]
#[command(name = "sprig", version, about = "Restore project dependencies")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Restore the packages of one or more projects
    Restore(RestoreArgs),
    /// Show version information
    Version,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    setup_logging(cli.verbose);
    setup_panic_handler();

    debug!("Starting sprig v{}", env!("CARGO_PKG_VERSION"));

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("error: Failed to create async runtime: {}", e);
            return ExitCode::FAILURE;
        },
    };

    let result = runtime.block_on(async {
        let ctx = CommandContext::new()?;
        commands::dispatch_command(cli.command, &ctx).await
    });

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{}", ErrorFormatter::default().format_error(&e));
            ExitCode::FAILURE
        },
    }
}

fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "sprig={level},sprig_core={level},sprig_config={level},sprig_cache={level},\
             sprig_registry={level},sprig_resolver={level}"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|panic_info| {
        error!("sprig encountered an unexpected error: {}", panic_info);
        eprintln!("sprig crashed! This is a bug.");
        eprintln!("Please report this at: https://github.com/sprig-pm/sprig/issues");
        eprintln!("Error: {}", panic_info);
    }));
}
