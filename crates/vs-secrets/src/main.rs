//! vs-secrets CLI - Synchronize solution user secrets
//!
//! This is the main entry point for the vs-secrets command-line interface.

mod cli;
mod commands;
mod output;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Must run before any TLS operation
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Init(args) => commands::init::run(args, cli.batch).await,
        Commands::Changekey(args) => commands::changekey::run(args, cli.batch).await,
        Commands::Push(args) => commands::push::run(args, cli.batch).await,
        Commands::Pull(args) => commands::pull::run(args, cli.batch).await,
        Commands::Status(args) => commands::status::run(args, cli.batch).await,
        Commands::Search(args) => commands::search::run(args),
        Commands::Configure(args) => commands::configure::run(args),
    }
}

/// Initialize tracing with appropriate verbosity
fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            // The GitHub device code is announced at info level
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}
