//! driftgate CLI
//!
//! A TCP listener that stops taking work after a maximum lifetime or an idle
//! period and drains in-flight connections before exiting.

// Use mimalloc as the global allocator for better performance
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod commands;
mod health;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "driftgate",
    author,
    version,
    about = "Drain-safe TCP stream listener",
    long_about = "driftgate accepts TCP connections until it reaches its maximum lifetime,\n\
                  finds itself idle, or is told to stop. It then reports unhealthy,\n\
                  closes its listener and waits for every open connection to finish.",
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the listener
    Serve(commands::serve::ServeArgs),

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => commands::serve::run(args).await,
        Commands::Version => {
            commands::version::run();
            Ok(())
        }
    }
}
