use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod telemetry;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // stdout carries the CSV stream, so logs go to stderr
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Check(args) => args.run(),
        Command::Run(args) => args.run(),
    }
}

#[derive(Parser)]
#[command(name = "fresa", about = "G-code motion planning for fresa")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse a G-code program and list its blocks.
    Check(cli::check::CheckArgs),
    /// Interpolate a G-code program into timed setpoints.
    Run(cli::run::RunArgs),
}
