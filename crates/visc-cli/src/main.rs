use std::error::Error;

use clap::{Parser, Subcommand};
use commands::{
    collect::{self, CollectArgs},
    export::{self, ExportArgs},
    ingest::{self, IngestArgs},
    plan::{self, PlanArgs},
    sweep::{self, SweepArgs},
    watch::{self, WatchArgs},
};
use tracing_subscriber::EnvFilter;

mod commands;
mod pipeline;

#[derive(Parser, Debug)]
#[command(name = "visc", about = "BoB parameter sweeps and result store")]
struct Cli {
    /// Log at debug level regardless of RUST_LOG.
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a configured sweep end to end: dispatch, collect, ingest, export.
    Sweep(SweepArgs),
    /// Print the expanded grid without contacting the host.
    Plan(PlanArgs),
    /// Watch batch jobs recorded by an earlier sweep, then collect and ingest.
    Watch(WatchArgs),
    /// Mirror run directories from the working directory.
    Collect(CollectArgs),
    /// Build the result store from a local tree of run directories.
    Ingest(IngestArgs),
    /// Write CSV exports of an existing store.
    Export(ExportArgs),
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match cli.command {
        Command::Sweep(args) => sweep::run(&args),
        Command::Plan(args) => plan::run(&args),
        Command::Watch(args) => watch::run(&args),
        Command::Collect(args) => collect::run(&args),
        Command::Ingest(args) => ingest::run(&args),
        Command::Export(args) => export::run(&args),
    }
}
