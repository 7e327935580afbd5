use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use visc_sweep::{run_sweep, write_report};

use crate::pipeline::{
    collect_and_ingest, load_config, open_session, print_sweep_summary, GridArgs, StoreArgs,
};

#[derive(Args, Debug)]
pub struct SweepArgs {
    /// YAML sweep configuration.
    #[arg(long)]
    pub config: PathBuf,
    /// Stop once dispatch has settled; skip collection and ingestion.
    #[arg(long)]
    pub no_collect: bool,
    #[command(flatten)]
    pub grid: GridArgs,
    #[command(flatten)]
    pub store: StoreArgs,
}

pub fn run(args: &SweepArgs) -> Result<(), Box<dyn Error>> {
    let config = load_config(&args.config, &args.grid)?;
    let mut session = open_session(&config)?;
    let report = run_sweep(session.as_mut(), &config)?;
    write_report(&config.local.output_dir.join("sweep_report.json"), &report)?;
    print_sweep_summary(&report);
    if args.no_collect {
        return Ok(());
    }
    collect_and_ingest(session.as_ref(), &config, &report, &args.store)
}
