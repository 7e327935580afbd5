use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use visc_sweep::{resume_batch, write_report, SweepConfig};

use crate::pipeline::{collect_and_ingest, open_session, print_sweep_summary, StoreArgs};

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Configuration of the sweep that submitted the jobs.
    #[arg(long)]
    pub config: PathBuf,
    /// Only drain the queue.
    #[arg(long)]
    pub no_collect: bool,
    #[command(flatten)]
    pub store: StoreArgs,
}

pub fn run(args: &WatchArgs) -> Result<(), Box<dyn Error>> {
    let config = SweepConfig::load(&args.config)?;
    if !config.dispatch.is_batch() {
        return Err("watch applies to batch sweeps only".into());
    }
    let mut session = open_session(&config)?;
    let report = resume_batch(session.as_mut(), &config)?;
    write_report(&config.local.output_dir.join("watch_report.json"), &report)?;
    print_sweep_summary(&report);
    if args.no_collect {
        return Ok(());
    }
    collect_and_ingest(session.as_ref(), &config, &report, &args.store)
}
