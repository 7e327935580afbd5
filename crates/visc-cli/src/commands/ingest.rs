use std::collections::BTreeMap;
use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use visc_dsr::{ingest_tree, IngestOptions, JobState};

use crate::pipeline::write_json;

#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Directory holding the `Mw_*` run directories.
    #[arg(long)]
    pub root: PathBuf,
    /// Store to (re)create.
    #[arg(long)]
    pub db: PathBuf,
    /// Also ingest outputs found directly in the root.
    #[arg(long)]
    pub include_root: bool,
    /// Assign simulation ids in ascending molecular-weight order.
    #[arg(long)]
    pub sort_by_mw: bool,
    /// Recorded status for one run, as `<run-dir>=<queued|finished|error>`.
    #[arg(long = "status", value_name = "RUN=STATE", value_parser = parse_status)]
    pub statuses: Vec<(String, JobState)>,
    /// Write the ingestion report as JSON.
    #[arg(long)]
    pub report: Option<PathBuf>,
}

fn parse_status(value: &str) -> Result<(String, JobState), String> {
    let (run, state) = value
        .split_once('=')
        .ok_or_else(|| format!("expected RUN=STATE, got '{value}'"))?;
    let state = JobState::parse(state.trim())
        .ok_or_else(|| format!("unknown job state '{}'", state.trim()))?;
    Ok((run.trim().to_string(), state))
}

pub fn run(args: &IngestArgs) -> Result<(), Box<dyn Error>> {
    let job_states: BTreeMap<String, JobState> = args.statuses.iter().cloned().collect();
    let opts = IngestOptions {
        include_root: args.include_root,
        sort_by_molecular_weight: args.sort_by_mw,
        job_states,
    };
    let report = ingest_tree(&args.root, &args.db, &opts)?;
    if let Some(path) = &args.report {
        write_json(path, &report)?;
    }
    println!(
        "{} run(s) stored, {} skipped, {} malformed row(s) -> {}",
        report.accepted.len(),
        report.skipped,
        report.malformed_rows,
        report.store_path.display()
    );
    for issue in &report.issues {
        println!("  {issue}");
    }
    Ok(())
}
