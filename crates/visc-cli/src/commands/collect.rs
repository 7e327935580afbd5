use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use visc_sweep::{collect_runs, CollectOptions, SweepConfig};

use crate::pipeline::{open_session, write_json};

#[derive(Args, Debug)]
pub struct CollectArgs {
    #[arg(long)]
    pub config: PathBuf,
    /// Only these run directories; repeatable.
    #[arg(long = "run", value_name = "DIR")]
    pub runs: Vec<String>,
    /// Only run directories with these molecular weights; repeatable.
    #[arg(long = "mw", value_name = "MW")]
    pub molecular_weights: Vec<f64>,
    /// Local destination; defaults to the configured output directory.
    #[arg(long)]
    pub out: Option<PathBuf>,
}

pub fn run(args: &CollectArgs) -> Result<(), Box<dyn Error>> {
    let config = SweepConfig::load(&args.config)?;
    let session = open_session(&config)?;
    let out = args
        .out
        .clone()
        .unwrap_or_else(|| config.local.output_dir.clone());
    let opts = CollectOptions {
        only: (!args.runs.is_empty()).then(|| args.runs.iter().cloned().collect()),
        molecular_weights: args.molecular_weights.clone(),
    };
    let report = collect_runs(session.as_ref(), &config.working_dir, &out, &opts)?;
    write_json(&out.join("collect_report.json"), &report)?;
    println!(
        "{} run(s): {} file(s) downloaded, {} unchanged, {} issue(s)",
        report.runs.len(),
        report.downloaded,
        report.unchanged,
        report.issues.len()
    );
    for issue in &report.issues {
        println!("  {issue}");
    }
    Ok(())
}
