use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use serde::Serialize;
use visc_core::to_canonical_json_bytes;
use visc_sweep::dispatch::{batch_job_name, batch_script_name};
use visc_sweep::DispatchStrategy;

use crate::pipeline::{load_config, GridArgs};

#[derive(Args, Debug)]
pub struct PlanArgs {
    #[arg(long)]
    pub config: PathBuf,
    /// Emit JSON instead of one line per combination.
    #[arg(long)]
    pub json: bool,
    #[command(flatten)]
    pub grid: GridArgs,
}

#[derive(Debug, Serialize)]
struct PlannedRun {
    run_dir: String,
    input_file: String,
    distribution_label: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    batch_script: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    job_name: Option<String>,
}

pub fn run(args: &PlanArgs) -> Result<(), Box<dyn Error>> {
    let config = load_config(&args.config, &args.grid)?;
    let template = config.template_name()?;
    let batch = match &config.dispatch {
        DispatchStrategy::Batch(resources) => Some(resources),
        DispatchStrategy::Direct => None,
    };
    let planned: Vec<PlannedRun> = config
        .grid
        .expand()
        .iter()
        .map(|combo| PlannedRun {
            run_dir: combo.dir_name(),
            input_file: combo.input_file_name(&template),
            distribution_label: combo.distribution_label(),
            batch_script: batch.map(|_| batch_script_name(combo)),
            job_name: batch.map(|resources| batch_job_name(resources, combo)),
        })
        .collect();
    if args.json {
        let bytes = to_canonical_json_bytes(&planned)?;
        println!("{}", String::from_utf8_lossy(&bytes));
        return Ok(());
    }
    for run in &planned {
        match &run.job_name {
            Some(job) => println!("{}\t{}\t{}", run.run_dir, run.input_file, job),
            None => println!("{}\t{}", run.run_dir, run.input_file),
        }
    }
    println!("{} combination(s) under {}", planned.len(), config.working_dir);
    Ok(())
}
