//! Steps shared by `sweep` and `watch` once dispatch has settled.

use std::collections::BTreeMap;
use std::error::Error;
use std::fs;
use std::path::Path;

use clap::Args;
use serde::Serialize;
use tracing::{info, warn};
use visc_core::{to_canonical_json_bytes, Issue, SweepError};
use visc_dsr::{export_store_file, ingest_tree, ExportOptions, IngestOptions, JobState};
use visc_remote::{LocalSession, RemoteSession, SshSession};
use visc_sweep::{
    collect_runs, publish_outputs, CollectOptions, DispatchStatus, PublishPlan, SweepConfig,
    SweepReport,
};

#[derive(Args, Debug, Clone, Default)]
pub struct StoreArgs {
    /// Assign simulation ids in ascending molecular-weight order.
    #[arg(long)]
    pub sort_by_mw: bool,
    /// Also write the mean viscosities per distribution label.
    #[arg(long)]
    pub distribution_summary: bool,
    /// Keep the store and exports on this host only.
    #[arg(long)]
    pub no_publish: bool,
}

/// Grid dimensions typed on the command line, overriding the config file.
#[derive(Args, Debug, Clone, Default)]
pub struct GridArgs {
    /// Molecular weights, comma or space separated.
    #[arg(long = "mw", value_name = "LIST")]
    pub molecular_weights: Option<String>,
    /// Distribution codes; an empty list leaves the distribution unspecified.
    #[arg(long = "dist", value_name = "LIST")]
    pub distributions: Option<String>,
    /// Polydispersities; an empty list leaves the polydispersity unspecified.
    #[arg(long = "pdi", value_name = "LIST")]
    pub polydispersities: Option<String>,
}

/// Loads the sweep configuration and applies the grid overrides.
pub fn load_config(path: &Path, grid: &GridArgs) -> Result<SweepConfig, SweepError> {
    let mut config = SweepConfig::load(path)?;
    config.grid.override_with(
        grid.molecular_weights.as_deref(),
        grid.distributions.as_deref(),
        grid.polydispersities.as_deref(),
    )?;
    Ok(config)
}

/// SSH when a connection is configured, this host otherwise.
pub fn open_session(config: &SweepConfig) -> Result<Box<dyn RemoteSession>, SweepError> {
    match &config.connection {
        Some(target) => Ok(Box::new(SshSession::connect(target.clone())?)),
        None => Ok(Box::new(LocalSession::new())),
    }
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, to_canonical_json_bytes(value)?)?;
    Ok(())
}

/// Status recorded in the store for each dispatched run.
pub fn job_states(report: &SweepReport) -> BTreeMap<String, JobState> {
    report
        .statuses()
        .into_iter()
        .map(|(run, status)| {
            let state = match status {
                DispatchStatus::Succeeded => JobState::Finished,
                DispatchStatus::Failed => JobState::Error,
                DispatchStatus::Pending | DispatchStatus::Submitted | DispatchStatus::Running => {
                    JobState::Queued
                }
            };
            (run, state)
        })
        .collect()
}

fn log_issues(stage: &str, issues: &[Issue]) {
    for issue in issues {
        warn!(stage, %issue, "issue recorded");
    }
}

/// Collects the report's runs, rebuilds the store, exports it and, unless
/// disabled, publishes store and exports back to the working directory.
pub fn collect_and_ingest(
    session: &dyn RemoteSession,
    config: &SweepConfig,
    report: &SweepReport,
    args: &StoreArgs,
) -> Result<(), Box<dyn Error>> {
    let local = &config.local;
    let collected = collect_runs(
        session,
        &config.working_dir,
        &local.output_dir,
        &CollectOptions::runs(report.run_names()),
    )?;
    log_issues("collect", &collected.issues);
    write_json(&local.output_dir.join("collect_report.json"), &collected)?;

    let store = local.store_path();
    let ingest_opts = IngestOptions {
        include_root: false,
        sort_by_molecular_weight: args.sort_by_mw,
        job_states: job_states(report),
    };
    let ingested = ingest_tree(&local.output_dir, &store, &ingest_opts)?;
    log_issues("ingest", &ingested.issues);
    write_json(&local.output_dir.join("ingest_report.json"), &ingested)?;

    let export_opts = ExportOptions {
        per_run: true,
        distribution_summary: args.distribution_summary,
    };
    let exported = export_store_file(&store, &local.export_dir, &export_opts)?;

    if local.publish && !args.no_publish {
        let mut root_files = vec![store.clone()];
        root_files.extend(exported.tables.iter().cloned());
        let plan = PublishPlan {
            root_files,
            per_run: exported.per_run.clone(),
        };
        let issues = publish_outputs(session, &config.working_dir, &plan)?;
        log_issues("publish", &issues);
    }

    info!(
        collected = collected.runs.len(),
        stored = ingested.accepted.len(),
        skipped = ingested.skipped,
        store = %store.display(),
        "results stored"
    );
    println!(
        "{} run(s) collected, {} stored, {} skipped -> {}",
        collected.runs.len(),
        ingested.accepted.len(),
        ingested.skipped,
        store.display()
    );
    Ok(())
}

pub fn print_sweep_summary(report: &SweepReport) {
    println!(
        "{} combination(s): {} succeeded, {} failed, {} still queued, {} issue(s)",
        report.runs.len(),
        report.count(DispatchStatus::Succeeded),
        report.count(DispatchStatus::Failed),
        report.count(DispatchStatus::Running) + report.count(DispatchStatus::Submitted),
        report.issues.len()
    );
}
