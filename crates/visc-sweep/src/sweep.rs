use std::collections::{BTreeMap, BTreeSet};

use tracing::{info, warn};
use visc_core::{stable_hash_string, Issue, IssueKind, RunProvenance, SweepError};
use visc_remote::{remote_join, RemoteSession};

use crate::config::{BatchResources, DispatchStrategy, SweepConfig};
use crate::dispatch::{
    batch_script_name, render_batch_script, run_direct, solver_invocation, submit_batch,
    DispatchHandle, DispatchMode, DispatchRecord, DispatchStatus,
};
use crate::environment::{resolve_activation, Activation};
use crate::manifest::{append_entry, ManifestEntry, QueueManifest};
use crate::materialize::{materialize, MaterializedRun, RunInputs};
use crate::report::SweepReport;
use crate::watch::{drain_queue, probe_artifacts, wait_for_artifacts, DrainOutcome};

fn mode_of(strategy: &DispatchStrategy) -> DispatchMode {
    match strategy {
        DispatchStrategy::Direct => DispatchMode::Direct,
        DispatchStrategy::Batch(_) => DispatchMode::Batch,
    }
}

/// Marks the record failed and records the issue, unless the error is fatal.
fn fail(
    record: &mut DispatchRecord,
    issues: &mut Vec<Issue>,
    kind: IssueKind,
    err: SweepError,
) -> Result<(), SweepError> {
    if err.is_fatal_for_sweep() {
        return Err(err);
    }
    let message = err.info().message.clone();
    warn!(run = %record.run, kind = %kind, error = %err, "combination skipped");
    issues.push(Issue::for_run(kind, record.run.as_str(), message.as_str()));
    record.transition(DispatchStatus::Failed, Some(message))
}

/// Runs every combination of the grid in enumeration order.
///
/// Per-combination failures become issues on the report and the sweep moves
/// on; a connectivity error ends the sweep and is returned.
pub fn run_sweep<S: RemoteSession + ?Sized>(
    session: &mut S,
    config: &SweepConfig,
) -> Result<SweepReport, SweepError> {
    config.validate()?;
    let plan_hash = stable_hash_string(config)?;
    let inputs = RunInputs::from_config(config)?;
    let combinations = config.grid.expand();
    let mode = mode_of(&config.dispatch);
    info!(
        host = session.host(),
        combinations = combinations.len(),
        mode = ?mode,
        "starting sweep"
    );

    session.ensure_dir(&config.working_dir)?;
    let activation = resolve_activation(&*session, &config.environment)?;

    let mut records = Vec::with_capacity(combinations.len());
    let mut issues = Vec::new();
    for combination in &combinations {
        let mut record = DispatchRecord::new(combination.dir_name(), *combination, mode);
        let run = match materialize(&*session, &config.working_dir, combination, &inputs) {
            Ok(run) => run,
            Err(err) => {
                fail(&mut record, &mut issues, IssueKind::Materialization, err)?;
                records.push(record);
                continue;
            }
        };
        for issue in &run.issues {
            warn!(run = %run.dir_name, "{}", issue.message);
        }
        issues.extend(run.issues.iter().cloned());
        match &config.dispatch {
            DispatchStrategy::Direct => {
                dispatch_direct(&*session, config, &run, &activation, &mut record, &mut issues)?
            }
            DispatchStrategy::Batch(resources) => dispatch_batch(
                &*session,
                config,
                resources,
                &run,
                &activation,
                &mut record,
                &mut issues,
            )?,
        }
        records.push(record);
    }

    let drain = if config.dispatch.is_batch() {
        Some(settle_batch(session, config, &mut records, &mut issues)?)
    } else {
        None
    };

    let report = SweepReport {
        plan_hash: plan_hash.clone(),
        provenance: RunProvenance::now(plan_hash),
        working_dir: config.working_dir.clone(),
        mode,
        runs: records,
        issues,
        drain,
    };
    info!(
        succeeded = report.count(DispatchStatus::Succeeded),
        failed = report.count(DispatchStatus::Failed),
        issues = report.issues.len(),
        "sweep finished"
    );
    Ok(report)
}

fn dispatch_direct<S: RemoteSession + ?Sized>(
    session: &S,
    config: &SweepConfig,
    run: &MaterializedRun,
    activation: &Activation,
    record: &mut DispatchRecord,
    issues: &mut Vec<Issue>,
) -> Result<(), SweepError> {
    let invocation =
        match solver_invocation(&config.solver, &run.input_name, run.polymer_name.as_deref()) {
            Ok(invocation) => invocation,
            Err(err) => return fail(record, issues, IssueKind::Dispatch, err),
        };
    let output = match run_direct(session, run, activation, &invocation) {
        Ok(output) => output,
        Err(err) => return fail(record, issues, IssueKind::Dispatch, err),
    };
    record.handle = Some(DispatchHandle::ExitCode(output.exit_code));
    record.transition(DispatchStatus::Submitted, None)?;
    if !output.success() {
        let message = format!(
            "solver exited with code {}: {}",
            output.exit_code,
            output.diagnostic()
        );
        warn!(run = %run.dir_name, "{message}");
        issues.push(Issue::for_run(IssueKind::Dispatch, run.dir_name.as_str(), message.as_str()));
        return record.transition(DispatchStatus::Failed, Some(message));
    }

    let outcome = wait_for_artifacts(session, &run.run_dir, &config.watch.artifact_policy())?;
    let ready = outcome.is_ready();
    let attempts = outcome.attempts();
    let probe = outcome.into_value();
    record.distribution_output = probe.distribution_output;
    if ready {
        info!(
            run = %run.dir_name,
            distribution_output = probe.distribution_output,
            "run complete"
        );
        record.transition(DispatchStatus::Succeeded, None)
    } else {
        let message = format!(
            "solver exited 0 but {} missing after {attempts} probes",
            probe.missing().join(" and ")
        );
        warn!(run = %run.dir_name, "{message}");
        issues.push(Issue::for_run(
            IssueKind::IncompleteRun,
            run.dir_name.as_str(),
            message.as_str(),
        ));
        record.transition(DispatchStatus::Failed, Some(message))
    }
}

fn dispatch_batch<S: RemoteSession + ?Sized>(
    session: &S,
    config: &SweepConfig,
    resources: &BatchResources,
    run: &MaterializedRun,
    activation: &Activation,
    record: &mut DispatchRecord,
    issues: &mut Vec<Issue>,
) -> Result<(), SweepError> {
    let invocation =
        match solver_invocation(&config.solver, &run.input_name, run.polymer_name.as_deref()) {
            Ok(invocation) => invocation,
            Err(err) => return fail(record, issues, IssueKind::Dispatch, err),
        };
    let script = render_batch_script(&run.combination, resources, activation, &invocation);
    let script_name = batch_script_name(&run.combination);
    let job_id = match submit_batch(session, run, &script_name, &script) {
        Ok(job_id) => job_id,
        Err(err) => return fail(record, issues, IssueKind::Dispatch, err),
    };
    info!(run = %run.dir_name, job = %job_id, "job submitted");
    record.handle = Some(DispatchHandle::JobId(job_id.clone()));
    record.transition(DispatchStatus::Submitted, Some(format!("submitted as job {job_id}")))?;

    let entry = ManifestEntry::new(job_id.as_str(), run.dir_name.as_str(), run.combination);
    if let Err(err) = append_entry(session, &config.working_dir, entry) {
        if err.is_fatal_for_sweep() {
            return Err(err);
        }
        warn!(job = %job_id, error = %err, "queue manifest not updated");
        issues.push(Issue::for_run(
            IssueKind::Dispatch,
            run.dir_name.as_str(),
            format!("job {job_id} not recorded in the queue manifest: {}", err.info().message),
        ));
    }
    Ok(())
}

/// Drains the queue for every submitted record, then settles each record
/// with one artifact probe. Jobs still queued at the timeout are left
/// `Running` and a queue-timeout issue is recorded.
pub fn settle_batch<S: RemoteSession + ?Sized>(
    session: &mut S,
    config: &SweepConfig,
    records: &mut [DispatchRecord],
    issues: &mut Vec<Issue>,
) -> Result<DrainOutcome, SweepError> {
    let job_ids: BTreeSet<String> = records
        .iter()
        .filter(|record| record.status == DispatchStatus::Submitted)
        .filter_map(|record| record.job_id().map(str::to_string))
        .collect();
    info!(jobs = job_ids.len(), "waiting for the batch queue");
    let outcome = drain_queue(session, &job_ids, &config.watch.queue_policy())?;
    if !outcome.drained {
        issues.push(Issue::new(
            IssueKind::QueueTimeout,
            None,
            format!(
                "{} job(s) still queued after {} polls; collecting whatever exists",
                outcome.remaining.len(),
                outcome.polls
            ),
        ));
    }

    for record in records
        .iter_mut()
        .filter(|record| record.status == DispatchStatus::Submitted)
    {
        let still_queued = record
            .job_id()
            .map(|id| outcome.remaining.contains(id))
            .unwrap_or(false);
        if still_queued {
            record.transition(
                DispatchStatus::Running,
                Some("still queued when the watch ended".to_string()),
            )?;
            continue;
        }
        let run_dir = remote_join(&config.working_dir, &record.run);
        let probe = probe_artifacts(&*session, &run_dir)?;
        record.distribution_output = probe.distribution_output;
        if probe.complete() {
            record.transition(DispatchStatus::Succeeded, None)?;
        } else {
            let message = format!("job finished but {} missing", probe.missing().join(" and "));
            warn!(run = %record.run, "{message}");
            issues.push(Issue::for_run(
                IssueKind::IncompleteRun,
                record.run.as_str(),
                message.as_str(),
            ));
            record.transition(DispatchStatus::Failed, Some(message))?;
        }
    }
    Ok(outcome)
}

/// Watches jobs recorded in the working directory's queue manifest, for
/// batch sweeps whose submitting process has exited.
pub fn resume_batch<S: RemoteSession + ?Sized>(
    session: &mut S,
    config: &SweepConfig,
) -> Result<SweepReport, SweepError> {
    let plan_hash = stable_hash_string(config)?;
    let manifest = QueueManifest::load(&*session, &config.working_dir)?;
    let mut latest: BTreeMap<&str, &ManifestEntry> = BTreeMap::new();
    for entry in &manifest.entries {
        latest.insert(entry.run.as_str(), entry);
    }
    let mut records = Vec::with_capacity(latest.len());
    for entry in latest.values() {
        let mut record = DispatchRecord::new(entry.run.as_str(), entry.combination, DispatchMode::Batch);
        record.handle = Some(DispatchHandle::JobId(entry.job_id.clone()));
        record.transition(DispatchStatus::Submitted, None)?;
        records.push(record);
    }
    let mut issues = Vec::new();
    let drain = settle_batch(session, config, &mut records, &mut issues)?;
    Ok(SweepReport {
        plan_hash: plan_hash.clone(),
        provenance: RunProvenance::now(plan_hash),
        working_dir: config.working_dir.clone(),
        mode: DispatchMode::Batch,
        runs: records,
        issues,
        drain: Some(drain),
    })
}
