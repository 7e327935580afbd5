//! Completion watching: artifact readiness for direct runs, queue drains for
//! batch jobs.

use std::collections::BTreeSet;

use globset::{Glob, GlobMatcher};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use visc_core::{ErrorInfo, SweepError};
use visc_remote::RemoteSession;

use crate::retry::{wait_for, Probe, RetryPolicy, WaitOutcome};

/// Time-domain output.
pub const RELAXATION_FILE: &str = "gt.dat";
/// Frequency-domain output.
pub const DYNAMIC_FILE: &str = "gtp.dat";
/// Molar-mass distribution outputs.
pub const DISTRIBUTION_PATTERN: &str = "gpcls*";

/// Lists the caller's jobs, one identifier per line.
pub const QUEUE_LISTING: &str = r#"squeue -h -o %i -u "$USER""#;

/// What a run directory currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ArtifactProbe {
    pub relaxation: bool,
    pub dynamic: bool,
    pub distribution_output: bool,
}

impl ArtifactProbe {
    /// Both mandatory artifacts exist and are non-empty.
    pub fn complete(&self) -> bool {
        self.relaxation && self.dynamic
    }

    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if !self.relaxation {
            missing.push(RELAXATION_FILE);
        }
        if !self.dynamic {
            missing.push(DYNAMIC_FILE);
        }
        missing
    }
}

fn distribution_matcher() -> Result<GlobMatcher, SweepError> {
    Glob::new(DISTRIBUTION_PATTERN)
        .map(|glob| glob.compile_matcher())
        .map_err(|err| SweepError::Config(ErrorInfo::new("glob", err.to_string())))
}

/// One listing of `run_dir`. A directory that cannot be listed reads as empty.
pub fn probe_artifacts<S: RemoteSession + ?Sized>(
    session: &S,
    run_dir: &str,
) -> Result<ArtifactProbe, SweepError> {
    let entries = match session.list(run_dir) {
        Ok(entries) => entries,
        Err(err) if err.is_fatal_for_sweep() => return Err(err),
        Err(err) => {
            debug!(run_dir, error = %err, "run directory not listable yet");
            return Ok(ArtifactProbe::default());
        }
    };
    let matcher = distribution_matcher()?;
    let mut probe = ArtifactProbe::default();
    for entry in entries.iter().filter(|entry| entry.is_file()) {
        match entry.name.as_str() {
            RELAXATION_FILE => probe.relaxation = entry.size > 0,
            DYNAMIC_FILE => probe.dynamic = entry.size > 0,
            name if matcher.is_match(name) => probe.distribution_output = true,
            _ => {}
        }
    }
    Ok(probe)
}

/// Polls until both mandatory artifacts are present or the policy runs out.
/// The returned probe is the last one taken.
pub fn wait_for_artifacts<S: RemoteSession + ?Sized>(
    session: &S,
    run_dir: &str,
    policy: &RetryPolicy,
) -> Result<WaitOutcome<ArtifactProbe>, SweepError> {
    wait_for(policy, |attempt| {
        let probe = probe_artifacts(session, run_dir)?;
        debug!(run_dir, attempt, complete = probe.complete(), "artifact probe");
        Ok(if probe.complete() {
            Probe::Ready(probe)
        } else {
            Probe::Pending(probe)
        })
    })
}

/// Parses the queue listing into job identifiers.
pub fn parse_queue_listing(stdout: &str) -> BTreeSet<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn list_queue<S: RemoteSession + ?Sized>(session: &S) -> Result<BTreeSet<String>, SweepError> {
    let output = session.exec(QUEUE_LISTING)?;
    if !output.success() {
        return Err(SweepError::Remote(
            ErrorInfo::new("squeue", output.diagnostic())
                .with_context("exit_code", output.exit_code.to_string()),
        ));
    }
    Ok(parse_queue_listing(&output.stdout))
}

/// Outcome of a queue drain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainOutcome {
    pub drained: bool,
    /// Watched jobs still listed at the last poll.
    pub remaining: BTreeSet<String>,
    pub polls: u32,
}

/// Polls the queue until none of `job_ids` is listed. The session is
/// revalidated before every poll; a failed listing counts as "nothing left
/// the queue" for that poll. Completion order does not matter.
pub fn drain_queue<S: RemoteSession + ?Sized>(
    session: &mut S,
    job_ids: &BTreeSet<String>,
    policy: &RetryPolicy,
) -> Result<DrainOutcome, SweepError> {
    if job_ids.is_empty() {
        return Ok(DrainOutcome {
            drained: true,
            remaining: BTreeSet::new(),
            polls: 0,
        });
    }
    let mut remaining = job_ids.clone();
    let outcome = wait_for(policy, |attempt| {
        session.revalidate()?;
        match list_queue(&*session) {
            Ok(listed) => {
                remaining = job_ids.intersection(&listed).cloned().collect();
                debug!(attempt, remaining = remaining.len(), "queue poll");
            }
            Err(err) if err.is_fatal_for_sweep() => return Err(err),
            Err(err) => warn!(attempt, error = %err, "queue listing failed"),
        }
        Ok(if remaining.is_empty() {
            Probe::Ready(())
        } else {
            Probe::Pending(())
        })
    })?;
    let drained = outcome.is_ready();
    let polls = outcome.attempts();
    if drained {
        info!(jobs = job_ids.len(), polls, "queue drained");
    } else {
        warn!(remaining = remaining.len(), polls, "queue drain timed out");
    }
    Ok(DrainOutcome {
        drained,
        remaining,
        polls,
    })
}
