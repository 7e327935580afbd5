//! Mirrors remote run trees onto this host.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use visc_core::{io_error, DirTokens, Issue, IssueKind, SweepError, RUN_DIR_PREFIX};
use visc_remote::{remote_join, RemoteSession};

/// Which run directories to mirror.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectOptions {
    /// Restrict to these directory names.
    pub only: Option<BTreeSet<String>>,
    /// Restrict to directories whose molecular weight is listed.
    pub molecular_weights: Vec<f64>,
}

impl CollectOptions {
    pub fn runs(names: impl IntoIterator<Item = String>) -> Self {
        Self {
            only: Some(names.into_iter().collect()),
            molecular_weights: Vec::new(),
        }
    }

    fn accepts(&self, name: &str) -> bool {
        if let Some(only) = &self.only {
            if !only.contains(name) {
                return false;
            }
        }
        if self.molecular_weights.is_empty() {
            return true;
        }
        DirTokens::parse(name)
            .and_then(|tokens| tokens.molecular_weight)
            .map(|mw| {
                self.molecular_weights
                    .iter()
                    .any(|wanted| (wanted - mw).abs() <= f64::EPSILON * wanted.abs().max(1.0))
            })
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectReport {
    pub runs: Vec<String>,
    pub downloaded: usize,
    pub unchanged: usize,
    pub issues: Vec<Issue>,
}

/// Mirrors every matching `Mw_*` directory under `working_dir` into
/// `local_root`. Files already present locally with the remote size are not
/// transferred again. Per-file failures are recorded and skipped.
pub fn collect_runs<S: RemoteSession + ?Sized>(
    session: &S,
    working_dir: &str,
    local_root: &Path,
    opts: &CollectOptions,
) -> Result<CollectReport, SweepError> {
    fs::create_dir_all(local_root).map_err(|err| {
        io_error("collect_root", err).with_context("path", local_root.display().to_string())
    })?;
    let mut report = CollectReport::default();
    let entries = session.list(working_dir)?;
    for entry in entries
        .iter()
        .filter(|entry| entry.is_dir() && entry.name.starts_with(RUN_DIR_PREFIX))
        .filter(|entry| opts.accepts(&entry.name))
    {
        let remote_dir = remote_join(working_dir, &entry.name);
        let local_dir = local_root.join(&entry.name);
        mirror_tree(session, &remote_dir, &local_dir, &entry.name, &mut report)?;
        report.runs.push(entry.name.clone());
    }
    info!(
        runs = report.runs.len(),
        downloaded = report.downloaded,
        unchanged = report.unchanged,
        "collection finished"
    );
    Ok(report)
}

/// Recursive copy of one remote tree. Only connectivity errors propagate.
pub fn mirror_tree<S: RemoteSession + ?Sized>(
    session: &S,
    remote_dir: &str,
    local_dir: &Path,
    run: &str,
    report: &mut CollectReport,
) -> Result<(), SweepError> {
    if let Err(err) = fs::create_dir_all(local_dir) {
        report.issues.push(Issue::for_run(
            IssueKind::CollectionSkip,
            run,
            format!("cannot create {}: {err}", local_dir.display()),
        ));
        return Ok(());
    }
    let entries = match session.list(remote_dir) {
        Ok(entries) => entries,
        Err(err) if err.is_fatal_for_sweep() => return Err(err),
        Err(err) => {
            warn!(remote_dir, error = %err, "listing failed during collection");
            report.issues.push(Issue::for_run(
                IssueKind::CollectionSkip,
                run,
                format!("cannot list {remote_dir}: {}", err.info().message),
            ));
            return Ok(());
        }
    };
    for entry in entries {
        let remote_path = remote_join(remote_dir, &entry.name);
        let local_path = local_dir.join(&entry.name);
        if entry.is_dir() {
            mirror_tree(session, &remote_path, &local_path, run, report)?;
            continue;
        }
        if !entry.is_file() {
            continue;
        }
        let unchanged = fs::metadata(&local_path)
            .map(|meta| meta.is_file() && meta.len() == entry.size)
            .unwrap_or(false);
        if unchanged {
            report.unchanged += 1;
            continue;
        }
        match session.download(&remote_path, &local_path) {
            Ok(()) => {
                debug!(remote = %remote_path, "downloaded");
                report.downloaded += 1;
            }
            Err(err) if err.is_fatal_for_sweep() => return Err(err),
            Err(err) => {
                warn!(remote = %remote_path, error = %err, "download failed");
                report.issues.push(Issue::for_run(
                    IssueKind::CollectionSkip,
                    run,
                    format!("{}: {}", entry.name, err.info().message),
                ));
            }
        }
    }
    Ok(())
}
