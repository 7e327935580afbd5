//! Uploads the result store and its exports back to the working directory.

use std::path::{Path, PathBuf};

use tracing::{info, warn};
use visc_core::{Issue, IssueKind, SweepError};
use visc_remote::{remote_join, RemoteSession};

/// Files to publish. Root files land in the working directory; per-run files
/// land in the matching run directory, which must already exist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishPlan {
    pub root_files: Vec<PathBuf>,
    pub per_run: Vec<(String, Vec<PathBuf>)>,
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

fn upload_one<S: RemoteSession + ?Sized>(
    session: &S,
    local: &Path,
    remote_dir: &str,
    run: Option<&str>,
    issues: &mut Vec<Issue>,
) -> Result<bool, SweepError> {
    let Some(name) = file_name(local) else {
        return Ok(false);
    };
    match session.upload(local, &remote_join(remote_dir, &name)) {
        Ok(()) => Ok(true),
        Err(err) if err.is_fatal_for_sweep() => Err(err),
        Err(err) => {
            warn!(file = %local.display(), error = %err, "publish failed");
            issues.push(Issue::new(
                IssueKind::Publication,
                run.map(str::to_string),
                format!("{name}: {}", err.info().message),
            ));
            Ok(false)
        }
    }
}

/// Returns the issues raised; only connectivity errors abort.
pub fn publish_outputs<S: RemoteSession + ?Sized>(
    session: &S,
    working_dir: &str,
    plan: &PublishPlan,
) -> Result<Vec<Issue>, SweepError> {
    let mut issues = Vec::new();
    let mut uploaded = 0usize;
    for local in &plan.root_files {
        if upload_one(session, local, working_dir, None, &mut issues)? {
            uploaded += 1;
        }
    }
    for (run, files) in &plan.per_run {
        let remote_dir = remote_join(working_dir, run);
        let present = match session.stat(&remote_dir) {
            Ok(entry) => entry.map(|entry| entry.is_dir()).unwrap_or(false),
            Err(err) if err.is_fatal_for_sweep() => return Err(err),
            Err(_) => false,
        };
        if !present {
            continue;
        }
        for local in files {
            if upload_one(session, local, &remote_dir, Some(run), &mut issues)? {
                uploaded += 1;
            }
        }
    }
    info!(uploaded, issues = issues.len(), "outputs published");
    Ok(issues)
}
