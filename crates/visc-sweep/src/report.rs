use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use visc_core::{io_error, to_canonical_json_bytes, Issue, IssueKind, RunProvenance, SweepError};

use crate::dispatch::{DispatchMode, DispatchRecord, DispatchStatus};
use crate::watch::DrainOutcome;

/// Aggregate sweep report persisted next to the collected runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    pub plan_hash: String,
    pub provenance: RunProvenance,
    pub working_dir: String,
    pub mode: DispatchMode,
    pub runs: Vec<DispatchRecord>,
    pub issues: Vec<Issue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drain: Option<DrainOutcome>,
}

impl SweepReport {
    pub fn count(&self, status: DispatchStatus) -> usize {
        self.runs.iter().filter(|run| run.status == status).count()
    }

    pub fn issue_count(&self, kind: IssueKind) -> usize {
        visc_core::issues::count_kind(&self.issues, kind)
    }

    pub fn record(&self, run: &str) -> Option<&DispatchRecord> {
        self.runs.iter().find(|record| record.run == run)
    }

    /// Names of every run directory the sweep touched.
    pub fn run_names(&self) -> Vec<String> {
        self.runs.iter().map(|record| record.run.clone()).collect()
    }

    pub fn statuses(&self) -> BTreeMap<String, DispatchStatus> {
        self.runs
            .iter()
            .map(|record| (record.run.clone(), record.status))
            .collect()
    }
}

pub fn write_report(path: &Path, report: &SweepReport) -> Result<(), SweepError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| io_error("report_dir", err))?;
    }
    let bytes = to_canonical_json_bytes(report)?;
    fs::write(path, bytes).map_err(|err| io_error("report_write", err))
}
