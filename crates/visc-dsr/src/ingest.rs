use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use visc_core::{
    stable_hash_string, ErrorInfo, Issue, IssueKind, RunProvenance, SweepError, RUN_DIR_PREFIX,
};
use walkdir::WalkDir;

use crate::metadata::{default_chain, resolve_metadata, MetadataSource, RunMetadata};
use crate::parse::{parse_dynamic, parse_relaxation, Series};
use crate::schema::{
    init_schema, insert_dynamic, insert_job_status, insert_relaxation, insert_simulation,
    store_error, JobState,
};

/// Time-domain output.
pub const RELAXATION_FILE: &str = "gt.dat";
/// Frequency-domain output.
pub const DYNAMIC_FILE: &str = "gtp.dat";

/// Run name used for outputs found directly in the ingestion root.
pub const ROOT_RUN: &str = ".";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestOptions {
    /// Also ingest outputs sitting directly in the root.
    #[serde(default)]
    pub include_root: bool,
    /// Insert runs in ascending molecular-weight order so ids follow it.
    #[serde(default)]
    pub sort_by_molecular_weight: bool,
    /// Status recorded per run directory name; `finished` otherwise.
    #[serde(default)]
    pub job_states: BTreeMap<String, JobState>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptedRun {
    pub run: String,
    pub simulation_id: i64,
    pub metadata: RunMetadata,
    pub dynamic_points: usize,
    pub relaxation_points: usize,
    pub status: JobState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub store_path: PathBuf,
    pub provenance: RunProvenance,
    pub accepted: Vec<AcceptedRun>,
    pub skipped: usize,
    /// Lines of accepted runs' outputs that did not parse.
    pub malformed_rows: usize,
    pub issues: Vec<Issue>,
}

struct PreparedRun {
    run: String,
    metadata: RunMetadata,
    molecular_weight: f64,
    dynamic: Series<(f64, f64, f64)>,
    relaxation: Series<(f64, f64)>,
}

fn non_empty_file(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.len() > 0)
        .unwrap_or(false)
}

fn read_text(path: &Path) -> Option<String> {
    fs::read(path)
        .ok()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}

/// Run directories under `root` in name order, preceded by the root itself
/// when requested.
pub fn discover_runs(root: &Path, include_root: bool) -> Vec<(String, PathBuf)> {
    let mut runs = Vec::new();
    if include_root {
        runs.push((ROOT_RUN.to_string(), root.to_path_buf()));
    }
    for entry in WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_dir())
    {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(RUN_DIR_PREFIX) {
            runs.push((name, entry.into_path()));
        }
    }
    runs
}

fn prepare(
    run: &str,
    dir: &Path,
    chain: &[Box<dyn MetadataSource>],
) -> Result<PreparedRun, String> {
    let relaxation_path = dir.join(RELAXATION_FILE);
    let dynamic_path = dir.join(DYNAMIC_FILE);
    for path in [&relaxation_path, &dynamic_path] {
        if !non_empty_file(path) {
            return Err(format!("{} missing or empty", path.display()));
        }
    }
    let relaxation = read_text(&relaxation_path)
        .map(|text| parse_relaxation(&text))
        .ok_or_else(|| format!("cannot read {RELAXATION_FILE}"))?;
    let dynamic = read_text(&dynamic_path)
        .map(|text| parse_dynamic(&text))
        .ok_or_else(|| format!("cannot read {DYNAMIC_FILE}"))?;
    if relaxation.is_empty() || dynamic.is_empty() {
        return Err(format!("no valid rows in {RELAXATION_FILE} or {DYNAMIC_FILE}"));
    }
    let metadata = resolve_metadata(dir, chain);
    let Some(molecular_weight) = metadata.molecular_weight else {
        return Err("molecular weight could not be resolved".to_string());
    };
    Ok(PreparedRun {
        run: run.to_string(),
        metadata,
        molecular_weight,
        dynamic,
        relaxation,
    })
}

fn partial_path(db_path: &Path) -> PathBuf {
    let mut name = db_path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    db_path.with_file_name(name)
}

fn remove_if_present(path: &Path) -> Result<(), SweepError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(store_error("visc_dsr.remove", err)
            .with_context("path", path.display().to_string())),
    }
}

/// Builds a fresh store at `db_path` from the run directories under `root`.
///
/// The store is written next to its final location and moved into place
/// once every insert has committed, so an existing store is replaced
/// whole. When no run is accepted nothing is left at `db_path` and
/// [`SweepError::EmptyStore`] is returned.
pub fn ingest_tree(
    root: &Path,
    db_path: &Path,
    opts: &IngestOptions,
) -> Result<IngestReport, SweepError> {
    let chain = default_chain();
    let mut issues = Vec::new();
    let mut prepared = Vec::new();
    for (run, dir) in discover_runs(root, opts.include_root) {
        match prepare(&run, &dir, &chain) {
            Ok(ready) => prepared.push(ready),
            Err(reason) => {
                if run != ROOT_RUN {
                    warn!(run = %run, reason = %reason, "run excluded from the store");
                    issues.push(Issue::for_run(IssueKind::IngestionSkip, run, reason));
                }
            }
        }
    }
    let skipped = issues.len();

    if prepared.is_empty() {
        remove_if_present(db_path)?;
        return Err(SweepError::EmptyStore(
            ErrorInfo::new("visc_dsr.empty_store", "no run directory held usable outputs")
                .with_context("root", root.display().to_string())
                .with_context("skipped", skipped.to_string()),
        ));
    }
    if opts.sort_by_molecular_weight {
        prepared.sort_by(|a, b| a.molecular_weight.total_cmp(&b.molecular_weight));
    }

    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| {
            store_error("visc_dsr.store_dir", err).with_context("path", parent.display().to_string())
        })?;
    }
    let staging = partial_path(db_path);
    remove_if_present(&staging)?;
    let accepted = match write_store(&staging, &prepared, opts) {
        Ok(accepted) => accepted,
        Err(err) => {
            remove_if_present(&staging)?;
            return Err(err);
        }
    };
    fs::rename(&staging, db_path).map_err(|err| {
        store_error("visc_dsr.store_publish", err).with_context("path", db_path.display().to_string())
    })?;

    let malformed_rows: usize = prepared
        .iter()
        .map(|run| run.dynamic.malformed + run.relaxation.malformed)
        .sum();
    info!(
        accepted = accepted.len(),
        skipped,
        malformed_rows,
        store = %db_path.display(),
        "store written"
    );
    Ok(IngestReport {
        store_path: db_path.to_path_buf(),
        provenance: RunProvenance::now(stable_hash_string(opts)?)
            .with_tool("sqlite", rusqlite::version()),
        accepted,
        skipped,
        malformed_rows,
        issues,
    })
}

fn write_store(
    path: &Path,
    prepared: &[PreparedRun],
    opts: &IngestOptions,
) -> Result<Vec<AcceptedRun>, SweepError> {
    let mut conn = Connection::open(path).map_err(|err| {
        store_error("visc_dsr.open", err).with_context("path", path.display().to_string())
    })?;
    init_schema(&conn)?;
    let tx = conn
        .transaction()
        .map_err(|err| store_error("visc_dsr.transaction", err))?;
    let mut accepted = Vec::with_capacity(prepared.len());
    for run in prepared {
        let meta = &run.metadata;
        let simulation_id = insert_simulation(
            &tx,
            run.molecular_weight,
            meta.polydispersity,
            meta.distribution_label.as_deref(),
            meta.zero_shear_viscosity,
            meta.complex_viscosity,
        )?;
        insert_dynamic(&tx, simulation_id, &run.dynamic.points)?;
        insert_relaxation(&tx, simulation_id, &run.relaxation.points)?;
        let status = opts.job_states.get(&run.run).copied().unwrap_or_default();
        insert_job_status(&tx, simulation_id, status)?;
        accepted.push(AcceptedRun {
            run: run.run.clone(),
            simulation_id,
            metadata: meta.clone(),
            dynamic_points: run.dynamic.points.len(),
            relaxation_points: run.relaxation.points.len(),
            status,
        });
    }
    tx.commit()
        .map_err(|err| store_error("visc_dsr.commit", err))?;
    conn.close()
        .map_err(|(_, err)| store_error("visc_dsr.close", err))?;
    Ok(accepted)
}
