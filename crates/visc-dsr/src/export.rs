use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::info;
use visc_core::{
    decimal_repr, distribution_code, io_error, to_canonical_json_bytes, ParameterCombination,
    SweepError,
};

use crate::query::StoreQuery;
use crate::schema::{store_error, DynamicPoint, RelaxationPoint, SimulationRecord};

pub const SIMULATION_CSV: &str = "01-simulation.csv";
pub const DYNAMIC_CSV: &str = "01-dynamic.csv";
pub const RELAXATION_CSV: &str = "01-relaxation.csv";
pub const JOB_STATUS_CSV: &str = "01-job_status.csv";
pub const RELAXATION_DERIVED_CSV: &str = "02-relaxation_pyRheo.csv";
pub const DYNAMIC_DERIVED_CSV: &str = "02-dynamic_pyRheo.csv";
pub const DISTRIBUTION_SUMMARY_CSV: &str = "03-viscosity_by_distribution.csv";

const RELAXATION_DERIVED_HEADER: [&str; 2] = ["Time", "Relaxation Modulus"];
const DYNAMIC_DERIVED_HEADER: [&str; 3] = ["Angular Frequency", "Storage Modulus", "Loss Modulus"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExportOptions {
    /// Also write the derived files per combination under `<run-dir-name>/`.
    #[serde(default)]
    pub per_run: bool,
    /// Write the mean viscosities per distribution label.
    #[serde(default)]
    pub distribution_summary: bool,
}

/// Files written by one export.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportManifest {
    /// Table dumps and the optional distribution summary.
    pub tables: Vec<PathBuf>,
    /// Aggregated derived files.
    pub derived: Vec<PathBuf>,
    /// Per-combination derived files keyed by run directory name.
    pub per_run: Vec<(String, Vec<PathBuf>)>,
}

fn real(value: f64) -> String {
    decimal_repr(value)
}

fn optional_real(value: Option<f64>) -> String {
    value.map(real).unwrap_or_default()
}

fn write_csv<I>(path: &Path, header: &[&str], rows: I) -> Result<(), SweepError>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let with_path = |err: SweepError| err.with_context("path", path.display().to_string());
    let mut wtr =
        csv::Writer::from_path(path).map_err(|err| with_path(io_error("visc_dsr.export", err)))?;
    wtr.write_record(header)
        .map_err(|err| with_path(io_error("visc_dsr.export", err)))?;
    for row in rows {
        wtr.write_record(&row)
            .map_err(|err| with_path(io_error("visc_dsr.export", err)))?;
    }
    wtr.flush()
        .map_err(|err| with_path(io_error("visc_dsr.export", err)))
}

fn relaxation_rows(points: &[&RelaxationPoint]) -> Vec<Vec<String>> {
    points
        .iter()
        .map(|p| vec![real(p.time), real(p.modulus)])
        .collect()
}

fn dynamic_rows(points: &[&DynamicPoint]) -> Vec<Vec<String>> {
    points
        .iter()
        .map(|p| vec![real(p.frequency), real(p.storage_modulus), real(p.loss_modulus)])
        .collect()
}

/// Directory name of the combination a simulation was run for.
pub fn run_dir_name(simulation: &SimulationRecord) -> Option<String> {
    let mw = simulation.molecular_weight?;
    let code = simulation
        .distribution_label
        .as_deref()
        .and_then(distribution_code);
    Some(ParameterCombination::new(mw, code, simulation.pdi).dir_name())
}

/// Dumps the four tables, the derived files and, on request, the
/// per-combination copies and the distribution summary into `out_dir`.
pub fn export_store(
    conn: &Connection,
    out_dir: &Path,
    opts: &ExportOptions,
) -> Result<ExportManifest, SweepError> {
    fs::create_dir_all(out_dir).map_err(|err| {
        io_error("visc_dsr.export_dir", err).with_context("path", out_dir.display().to_string())
    })?;
    let store = StoreQuery::load(conn)?;
    store.ensure_referential()?;
    let mut manifest = ExportManifest::default();

    let path = out_dir.join(SIMULATION_CSV);
    write_csv(
        &path,
        &[
            "id",
            "molecular_weight",
            "pdi",
            "distribution_label",
            "zero_shear_viscosity",
            "complex_viscosity",
        ],
        store.simulations.iter().map(|s| {
            vec![
                s.id.to_string(),
                optional_real(s.molecular_weight),
                optional_real(s.pdi),
                s.distribution_label.clone().unwrap_or_default(),
                optional_real(s.zero_shear_viscosity),
                optional_real(s.complex_viscosity),
            ]
        }),
    )?;
    manifest.tables.push(path);

    let path = out_dir.join(DYNAMIC_CSV);
    write_csv(
        &path,
        &["id", "simulation_id", "frequency", "storage_modulus", "loss_modulus"],
        store.dynamic.iter().map(|p| {
            vec![
                p.id.to_string(),
                p.simulation_id.to_string(),
                real(p.frequency),
                real(p.storage_modulus),
                real(p.loss_modulus),
            ]
        }),
    )?;
    manifest.tables.push(path);

    let path = out_dir.join(RELAXATION_CSV);
    write_csv(
        &path,
        &["id", "simulation_id", "time", "modulus"],
        store.relaxation.iter().map(|p| {
            vec![
                p.id.to_string(),
                p.simulation_id.to_string(),
                real(p.time),
                real(p.modulus),
            ]
        }),
    )?;
    manifest.tables.push(path);

    let path = out_dir.join(JOB_STATUS_CSV);
    write_csv(
        &path,
        &["simulation_id", "status"],
        store
            .job_status
            .iter()
            .map(|r| vec![r.simulation_id.to_string(), r.status.to_string()]),
    )?;
    manifest.tables.push(path);

    if opts.distribution_summary {
        let path = out_dir.join(DISTRIBUTION_SUMMARY_CSV);
        write_distribution_summary(&path, &store.simulations)?;
        manifest.tables.push(path);
    }

    let relaxation: Vec<&RelaxationPoint> = store.relaxation.iter().collect();
    let dynamic: Vec<&DynamicPoint> = store.dynamic.iter().collect();
    let path = out_dir.join(RELAXATION_DERIVED_CSV);
    write_csv(&path, &RELAXATION_DERIVED_HEADER, relaxation_rows(&relaxation))?;
    manifest.derived.push(path);
    let path = out_dir.join(DYNAMIC_DERIVED_CSV);
    write_csv(&path, &DYNAMIC_DERIVED_HEADER, dynamic_rows(&dynamic))?;
    manifest.derived.push(path);

    if opts.per_run {
        manifest.per_run = export_per_run(out_dir, &store)?;
    }
    info!(
        simulations = store.simulations.len(),
        per_run = manifest.per_run.len(),
        out_dir = %out_dir.display(),
        "store exported"
    );
    Ok(manifest)
}

/// Opens the store at `db_path` and exports it.
pub fn export_store_file(
    db_path: &Path,
    out_dir: &Path,
    opts: &ExportOptions,
) -> Result<ExportManifest, SweepError> {
    if !db_path.is_file() {
        return Err(store_error("visc_dsr.open", "store not found")
            .with_context("path", db_path.display().to_string()));
    }
    let conn = Connection::open(db_path).map_err(|err| {
        store_error("visc_dsr.open", err).with_context("path", db_path.display().to_string())
    })?;
    export_store(&conn, out_dir, opts)
}

fn export_per_run(
    out_dir: &Path,
    store: &StoreQuery,
) -> Result<Vec<(String, Vec<PathBuf>)>, SweepError> {
    // simulations resolving to the same combination share one directory
    let mut groups: BTreeMap<String, (Vec<&RelaxationPoint>, Vec<&DynamicPoint>)> = BTreeMap::new();
    for simulation in &store.simulations {
        let Some(name) = run_dir_name(simulation) else {
            continue;
        };
        let group = groups.entry(name).or_default();
        group.0.extend(
            store
                .relaxation
                .iter()
                .filter(|p| p.simulation_id == simulation.id),
        );
        group.1.extend(
            store
                .dynamic
                .iter()
                .filter(|p| p.simulation_id == simulation.id),
        );
    }
    let mut written = Vec::with_capacity(groups.len());
    for (name, (relaxation, dynamic)) in groups {
        let dir = out_dir.join(&name);
        fs::create_dir_all(&dir).map_err(|err| {
            io_error("visc_dsr.export_dir", err).with_context("path", dir.display().to_string())
        })?;
        let relaxation_path = dir.join(RELAXATION_DERIVED_CSV);
        write_csv(&relaxation_path, &RELAXATION_DERIVED_HEADER, relaxation_rows(&relaxation))?;
        let dynamic_path = dir.join(DYNAMIC_DERIVED_CSV);
        write_csv(&dynamic_path, &DYNAMIC_DERIVED_HEADER, dynamic_rows(&dynamic))?;
        written.push((name, vec![relaxation_path, dynamic_path]));
    }
    Ok(written)
}

#[derive(Default)]
struct Mean {
    sum: f64,
    count: usize,
}

impl Mean {
    fn add(&mut self, value: Option<f64>) {
        if let Some(value) = value {
            self.sum += value;
            self.count += 1;
        }
    }

    fn value(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

fn write_distribution_summary(
    path: &Path,
    simulations: &[SimulationRecord],
) -> Result<(), SweepError> {
    let mut groups: BTreeMap<&str, (Mean, Mean)> = BTreeMap::new();
    for simulation in simulations {
        let Some(label) = simulation.distribution_label.as_deref() else {
            continue;
        };
        let (zero, complex) = groups.entry(label).or_default();
        zero.add(simulation.zero_shear_viscosity);
        complex.add(simulation.complex_viscosity);
    }
    write_csv(
        path,
        &[
            "distribution_label",
            "zero_shear_viscosity_mean",
            "complex_viscosity_mean",
        ],
        groups.into_iter().map(|(label, (zero, complex))| {
            vec![
                label.to_string(),
                optional_real(zero.value()),
                optional_real(complex.value()),
            ]
        }),
    )
}

/// Canonical JSON dump of the whole store.
pub fn export_json(conn: &Connection, out_path: &Path) -> Result<(), SweepError> {
    let store = StoreQuery::load(conn)?;
    let bytes = to_canonical_json_bytes(&store)?;
    fs::write(out_path, bytes).map_err(|err| {
        io_error("visc_dsr.export", err).with_context("path", out_path.display().to_string())
    })
}
