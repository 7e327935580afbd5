use std::fmt;

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use visc_core::{ErrorInfo, SweepError};

pub const SCHEMA_VERSION: i64 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationRecord {
    pub id: i64,
    pub molecular_weight: Option<f64>,
    pub pdi: Option<f64>,
    pub distribution_label: Option<String>,
    pub zero_shear_viscosity: Option<f64>,
    pub complex_viscosity: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicPoint {
    pub id: i64,
    pub simulation_id: i64,
    pub frequency: f64,
    pub storage_modulus: f64,
    pub loss_modulus: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelaxationPoint {
    pub id: i64,
    pub simulation_id: i64,
    pub time: f64,
    pub modulus: f64,
}

/// Terminal state recorded for every simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    #[default]
    Finished,
    Error,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Finished => "finished",
            JobState::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "queued" => Some(JobState::Queued),
            "finished" => Some(JobState::Finished),
            "error" => Some(JobState::Error),
            _ => None,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatusRecord {
    pub simulation_id: i64,
    pub status: JobState,
}

pub(crate) fn store_error(code: &str, err: impl ToString) -> SweepError {
    SweepError::Ingestion(ErrorInfo::new(code, err.to_string()))
}

pub fn init_schema(conn: &Connection) -> Result<(), SweepError> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
        BEGIN;
        CREATE TABLE IF NOT EXISTS meta(version INTEGER NOT NULL);
        CREATE TABLE IF NOT EXISTS simulation(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            molecular_weight REAL,
            pdi REAL,
            distribution_label TEXT,
            zero_shear_viscosity REAL,
            complex_viscosity REAL
        );
        CREATE TABLE IF NOT EXISTS dynamic(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            simulation_id INTEGER NOT NULL,
            frequency REAL NOT NULL,
            storage_modulus REAL NOT NULL,
            loss_modulus REAL NOT NULL,
            FOREIGN KEY(simulation_id) REFERENCES simulation(id)
        );
        CREATE TABLE IF NOT EXISTS relaxation(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            simulation_id INTEGER NOT NULL,
            time REAL NOT NULL,
            modulus REAL NOT NULL,
            FOREIGN KEY(simulation_id) REFERENCES simulation(id)
        );
        CREATE TABLE IF NOT EXISTS job_status(
            simulation_id INTEGER NOT NULL,
            status TEXT NOT NULL CHECK(status IN ('queued', 'finished', 'error')),
            FOREIGN KEY(simulation_id) REFERENCES simulation(id)
        );
        COMMIT;",
    )
    .map_err(|err| store_error("visc_dsr.schema", err))?;
    set_version(conn, SCHEMA_VERSION)?;
    Ok(())
}

fn set_version(conn: &Connection, version: i64) -> Result<(), SweepError> {
    let existing: Option<i64> = conn
        .query_row("SELECT version FROM meta LIMIT 1", [], |row| row.get(0))
        .optional()
        .map_err(|err| store_error("visc_dsr.schema", err))?;
    match existing {
        Some(current) if current == version => Ok(()),
        Some(current) => Err(store_error(
            "visc_dsr.schema_version",
            format!("store schema {current} incompatible with expected {version}"),
        )),
        None => {
            conn.execute("INSERT INTO meta(version) VALUES (?)", params![version])
                .map_err(|err| store_error("visc_dsr.schema", err))?;
            Ok(())
        }
    }
}

pub fn insert_simulation(
    conn: &Connection,
    molecular_weight: f64,
    pdi: Option<f64>,
    distribution_label: Option<&str>,
    zero_shear_viscosity: Option<f64>,
    complex_viscosity: Option<f64>,
) -> Result<i64, SweepError> {
    conn.execute(
        "INSERT INTO simulation(molecular_weight, pdi, distribution_label, zero_shear_viscosity, complex_viscosity) VALUES (?, ?, ?, ?, ?)",
        params![
            molecular_weight,
            pdi,
            distribution_label,
            zero_shear_viscosity,
            complex_viscosity
        ],
    )
    .map_err(|err| store_error("visc_dsr.insert_simulation", err))?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_dynamic(
    conn: &Connection,
    simulation_id: i64,
    points: &[(f64, f64, f64)],
) -> Result<(), SweepError> {
    let mut stmt = conn
        .prepare_cached(
            "INSERT INTO dynamic(simulation_id, frequency, storage_modulus, loss_modulus) VALUES (?, ?, ?, ?)",
        )
        .map_err(|err| store_error("visc_dsr.insert_dynamic", err))?;
    for (frequency, storage, loss) in points {
        stmt.execute(params![simulation_id, frequency, storage, loss])
            .map_err(|err| store_error("visc_dsr.insert_dynamic", err))?;
    }
    Ok(())
}

pub fn insert_relaxation(
    conn: &Connection,
    simulation_id: i64,
    points: &[(f64, f64)],
) -> Result<(), SweepError> {
    let mut stmt = conn
        .prepare_cached("INSERT INTO relaxation(simulation_id, time, modulus) VALUES (?, ?, ?)")
        .map_err(|err| store_error("visc_dsr.insert_relaxation", err))?;
    for (time, modulus) in points {
        stmt.execute(params![simulation_id, time, modulus])
            .map_err(|err| store_error("visc_dsr.insert_relaxation", err))?;
    }
    Ok(())
}

pub fn insert_job_status(
    conn: &Connection,
    simulation_id: i64,
    status: JobState,
) -> Result<(), SweepError> {
    conn.execute(
        "INSERT INTO job_status(simulation_id, status) VALUES (?, ?)",
        params![simulation_id, status.as_str()],
    )
    .map_err(|err| store_error("visc_dsr.insert_job_status", err))?;
    Ok(())
}

/// Simulations ordered by molecular weight, then id.
pub fn load_simulations(conn: &Connection) -> Result<Vec<SimulationRecord>, SweepError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, molecular_weight, pdi, distribution_label, zero_shear_viscosity, complex_viscosity FROM simulation ORDER BY molecular_weight ASC, id ASC",
        )
        .map_err(|err| store_error("visc_dsr.query", err))?;
    let rows = stmt
        .query_map([], |row| {
            Ok(SimulationRecord {
                id: row.get(0)?,
                molecular_weight: row.get(1)?,
                pdi: row.get(2)?,
                distribution_label: row.get(3)?,
                zero_shear_viscosity: row.get(4)?,
                complex_viscosity: row.get(5)?,
            })
        })
        .map_err(|err| store_error("visc_dsr.query", err))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|err| store_error("visc_dsr.query", err))
}

pub fn load_dynamic(conn: &Connection) -> Result<Vec<DynamicPoint>, SweepError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, simulation_id, frequency, storage_modulus, loss_modulus FROM dynamic ORDER BY simulation_id ASC, frequency ASC, id ASC",
        )
        .map_err(|err| store_error("visc_dsr.query", err))?;
    let rows = stmt
        .query_map([], |row| {
            Ok(DynamicPoint {
                id: row.get(0)?,
                simulation_id: row.get(1)?,
                frequency: row.get(2)?,
                storage_modulus: row.get(3)?,
                loss_modulus: row.get(4)?,
            })
        })
        .map_err(|err| store_error("visc_dsr.query", err))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|err| store_error("visc_dsr.query", err))
}

pub fn load_relaxation(conn: &Connection) -> Result<Vec<RelaxationPoint>, SweepError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, simulation_id, time, modulus FROM relaxation ORDER BY simulation_id ASC, time ASC, id ASC",
        )
        .map_err(|err| store_error("visc_dsr.query", err))?;
    let rows = stmt
        .query_map([], |row| {
            Ok(RelaxationPoint {
                id: row.get(0)?,
                simulation_id: row.get(1)?,
                time: row.get(2)?,
                modulus: row.get(3)?,
            })
        })
        .map_err(|err| store_error("visc_dsr.query", err))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|err| store_error("visc_dsr.query", err))
}

pub fn load_job_status(conn: &Connection) -> Result<Vec<JobStatusRecord>, SweepError> {
    let mut stmt = conn
        .prepare("SELECT simulation_id, status FROM job_status ORDER BY simulation_id ASC")
        .map_err(|err| store_error("visc_dsr.query", err))?;
    let rows = stmt
        .query_map([], |row| {
            let simulation_id: i64 = row.get(0)?;
            let status: String = row.get(1)?;
            Ok((simulation_id, status))
        })
        .map_err(|err| store_error("visc_dsr.query", err))?;
    let mut records = Vec::new();
    for row in rows {
        let (simulation_id, status) = row.map_err(|err| store_error("visc_dsr.query", err))?;
        let status = JobState::parse(&status).ok_or_else(|| {
            store_error("visc_dsr.job_status", format!("unknown job status '{status}'"))
        })?;
        records.push(JobStatusRecord {
            simulation_id,
            status,
        });
    }
    Ok(records)
}
