use std::collections::BTreeSet;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use visc_core::SweepError;

use crate::schema::{
    load_dynamic, load_job_status, load_relaxation, load_simulations, store_error, DynamicPoint,
    JobState, JobStatusRecord, RelaxationPoint, SimulationRecord,
};

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryParams {
    #[serde(default)]
    pub distribution_label: Option<String>,
    #[serde(default)]
    pub min_molecular_weight: Option<f64>,
    #[serde(default)]
    pub max_molecular_weight: Option<f64>,
    #[serde(default)]
    pub status: Option<JobState>,
}

impl QueryParams {
    fn accepts(&self, simulation: &SimulationRecord, status: Option<JobState>) -> bool {
        if let Some(label) = &self.distribution_label {
            if simulation.distribution_label.as_deref() != Some(label.as_str()) {
                return false;
            }
        }
        let mw = simulation.molecular_weight;
        if let Some(min) = self.min_molecular_weight {
            if mw.map_or(true, |mw| mw < min) {
                return false;
            }
        }
        if let Some(max) = self.max_molecular_weight {
            if mw.map_or(true, |mw| mw > max) {
                return false;
            }
        }
        match self.status {
            Some(wanted) => status == Some(wanted),
            None => true,
        }
    }
}

/// Store contents with children restricted to the selected simulations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreQuery {
    pub simulations: Vec<SimulationRecord>,
    pub dynamic: Vec<DynamicPoint>,
    pub relaxation: Vec<RelaxationPoint>,
    pub job_status: Vec<JobStatusRecord>,
}

impl StoreQuery {
    pub fn load(conn: &Connection) -> Result<Self, SweepError> {
        Self::execute(conn, &QueryParams::default())
    }

    pub fn execute(conn: &Connection, params: &QueryParams) -> Result<Self, SweepError> {
        let job_status = load_job_status(conn)?;
        let status_of = |id: i64| {
            job_status
                .iter()
                .find(|record| record.simulation_id == id)
                .map(|record| record.status)
        };
        let simulations: Vec<SimulationRecord> = load_simulations(conn)?
            .into_iter()
            .filter(|simulation| params.accepts(simulation, status_of(simulation.id)))
            .collect();
        let selected: BTreeSet<i64> = simulations.iter().map(|s| s.id).collect();
        let dynamic = load_dynamic(conn)?
            .into_iter()
            .filter(|point| selected.contains(&point.simulation_id))
            .collect();
        let relaxation = load_relaxation(conn)?
            .into_iter()
            .filter(|point| selected.contains(&point.simulation_id))
            .collect();
        let job_status = job_status
            .iter()
            .filter(|record| selected.contains(&record.simulation_id))
            .cloned()
            .collect();
        Ok(Self {
            simulations,
            dynamic,
            relaxation,
            job_status,
        })
    }

    pub fn simulation(&self, id: i64) -> Option<&SimulationRecord> {
        self.simulations.iter().find(|simulation| simulation.id == id)
    }

    /// Every child row must reference a loaded simulation.
    pub fn ensure_referential(&self) -> Result<(), SweepError> {
        let ids: BTreeSet<i64> = self.simulations.iter().map(|s| s.id).collect();
        let orphan = self
            .dynamic
            .iter()
            .map(|p| p.simulation_id)
            .chain(self.relaxation.iter().map(|p| p.simulation_id))
            .chain(self.job_status.iter().map(|r| r.simulation_id))
            .find(|id| !ids.contains(id));
        match orphan {
            Some(id) => Err(store_error(
                "visc_dsr.orphan",
                format!("child row references missing simulation {id}"),
            )),
            None => Ok(()),
        }
    }
}
