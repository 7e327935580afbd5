//! Queue manifest shared by every batch sweep in a working directory.

use std::collections::BTreeSet;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;
use visc_core::{from_json_slice, to_canonical_json_bytes, ParameterCombination, SweepError};
use visc_remote::{remote_join, RemoteSession};

/// File name of the manifest at the working directory root.
pub const MANIFEST_FILE: &str = "queue_manifest.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub job_id: String,
    pub run: String,
    pub combination: ParameterCombination,
    pub submitted_at: String,
}

impl ManifestEntry {
    pub fn new(job_id: impl Into<String>, run: impl Into<String>, combination: ParameterCombination) -> Self {
        Self {
            job_id: job_id.into(),
            run: run.into(),
            combination,
            submitted_at: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueueManifest {
    #[serde(default)]
    pub entries: Vec<ManifestEntry>,
}

impl QueueManifest {
    pub fn path(working_dir: &str) -> String {
        remote_join(working_dir, MANIFEST_FILE)
    }

    /// Reads the manifest; a missing file is an empty manifest.
    pub fn load<S: RemoteSession + ?Sized>(
        session: &S,
        working_dir: &str,
    ) -> Result<Self, SweepError> {
        let path = Self::path(working_dir);
        if !session.exists(&path)? {
            return Ok(Self::default());
        }
        let bytes = session.read_file(&path)?;
        from_json_slice(&bytes)
    }

    pub fn store<S: RemoteSession + ?Sized>(
        &self,
        session: &S,
        working_dir: &str,
    ) -> Result<(), SweepError> {
        let bytes = to_canonical_json_bytes(self)?;
        session.write_file(&Self::path(working_dir), &bytes, None)
    }

    /// Adds an entry, replacing any earlier entry with the same job id.
    pub fn record(&mut self, entry: ManifestEntry) {
        self.entries.retain(|existing| existing.job_id != entry.job_id);
        self.entries.push(entry);
    }

    pub fn job_ids(&self) -> BTreeSet<String> {
        self.entries.iter().map(|entry| entry.job_id.clone()).collect()
    }

    pub fn entry_for_run(&self, run: &str) -> Option<&ManifestEntry> {
        self.entries.iter().rev().find(|entry| entry.run == run)
    }
}

/// Loads the manifest, records `entry` and writes it back.
pub fn append_entry<S: RemoteSession + ?Sized>(
    session: &S,
    working_dir: &str,
    entry: ManifestEntry,
) -> Result<(), SweepError> {
    let mut manifest = QueueManifest::load(session, working_dir)?;
    debug!(job = %entry.job_id, run = %entry.run, "recording job in manifest");
    manifest.record(entry);
    manifest.store(session, working_dir)
}
