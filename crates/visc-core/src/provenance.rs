//! Provenance descriptors attached to persisted reports.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Provenance information attached to every serialized report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RunProvenance {
    /// Hash of the configuration that produced the report.
    pub config_hash: String,
    /// RFC 3339 timestamp recording when the report was generated.
    pub created_at: String,
    /// Version map for all tools involved in the run.
    pub tool_versions: BTreeMap<String, String>,
}

impl RunProvenance {
    /// Stamps the current time and this crate's version.
    pub fn now(config_hash: impl Into<String>) -> Self {
        let mut tool_versions = BTreeMap::new();
        tool_versions.insert("visc".to_string(), env!("CARGO_PKG_VERSION").to_string());
        Self {
            config_hash: config_hash.into(),
            created_at: Utc::now().to_rfc3339(),
            tool_versions,
        }
    }

    pub fn with_tool(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.tool_versions.insert(name.into(), version.into());
        self
    }
}
