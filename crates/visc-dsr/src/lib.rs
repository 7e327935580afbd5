//! Result store for BoB sweeps: ingestion of run directories into SQLite,
//! filtered queries and CSV exports.

pub mod export;
pub mod ingest;
pub mod metadata;
pub mod parse;
pub mod query;
pub mod schema;

pub use export::{
    export_json, export_store, export_store_file, run_dir_name, ExportManifest, ExportOptions,
};
pub use ingest::{discover_runs, ingest_tree, AcceptedRun, IngestOptions, IngestReport};
pub use metadata::{default_chain, parse_summary, resolve_metadata, MetadataSource, RunMetadata};
pub use query::{QueryParams, StoreQuery};
pub use schema::{
    init_schema, DynamicPoint, JobState, JobStatusRecord, RelaxationPoint, SimulationRecord,
};
