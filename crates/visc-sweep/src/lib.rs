//! Remote parameter sweeps for the BoB solver.
//!
//! A sweep expands the configured grid, prepares one run directory per
//! combination, dispatches the solver directly or through the batch queue,
//! waits for completion and mirrors the run trees back to this host.

pub mod collect;
pub mod config;
pub mod dispatch;
pub mod environment;
pub mod grid;
pub mod manifest;
pub mod materialize;
pub mod publish;
pub mod report;
pub mod retry;
pub mod sweep;
pub mod watch;

pub use collect::{collect_runs, CollectOptions, CollectReport};
pub use config::{
    BatchResources, DispatchStrategy, EnvironmentSettings, LocalSettings, SolverSettings,
    SweepConfig, WatchSettings,
};
pub use dispatch::{DispatchHandle, DispatchMode, DispatchRecord, DispatchStatus};
pub use grid::{expand, GridSpec};
pub use manifest::{ManifestEntry, QueueManifest, MANIFEST_FILE};
pub use publish::{publish_outputs, PublishPlan};
pub use report::{write_report, SweepReport};
pub use retry::{wait_for, Probe, RetryPolicy, WaitOutcome};
pub use sweep::{resume_batch, run_sweep, settle_batch};
