use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use visc_core::{io_error, ErrorInfo, SweepError};
use visc_remote::SshTarget;

use crate::grid::GridSpec;
use crate::retry::RetryPolicy;

/// Run configuration published with the solver releases.
pub const DEFAULT_RUN_CONFIG_URL: &str =
    "https://sourceforge.net/projects/bob-rheology/files/bob-rheology/bob2.5/bob.rc";

/// Everything a sweep needs, passed explicitly to every phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Compute host. Sweeps run on this machine when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<SshTarget>,
    /// Remote directory holding one subdirectory per combination.
    pub working_dir: String,
    /// Local solver input used as the template for every combination.
    pub template_input: PathBuf,
    /// Optional polymer configuration passed to the solver with `-c`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polymer_config: Option<PathBuf>,
    /// Local `bob.rc`; fetched from `run_config_url` on the host when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_config: Option<PathBuf>,
    #[serde(default = "default_run_config_url")]
    pub run_config_url: String,
    #[serde(default)]
    pub solver: SolverSettings,
    #[serde(default)]
    pub environment: EnvironmentSettings,
    pub grid: GridSpec,
    #[serde(default)]
    pub dispatch: DispatchStrategy,
    #[serde(default)]
    pub watch: WatchSettings,
    #[serde(default)]
    pub local: LocalSettings,
}

fn default_run_config_url() -> String {
    DEFAULT_RUN_CONFIG_URL.to_string()
}

/// Solver executable and invocation flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverSettings {
    #[serde(default = "SolverSettings::default_executable")]
    pub executable: String,
    /// Pass `-b` so the solver reads its defaults without prompting.
    #[serde(default)]
    pub batch_defaults: bool,
    /// Pass `-p` to only generate polymers.
    #[serde(default)]
    pub generate_polymers: bool,
    /// Additional tokens appended to the invocation.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl SolverSettings {
    fn default_executable() -> String {
        "bob2p5".to_string()
    }
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            executable: Self::default_executable(),
            batch_defaults: false,
            generate_polymers: false,
            extra_args: Vec::new(),
        }
    }
}

/// Conda environment activated before the solver runs.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EnvironmentSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conda_env: Option<String>,
    /// Explicit `conda.sh`; discovered from `~/.bashrc` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conda_sh: Option<String>,
}

/// How runs reach the solver, chosen once per sweep.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum DispatchStrategy {
    /// Run the solver synchronously over the session.
    #[default]
    Direct,
    /// Submit one batch script per combination.
    Batch(BatchResources),
}

impl DispatchStrategy {
    pub fn is_batch(&self) -> bool {
        matches!(self, DispatchStrategy::Batch(_))
    }
}

/// Batch-queue resource directives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResources {
    #[serde(default)]
    pub partition: String,
    #[serde(default = "BatchResources::default_count")]
    pub nodes: u32,
    #[serde(default = "BatchResources::default_count")]
    pub cpus_per_task: u32,
    #[serde(default = "BatchResources::default_mem")]
    pub mem_per_cpu: String,
    /// Job name prefix; the combination suffix is appended.
    #[serde(default = "BatchResources::default_job_name")]
    pub job_name: String,
}

impl BatchResources {
    const fn default_count() -> u32 {
        1
    }

    fn default_mem() -> String {
        "1G".to_string()
    }

    fn default_job_name() -> String {
        "BoBjob".to_string()
    }
}

impl Default for BatchResources {
    fn default() -> Self {
        Self {
            partition: String::new(),
            nodes: Self::default_count(),
            cpus_per_task: Self::default_count(),
            mem_per_cpu: Self::default_mem(),
            job_name: Self::default_job_name(),
        }
    }
}

/// Polling limits for artifact waits and queue drains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchSettings {
    #[serde(default = "WatchSettings::default_artifact_attempts")]
    pub artifact_attempts: u32,
    #[serde(default = "WatchSettings::default_artifact_backoff")]
    pub artifact_backoff_secs: f64,
    #[serde(default = "WatchSettings::default_queue_poll")]
    pub queue_poll_secs: f64,
    #[serde(default = "WatchSettings::default_queue_timeout")]
    pub queue_timeout_secs: f64,
}

impl WatchSettings {
    const fn default_artifact_attempts() -> u32 {
        6
    }

    const fn default_artifact_backoff() -> f64 {
        1.0
    }

    const fn default_queue_poll() -> f64 {
        30.0
    }

    const fn default_queue_timeout() -> f64 {
        6.0 * 3600.0
    }

    pub fn artifact_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.artifact_attempts, secs(self.artifact_backoff_secs))
    }

    /// Unbounded attempt count; the wall-clock timeout ends the drain.
    pub fn queue_policy(&self) -> RetryPolicy {
        RetryPolicy::new(u32::MAX, secs(self.queue_poll_secs))
            .with_timeout(secs(self.queue_timeout_secs))
    }
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            artifact_attempts: Self::default_artifact_attempts(),
            artifact_backoff_secs: Self::default_artifact_backoff(),
            queue_poll_secs: Self::default_queue_poll(),
            queue_timeout_secs: Self::default_queue_timeout(),
        }
    }
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

/// Where collected runs, the store and exports are placed on this host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalSettings {
    #[serde(default = "LocalSettings::default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "LocalSettings::default_store_name")]
    pub store_name: String,
    #[serde(default = "LocalSettings::default_export_dir")]
    pub export_dir: PathBuf,
    /// Upload the store and exports back to the working directory.
    #[serde(default = "LocalSettings::default_publish")]
    pub publish: bool,
}

impl LocalSettings {
    fn default_output_dir() -> PathBuf {
        PathBuf::from("results")
    }

    fn default_store_name() -> String {
        "simulations.db".to_string()
    }

    fn default_export_dir() -> PathBuf {
        PathBuf::from("results/exports")
    }

    const fn default_publish() -> bool {
        true
    }

    pub fn store_path(&self) -> PathBuf {
        self.output_dir.join(&self.store_name)
    }
}

impl Default for LocalSettings {
    fn default() -> Self {
        Self {
            output_dir: Self::default_output_dir(),
            store_name: Self::default_store_name(),
            export_dir: Self::default_export_dir(),
            publish: Self::default_publish(),
        }
    }
}

fn config_error(code: &str, message: impl Into<String>) -> SweepError {
    SweepError::Config(ErrorInfo::new(code, message))
}

impl SweepConfig {
    /// Loads and validates a YAML configuration file.
    pub fn load(path: &Path) -> Result<Self, SweepError> {
        let text = fs::read_to_string(path).map_err(|err| {
            io_error("config_read", err).with_context("path", path.display().to_string())
        })?;
        let config: SweepConfig = serde_yaml::from_str(&text).map_err(|err| {
            SweepError::Serde(
                ErrorInfo::new("config_parse", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SweepError> {
        if self.working_dir.trim().is_empty() {
            return Err(config_error("working_dir", "working directory is empty"));
        }
        if self.solver.executable.trim().is_empty() {
            return Err(config_error("solver_executable", "solver executable is empty"));
        }
        self.grid.validate()?;
        crate::dispatch::validate_solver_args(&self.solver.extra_args)?;
        if let DispatchStrategy::Batch(resources) = &self.dispatch {
            if resources.nodes == 0 || resources.cpus_per_task == 0 {
                return Err(config_error(
                    "batch_resources",
                    "nodes and cpus_per_task must be at least 1",
                ));
            }
            if !valid_memory_spec(&resources.mem_per_cpu) {
                return Err(SweepError::Config(
                    ErrorInfo::new(
                        "batch_memory",
                        format!("invalid mem_per_cpu '{}'", resources.mem_per_cpu),
                    )
                    .with_hint("use an integer with an optional K, M, G or T suffix"),
                ));
            }
            if resources.job_name.chars().any(char::is_whitespace) {
                return Err(config_error("batch_job_name", "job name contains whitespace"));
            }
        }
        let watch = &self.watch;
        for (name, value) in [
            ("artifact_backoff_secs", watch.artifact_backoff_secs),
            ("queue_poll_secs", watch.queue_poll_secs),
            ("queue_timeout_secs", watch.queue_timeout_secs),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(config_error("watch", format!("{name} must be a non-negative number")));
            }
        }
        if watch.artifact_attempts == 0 {
            return Err(config_error("watch", "artifact_attempts must be at least 1"));
        }
        Ok(())
    }

    /// File name of the template input as uploaded.
    pub fn template_name(&self) -> Result<String, SweepError> {
        self.template_input
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| config_error("template_input", "template input has no file name"))
    }
}

fn valid_memory_spec(spec: &str) -> bool {
    let digits = spec
        .strip_suffix(|c: char| matches!(c.to_ascii_uppercase(), 'K' | 'M' | 'G' | 'T'))
        .unwrap_or(spec);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}
