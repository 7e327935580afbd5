use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use visc_core::{
    io_error, rewrite_candidate, ErrorInfo, Issue, IssueKind, ParameterCombination, SweepError,
};
use visc_remote::{remote_join, shell_quote, RemoteSession};

use crate::config::SweepConfig;

/// Name every run directory uses for the run-time configuration.
pub const RUN_CONFIG_FILE: &str = "bob.rc";

/// Where `bob.rc` comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunConfigSource {
    Upload(PathBuf),
    Fetch(String),
}

/// Local inputs shared by every combination, read once per sweep.
#[derive(Debug, Clone)]
pub struct RunInputs {
    pub template_name: String,
    pub template_text: String,
    pub polymer_config: Option<PathBuf>,
    pub run_config: RunConfigSource,
}

impl RunInputs {
    pub fn from_config(config: &SweepConfig) -> Result<Self, SweepError> {
        let template_name = config.template_name()?;
        let template_text = read_local(&config.template_input, "template_read")?;
        if let Some(polymer) = &config.polymer_config {
            if !polymer.is_file() {
                return Err(SweepError::Config(
                    ErrorInfo::new("polymer_config", "polymer configuration not found")
                        .with_context("path", polymer.display().to_string()),
                ));
            }
        }
        let run_config = match &config.run_config {
            Some(path) if path.is_file() => RunConfigSource::Upload(path.clone()),
            Some(path) => {
                return Err(SweepError::Config(
                    ErrorInfo::new("run_config", "bob.rc not found")
                        .with_context("path", path.display().to_string())
                        .with_hint("remove run_config to fetch the published default"),
                ))
            }
            None => RunConfigSource::Fetch(config.run_config_url.clone()),
        };
        Ok(Self {
            template_name,
            template_text,
            polymer_config: config.polymer_config.clone(),
            run_config,
        })
    }

    pub fn polymer_name(&self) -> Option<String> {
        self.polymer_config
            .as_deref()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned())
    }
}

fn read_local(path: &Path, code: &str) -> Result<String, SweepError> {
    fs::read_to_string(path)
        .map_err(|err| io_error(code, err).with_context("path", path.display().to_string()))
}

/// A prepared run directory.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterializedRun {
    pub combination: ParameterCombination,
    pub dir_name: String,
    pub run_dir: String,
    pub input_name: String,
    pub polymer_name: Option<String>,
    pub issues: Vec<Issue>,
}

/// Session failures become materialization errors; a lost session stays a
/// connectivity error.
fn escalate(err: SweepError, step: &str, run: &str) -> SweepError {
    let err = match err {
        SweepError::Connectivity(_) => err,
        other => SweepError::Materialization(other.info().clone()),
    };
    err.with_context("step", step).with_context("run", run)
}

/// Creates the run directory and places the rewritten input, the polymer
/// configuration and `bob.rc` in it.
pub fn materialize<S: RemoteSession + ?Sized>(
    session: &S,
    working_dir: &str,
    combination: &ParameterCombination,
    inputs: &RunInputs,
) -> Result<MaterializedRun, SweepError> {
    let dir_name = combination.dir_name();
    let run_dir = remote_join(working_dir, &dir_name);
    let mut issues = Vec::new();

    session
        .ensure_dir(&run_dir)
        .map_err(|err| escalate(err, "ensure_dir", &dir_name))?;

    let rewrite = rewrite_candidate(
        &inputs.template_text,
        combination.molecular_weight,
        combination.distribution_code,
        combination.polydispersity,
    );
    if rewrite.line_index.is_none() {
        issues.push(Issue::for_run(
            IssueKind::InputRewrite,
            &dir_name,
            "no (distribution, Mw, PDI) line after the header; input uploaded unmodified",
        ));
    }
    let input_name = combination.input_file_name(&inputs.template_name);
    session
        .write_file(
            &remote_join(&run_dir, &input_name),
            rewrite.text.as_bytes(),
            None,
        )
        .map_err(|err| escalate(err, "upload_input", &dir_name))?;
    debug!(run = %dir_name, input = %input_name, "input uploaded");

    let polymer_name = inputs.polymer_name();
    if let (Some(local), Some(name)) = (&inputs.polymer_config, &polymer_name) {
        session
            .upload(local, &remote_join(&run_dir, name))
            .map_err(|err| escalate(err, "upload_polymer", &dir_name))?;
    }

    let rc_path = remote_join(&run_dir, RUN_CONFIG_FILE);
    match &inputs.run_config {
        RunConfigSource::Upload(local) => session
            .upload(local, &rc_path)
            .map_err(|err| escalate(err, "upload_run_config", &dir_name))?,
        RunConfigSource::Fetch(url) => {
            let command = format!("wget -q {} -O {}", shell_quote(url), shell_quote(&rc_path));
            let output = session
                .exec(&command)
                .map_err(|err| escalate(err, "fetch_run_config", &dir_name))?;
            if !output.success() {
                return Err(SweepError::Materialization(
                    ErrorInfo::new("fetch_run_config", output.diagnostic())
                        .with_context("run", dir_name.as_str())
                        .with_context("exit_code", output.exit_code.to_string()),
                ));
            }
        }
    }

    info!(run = %dir_name, "run directory prepared");
    Ok(MaterializedRun {
        combination: *combination,
        dir_name,
        run_dir,
        input_name,
        polymer_name,
        issues,
    })
}
