use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use visc_core::{ErrorInfo, ParameterCombination, SweepError};
use visc_remote::{remote_join, shell_quote, CommandOutput, RemoteSession};

use crate::config::{BatchResources, SolverSettings};
use crate::environment::Activation;
use crate::materialize::MaterializedRun;

/// Flags the solver accepts.
pub const SOLVER_FLAGS: [&str; 4] = ["-i", "-c", "-b", "-p"];

const SUBMISSION_PREFIX: &str = "Submitted batch job";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DispatchMode {
    Direct,
    Batch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DispatchStatus {
    Pending,
    Submitted,
    Running,
    Succeeded,
    Failed,
}

impl DispatchStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, DispatchStatus::Succeeded | DispatchStatus::Failed)
    }

    fn allows(self, next: DispatchStatus) -> bool {
        use DispatchStatus::*;
        matches!(
            (self, next),
            (Pending, Submitted)
                | (Pending, Failed)
                | (Submitted, Running)
                | (Submitted, Succeeded)
                | (Submitted, Failed)
                | (Running, Succeeded)
                | (Running, Failed)
        )
    }
}

/// Exit code for direct runs, queue identifier for batch jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DispatchHandle {
    ExitCode(i32),
    JobId(String),
}

/// Dispatch state of one combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchRecord {
    pub run: String,
    pub combination: ParameterCombination,
    pub mode: DispatchMode,
    pub status: DispatchStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<DispatchHandle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Whether molar-mass distribution output (`gpcls*`) was found.
    #[serde(default)]
    pub distribution_output: bool,
}

impl DispatchRecord {
    pub fn new(run: impl Into<String>, combination: ParameterCombination, mode: DispatchMode) -> Self {
        Self {
            run: run.into(),
            combination,
            mode,
            status: DispatchStatus::Pending,
            handle: None,
            message: None,
            distribution_output: false,
        }
    }

    /// Moves to `next`. Terminal records and backwards moves are rejected.
    pub fn transition(
        &mut self,
        next: DispatchStatus,
        message: Option<String>,
    ) -> Result<(), SweepError> {
        if self.status.is_terminal() {
            return Err(SweepError::Dispatch(
                ErrorInfo::new(
                    "dispatch_terminal",
                    format!("already {:?}, cannot move to {:?}", self.status, next),
                )
                .with_context("run", self.run.as_str()),
            ));
        }
        if !self.status.allows(next) {
            return Err(SweepError::Dispatch(
                ErrorInfo::new(
                    "dispatch_transition",
                    format!("cannot move from {:?} to {:?}", self.status, next),
                )
                .with_context("run", self.run.as_str()),
            ));
        }
        self.status = next;
        if message.is_some() {
            self.message = message;
        }
        Ok(())
    }

    pub fn job_id(&self) -> Option<&str> {
        match &self.handle {
            Some(DispatchHandle::JobId(id)) => Some(id),
            _ => None,
        }
    }
}

/// Rejects any flag-like token the solver does not understand.
pub fn validate_solver_args(tokens: &[String]) -> Result<(), SweepError> {
    for token in tokens {
        if token.starts_with('-') && !SOLVER_FLAGS.contains(&token.as_str()) {
            return Err(SweepError::Dispatch(
                ErrorInfo::new("solver_flag", format!("unsupported solver flag '{token}'"))
                    .with_hint("the solver accepts -i, -c, -b and -p"),
            ));
        }
    }
    Ok(())
}

/// Builds `<solver> -i <input> [-c <polymer>] [-b] [-p] [extra...]`.
pub fn solver_invocation(
    solver: &SolverSettings,
    input_name: &str,
    polymer_name: Option<&str>,
) -> Result<String, SweepError> {
    let mut tokens = vec!["-i".to_string(), input_name.to_string()];
    if let Some(polymer) = polymer_name {
        tokens.push("-c".to_string());
        tokens.push(polymer.to_string());
    }
    if solver.batch_defaults {
        tokens.push("-b".to_string());
    }
    if solver.generate_polymers {
        tokens.push("-p".to_string());
    }
    tokens.extend(solver.extra_args.iter().cloned());
    validate_solver_args(&tokens)?;

    let mut command = solver.executable.clone();
    for token in tokens {
        command.push(' ');
        if SOLVER_FLAGS.contains(&token.as_str()) {
            command.push_str(&token);
        } else {
            command.push_str(&shell_quote(&token));
        }
    }
    Ok(command)
}

/// `bash -lc '<cd> && <activation> && <solver>'`.
pub fn direct_command(run_dir: &str, activation: &Activation, invocation: &str) -> String {
    let mut script = format!("cd {}", shell_quote(run_dir));
    if let Some(chain) = activation.chained() {
        script.push_str(" && ");
        script.push_str(&chain);
    }
    script.push_str(" && ");
    script.push_str(invocation);
    format!("bash -lc {}", shell_quote(&script))
}

/// Runs the solver synchronously; the exit code is authoritative.
pub fn run_direct<S: RemoteSession + ?Sized>(
    session: &S,
    run: &MaterializedRun,
    activation: &Activation,
    invocation: &str,
) -> Result<CommandOutput, SweepError> {
    let command = direct_command(&run.run_dir, activation, invocation);
    info!(run = %run.dir_name, "running solver");
    session.exec(&command).map_err(|err| match err {
        SweepError::Connectivity(_) => err,
        other => SweepError::Dispatch(other.info().clone()),
    })
}

pub fn batch_script_name(combination: &ParameterCombination) -> String {
    format!("run_{}.sh", combination.job_suffix())
}

pub fn batch_job_name(resources: &BatchResources, combination: &ParameterCombination) -> String {
    format!("{}_{}", resources.job_name, combination.job_suffix())
}

/// Renders the batch script for one run directory.
pub fn render_batch_script(
    combination: &ParameterCombination,
    resources: &BatchResources,
    activation: &Activation,
    invocation: &str,
) -> String {
    let mut lines = vec!["#!/bin/bash -l".to_string()];
    let partition = resources.partition.trim();
    if !partition.is_empty() {
        lines.push(format!("#SBATCH --partition={partition}"));
    }
    // sbatch is issued from the run directory, so log paths stay relative to it
    lines.extend([
        format!("#SBATCH --nodes={}", resources.nodes),
        format!("#SBATCH --cpus-per-task={}", resources.cpus_per_task),
        format!("#SBATCH --mem-per-cpu={}", resources.mem_per_cpu),
        format!("#SBATCH --job-name={}", batch_job_name(resources, combination)),
        "#SBATCH --output=slurm-%j.out".to_string(),
        "#SBATCH --error=slurm-%j.err".to_string(),
        String::new(),
        "set -euo pipefail".to_string(),
        String::new(),
        "cd \"${SLURM_SUBMIT_DIR:-.}\"".to_string(),
    ]);
    if !activation.is_empty() {
        // conda's hook scripts reference unset variables
        lines.push("set +u".to_string());
        lines.extend(activation.commands().iter().cloned());
        lines.push("set -u".to_string());
    }
    lines.push(invocation.to_string());
    let mut script = lines.join("\n");
    script.push('\n');
    script
}

/// Extracts the job id from the queue's acceptance line.
pub fn parse_submission(stdout: &str) -> Option<String> {
    stdout.lines().find_map(|line| {
        let rest = line.trim().strip_prefix(SUBMISSION_PREFIX)?;
        let id: String = rest
            .trim()
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
            .collect();
        (!id.is_empty()).then_some(id)
    })
}

/// Uploads the script with mode 0750 and submits it from the run directory.
pub fn submit_batch<S: RemoteSession + ?Sized>(
    session: &S,
    run: &MaterializedRun,
    script_name: &str,
    script: &str,
) -> Result<String, SweepError> {
    let to_dispatch = |err: SweepError| match err {
        SweepError::Connectivity(_) => err,
        other => SweepError::Dispatch(other.info().clone()),
    };
    session
        .write_file(
            &remote_join(&run.run_dir, script_name),
            script.as_bytes(),
            Some(0o750),
        )
        .map_err(to_dispatch)?;
    let command = format!(
        "cd {} && sbatch {}",
        shell_quote(&run.run_dir),
        shell_quote(script_name)
    );
    let output = session.exec(&command).map_err(to_dispatch)?;
    debug!(run = %run.dir_name, stdout = %output.stdout.trim(), "sbatch");
    if !output.success() {
        return Err(SweepError::Dispatch(
            ErrorInfo::new("sbatch", output.diagnostic())
                .with_context("run", run.dir_name.as_str())
                .with_context("exit_code", output.exit_code.to_string()),
        ));
    }
    parse_submission(&output.stdout).ok_or_else(|| {
        SweepError::Dispatch(
            ErrorInfo::new("sbatch_output", "no job id in submission output")
                .with_context("run", run.dir_name.as_str())
                .with_context("stdout", output.stdout.trim()),
        )
    })
}
