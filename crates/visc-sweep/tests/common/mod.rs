#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use visc_core::SweepError;
use visc_remote::{CommandOutput, LocalSession, RemoteEntry, RemoteSession};
use visc_sweep::{DispatchStrategy, EnvironmentSettings, GridSpec, SweepConfig, WatchSettings};

pub const WORKING_DIR: &str = "work";

pub const TEMPLATE: &str = "BoB input\nversion 2.5\n0.001 1.0e6\n1.0 1.0\n2\n0 50000.0 1.1\n1 1\n";

/// What one run directory does when the solver is started in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Behaviour {
    pub exit_code: i32,
    pub relaxation: bool,
    pub dynamic: bool,
    pub distribution: bool,
    /// Number of queue polls a batch job stays listed for.
    pub queued_polls: u32,
}

impl Behaviour {
    pub fn complete() -> Self {
        Self {
            exit_code: 0,
            relaxation: true,
            dynamic: true,
            distribution: false,
            queued_polls: 1,
        }
    }

    pub fn without_dynamic(mut self) -> Self {
        self.dynamic = false;
        self
    }

    pub fn with_distribution(mut self) -> Self {
        self.distribution = true;
        self
    }

    pub fn exiting(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    pub fn queued_for(mut self, polls: u32) -> Self {
        self.queued_polls = polls;
        self
    }
}

/// A [`LocalSession`] whose solver, queue, download and conda commands are
/// answered in-process.
pub struct FakeCluster {
    pub root: PathBuf,
    inner: LocalSession,
    behaviours: BTreeMap<String, Behaviour>,
    default_behaviour: Behaviour,
    /// Run directories whose `bob.rc` download fails.
    pub failing_fetch: Vec<String>,
    pub commands: RefCell<Vec<String>>,
    queue: RefCell<BTreeMap<String, u32>>,
    next_job: Cell<u32>,
    pub queue_polls: Cell<u32>,
    pub revalidations: u32,
}

impl FakeCluster {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            inner: LocalSession::rooted(root),
            behaviours: BTreeMap::new(),
            default_behaviour: Behaviour::complete(),
            failing_fetch: Vec::new(),
            commands: RefCell::new(Vec::new()),
            queue: RefCell::new(BTreeMap::new()),
            next_job: Cell::new(1000),
            queue_polls: Cell::new(0),
            revalidations: 0,
        }
    }

    pub fn behave(mut self, dir_name: &str, behaviour: Behaviour) -> Self {
        self.behaviours.insert(dir_name.to_string(), behaviour);
        self
    }

    pub fn behave_by_default(mut self, behaviour: Behaviour) -> Self {
        self.default_behaviour = behaviour;
        self
    }

    pub fn run_path(&self, dir_name: &str) -> PathBuf {
        self.root.join(WORKING_DIR).join(dir_name)
    }

    pub fn commands_containing(&self, needle: &str) -> Vec<String> {
        self.commands
            .borrow()
            .iter()
            .filter(|command| command.contains(needle))
            .cloned()
            .collect()
    }

    fn behaviour(&self, dir_name: &str) -> Behaviour {
        self.behaviours
            .get(dir_name)
            .copied()
            .unwrap_or(self.default_behaviour)
    }

    fn produce_artifacts(&self, dir_name: &str, behaviour: Behaviour) {
        let dir = self.run_path(dir_name);
        fs::create_dir_all(&dir).expect("run dir");
        if behaviour.relaxation {
            fs::write(dir.join("gt.dat"), "0.1 5.0\n1.0 2.5\n").expect("gt");
        }
        if behaviour.dynamic {
            fs::write(dir.join("gtp.dat"), "0.1 1.0 2.0\n1.0 3.0 4.0\n").expect("gtp");
        }
        if behaviour.distribution {
            fs::write(dir.join("gpcls_1.dat"), "1 1\n").expect("gpcls");
        }
    }
}

fn ok(stdout: impl Into<String>) -> CommandOutput {
    CommandOutput {
        exit_code: 0,
        stdout: stdout.into(),
        stderr: String::new(),
    }
}

fn failed(code: i32, stderr: &str) -> CommandOutput {
    CommandOutput {
        exit_code: code,
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

/// First `Mw_...` directory name mentioned in a command.
pub fn run_dir_in(command: &str) -> Option<String> {
    let start = command.find("Mw_")?;
    let name: String = command[start..]
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '.')
        .collect();
    Some(name)
}

impl RemoteSession for FakeCluster {
    fn host(&self) -> &str {
        "fake-cluster"
    }

    fn exec(&self, command: &str) -> Result<CommandOutput, SweepError> {
        self.commands.borrow_mut().push(command.to_string());
        if command.starts_with("grep -E 'conda") {
            return Ok(ok(". \"/opt/conda/etc/profile.d/conda.sh\"\n"));
        }
        if command.starts_with("wget ") {
            let target = command
                .rsplit(" -O ")
                .next()
                .unwrap_or_default()
                .trim()
                .trim_matches('\'');
            let dir = run_dir_in(command).unwrap_or_default();
            if self.failing_fetch.contains(&dir) {
                return Ok(failed(8, "ERROR 404: Not Found."));
            }
            fs::write(self.inner.resolve(target), "rc defaults\n").expect("bob.rc");
            return Ok(ok(""));
        }
        if command.starts_with("squeue") {
            self.queue_polls.set(self.queue_polls.get() + 1);
            let mut queue = self.queue.borrow_mut();
            let listed: Vec<String> = queue
                .iter()
                .filter(|(_, polls)| **polls > 0)
                .map(|(id, _)| id.clone())
                .collect();
            for polls in queue.values_mut() {
                if *polls != u32::MAX {
                    *polls = polls.saturating_sub(1);
                }
            }
            return Ok(ok(listed.join("\n")));
        }
        if command.contains("&& sbatch ") {
            let dir = run_dir_in(command).unwrap_or_default();
            let behaviour = self.behaviour(&dir);
            let id = self.next_job.get();
            self.next_job.set(id + 1);
            self.queue
                .borrow_mut()
                .insert(id.to_string(), behaviour.queued_polls);
            self.produce_artifacts(&dir, behaviour);
            return Ok(ok(format!("Submitted batch job {id}\n")));
        }
        if command.starts_with("bash -lc ") {
            let dir = run_dir_in(command).unwrap_or_default();
            let behaviour = self.behaviour(&dir);
            if behaviour.exit_code != 0 {
                return Ok(failed(behaviour.exit_code, "bob2p5: segmentation fault"));
            }
            self.produce_artifacts(&dir, behaviour);
            return Ok(ok("BoB finished\n"));
        }
        self.inner.exec(command)
    }

    fn upload(&self, local: &Path, remote: &str) -> Result<(), SweepError> {
        self.inner.upload(local, remote)
    }

    fn write_file(&self, remote: &str, contents: &[u8], mode: Option<u32>) -> Result<(), SweepError> {
        self.inner.write_file(remote, contents, mode)
    }

    fn download(&self, remote: &str, local: &Path) -> Result<(), SweepError> {
        self.inner.download(remote, local)
    }

    fn read_file(&self, remote: &str) -> Result<Vec<u8>, SweepError> {
        self.inner.read_file(remote)
    }

    fn list(&self, dir: &str) -> Result<Vec<RemoteEntry>, SweepError> {
        self.inner.list(dir)
    }

    fn stat(&self, path: &str) -> Result<Option<RemoteEntry>, SweepError> {
        self.inner.stat(path)
    }

    fn ensure_dir(&self, path: &str) -> Result<(), SweepError> {
        self.inner.ensure_dir(path)
    }

    fn revalidate(&mut self) -> Result<(), SweepError> {
        self.revalidations += 1;
        Ok(())
    }
}

/// Writes the template deck under `local/` and returns a config that polls
/// without sleeping.
pub fn sweep_config(root: &Path, grid: GridSpec, dispatch: DispatchStrategy) -> SweepConfig {
    let local = root.join("local");
    fs::create_dir_all(&local).expect("local dir");
    let template = local.join("inp.dat");
    fs::write(&template, TEMPLATE).expect("template");
    SweepConfig {
        connection: None,
        working_dir: WORKING_DIR.to_string(),
        template_input: template,
        polymer_config: None,
        run_config: None,
        run_config_url: "https://example.org/bob.rc".to_string(),
        solver: Default::default(),
        environment: EnvironmentSettings {
            conda_env: Some("bob".to_string()),
            conda_sh: None,
        },
        grid,
        dispatch,
        watch: WatchSettings {
            artifact_attempts: 2,
            artifact_backoff_secs: 0.0,
            queue_poll_secs: 0.0,
            queue_timeout_secs: 30.0,
        },
        local: Default::default(),
    }
}

pub fn grid(mws: &[f64], dists: &[i64], pdis: &[f64]) -> GridSpec {
    GridSpec {
        molecular_weights: mws.to_vec(),
        distributions: dists.to_vec(),
        polydispersities: pdis.to_vec(),
    }
}
