use std::path::Path;

use serde::{Deserialize, Serialize};
use visc_core::SweepError;

/// Exit status and captured streams of a remote command.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Standard error when present, standard output otherwise.
    pub fn diagnostic(&self) -> &str {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim()
        } else {
            stderr
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryKind {
    File,
    Dir,
    Other,
}

/// One entry of a remote directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub name: String,
    pub kind: EntryKind,
    pub size: u64,
}

impl RemoteEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// Shell and file-transfer operations against the compute host.
///
/// Every call is fallible. Transport failures surface as
/// [`SweepError::Connectivity`]; failures of the operation itself as
/// [`SweepError::Remote`].
pub trait RemoteSession {
    /// Host label used in logs and error context.
    fn host(&self) -> &str;

    /// Runs a shell command and waits for it to exit.
    fn exec(&self, command: &str) -> Result<CommandOutput, SweepError>;

    fn upload(&self, local: &Path, remote: &str) -> Result<(), SweepError>;

    /// Writes `contents` to `remote`, applying `mode` when given.
    fn write_file(&self, remote: &str, contents: &[u8], mode: Option<u32>)
        -> Result<(), SweepError>;

    fn download(&self, remote: &str, local: &Path) -> Result<(), SweepError>;

    /// Reads a whole remote file into memory.
    fn read_file(&self, remote: &str) -> Result<Vec<u8>, SweepError>;

    /// Lists the direct children of `dir`.
    fn list(&self, dir: &str) -> Result<Vec<RemoteEntry>, SweepError>;

    /// Metadata for `path`, `None` when it does not exist.
    fn stat(&self, path: &str) -> Result<Option<RemoteEntry>, SweepError>;

    /// Creates `path` and any missing parents. Existing directories are fine.
    fn ensure_dir(&self, path: &str) -> Result<(), SweepError>;

    /// Probes the session and reconnects once if the probe fails.
    fn revalidate(&mut self) -> Result<(), SweepError> {
        Ok(())
    }

    fn exists(&self, path: &str) -> Result<bool, SweepError> {
        Ok(self.stat(path)?.is_some())
    }
}
