//! Session that runs against the local filesystem and `sh`.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;
use visc_core::{ErrorInfo, SweepError};

use crate::session::{CommandOutput, EntryKind, RemoteEntry, RemoteSession};

fn local_error(code: &str, path: &Path, err: impl ToString) -> SweepError {
    SweepError::Remote(
        ErrorInfo::new(code, err.to_string()).with_context("path", path.display().to_string()),
    )
}

/// Runs sweeps on this host. Remote paths are ordinary local paths; relative
/// ones resolve against `root` when set.
#[derive(Debug, Clone, Default)]
pub struct LocalSession {
    root: Option<PathBuf>,
}

impl LocalSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves relative remote paths and runs commands under `root`.
    pub fn rooted(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    pub fn resolve(&self, remote: &str) -> PathBuf {
        let path = Path::new(remote);
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }
}

fn entry_for(name: String, meta: &fs::Metadata) -> RemoteEntry {
    let kind = if meta.is_dir() {
        EntryKind::Dir
    } else if meta.is_file() {
        EntryKind::File
    } else {
        EntryKind::Other
    };
    RemoteEntry {
        name,
        kind,
        size: meta.len(),
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

impl RemoteSession for LocalSession {
    fn host(&self) -> &str {
        "localhost"
    }

    fn exec(&self, command: &str) -> Result<CommandOutput, SweepError> {
        debug!(command, "local exec");
        let mut process = Command::new("sh");
        process.arg("-c").arg(command);
        if let Some(root) = &self.root {
            process.current_dir(root);
        }
        let output = process.output().map_err(|err| {
            SweepError::Connectivity(ErrorInfo::new("local_spawn", err.to_string()))
        })?;
        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn upload(&self, local: &Path, remote: &str) -> Result<(), SweepError> {
        let target = self.resolve(remote);
        fs::copy(local, &target).map_err(|err| local_error("upload", &target, err))?;
        Ok(())
    }

    fn write_file(
        &self,
        remote: &str,
        contents: &[u8],
        mode: Option<u32>,
    ) -> Result<(), SweepError> {
        let target = self.resolve(remote);
        fs::write(&target, contents).map_err(|err| local_error("write_file", &target, err))?;
        if let Some(mode) = mode {
            set_mode(&target, mode).map_err(|err| local_error("chmod", &target, err))?;
        }
        Ok(())
    }

    fn download(&self, remote: &str, local: &Path) -> Result<(), SweepError> {
        let source = self.resolve(remote);
        if let Some(parent) = local.parent() {
            fs::create_dir_all(parent).map_err(|err| local_error("download_dir", parent, err))?;
        }
        fs::copy(&source, local).map_err(|err| local_error("download", &source, err))?;
        Ok(())
    }

    fn read_file(&self, remote: &str) -> Result<Vec<u8>, SweepError> {
        let source = self.resolve(remote);
        fs::read(&source).map_err(|err| local_error("read_file", &source, err))
    }

    fn list(&self, dir: &str) -> Result<Vec<RemoteEntry>, SweepError> {
        let path = self.resolve(dir);
        let mut entries = Vec::new();
        for entry in fs::read_dir(&path).map_err(|err| local_error("list", &path, err))? {
            let entry = entry.map_err(|err| local_error("list", &path, err))?;
            let meta = entry
                .metadata()
                .map_err(|err| local_error("list", &entry.path(), err))?;
            entries.push(entry_for(entry.file_name().to_string_lossy().into_owned(), &meta));
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn stat(&self, path: &str) -> Result<Option<RemoteEntry>, SweepError> {
        let resolved = self.resolve(path);
        match fs::metadata(&resolved) {
            Ok(meta) => {
                let name = resolved
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                Ok(Some(entry_for(name, &meta)))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(local_error("stat", &resolved, err)),
        }
    }

    fn ensure_dir(&self, path: &str) -> Result<(), SweepError> {
        let resolved = self.resolve(path);
        fs::create_dir_all(&resolved).map_err(|err| local_error("ensure_dir", &resolved, err))
    }
}
