//! OpenSSH-backed session.
//!
//! All traffic goes through the system `ssh` client with a control master, so
//! the handshake happens once per sweep and later calls reuse the channel.
//! File transfer streams through `cat` on the remote side, which keeps
//! quoting identical for commands and transfers.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tracing::{debug, warn};
use visc_core::{ErrorInfo, SweepError};

use crate::path::shell_quote;
use crate::session::{CommandOutput, EntryKind, RemoteEntry, RemoteSession};

/// Exit status the `ssh` client reserves for its own failures.
const SSH_TRANSPORT_FAILURE: i32 = 255;

/// How the session authenticates.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Credential {
    /// Private key file, optionally protected by a passphrase.
    KeyFile {
        path: PathBuf,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        passphrase: Option<String>,
    },
    /// Keys held by a running `ssh-agent`.
    #[default]
    Agent,
    Password { password: String },
}

/// Connection settings for the compute host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshTarget {
    pub host: String,
    #[serde(default = "SshTarget::default_port")]
    pub port: u16,
    pub user: String,
    #[serde(default)]
    pub credential: Credential,
    #[serde(default = "SshTarget::default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl SshTarget {
    const fn default_port() -> u16 {
        22
    }

    const fn default_connect_timeout() -> u64 {
        15
    }

    pub fn new(host: impl Into<String>, user: impl Into<String>, credential: Credential) -> Self {
        Self {
            host: host.into(),
            port: Self::default_port(),
            user: user.into(),
            credential,
            connect_timeout_secs: Self::default_connect_timeout(),
        }
    }

    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    fn secret(&self) -> Option<&str> {
        match &self.credential {
            Credential::KeyFile { passphrase, .. } => passphrase.as_deref(),
            Credential::Password { password } => Some(password),
            Credential::Agent => None,
        }
    }

    /// Program and leading arguments. Secrets are handed to `sshpass` through
    /// the environment, never on the command line.
    fn launcher(&self) -> Vec<String> {
        match &self.credential {
            Credential::KeyFile {
                passphrase: Some(_),
                ..
            } => vec![
                "sshpass".into(),
                "-P".into(),
                "passphrase".into(),
                "-e".into(),
                "ssh".into(),
            ],
            Credential::Password { .. } => vec!["sshpass".into(), "-e".into(), "ssh".into()],
            _ => vec!["ssh".into()],
        }
    }

    /// Options shared by every invocation.
    pub fn ssh_options(&self, control_path: &Path) -> Vec<String> {
        let mut args = vec![
            "-p".to_string(),
            self.port.to_string(),
            "-o".into(),
            format!("ConnectTimeout={}", self.connect_timeout_secs),
            "-o".into(),
            "ServerAliveInterval=15".into(),
            "-o".into(),
            "ControlMaster=auto".into(),
            "-o".into(),
            format!("ControlPath={}", control_path.display()),
            "-o".into(),
            "ControlPersist=120".into(),
        ];
        match &self.credential {
            Credential::KeyFile { path, passphrase } => {
                args.push("-i".into());
                args.push(path.display().to_string());
                args.push("-o".into());
                args.push("IdentitiesOnly=yes".into());
                if passphrase.is_none() {
                    args.push("-o".into());
                    args.push("BatchMode=yes".into());
                }
            }
            Credential::Agent => {
                args.push("-o".into());
                args.push("BatchMode=yes".into());
            }
            Credential::Password { .. } => {
                args.push("-o".into());
                args.push("PubkeyAuthentication=no".into());
                args.push("-o".into());
                args.push("PreferredAuthentications=password,keyboard-interactive".into());
            }
        }
        args
    }
}

enum Input<'a> {
    None,
    Bytes(&'a [u8]),
    File(File),
}

/// Session over the system OpenSSH client.
#[derive(Debug)]
pub struct SshSession {
    target: SshTarget,
    control_dir: TempDir,
}

impl SshSession {
    /// Opens the control connection. Fails with a connectivity error when the
    /// host is unreachable or rejects the credential.
    pub fn connect(target: SshTarget) -> Result<Self, SweepError> {
        let control_dir = tempfile::Builder::new()
            .prefix("visc-ssh")
            .tempdir()
            .map_err(|err| {
                SweepError::Io(ErrorInfo::new("ssh_control_dir", err.to_string()))
            })?;
        let session = Self {
            target,
            control_dir,
        };
        session.probe().map_err(|err| {
            err.with_context("host", session.target.host.clone())
                .with_context("user", session.target.user.clone())
        })?;
        debug!(host = %session.target.host, "ssh control connection established");
        Ok(session)
    }

    pub fn target(&self) -> &SshTarget {
        &self.target
    }

    fn control_path(&self) -> PathBuf {
        self.control_dir.path().join("cm-%C")
    }

    fn probe(&self) -> Result<(), SweepError> {
        let output = self.spawn("true", Input::None, Stdio::piped())?;
        if output.status.success() {
            Ok(())
        } else {
            Err(SweepError::Connectivity(
                ErrorInfo::new(
                    "ssh_probe",
                    String::from_utf8_lossy(&output.stderr).trim().to_string(),
                )
                .with_hint("check host, user and credential"),
            ))
        }
    }

    fn command(&self, remote_command: &str) -> Command {
        let launcher = self.target.launcher();
        let mut command = Command::new(&launcher[0]);
        command.args(&launcher[1..]);
        command.args(self.target.ssh_options(&self.control_path()));
        command.arg(self.target.destination());
        command.arg("--");
        command.arg(remote_command);
        if let Some(secret) = self.target.secret() {
            command.env("SSHPASS", secret);
        }
        command
    }

    /// Runs `remote_command`. Exit status 255 is either the client's own
    /// failure or the remote command's; a fresh probe over the same channel
    /// tells the two apart.
    fn run(&self, remote_command: &str, input: Input<'_>, stdout: Stdio) -> Result<Output, SweepError> {
        let output = self.spawn(remote_command, input, stdout)?;
        if output.status.code() != Some(SSH_TRANSPORT_FAILURE) {
            return Ok(output);
        }
        match self.probe() {
            Ok(()) => {
                debug!(host = %self.target.host, command = remote_command, "remote command exited 255");
                Ok(output)
            }
            Err(probe) => Err(SweepError::Connectivity(
                ErrorInfo::new("ssh_transport", String::from_utf8_lossy(&output.stderr).trim())
                    .with_context("host", self.target.host.clone())
                    .with_context("probe", probe.to_string()),
            )),
        }
    }

    fn spawn(&self, remote_command: &str, input: Input<'_>, stdout: Stdio) -> Result<Output, SweepError> {
        debug!(host = %self.target.host, command = remote_command, "ssh exec");
        let mut command = self.command(remote_command);
        command.stdout(stdout).stderr(Stdio::piped());
        let bytes = match input {
            Input::None => {
                command.stdin(Stdio::null());
                None
            }
            Input::Bytes(bytes) => {
                command.stdin(Stdio::piped());
                Some(bytes)
            }
            Input::File(file) => {
                command.stdin(Stdio::from(file));
                None
            }
        };
        let mut child = command.spawn().map_err(|err| {
            SweepError::Connectivity(
                ErrorInfo::new("ssh_spawn", err.to_string())
                    .with_hint("is the OpenSSH client installed and on PATH?"),
            )
        })?;
        if let (Some(bytes), Some(mut stdin)) = (bytes, child.stdin.take()) {
            stdin
                .write_all(bytes)
                .map_err(|err| transport_error("ssh_stdin", err))?;
        }
        child
            .wait_with_output()
            .map_err(|err| transport_error("ssh_wait", err))
    }

    fn checked(&self, code: &str, remote_command: &str, input: Input<'_>) -> Result<(), SweepError> {
        let output = self.run(remote_command, input, Stdio::piped())?;
        if output.status.success() {
            Ok(())
        } else {
            Err(SweepError::Remote(
                ErrorInfo::new(code, String::from_utf8_lossy(&output.stderr).trim())
                    .with_context("command", remote_command),
            ))
        }
    }

    fn close_master(&self) {
        let mut command = Command::new("ssh");
        command
            .args(self.target.ssh_options(&self.control_path()))
            .arg("-O")
            .arg("exit")
            .arg(self.target.destination())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if let Err(err) = command.status() {
            debug!(error = %err, "closing ssh control master failed");
        }
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        self.close_master();
    }
}

fn transport_error(code: &str, err: impl ToString) -> SweepError {
    SweepError::Connectivity(ErrorInfo::new(code, err.to_string()))
}

fn to_command_output(output: Output) -> CommandOutput {
    CommandOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    }
}

/// Parses `find -printf '%y\t%s\t%f\n'` output.
pub fn parse_find_listing(stdout: &str) -> Vec<RemoteEntry> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut parts = line.splitn(3, '\t');
            let kind = match parts.next()? {
                "f" => EntryKind::File,
                "d" => EntryKind::Dir,
                _ => EntryKind::Other,
            };
            let size = parts.next()?.parse::<u64>().ok()?;
            let name = parts.next()?.to_string();
            if name.is_empty() {
                return None;
            }
            Some(RemoteEntry { name, kind, size })
        })
        .collect()
}

const FIND_FORMAT: &str = r"'%y\t%s\t%f\n'";

impl RemoteSession for SshSession {
    fn host(&self) -> &str {
        &self.target.host
    }

    fn exec(&self, command: &str) -> Result<CommandOutput, SweepError> {
        let output = self.run(command, Input::None, Stdio::piped())?;
        Ok(to_command_output(output))
    }

    fn upload(&self, local: &Path, remote: &str) -> Result<(), SweepError> {
        let file = File::open(local).map_err(|err| {
            SweepError::Io(
                ErrorInfo::new("upload_open", err.to_string())
                    .with_context("path", local.display().to_string()),
            )
        })?;
        debug!(local = %local.display(), remote, "upload");
        self.checked(
            "upload",
            &format!("cat > {}", shell_quote(remote)),
            Input::File(file),
        )
    }

    fn write_file(
        &self,
        remote: &str,
        contents: &[u8],
        mode: Option<u32>,
    ) -> Result<(), SweepError> {
        let quoted = shell_quote(remote);
        let command = match mode {
            Some(mode) => format!("cat > {quoted} && chmod {mode:o} {quoted}"),
            None => format!("cat > {quoted}"),
        };
        self.checked("write_file", &command, Input::Bytes(contents))
    }

    fn download(&self, remote: &str, local: &Path) -> Result<(), SweepError> {
        if let Some(parent) = local.parent() {
            std::fs::create_dir_all(parent).map_err(|err| {
                SweepError::Io(ErrorInfo::new("download_dir", err.to_string()))
            })?;
        }
        let file = File::create(local).map_err(|err| {
            SweepError::Io(
                ErrorInfo::new("download_create", err.to_string())
                    .with_context("path", local.display().to_string()),
            )
        })?;
        debug!(remote, local = %local.display(), "download");
        let output = self.run(
            &format!("cat {}", shell_quote(remote)),
            Input::None,
            Stdio::from(file),
        )?;
        if output.status.success() {
            Ok(())
        } else {
            if let Err(err) = std::fs::remove_file(local) {
                warn!(path = %local.display(), error = %err, "could not remove partial download");
            }
            Err(SweepError::Remote(
                ErrorInfo::new("download", String::from_utf8_lossy(&output.stderr).trim())
                    .with_context("remote", remote),
            ))
        }
    }

    fn read_file(&self, remote: &str) -> Result<Vec<u8>, SweepError> {
        let output = self.run(
            &format!("cat {}", shell_quote(remote)),
            Input::None,
            Stdio::piped(),
        )?;
        if output.status.success() {
            Ok(output.stdout)
        } else {
            Err(SweepError::Remote(
                ErrorInfo::new("read_file", String::from_utf8_lossy(&output.stderr).trim())
                    .with_context("remote", remote),
            ))
        }
    }

    fn list(&self, dir: &str) -> Result<Vec<RemoteEntry>, SweepError> {
        let command = format!(
            "find {} -mindepth 1 -maxdepth 1 -printf {FIND_FORMAT}",
            shell_quote(dir)
        );
        let output = self.exec(&command)?;
        if !output.success() {
            return Err(SweepError::Remote(
                ErrorInfo::new("list", output.diagnostic()).with_context("dir", dir),
            ));
        }
        Ok(parse_find_listing(&output.stdout))
    }

    fn stat(&self, path: &str) -> Result<Option<RemoteEntry>, SweepError> {
        let quoted = shell_quote(path);
        let command = format!(
            "if [ -e {quoted} ]; then find {quoted} -maxdepth 0 -printf {FIND_FORMAT}; fi"
        );
        let output = self.exec(&command)?;
        if !output.success() {
            return Err(SweepError::Remote(
                ErrorInfo::new("stat", output.diagnostic()).with_context("path", path),
            ));
        }
        Ok(parse_find_listing(&output.stdout).into_iter().next())
    }

    fn ensure_dir(&self, path: &str) -> Result<(), SweepError> {
        self.checked(
            "ensure_dir",
            &format!("mkdir -p {}", shell_quote(path)),
            Input::None,
        )
    }

    fn revalidate(&mut self) -> Result<(), SweepError> {
        match self.probe() {
            Ok(()) => Ok(()),
            Err(first) => {
                warn!(host = %self.target.host, error = %first, "session probe failed, reconnecting");
                self.close_master();
                self.probe()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_parses_tabs_and_spaces_in_names() {
        let entries = parse_find_listing("d\t4096\tMw_1_0__D1__PDI_2_0\nf\t12\tmy file.dat\nl\t7\tlink\n");
        assert_eq!(entries.len(), 3);
        assert!(entries[0].is_dir());
        assert_eq!(entries[1].name, "my file.dat");
        assert_eq!(entries[1].size, 12);
        assert_eq!(entries[2].kind, EntryKind::Other);
    }

    #[test]
    fn key_file_options_include_identity() {
        let target = SshTarget::new(
            "cluster",
            "alice",
            Credential::KeyFile {
                path: PathBuf::from("/keys/id_ed25519"),
                passphrase: None,
            },
        );
        let args = target.ssh_options(Path::new("/tmp/cm"));
        assert!(args.windows(2).any(|w| w == ["-i", "/keys/id_ed25519"]));
        assert!(args.contains(&"BatchMode=yes".to_string()));
        assert!(args.contains(&"ControlPath=/tmp/cm".to_string()));
        assert_eq!(target.launcher(), vec!["ssh".to_string()]);
    }

    #[test]
    fn password_goes_through_sshpass_environment() {
        let target = SshTarget::new(
            "cluster",
            "alice",
            Credential::Password {
                password: "hunter2".into(),
            },
        );
        assert_eq!(target.launcher()[0], "sshpass");
        assert_eq!(target.secret(), Some("hunter2"));
        assert!(!target.ssh_options(Path::new("/tmp/cm")).iter().any(|arg| arg.contains("hunter2")));
    }
}
