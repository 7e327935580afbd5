//! Drives `SshSession` against a stand-in `ssh` client placed first on PATH.
//! The stand-in runs the remote command with `sh -c` and fails with the
//! client's own status 255 for any destination that has a `down-<dest>`
//! marker next to it.
#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::OnceLock;

use tempfile::TempDir;
use visc_remote::{Credential, RemoteSession, SshSession, SshTarget};

const FAKE_SSH: &str = r#"#!/bin/sh
dir=$(dirname "$0")
prev=""
dest=""
cmd=""
seen=0
for arg in "$@"; do
  if [ "$seen" = 1 ]; then cmd=$arg; fi
  if [ "$arg" = "--" ] && [ "$seen" = 0 ]; then dest=$prev; seen=1; fi
  prev=$arg
done
# control requests such as -O exit
if [ "$seen" = 0 ]; then exit 0; fi
if [ -e "$dir/down-$dest" ]; then
  echo "ssh: connect to host $dest port 22: Connection refused" >&2
  exit 255
fi
exec sh -c "$cmd"
"#;

fn fake_bin() -> &'static Path {
    static BIN: OnceLock<TempDir> = OnceLock::new();
    BIN.get_or_init(|| {
        let dir = tempfile::tempdir().expect("tempdir");
        let ssh = dir.path().join("ssh");
        fs::write(&ssh, FAKE_SSH).expect("write fake ssh");
        fs::set_permissions(&ssh, fs::Permissions::from_mode(0o755)).expect("chmod");
        let path = std::env::var("PATH").unwrap_or_default();
        std::env::set_var("PATH", format!("{}:{path}", dir.path().display()));
        dir
    })
    .path()
}

fn connect(host: &str) -> SshSession {
    fake_bin();
    SshSession::connect(SshTarget::new(host, "alice", Credential::Agent)).expect("connect")
}

fn mark_down(host: &str) {
    fs::write(fake_bin().join(format!("down-alice@{host}")), b"").expect("marker");
}

#[test]
fn remote_exit_255_is_reported_as_the_command_status() {
    let session = connect("healthy");

    let output = session.exec("echo partial; exit 255").expect("exec");

    assert_eq!(output.exit_code, 255);
    assert!(!output.success());
    assert_eq!(output.stdout, "partial\n");
}

#[test]
fn ordinary_exit_codes_pass_through() {
    let session = connect("ordinary");

    assert_eq!(session.exec("exit 3").expect("exec").exit_code, 3);
    assert!(session.exec("true").expect("exec").success());
}

#[test]
fn lost_link_is_a_connectivity_error() {
    let session = connect("flaky");
    mark_down("flaky");

    let err = session.exec("echo unreachable").expect_err("link down");

    assert!(err.is_fatal_for_sweep(), "{err}");
    assert_eq!(err.info().code, "ssh_transport");
    assert!(err.info().message.contains("Connection refused"));
}

#[test]
fn unreachable_host_fails_to_connect() {
    fake_bin();
    mark_down("offline");

    let err = SshSession::connect(SshTarget::new("offline", "alice", Credential::Agent))
        .expect_err("connect");

    assert!(err.is_fatal_for_sweep(), "{err}");
    assert_eq!(err.info().code, "ssh_probe");
    assert_eq!(err.info().context.get("host").map(String::as_str), Some("offline"));
}
