//! Remote sessions used by the sweep orchestrator.
//!
//! [`RemoteSession`] is the seam between orchestration and transport. The
//! OpenSSH-backed [`SshSession`] multiplexes every call over one control
//! connection; [`LocalSession`] runs the same operations on this host.

pub mod local;
pub mod path;
pub mod session;
pub mod ssh;

pub use local::LocalSession;
pub use path::{remote_join, shell_quote};
pub use session::{CommandOutput, EntryKind, RemoteEntry, RemoteSession};
pub use ssh::{Credential, SshSession, SshTarget};
