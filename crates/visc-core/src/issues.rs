//! Non-fatal outcomes accumulated while a sweep or ingestion pass runs.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Category of a recorded issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueKind {
    /// The input deck had no `(distribution, Mw, PDI)` line; uploaded unmodified.
    InputRewrite,
    /// The run directory could not be prepared; the combination was skipped.
    Materialization,
    /// Command construction, execution or submission failed.
    Dispatch,
    /// The solver finished but the mandatory artifacts never appeared.
    IncompleteRun,
    /// The queue still listed jobs when the drain timeout elapsed.
    QueueTimeout,
    /// A file could not be mirrored during collection.
    CollectionSkip,
    /// A run directory was excluded from the store.
    IngestionSkip,
    /// Publishing the store or exports back to the remote host failed.
    Publication,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            IssueKind::InputRewrite => "input-rewrite",
            IssueKind::Materialization => "materialization",
            IssueKind::Dispatch => "dispatch",
            IssueKind::IncompleteRun => "incomplete-run",
            IssueKind::QueueTimeout => "queue-timeout",
            IssueKind::CollectionSkip => "collection-skip",
            IssueKind::IngestionSkip => "ingestion-skip",
            IssueKind::Publication => "publication",
        };
        f.write_str(label)
    }
}

/// A single warning or skip tied to a run directory when one applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub kind: IssueKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<String>,
    pub message: String,
}

impl Issue {
    pub fn new(kind: IssueKind, run: Option<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            run,
            message: message.into(),
        }
    }

    pub fn for_run(kind: IssueKind, run: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(kind, Some(run.into()), message)
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.run {
            Some(run) => write!(f, "[{}] {}: {}", self.kind, run, self.message),
            None => write!(f, "[{}] {}", self.kind, self.message),
        }
    }
}

/// Counts issues of the given kind.
pub fn count_kind(issues: &[Issue], kind: IssueKind) -> usize {
    issues.iter().filter(|issue| issue.kind == kind).count()
}
