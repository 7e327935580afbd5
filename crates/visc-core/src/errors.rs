//! Structured error types shared across visc crates.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured payload attached to every [`SweepError`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable machine readable error code.
    pub code: String,
    /// Human readable diagnostic message.
    pub message: String,
    /// Contextual key value pairs (paths, hosts, run names).
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Optional hint that may help the caller resolve the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Creates a new error payload with the provided code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Adds a context entry to the payload.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Sets a human readable hint for remediation.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code: {})", self.message, self.code)?;
        if !self.context.is_empty() {
            write!(f, " | context: [")?;
            for (idx, (key, value)) in self.context.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}={value}")?;
            }
            write!(f, "]")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, " | hint: {hint}")?;
        }
        Ok(())
    }
}

/// Canonical error type for sweep orchestration and result ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum SweepError {
    /// The remote session could not be opened or was lost.
    #[error("connectivity error: {0}")]
    Connectivity(ErrorInfo),
    /// A remote operation failed on an otherwise healthy session.
    #[error("remote error: {0}")]
    Remote(ErrorInfo),
    /// A run directory could not be prepared.
    #[error("materialization error: {0}")]
    Materialization(ErrorInfo),
    /// Dispatch could not be built or submitted.
    #[error("dispatch error: {0}")]
    Dispatch(ErrorInfo),
    /// The result store could not be written.
    #[error("ingestion error: {0}")]
    Ingestion(ErrorInfo),
    /// No run directory produced a valid record.
    #[error("empty store: {0}")]
    EmptyStore(ErrorInfo),
    /// Configuration rejected during validation.
    #[error("config error: {0}")]
    Config(ErrorInfo),
    /// Local filesystem failures.
    #[error("io error: {0}")]
    Io(ErrorInfo),
    /// Serialization and schema errors.
    #[error("serde error: {0}")]
    Serde(ErrorInfo),
}

impl SweepError {
    /// Returns a reference to the payload describing the error.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            SweepError::Connectivity(info)
            | SweepError::Remote(info)
            | SweepError::Materialization(info)
            | SweepError::Dispatch(info)
            | SweepError::Ingestion(info)
            | SweepError::EmptyStore(info)
            | SweepError::Config(info)
            | SweepError::Io(info)
            | SweepError::Serde(info) => info,
        }
    }

    /// Only a lost or unreachable session stops a sweep; every other family is
    /// confined to the combination that raised it.
    pub fn is_fatal_for_sweep(&self) -> bool {
        matches!(self, SweepError::Connectivity(_))
    }

    /// Adds a context entry to the wrapped payload.
    pub fn with_context(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.map_info(|info| info.with_context(key, value))
    }

    fn map_info(self, f: impl FnOnce(ErrorInfo) -> ErrorInfo) -> Self {
        match self {
            SweepError::Connectivity(info) => SweepError::Connectivity(f(info)),
            SweepError::Remote(info) => SweepError::Remote(f(info)),
            SweepError::Materialization(info) => SweepError::Materialization(f(info)),
            SweepError::Dispatch(info) => SweepError::Dispatch(f(info)),
            SweepError::Ingestion(info) => SweepError::Ingestion(f(info)),
            SweepError::EmptyStore(info) => SweepError::EmptyStore(f(info)),
            SweepError::Config(info) => SweepError::Config(f(info)),
            SweepError::Io(info) => SweepError::Io(f(info)),
            SweepError::Serde(info) => SweepError::Serde(f(info)),
        }
    }
}

/// Wraps a local filesystem failure under the given code.
pub fn io_error(code: &str, err: impl ToString) -> SweepError {
    SweepError::Io(ErrorInfo::new(code, err.to_string()))
}
