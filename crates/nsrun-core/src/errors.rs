//! Structured error types shared across nsrun crates.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Exit status used by every cooperating process after a global abort.
pub const ABORT_EXIT_STATUS: i32 = 3;

/// Structured payload attached to every [`NsError`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable machine readable error code.
    pub code: String,
    /// Human readable diagnostic message.
    pub message: String,
    /// Contextual key value pairs (file roots, ranks, paths, etc.).
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

/// Canonical error type for nsrun batches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum NsError {
    /// Invalid batch configuration (empty axes, duplicate roots, bad seed policy).
    #[error("configuration error: {0}")]
    Config(ErrorInfo),
    /// Output directory creation failures other than "already exists".
    #[error("directory error: {0}")]
    Directory(ErrorInfo),
    /// The external sampler reported a failure or crashed.
    #[error("sampler error: {0}")]
    Sampler(ErrorInfo),
    /// One-time setup failed on the coordinating process.
    #[error("coordination setup error: {0}")]
    Coordination(ErrorInfo),
    /// Two-phase protocol could not be sequenced.
    #[error("phase sequencing error: {0}")]
    Phase(ErrorInfo),
    /// The worker pool could not be started.
    #[error("dispatch error: {0}")]
    Dispatch(ErrorInfo),
    /// A global abort was observed; the process must exit non-zero.
    #[error("batch aborted: {0}")]
    Aborted(ErrorInfo),
    /// Serialization, schema and artefact I/O errors.
    #[error("serde error: {0}")]
    Serde(ErrorInfo),
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

impl NsError {
    /// Returns a reference to the payload describing the error.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            NsError::Config(info)
            | NsError::Directory(info)
            | NsError::Sampler(info)
            | NsError::Coordination(info)
            | NsError::Phase(info)
            | NsError::Dispatch(info)
            | NsError::Aborted(info)
            | NsError::Serde(info) => info,
        }
    }

    fn info_mut(&mut self) -> &mut ErrorInfo {
        match self {
            NsError::Config(info)
            | NsError::Directory(info)
            | NsError::Sampler(info)
            | NsError::Coordination(info)
            | NsError::Phase(info)
            | NsError::Dispatch(info)
            | NsError::Aborted(info)
            | NsError::Serde(info) => info,
        }
    }

    /// Adds a context entry while keeping the error family.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.info_mut().context.insert(key.into(), value.into());
        self
    }

    /// Shorthand for a configuration error.
    pub fn config(code: impl Into<String>, message: impl Into<String>) -> Self {
        NsError::Config(ErrorInfo::new(code, message))
    }

    /// Shorthand for a sampler invocation error.
    pub fn sampler(code: impl Into<String>, message: impl Into<String>) -> Self {
        NsError::Sampler(ErrorInfo::new(code, message))
    }

    /// Returns true when the error means the whole batch has to stop.
    pub fn is_abort(&self) -> bool {
        matches!(self, NsError::Aborted(_) | NsError::Coordination(_))
    }

    /// Process exit status matching this error.
    pub fn exit_status(&self) -> i32 {
        if self.is_abort() {
            ABORT_EXIT_STATUS
        } else {
            1
        }
    }
}
