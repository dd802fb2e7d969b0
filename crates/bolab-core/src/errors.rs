//! Structured error types shared across the bolab crates.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured payload attached to every [`BolabError`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable machine readable error code.
    pub code: String,
    /// Human readable diagnostic message.
    pub message: String,
    /// Contextual key value pairs (identifiers, paths, counts, etc.).
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

/// Canonical error type for the bolab campaign engine.
///
/// Only `Validation`, `Schema`, `Storage`, and `BatchNotFound` cross the
/// public operation boundary; `Optimizer` and `Stale` are absorbed by the
/// orchestration layer with a policy decision (fallback or rebuild) and a
/// log record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum BolabError {
    /// Malformed parameter, objective, campaign, or result submission.
    #[error("validation error: {0}")]
    Validation(ErrorInfo),
    /// Persisted payload schema is newer than supported with no migration path.
    #[error("schema error: {0}")]
    Schema(ErrorInfo),
    /// The external optimization engine failed, timed out, or replied malformed.
    #[error("optimizer unavailable: {0}")]
    Optimizer(ErrorInfo),
    /// Persisted optimizer state no longer matches the live campaign definition.
    #[error("stale optimizer state: {0}")]
    Stale(ErrorInfo),
    /// Atomic persistence failure.
    #[error("storage error: {0}")]
    Storage(ErrorInfo),
    /// Result submission referenced an unknown batch.
    #[error("batch not found: {0}")]
    BatchNotFound(ErrorInfo),
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

impl BolabError {
    /// Returns a reference to the payload describing the error.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            BolabError::Validation(info)
            | BolabError::Schema(info)
            | BolabError::Optimizer(info)
            | BolabError::Stale(info)
            | BolabError::Storage(info)
            | BolabError::BatchNotFound(info) => info,
        }
    }

    /// True when the error is absorbed internally rather than surfaced.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, BolabError::Optimizer(_) | BolabError::Stale(_))
    }
}
