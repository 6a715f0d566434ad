//! Structured validation failures.

use serde::{Deserialize, Serialize};

/// The message used when a rule does not supply its own.
pub const DEFAULT_MESSAGE: &str = "Some validation errors occurred.";

/// One failed check: a stable code, a human-readable message, and the path
/// of the offending field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub code: String,
    pub message: String,
    pub path: Vec<String>,
}

impl ErrorEntry {
    pub fn new<P, S>(code: impl Into<String>, message: impl Into<String>, path: P) -> Self
    where
        P: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            code: code.into(),
            message: message.into(),
            path: path.into_iter().map(Into::into).collect(),
        }
    }
}

/// A validation failure carrying an ordered list of entries.
///
/// Serializes as `{ "message": ..., "errors": [{ "code", "message", "path" }] }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message} ({} error(s))", .errors.len())]
pub struct ValidationError {
    pub message: String,
    pub errors: Vec<ErrorEntry>,
}

impl ValidationError {
    pub fn new(message: impl Into<String>, errors: Vec<ErrorEntry>) -> Self {
        Self {
            message: message.into(),
            errors,
        }
    }

    /// A failure with one entry and the default message.
    pub fn single(entry: ErrorEntry) -> Self {
        Self::new(DEFAULT_MESSAGE, vec![entry])
    }

    /// Merge several failures into one, keeping entry order.
    ///
    /// The message of the first failure is kept. Returns `None` for an
    /// empty input.
    pub fn aggregate<'a>(failures: impl IntoIterator<Item = &'a ValidationError>) -> Option<Self> {
        let mut failures = failures.into_iter();
        let first = failures.next()?;
        let mut merged = first.clone();
        for failure in failures {
            merged.errors.extend(failure.errors.iter().cloned());
        }
        Some(merged)
    }

    /// Codes of every entry, in order.
    pub fn codes(&self) -> Vec<&str> {
        self.errors.iter().map(|e| e.code.as_str()).collect()
    }
}
