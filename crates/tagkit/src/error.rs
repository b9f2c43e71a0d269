//! Error types for tag reconciliation.
//!
//! Errors are grouped into categories so callers can decide whether a run
//! must stop (malformed input, broken live query, bad invocation) or whether
//! a single resource failure can be counted and skipped.

use std::path::PathBuf;
use thiserror::Error;

/// Categories of reconciliation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed declaration or snapshot input
    Format,
    /// Live-state retrieval failed or timed out
    Query,
    /// The caller asked for something contradictory or unconfirmed
    Invocation,
    /// A single resource update failed
    Update,
    /// Local filesystem error
    Io,
}

impl ErrorCategory {
    /// Whether an error of this category ends the whole run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Update)
    }

    /// Short user-facing label.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Format => "Malformed input",
            Self::Query => "Live state query failed",
            Self::Invocation => "Invalid invocation",
            Self::Update => "Resource update failed",
            Self::Io => "I/O error",
        }
    }
}

/// Errors that can occur while reconciling tags.
#[derive(Debug, Error)]
pub enum Error {
    /// Declaration or support file is malformed
    #[error("{}:{line}: {message}", .file.display())]
    Format {
        /// File being parsed
        file: PathBuf,
        /// 1-indexed line number (header is line 1)
        line: usize,
        /// What was wrong with it
        message: String,
    },

    /// Existing-state snapshot document is malformed
    #[error("malformed {origin}: {message}")]
    Snapshot {
        /// Which document (file name or query name)
        origin: String,
        /// Parser message
        message: String,
    },

    /// Resource id does not look like a subscription-rooted id
    #[error("badly formatted resource ID [{id}]: {reason}")]
    InvalidId {
        /// Offending id
        id: String,
        /// Why it was rejected
        reason: String,
    },

    /// Same tag declared for one resource under two different casings
    #[error("resource has duplicate tags defined [{first} {second}] [{resource}]")]
    DuplicateTag {
        /// Resource id
        resource: String,
        /// First spelling seen
        first: String,
        /// Second spelling seen
        second: String,
    },

    /// Live state query failed
    #[error("query failed: {message}")]
    Query {
        /// Failure description
        message: String,
    },

    /// External call exceeded the fixed timeout
    #[error("{command} timed out after {secs}s")]
    Timeout {
        /// Command that was running
        command: String,
        /// Timeout that elapsed
        secs: u64,
    },

    /// Contradictory or unconfirmed request
    #[error("invalid invocation: {0}")]
    Invocation(String),

    /// Update of a single resource failed
    #[error("update failed for {resource}: {message}")]
    Update {
        /// Resource id
        resource: String,
        /// Underlying cause
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV reader error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl Error {
    /// Category used for abort decisions and reporting.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Format { .. }
            | Error::Snapshot { .. }
            | Error::InvalidId { .. }
            | Error::DuplicateTag { .. }
            | Error::Json(_)
            | Error::Csv(_) => ErrorCategory::Format,
            Error::Query { .. } | Error::Timeout { .. } => ErrorCategory::Query,
            Error::Invocation(_) => ErrorCategory::Invocation,
            Error::Update { .. } => ErrorCategory::Update,
            Error::Io(_) => ErrorCategory::Io,
        }
    }

    /// Whether this error should stop the whole run.
    pub fn is_fatal(&self) -> bool {
        self.category().is_fatal()
    }

    /// Build a format error for a file position.
    pub fn format(file: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
        Error::Format {
            file: file.into(),
            line,
            message: message.into(),
        }
    }
}

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, Error>;
