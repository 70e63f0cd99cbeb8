//! Error types with clear, actionable messages
//!
//! Components raise their own typed errors; only the verifier turns them into
//! user-visible outcomes.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while enumerating or fetching a target's files
#[derive(Error, Debug)]
pub enum TargetError {
    /// The target does not exist or cannot be reached
    #[error("Target not found: {target}")]
    NotFound { target: String },

    /// A single candidate file could not be retrieved
    #[error("Failed to retrieve {path}: {reason}")]
    Fetch { path: String, reason: String },

    /// The hub answered with something we cannot use
    #[error("Unexpected response from hub for {target}: {reason}")]
    Hub { target: String, reason: String },

    /// Filesystem failure while walking a local target
    #[error("Failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Trust store persistence errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Reading or writing a store document failed
    #[error("Trust store I/O failed for {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A stored document is not valid JSON for its type
    #[error("Failed to parse trust store document {key} (corrupted or invalid format)")]
    Parse {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// A metadata document carries a schema version this build cannot read
    #[error("Unsupported metadata schema in {key}: found {found}, this build supports up to {supported}\n\nUpgrade model-sentinel to read this trust store.")]
    SchemaMismatch {
        key: String,
        found: String,
        supported: u32,
    },

    /// A key would escape the store root or is otherwise malformed
    #[error("Invalid trust store key: {key:?}")]
    InvalidKey { key: String },

    /// The document changed on disk between load and save
    #[error("Trust store document {key} was modified by another process during this run\n\nRe-run verification to review the latest state.")]
    Conflict { key: String },
}

/// Errors from a human-interaction surface
#[derive(Error, Debug)]
pub enum PromptError {
    #[error("Approval prompt I/O failed")]
    Io(#[from] std::io::Error),

    /// No decision arrived before the deadline
    #[error("No approval decision received within {seconds}s")]
    Timeout { seconds: u64 },

    /// The surface went away before a decision was submitted
    #[error("Approval surface closed before a decision was submitted")]
    Closed,
}

/// Verification outcomes that fail a run
#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("{0}\n\nModel verification failed. Nothing was recorded.")]
    NotFound(#[source] TargetError),

    #[error("{0}\n\nModel verification failed closed: every candidate file must be reviewed.")]
    FetchFailure(#[source] TargetError),

    /// At least one pending file was declined by the reviewer
    #[error("Trust not confirmed for: {}\n\nThe model hash was not updated. Review the changes and run verification again.", .rejected.join(", "))]
    RejectedApproval {
        rejected: Vec<String>,
        /// Whether individually approved files were still recorded
        partially_saved: bool,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Prompt(#[from] PromptError),
}

impl From<TargetError> for VerifyError {
    fn from(err: TargetError) -> Self {
        match err {
            TargetError::NotFound { .. } => VerifyError::NotFound(err),
            other => VerifyError::FetchFailure(other),
        }
    }
}

impl VerifyError {
    /// Log failures that indicate unreviewed or conflicting trust state
    pub fn log_if_security_critical(&self) {
        match self {
            VerifyError::RejectedApproval { .. }
            | VerifyError::Store(StoreError::SchemaMismatch { .. })
            | VerifyError::Store(StoreError::Conflict { .. }) => {
                tracing::error!(target: "security", "TRUST NOT ESTABLISHED: {}", self);
            }
            _ => {}
        }
    }
}
