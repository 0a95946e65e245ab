//! Error types for envsync-engine.

use std::fmt;

use thiserror::Error;

use envsync_core::LoadError;
use envsync_platform::RemoteError;

/// Errors that abort the whole run. No template's decision can be trusted
/// once one of these occurs.
#[derive(Debug, Error)]
pub enum RunError {
    /// Template set could not be loaded (missing root, duplicate names, ...).
    #[error(transparent)]
    Load(#[from] LoadError),

    /// Observed state could not be read. Never treated as "absent".
    #[error("remote platform unavailable: {0}")]
    RemoteUnavailable(#[source] RemoteError),
}

/// Why a single template failed. Per-template failures never abort the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The template source could not be parsed or validated.
    MalformedTemplate,
    /// The platform rejected a call (validation, auth, conflict, bad response).
    RemoteValidation,
    /// A transient error persisted through every retry.
    RetriesExhausted,
    /// Some calls succeeded before a later one failed, e.g. the environment
    /// was created but its revision was not published. Re-running repairs it.
    PartiallyApplied,
}

impl FailureKind {
    pub fn from_remote(err: &RemoteError) -> Self {
        if err.is_transient() {
            FailureKind::RetriesExhausted
        } else {
            FailureKind::RemoteValidation
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::MalformedTemplate => "malformed_template",
            FailureKind::RemoteValidation => "remote_validation",
            FailureKind::RetriesExhausted => "retries_exhausted",
            FailureKind::PartiallyApplied => "partially_applied",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
