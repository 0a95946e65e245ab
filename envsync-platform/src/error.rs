//! Error types for envsync-platform.

use thiserror::Error;

use crate::api::Operation;

/// Failure of a single remote call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// Timeouts, connection failures, 408/429 and 5xx responses. Retried.
    #[error("{operation} failed transiently: {message}")]
    Transient {
        operation: Operation,
        message: String,
    },

    /// Any other non-success status (validation, auth, not found). Not retried.
    #[error("{operation} rejected with HTTP {status}: {message}")]
    Rejected {
        operation: Operation,
        status: u16,
        message: String,
    },

    /// The platform answered with a body we could not interpret.
    #[error("{operation} returned an unexpected response: {message}")]
    Decode {
        operation: Operation,
        message: String,
    },
}

impl RemoteError {
    pub fn transient(operation: Operation, message: impl Into<String>) -> Self {
        Self::Transient {
            operation,
            message: message.into(),
        }
    }

    pub fn rejected(operation: Operation, status: u16, message: impl Into<String>) -> Self {
        Self::Rejected {
            operation,
            status,
            message: message.into(),
        }
    }

    pub fn decode(operation: Operation, message: impl Into<String>) -> Self {
        Self::Decode {
            operation,
            message: message.into(),
        }
    }

    /// Build the error for a non-success HTTP status.
    pub fn from_status(operation: Operation, status: u16, message: impl Into<String>) -> Self {
        if is_transient_status(status) {
            Self::transient(operation, format!("HTTP {status}: {}", message.into()))
        } else {
            Self::rejected(operation, status, message)
        }
    }

    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Transient { .. })
    }

    pub fn operation(&self) -> Operation {
        match self {
            RemoteError::Transient { operation, .. }
            | RemoteError::Rejected { operation, .. }
            | RemoteError::Decode { operation, .. } => *operation,
        }
    }
}

/// 408 Request Timeout, 429 Too Many Requests and every 5xx.
pub fn is_transient_status(status: u16) -> bool {
    status == 408 || status == 429 || (500..600).contains(&status)
}
