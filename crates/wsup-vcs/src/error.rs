//! Error types for provider operations.
//!
//! [`VcsError`] is the single error type returned by all
//! [`VcsProvider`](crate::VcsProvider) and [`FileProvider`](crate::FileProvider)
//! methods. The variants mirror the classes of failure a repository host
//! reports over its API so callers can match on them without parsing messages.

use thiserror::Error;

/// Errors returned by provider operations.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum VcsError {
    /// A requested project, branch, commit, or merge request was not found.
    #[error("not found: {message}")]
    NotFound {
        /// Human-readable description of what was missing.
        message: String,
    },

    /// The host refused the action for the current credentials.
    #[error("forbidden: {message}")]
    Forbidden {
        /// Details from the host.
        message: String,
    },

    /// A network failure or server-side (5xx class) error. The only class
    /// worth retrying.
    #[error("transient failure: {message}")]
    Transient {
        /// Details about the failure.
        message: String,
    },

    /// The host rejected the request as invalid (4xx class other than 403/404),
    /// e.g. creating a file that already exists.
    #[error("rejected: {message}")]
    Rejected {
        /// Details about the rejection.
        message: String,
    },

    /// The backend returned an unclassified error.
    #[error("backend error: {message}")]
    Backend {
        /// Freeform error description from the backend.
        message: String,
    },
}

impl VcsError {
    /// Shorthand for [`VcsError::NotFound`].
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Shorthand for [`VcsError::Forbidden`].
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// Shorthand for [`VcsError::Transient`].
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    /// Shorthand for [`VcsError::Rejected`].
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    /// Returns `true` for [`VcsError::NotFound`].
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if repeating the same call may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}
