//! Error types for workspace operations.
//!
//! Every failure surfaced by the core is a [`WorkspaceError`]. Host errors are
//! turned into one in exactly one place, [`classify`], and always carry the
//! operation that was attempted, the project, and what it was attempted on.
//!
//! Best-effort cleanup failures never become a `WorkspaceError` the caller
//! sees; they are logged where they happen.

use std::fmt;

use thiserror::Error;
use wsup_vcs::{ProjectId, VcsError};

use crate::codec::InvalidWorkspaceId;

// ---------------------------------------------------------------------------
// ErrorKind
// ---------------------------------------------------------------------------

/// Caller-facing classification of a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The request itself was invalid (bad id, rejected action).
    BadRequest,
    /// An unknown project, workspace, revision or merge request.
    NotFound,
    /// The host denied the action.
    Forbidden,
    /// The request conflicts with the project's current state.
    Conflict,
    /// The operation could not be completed (transient errors that outlived
    /// their retries, timeouts, unclassified host errors).
    Failed,
    /// The host reported success without a usable result.
    ProtocolViolation,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::BadRequest => "bad request",
            Self::NotFound => "not found",
            Self::Forbidden => "forbidden",
            Self::Conflict => "conflict",
            Self::Failed => "failed",
            Self::ProtocolViolation => "protocol violation",
        })
    }
}

/// Map a host error onto the caller-facing taxonomy.
#[must_use]
pub const fn classify(err: &VcsError) -> ErrorKind {
    match err {
        VcsError::NotFound { .. } => ErrorKind::NotFound,
        VcsError::Forbidden { .. } => ErrorKind::Forbidden,
        VcsError::Rejected { .. } => ErrorKind::BadRequest,
        VcsError::Transient { .. } | VcsError::Backend { .. } => ErrorKind::Failed,
    }
}

// ---------------------------------------------------------------------------
// WorkspaceError
// ---------------------------------------------------------------------------

/// Errors returned by the lifecycle manager, staleness detector and update
/// orchestrator.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error(transparent)]
    InvalidWorkspaceId(#[from] InvalidWorkspaceId),

    /// The request cannot be served as asked.
    #[error("{operation}: {detail}")]
    BadRequest {
        operation: &'static str,
        detail: String,
    },

    /// The project lacks the structural setup workspaces depend on.
    #[error(
        "project {project} is not set up: '{path}' is missing on {branch}.\n  To fix: commit the project configuration to the default branch first."
    )]
    ProjectNotSetUp {
        project: ProjectId,
        branch: String,
        path: String,
    },

    /// A host call failed.
    #[error("{operation} failed for {target} in project {project} ({kind}): {source}")]
    Remote {
        kind: ErrorKind,
        operation: &'static str,
        project: ProjectId,
        target: String,
        #[source]
        source: VcsError,
    },

    /// A host call succeeded but the expected state never materialized
    /// (branch still missing or still present after verification).
    #[error("{operation} did not complete for {target} in project {project}: {detail}")]
    Incomplete {
        operation: &'static str,
        project: ProjectId,
        target: String,
        detail: String,
    },

    /// The host reported success without returning a usable object.
    #[error("protocol violation during {operation} for {target} in project {project}: {detail}")]
    Protocol {
        operation: &'static str,
        project: ProjectId,
        target: String,
        detail: String,
    },
}

impl WorkspaceError {
    /// The caller-facing class of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidWorkspaceId(_) | Self::BadRequest { .. } => ErrorKind::BadRequest,
            Self::ProjectNotSetUp { .. } => ErrorKind::Conflict,
            Self::Remote { kind, .. } => *kind,
            Self::Incomplete { .. } => ErrorKind::Failed,
            Self::Protocol { .. } => ErrorKind::ProtocolViolation,
        }
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self.kind(), ErrorKind::NotFound)
    }
}

// ---------------------------------------------------------------------------
// Op: contextual message builder
// ---------------------------------------------------------------------------

/// What was being attempted, on what. Builds contextual errors.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Op<'a> {
    pub name: &'static str,
    pub project: &'a ProjectId,
    pub target: &'a str,
}

impl<'a> Op<'a> {
    pub(crate) const fn new(name: &'static str, project: &'a ProjectId, target: &'a str) -> Self {
        Self {
            name,
            project,
            target,
        }
    }

    pub(crate) fn remote(self, source: VcsError) -> WorkspaceError {
        WorkspaceError::Remote {
            kind: classify(&source),
            operation: self.name,
            project: self.project.clone(),
            target: self.target.to_owned(),
            source,
        }
    }

    pub(crate) fn incomplete(self, detail: impl Into<String>) -> WorkspaceError {
        WorkspaceError::Incomplete {
            operation: self.name,
            project: self.project.clone(),
            target: self.target.to_owned(),
            detail: detail.into(),
        }
    }

    pub(crate) fn protocol(self, detail: impl Into<String>) -> WorkspaceError {
        WorkspaceError::Protocol {
            operation: self.name,
            project: self.project.clone(),
            target: self.target.to_owned(),
            detail: detail.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;
    use crate::codec::WorkspaceId;

    fn project() -> ProjectId {
        ProjectId::new("acme/site")
    }

    #[test]
    fn classify_maps_every_host_error() {
        assert_eq!(classify(&VcsError::not_found("x")), ErrorKind::NotFound);
        assert_eq!(classify(&VcsError::forbidden("x")), ErrorKind::Forbidden);
        assert_eq!(classify(&VcsError::rejected("x")), ErrorKind::BadRequest);
        assert_eq!(classify(&VcsError::transient("x")), ErrorKind::Failed);
        assert_eq!(
            classify(&VcsError::Backend {
                message: "x".to_owned()
            }),
            ErrorKind::Failed
        );
    }

    #[test]
    fn remote_error_carries_context_and_source() {
        let p = project();
        let err = Op::new("create branch", &p, "ws-user/alice").remote(VcsError::forbidden("no"));
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        let msg = err.to_string();
        assert!(msg.contains("create branch"), "{msg}");
        assert!(msg.contains("ws-user/alice"), "{msg}");
        assert!(msg.contains("acme/site"), "{msg}");
        assert!(msg.contains("forbidden"), "{msg}");
        assert!(err.source().is_some());
    }

    #[test]
    fn not_found_is_detected_through_kind() {
        let p = project();
        let err = Op::new("get branch", &p, "ws-user/x").remote(VcsError::not_found("branch"));
        assert!(err.is_not_found());
        let err = Op::new("get branch", &p, "ws-user/x").remote(VcsError::transient("502"));
        assert!(!err.is_not_found());
    }

    #[test]
    fn non_remote_kinds() {
        let p = project();
        let invalid: WorkspaceError = WorkspaceId::new("a..b").unwrap_err().into();
        assert_eq!(invalid.kind(), ErrorKind::BadRequest);
        assert!(invalid.to_string().contains("a..b"));

        let setup = WorkspaceError::ProjectNotSetUp {
            project: p.clone(),
            branch: "main".to_owned(),
            path: "project.json".to_owned(),
        };
        assert_eq!(setup.kind(), ErrorKind::Conflict);
        assert!(setup.to_string().contains("To fix"));

        let op = Op::new("delete branch", &p, "ws-user/x");
        assert_eq!(op.incomplete("still visible").kind(), ErrorKind::Failed);
        assert_eq!(
            op.protocol("host returned no branch").kind(),
            ErrorKind::ProtocolViolation
        );
    }
}
