//! Core value types: references to workspace branches and update reports.

use std::fmt;

use serde::{Deserialize, Serialize};
use wsup_vcs::{Branch, CommitId, ProjectId};

use crate::codec::{self, AccessType, WorkspaceId, WorkspaceKind};

/// Identifies exactly one branch on the host. Immutable once built; use
/// [`with_access`](Self::with_access) to address a sibling branch.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkspaceRef {
    project: ProjectId,
    id: WorkspaceId,
    kind: WorkspaceKind,
    access: AccessType,
}

impl WorkspaceRef {
    #[must_use]
    pub const fn new(
        project: ProjectId,
        id: WorkspaceId,
        kind: WorkspaceKind,
        access: AccessType,
    ) -> Self {
        Self {
            project,
            id,
            kind,
            access,
        }
    }

    /// Reference to the primary workspace branch.
    #[must_use]
    pub const fn workspace(project: ProjectId, id: WorkspaceId, kind: WorkspaceKind) -> Self {
        Self::new(project, id, kind, AccessType::Workspace)
    }

    #[must_use]
    pub const fn project(&self) -> &ProjectId {
        &self.project
    }

    #[must_use]
    pub const fn id(&self) -> &WorkspaceId {
        &self.id
    }

    #[must_use]
    pub const fn kind(&self) -> WorkspaceKind {
        self.kind
    }

    #[must_use]
    pub const fn access(&self) -> AccessType {
        self.access
    }

    /// The same workspace, addressed through another access type.
    #[must_use]
    pub fn with_access(&self, access: AccessType) -> Self {
        Self {
            access,
            ..self.clone()
        }
    }

    /// The host branch name this reference encodes to.
    #[must_use]
    pub fn branch_name(&self) -> String {
        codec::encode(self.kind, self.access, &self.id)
    }
}

impl fmt::Display for WorkspaceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} '{}'",
            self.kind.label(),
            self.access.label(),
            self.id
        )
    }
}

/// A workspace branch as it currently exists on the host.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Workspace {
    reference: WorkspaceRef,
    branch: String,
    head: CommitId,
}

impl Workspace {
    pub(crate) fn from_branch(reference: WorkspaceRef, branch: Branch) -> Self {
        Self {
            reference,
            head: branch.head.id,
            branch: branch.name,
        }
    }

    #[must_use]
    pub const fn reference(&self) -> &WorkspaceRef {
        &self.reference
    }

    /// Host branch name.
    #[must_use]
    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Head commit when the branch was read.
    #[must_use]
    pub const fn head(&self) -> &CommitId {
        &self.head
    }
}

/// Terminal state of an update attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateStatus {
    /// The workspace already contained the baseline head. Nothing changed.
    NoOp,
    /// The workspace branch was re-pointed onto the baseline.
    Updated,
    /// Automatic update failed; a conflict-resolution branch was built.
    Conflict,
}

impl fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NoOp => "NO_OP",
            Self::Updated => "UPDATED",
            Self::Conflict => "CONFLICT",
        })
    }
}

/// The sole externally observable result of an update attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceUpdateReport {
    pub status: UpdateStatus,
    /// Baseline head observed when the attempt began.
    pub baseline_revision_id: CommitId,
    /// Workspace head for `NO_OP`/`UPDATED`, conflict branch head for
    /// `CONFLICT`.
    pub resulting_revision_id: CommitId,
}

impl WorkspaceUpdateReport {
    #[must_use]
    pub const fn new(status: UpdateStatus, baseline: CommitId, resulting: CommitId) -> Self {
        Self {
            status,
            baseline_revision_id: baseline,
            resulting_revision_id: resulting,
        }
    }
}
