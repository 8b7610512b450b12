//! Has the baseline moved past a workspace?
//!
//! A branch is up to date when its head equals the baseline head or when the
//! host lists it among the branches containing the baseline head. That
//! covers "equal" and "strict descendant" without walking history.

use tracing::debug;
use wsup_vcs::{Branch, ProjectId};

use crate::codec::{AccessType, WorkspaceId, WorkspaceKind};
use crate::context::Context;
use crate::error::WorkspaceError;
use crate::model::WorkspaceRef;
use crate::remote::Remote;

pub struct StalenessDetector {
    remote: Remote,
}

impl StalenessDetector {
    #[must_use]
    pub fn new(ctx: &Context) -> Self {
        Self {
            remote: ctx.remote(),
        }
    }

    /// `true` if the baseline head is not part of the branch's history.
    pub fn is_outdated(&self, reference: &WorkspaceRef) -> Result<bool, WorkspaceError> {
        let project = reference.project();
        let branch = self.remote.get_branch(project, &reference.branch_name())?;
        let baseline = self.remote.baseline(project)?;
        let outdated = !contains_baseline(&self.remote, project, &branch, &baseline)?;
        debug!(
            project = %project,
            branch = %branch.name,
            revision = %branch.head_id(),
            baseline = %baseline.head_id(),
            outdated,
            "staleness checked"
        );
        Ok(outdated)
    }

    pub fn is_workspace_outdated(
        &self,
        project: &ProjectId,
        id: &WorkspaceId,
        kind: WorkspaceKind,
    ) -> Result<bool, WorkspaceError> {
        self.is_outdated(&WorkspaceRef::workspace(project.clone(), id.clone(), kind))
    }

    pub fn is_conflict_resolution_outdated(
        &self,
        project: &ProjectId,
        id: &WorkspaceId,
        kind: WorkspaceKind,
    ) -> Result<bool, WorkspaceError> {
        self.is_outdated(&WorkspaceRef::new(
            project.clone(),
            id.clone(),
            kind,
            AccessType::ConflictResolution,
        ))
    }

    pub fn is_backup_outdated(
        &self,
        project: &ProjectId,
        id: &WorkspaceId,
        kind: WorkspaceKind,
    ) -> Result<bool, WorkspaceError> {
        self.is_outdated(&WorkspaceRef::new(
            project.clone(),
            id.clone(),
            kind,
            AccessType::Backup,
        ))
    }

    /// `true` if the workspace exists and has a conflict-resolution branch.
    ///
    /// A missing workspace is an error; a missing conflict-resolution branch
    /// is simply `false`.
    pub fn is_in_conflict_resolution_mode(
        &self,
        project: &ProjectId,
        id: &WorkspaceId,
        kind: WorkspaceKind,
    ) -> Result<bool, WorkspaceError> {
        let reference = WorkspaceRef::workspace(project.clone(), id.clone(), kind);
        self.remote.get_branch(project, &reference.branch_name())?;
        let resolve = reference
            .with_access(AccessType::ConflictResolution)
            .branch_name();
        Ok(self.remote.find_branch(project, &resolve)?.is_some())
    }
}

/// `true` if `branch` already holds the baseline head.
pub(crate) fn contains_baseline(
    remote: &Remote,
    project: &ProjectId,
    branch: &Branch,
    baseline: &Branch,
) -> Result<bool, WorkspaceError> {
    if branch.head_id() == baseline.head_id() {
        return Ok(true);
    }
    let containing = remote.branches_containing(project, baseline.head_id())?;
    Ok(containing.iter().any(|name| *name == branch.name))
}
