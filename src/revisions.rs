//! Reading a workspace branch's recent history.

use wsup_vcs::Commit;

use crate::error::WorkspaceError;
use crate::model::WorkspaceRef;
use crate::remote::Remote;

/// Current and recent commits of the branch a [`WorkspaceRef`] names.
pub trait RevisionProvider: Send + Sync {
    /// The branch head.
    fn current_revision(&self, reference: &WorkspaceRef) -> Result<Commit, WorkspaceError>;

    /// Up to `n` commits of first-parent history, newest first.
    fn recent_revisions(
        &self,
        reference: &WorkspaceRef,
        n: usize,
    ) -> Result<Vec<Commit>, WorkspaceError>;
}

/// [`RevisionProvider`] backed by the host's branch history.
#[derive(Clone)]
pub struct BranchRevisions {
    remote: Remote,
}

impl BranchRevisions {
    #[must_use]
    pub const fn new(remote: Remote) -> Self {
        Self { remote }
    }
}

impl RevisionProvider for BranchRevisions {
    fn current_revision(&self, reference: &WorkspaceRef) -> Result<Commit, WorkspaceError> {
        let branch = self
            .remote
            .get_branch(reference.project(), &reference.branch_name())?;
        Ok(branch.head)
    }

    fn recent_revisions(
        &self,
        reference: &WorkspaceRef,
        n: usize,
    ) -> Result<Vec<Commit>, WorkspaceError> {
        self.remote
            .list_commits(reference.project(), &reference.branch_name(), n)
    }
}
