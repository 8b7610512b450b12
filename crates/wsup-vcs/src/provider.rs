//! The provider traits: the only way the wsup core talks to a repository host.
//!
//! The host is assumed to offer coarse primitives only: named branches,
//! commits built from file actions, revision comparison, and merge requests
//! with an asynchronous rebase. There is no transaction support; the core
//! sequences these calls itself.
//!
//! | Group          | Methods                                                   |
//! |----------------|-----------------------------------------------------------|
//! | Project        | `default_branch`                                          |
//! | Branches       | `get_branch`, `list_branches`, `create_branch`, `delete_branch` |
//! | History        | `commit_refs`, `merge_base`, `list_commits`, `compare`    |
//! | Commits        | `create_commit`                                           |
//! | Merge requests | `create_merge_request`, `rebase_merge_request`, `rebase_status`, `close_merge_request` |
//! | Pipelines      | `running_pipelines`                                       |
//! | Files          | `read_file` ([`FileProvider`])                            |
//!
//! Both traits are object-safe; the core holds an `Arc<dyn Host>`.

use crate::error::VcsError;
use crate::types::{
    Branch, Commit, CommitAction, CommitId, DiffEntry, MergeRequest, ProjectId, RebaseStatus,
    RefType,
};

/// Branch, history, commit and merge-request operations on a host.
///
/// Revisions passed as `&str` accept either a branch name or a commit id.
pub trait VcsProvider {
    // -----------------------------------------------------------------------
    // Project
    // -----------------------------------------------------------------------

    /// Name of the project's default branch (the baseline).
    fn default_branch(&self, project: &ProjectId) -> Result<String, VcsError>;

    // -----------------------------------------------------------------------
    // Branches
    // -----------------------------------------------------------------------

    /// Fetch one branch by exact name.
    ///
    /// Returns [`VcsError::NotFound`] if the branch does not exist.
    fn get_branch(&self, project: &ProjectId, name: &str) -> Result<Branch, VcsError>;

    /// List branches whose name matches `search`.
    ///
    /// Hosts implement this as a search, so the result may be a superset of
    /// the branches that literally start with `search`. Callers filter.
    fn list_branches(&self, project: &ProjectId, search: &str) -> Result<Vec<Branch>, VcsError>;

    /// Create branch `name` at `from_revision`.
    ///
    /// `Ok(None)` means the host acknowledged the call but returned nothing,
    /// which callers treat as a protocol violation.
    fn create_branch(
        &self,
        project: &ProjectId,
        name: &str,
        from_revision: &str,
    ) -> Result<Option<Branch>, VcsError>;

    /// Delete branch `name`. Returns `false` if the host reports it kept the
    /// branch.
    fn delete_branch(&self, project: &ProjectId, name: &str) -> Result<bool, VcsError>;

    // -----------------------------------------------------------------------
    // History
    // -----------------------------------------------------------------------

    /// Names of the refs whose history contains `commit`.
    fn commit_refs(
        &self,
        project: &ProjectId,
        commit: &CommitId,
        ref_type: RefType,
    ) -> Result<Vec<String>, VcsError>;

    /// The best common ancestor of two revisions.
    fn merge_base(&self, project: &ProjectId, a: &str, b: &str) -> Result<Commit, VcsError>;

    /// First-parent history of `revision`, newest first, at most `limit` commits.
    fn list_commits(
        &self,
        project: &ProjectId,
        revision: &str,
        limit: usize,
    ) -> Result<Vec<Commit>, VcsError>;

    /// File-level changes needed to go from `base` to `head`.
    fn compare(&self, project: &ProjectId, base: &str, head: &str)
    -> Result<Vec<DiffEntry>, VcsError>;

    // -----------------------------------------------------------------------
    // Commits
    // -----------------------------------------------------------------------

    /// Apply `actions` as one new commit on top of `branch` and advance it.
    fn create_commit(
        &self,
        project: &ProjectId,
        branch: &str,
        message: &str,
        author: &str,
        actions: &[CommitAction],
    ) -> Result<Commit, VcsError>;

    // -----------------------------------------------------------------------
    // Merge requests
    // -----------------------------------------------------------------------

    /// Open a merge request from `source` into `target`.
    fn create_merge_request(
        &self,
        project: &ProjectId,
        source: &str,
        target: &str,
        title: &str,
        description: &str,
    ) -> Result<MergeRequest, VcsError>;

    /// Ask the host to rebase the merge request's source branch onto its
    /// target. Returns immediately; progress is read with
    /// [`rebase_status`](Self::rebase_status).
    fn rebase_merge_request(&self, project: &ProjectId, iid: u64) -> Result<(), VcsError>;

    /// Current state of the last requested rebase.
    fn rebase_status(&self, project: &ProjectId, iid: u64) -> Result<RebaseStatus, VcsError>;

    /// Close the merge request without merging.
    fn close_merge_request(&self, project: &ProjectId, iid: u64) -> Result<(), VcsError>;

    // -----------------------------------------------------------------------
    // Pipelines
    // -----------------------------------------------------------------------

    /// Number of pipelines still running against `branch`.
    fn running_pipelines(&self, project: &ProjectId, branch: &str) -> Result<usize, VcsError>;
}

/// Read access to file content at a revision.
pub trait FileProvider {
    /// Content of `path` at `revision`, or `None` if the path does not exist
    /// there.
    fn read_file(
        &self,
        project: &ProjectId,
        revision: &str,
        path: &str,
    ) -> Result<Option<Vec<u8>>, VcsError>;
}

/// Everything the core needs from a host, shareable across threads.
pub trait Host: VcsProvider + FileProvider + Send + Sync {}

impl<T> Host for T where T: VcsProvider + FileProvider + Send + Sync {}
