//! Host access with retries, verification, and error context.
//!
//! Reads are retried on transient failures. Mutations are issued once, since
//! repeating a create or commit that actually landed would fail or duplicate
//! it. Branch creation and deletion are followed by a bounded poll until the
//! host shows the new state, because hosts serve branch reads from replicas
//! that lag behind writes.

use std::sync::Arc;

use tracing::debug;
use wsup_vcs::{
    Branch, Commit, CommitAction, CommitId, DiffEntry, Host, MergeRequest, ProjectId,
    RebaseStatus, RefType, VcsError,
};

use crate::config::Settings;
use crate::error::{Op, WorkspaceError};
use crate::retry::Sleeper;

/// A shareable handle on the host plus the policies used to talk to it.
#[derive(Clone)]
pub struct Remote {
    host: Arc<dyn Host>,
    sleeper: Arc<dyn Sleeper>,
    settings: Arc<Settings>,
}

impl Remote {
    #[must_use]
    pub fn new(host: Arc<dyn Host>, sleeper: Arc<dyn Sleeper>, settings: Arc<Settings>) -> Self {
        Self {
            host,
            sleeper,
            settings,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[must_use]
    pub fn sleeper(&self) -> &dyn Sleeper {
        self.sleeper.as_ref()
    }

    fn read<T>(
        &self,
        op: Op<'_>,
        mut f: impl FnMut(&dyn Host) -> Result<T, VcsError>,
    ) -> Result<T, WorkspaceError> {
        self.settings
            .retry_policy()
            .run(self.sleeper.as_ref(), op.name, || f(self.host.as_ref()))
            .map_err(|e| op.remote(e))
    }

    fn write<T>(
        &self,
        op: Op<'_>,
        f: impl FnOnce(&dyn Host) -> Result<T, VcsError>,
    ) -> Result<T, WorkspaceError> {
        f(self.host.as_ref()).map_err(|e| op.remote(e))
    }

    // -----------------------------------------------------------------------
    // Branches
    // -----------------------------------------------------------------------

    pub fn default_branch(&self, project: &ProjectId) -> Result<String, WorkspaceError> {
        self.read(Op::new("read default branch", project, "project"), |h| {
            h.default_branch(project)
        })
    }

    /// The baseline branch with its current head.
    pub fn baseline(&self, project: &ProjectId) -> Result<Branch, WorkspaceError> {
        let name = self.default_branch(project)?;
        self.get_branch(project, &name)
    }

    pub fn get_branch(&self, project: &ProjectId, name: &str) -> Result<Branch, WorkspaceError> {
        self.read(Op::new("get branch", project, name), |h| {
            h.get_branch(project, name)
        })
    }

    /// Like [`get_branch`](Self::get_branch), but a missing branch is `None`.
    pub fn find_branch(
        &self,
        project: &ProjectId,
        name: &str,
    ) -> Result<Option<Branch>, WorkspaceError> {
        match self.get_branch(project, name) {
            Ok(branch) => Ok(Some(branch)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn list_branches(
        &self,
        project: &ProjectId,
        search: &str,
    ) -> Result<Vec<Branch>, WorkspaceError> {
        self.read(Op::new("list branches", project, search), |h| {
            h.list_branches(project, search)
        })
    }

    /// Create `name` at `from_revision` and wait until the host serves it.
    pub fn create_branch(
        &self,
        project: &ProjectId,
        name: &str,
        from_revision: &str,
    ) -> Result<Branch, WorkspaceError> {
        let op = Op::new("create branch", project, name);
        let created = self.write(op, |h| h.create_branch(project, name, from_revision))?;
        if created.is_none() {
            return Err(op.protocol(format!(
                "host acknowledged creating the branch from {from_revision} but returned none"
            )));
        }

        let poll = self.settings.create_verify_poll();
        let visible = poll.poll(
            self.sleeper.as_ref(),
            || match self.host.get_branch(project, name) {
                Ok(branch) => Ok(Some(branch)),
                Err(e) if e.is_not_found() || e.is_retryable() => Ok(None),
                Err(e) => Err(op.remote(e)),
            },
            Option::is_some,
        )?;
        match visible.flatten() {
            Some(branch) => {
                debug!(project = %project, branch = name, head = %branch.head_id(), "branch created");
                Ok(branch)
            }
            None => Err(op.incomplete(format!(
                "branch not visible after {} checks",
                poll.attempts
            ))),
        }
    }

    /// Delete `name` and wait until the host stops serving it.
    pub fn delete_branch(&self, project: &ProjectId, name: &str) -> Result<(), WorkspaceError> {
        let op = Op::new("delete branch", project, name);
        if !self.write(op, |h| h.delete_branch(project, name))? {
            return Err(op.incomplete("host reported the branch was not deleted"));
        }

        let poll = self.settings.delete_verify_poll();
        let gone = poll.poll(
            self.sleeper.as_ref(),
            || match self.host.get_branch(project, name) {
                Ok(_) => Ok(false),
                Err(e) if e.is_not_found() => Ok(true),
                Err(e) if e.is_retryable() => Ok(false),
                Err(e) => Err(op.remote(e)),
            },
            |gone| *gone,
        )?;
        if gone.is_none() {
            return Err(op.incomplete(format!(
                "branch still visible after {} checks",
                poll.attempts
            )));
        }
        debug!(project = %project, branch = name, "branch deleted");
        Ok(())
    }

    /// Delete `name` if it exists. Returns whether there was anything to
    /// delete.
    pub fn delete_branch_if_exists(
        &self,
        project: &ProjectId,
        name: &str,
    ) -> Result<bool, WorkspaceError> {
        if self.find_branch(project, name)?.is_none() {
            return Ok(false);
        }
        match self.delete_branch(project, name) {
            Ok(()) => Ok(true),
            // Someone else got there first.
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    // -----------------------------------------------------------------------
    // History and files
    // -----------------------------------------------------------------------

    /// Names of the branches whose history contains `commit`.
    pub fn branches_containing(
        &self,
        project: &ProjectId,
        commit: &CommitId,
    ) -> Result<Vec<String>, WorkspaceError> {
        self.read(Op::new("list refs of commit", project, commit.as_str()), |h| {
            h.commit_refs(project, commit, RefType::Branch)
        })
    }

    pub fn merge_base(
        &self,
        project: &ProjectId,
        a: &str,
        b: &str,
    ) -> Result<Commit, WorkspaceError> {
        let target = format!("{a}...{b}");
        self.read(Op::new("find merge base", project, &target), |h| {
            h.merge_base(project, a, b)
        })
    }

    pub fn list_commits(
        &self,
        project: &ProjectId,
        revision: &str,
        limit: usize,
    ) -> Result<Vec<Commit>, WorkspaceError> {
        self.read(Op::new("list commits", project, revision), |h| {
            h.list_commits(project, revision, limit)
        })
    }

    pub fn compare(
        &self,
        project: &ProjectId,
        base: &str,
        head: &str,
    ) -> Result<Vec<DiffEntry>, WorkspaceError> {
        let target = format!("{base}..{head}");
        self.read(Op::new("compare revisions", project, &target), |h| {
            h.compare(project, base, head)
        })
    }

    pub fn read_file(
        &self,
        project: &ProjectId,
        revision: &str,
        path: &str,
    ) -> Result<Option<Vec<u8>>, WorkspaceError> {
        let target = format!("{revision}:{path}");
        self.read(Op::new("read file", project, &target), |h| {
            h.read_file(project, revision, path)
        })
    }

    /// Commit `actions` on `branch` as the configured author.
    pub fn create_commit(
        &self,
        project: &ProjectId,
        branch: &str,
        message: &str,
        actions: &[CommitAction],
    ) -> Result<Commit, WorkspaceError> {
        let author = &self.settings.commit.author;
        self.write(Op::new("create commit", project, branch), |h| {
            h.create_commit(project, branch, message, author, actions)
        })
    }

    // -----------------------------------------------------------------------
    // Merge requests and pipelines
    // -----------------------------------------------------------------------

    pub fn open_merge_request(
        &self,
        project: &ProjectId,
        source: &str,
        target: &str,
        title: &str,
        description: &str,
    ) -> Result<MergeRequest, WorkspaceError> {
        self.write(Op::new("open merge request", project, source), |h| {
            h.create_merge_request(project, source, target, title, description)
        })
    }

    pub fn request_rebase(
        &self,
        project: &ProjectId,
        request: &MergeRequest,
    ) -> Result<(), WorkspaceError> {
        self.write(
            Op::new("request rebase", project, &request.source_branch),
            |h| h.rebase_merge_request(project, request.iid),
        )
    }

    pub fn rebase_status(
        &self,
        project: &ProjectId,
        request: &MergeRequest,
    ) -> Result<RebaseStatus, WorkspaceError> {
        self.read(
            Op::new("read rebase status", project, &request.source_branch),
            |h| h.rebase_status(project, request.iid),
        )
    }

    pub fn close_merge_request(
        &self,
        project: &ProjectId,
        request: &MergeRequest,
    ) -> Result<(), WorkspaceError> {
        self.write(
            Op::new("close merge request", project, &request.source_branch),
            |h| h.close_merge_request(project, request.iid),
        )
    }

    /// Wait until no pipeline runs on `branch`. Returns `false` if some were
    /// still running when the wait ran out.
    pub fn wait_for_pipelines(
        &self,
        project: &ProjectId,
        branch: &str,
    ) -> Result<bool, WorkspaceError> {
        let idle = self.settings.pipeline_wait_poll().poll(
            self.sleeper.as_ref(),
            || {
                self.read(Op::new("list pipelines", project, branch), |h| {
                    h.running_pipelines(project, branch)
                })
            },
            |running| *running == 0,
        )?;
        Ok(idle.is_some())
    }
}
