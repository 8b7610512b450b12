//! One rebase attempt through a throwaway merge request.
//!
//! ```text
//! open MR tmp -> baseline
//! request rebase, poll status (bounded)
//!   merge error / still running  -> Failed
//!   done:
//!     create backup-* from ws-*
//!     delete ws-*
//!     create ws-* at rebased tmp head
//!     delete backup-*            (best-effort)
//! close MR                       (always, best-effort)
//! schedule deletion of tmp       (always, after pipelines finish)
//! ```
//!
//! Everything between "done" and the backup deletion re-points the
//! workspace, so any host error there is returned to the caller.

use tracing::{debug, info, warn};
use wsup_vcs::{Branch, CommitId, MergeRequest};

use crate::cleanup::{self, Pipelines};
use crate::codec::AccessType;
use crate::error::WorkspaceError;
use crate::model::WorkspaceRef;
use crate::remote::Remote;
use crate::scheduler::Scheduler;

#[derive(Debug)]
pub(crate) enum RebaseOutcome {
    /// The workspace branch now points at the rebased commit.
    Rebased(Branch),
    /// The host could not rebase; nothing was changed.
    Failed(String),
}

pub(crate) struct Rebaser<'a> {
    pub remote: &'a Remote,
    pub scheduler: &'a dyn Scheduler,
}

impl Rebaser<'_> {
    /// Rebase `temp_branch` onto `baseline` and, on success, move the
    /// workspace to the result.
    ///
    /// Takes ownership of `temp_branch`: it is scheduled for deletion on
    /// every path out of this function.
    pub(crate) fn run(
        &self,
        reference: &WorkspaceRef,
        temp_branch: &str,
        baseline: &str,
    ) -> Result<RebaseOutcome, WorkspaceError> {
        let project = reference.project();
        let opened = self.remote.open_merge_request(
            project,
            temp_branch,
            baseline,
            &format!("Update {}", reference.branch_name()),
            "Opened to rebase a workspace; closed automatically.",
        );
        let outcome = match opened {
            Ok(request) => {
                let outcome = self.drive(reference, &request);
                if let Err(e) = self.remote.close_merge_request(project, &request) {
                    warn!(project = %project, iid = request.iid, error = %e, "could not close merge request");
                }
                outcome
            }
            Err(e) => Err(e),
        };
        cleanup::schedule_branch_deletion(
            self.remote,
            self.scheduler,
            project,
            temp_branch,
            Pipelines::Wait,
        );
        outcome
    }

    fn drive(
        &self,
        reference: &WorkspaceRef,
        request: &MergeRequest,
    ) -> Result<RebaseOutcome, WorkspaceError> {
        let project = reference.project();
        self.remote.request_rebase(project, request)?;

        let poll = self.remote.settings().rebase_poll();
        let status = poll.poll(
            self.remote.sleeper(),
            || self.remote.rebase_status(project, request),
            |status| !status.in_progress,
        )?;
        let Some(status) = status else {
            return Ok(RebaseOutcome::Failed(format!(
                "rebase still in progress after {} polls",
                poll.attempts
            )));
        };
        if let Some(error) = status.merge_error {
            return Ok(RebaseOutcome::Failed(error));
        }

        let rebased = self.remote.get_branch(project, &request.source_branch)?;
        debug!(project = %project, branch = %rebased.name, revision = %rebased.head_id(), "rebase finished");
        let branch = self.repoint(reference, rebased.head_id())?;
        Ok(RebaseOutcome::Rebased(branch))
    }

    /// Move the workspace branch to `revision`, keeping a backup until the
    /// new branch is in place.
    fn repoint(
        &self,
        reference: &WorkspaceRef,
        revision: &CommitId,
    ) -> Result<Branch, WorkspaceError> {
        let project = reference.project();
        let workspace = reference.branch_name();
        let backup = reference.with_access(AccessType::Backup).branch_name();

        self.remote.create_branch(project, &backup, &workspace)?;
        self.remote.delete_branch(project, &workspace)?;
        let branch = self
            .remote
            .create_branch(project, &workspace, revision.as_str())?;
        info!(project = %project, branch = %workspace, revision = %branch.head_id(), "workspace re-pointed");

        if let Err(e) = self.remote.delete_branch(project, &backup) {
            warn!(project = %project, branch = %backup, error = %e, "could not delete backup; retrying in background");
            cleanup::schedule_branch_deletion(
                self.remote,
                self.scheduler,
                project,
                &backup,
                Pipelines::Ignore,
            );
        }
        Ok(branch)
    }
}
