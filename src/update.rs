//! The update orchestrator.
//!
//! Drives a workspace to one of three terminal reports:
//!
//! 1. `NO_OP` if the workspace already holds the baseline head.
//! 2. `UPDATED` if a rebase of the workspace branch succeeds, or, when the
//!    workspace has two or more commits beyond the merge base, a rebase of
//!    the squashed workspace succeeds.
//! 3. `CONFLICT` otherwise, after building the conflict-resolution branch.
//!
//! Once a rebase or squash commit has been issued the call runs to one of
//! these reports or returns an error; it cannot be cancelled midway.

use std::sync::Arc;

use tracing::{debug, info, info_span};
use wsup_vcs::ProjectId;

use crate::cleanup::{self, Pipelines};
use crate::codec::{self, AccessType, WorkspaceId, WorkspaceKind};
use crate::conflict;
use crate::context::Context;
use crate::error::WorkspaceError;
use crate::model::{UpdateStatus, WorkspaceRef, WorkspaceUpdateReport};
use crate::rebase::{RebaseOutcome, Rebaser};
use crate::remote::Remote;
use crate::revisions::{BranchRevisions, RevisionProvider};
use crate::scheduler::Scheduler;
use crate::squash::{self, SquashOutcome};
use crate::staleness;

pub struct WorkspaceUpdater {
    remote: Remote,
    scheduler: Arc<dyn Scheduler>,
    revisions: Arc<dyn RevisionProvider>,
}

impl WorkspaceUpdater {
    #[must_use]
    pub fn new(ctx: &Context) -> Self {
        let revisions = Arc::new(BranchRevisions::new(ctx.remote()));
        Self::with_revisions(ctx, revisions)
    }

    #[must_use]
    pub fn with_revisions(ctx: &Context, revisions: Arc<dyn RevisionProvider>) -> Self {
        Self {
            remote: ctx.remote(),
            scheduler: Arc::clone(&ctx.scheduler),
            revisions,
        }
    }

    pub fn update_workspace(
        &self,
        project: &ProjectId,
        id: &WorkspaceId,
        kind: WorkspaceKind,
    ) -> Result<WorkspaceUpdateReport, WorkspaceError> {
        self.update(&WorkspaceRef::workspace(project.clone(), id.clone(), kind))
    }

    /// Bring the workspace up to date with the baseline.
    pub fn update(
        &self,
        reference: &WorkspaceRef,
    ) -> Result<WorkspaceUpdateReport, WorkspaceError> {
        if reference.access() != AccessType::Workspace {
            return Err(WorkspaceError::BadRequest {
                operation: "update workspace",
                detail: format!("{reference} cannot be updated; only workspaces can"),
            });
        }
        let project = reference.project();
        let span = info_span!(
            "update_workspace",
            project = %project,
            workspace = %reference.id(),
            kind = reference.kind().label()
        );
        let _guard = span.enter();

        let workspace = self.remote.get_branch(project, &reference.branch_name())?;
        let baseline = self.remote.baseline(project)?;
        let head = workspace.head_id().clone();
        let observed = baseline.head_id().clone();

        if staleness::contains_baseline(&self.remote, project, &workspace, &baseline)? {
            info!(revision = %head, baseline = %observed, "workspace already up to date");
            return Ok(WorkspaceUpdateReport::new(UpdateStatus::NoOp, observed, head));
        }

        let rebaser = Rebaser {
            remote: &self.remote,
            scheduler: self.scheduler.as_ref(),
        };

        // Tier 1: rebase the workspace as is.
        let temp = codec::temporary_branch_name();
        if let Err(e) = self.remote.create_branch(project, &temp, head.as_str()) {
            cleanup::schedule_branch_deletion(
                &self.remote,
                self.scheduler.as_ref(),
                project,
                &temp,
                Pipelines::Wait,
            );
            return Err(e);
        }
        match rebaser.run(reference, &temp, &baseline.name)? {
            RebaseOutcome::Rebased(branch) => {
                info!(revision = %branch.head_id(), baseline = %observed, "workspace rebased");
                return Ok(WorkspaceUpdateReport::new(
                    UpdateStatus::Updated,
                    observed,
                    branch.head.id,
                ));
            }
            RebaseOutcome::Failed(reason) => info!(reason = %reason, "rebase failed"),
        }

        // Tier 2: squash, but only if there is more than one commit to squash.
        let merge_base = self
            .remote
            .merge_base(project, &baseline.name, head.as_str())?;
        let recent = self.revisions.recent_revisions(reference, 2)?;
        if recent.iter().any(|c| c.id == merge_base.id) {
            debug!(merge_base = %merge_base.id, "single commit beyond merge base; skipping squash");
        } else {
            match squash::squash_and_retry(&rebaser, reference, &head, &merge_base, &baseline.name)?
            {
                SquashOutcome::Updated(branch) => {
                    info!(revision = %branch.head_id(), baseline = %observed, "squashed workspace rebased");
                    return Ok(WorkspaceUpdateReport::new(
                        UpdateStatus::Updated,
                        observed,
                        branch.head.id,
                    ));
                }
                SquashOutcome::Conflict => {}
            }
        }

        // Tier 3: hand the net change over for manual resolution.
        conflict::build_conflict_branch(&self.remote, reference, &head, &merge_base.id, &observed)
    }
}
