//! Squash the workspace into one commit and retry the rebase.
//!
//! A per-commit rebase fails when any intermediate commit conflicts with the
//! baseline, even if the net change would apply cleanly. Rebasing a single
//! commit carrying the net change separates the two cases.

use tracing::{debug, info};
use wsup_vcs::{Branch, ChangeKind, Commit, CommitAction, CommitId, DiffEntry, ProjectId};

use crate::cleanup::{self, Pipelines};
use crate::codec;
use crate::error::{Op, WorkspaceError};
use crate::model::WorkspaceRef;
use crate::rebase::{RebaseOutcome, Rebaser};
use crate::remote::Remote;

#[derive(Debug)]
pub(crate) enum SquashOutcome {
    Updated(Branch),
    Conflict,
}

pub(crate) fn squash_and_retry(
    rebaser: &Rebaser<'_>,
    reference: &WorkspaceRef,
    workspace_head: &CommitId,
    merge_base: &Commit,
    baseline: &str,
) -> Result<SquashOutcome, WorkspaceError> {
    let remote = rebaser.remote;
    let project = reference.project();
    let temp = codec::temporary_branch_name();

    if let Err(e) = prepare(remote, project, &temp, workspace_head, &merge_base.id) {
        cleanup::schedule_branch_deletion(remote, rebaser.scheduler, project, &temp, Pipelines::Wait);
        return Err(e);
    }

    match rebaser.run(reference, &temp, baseline)? {
        RebaseOutcome::Rebased(branch) => Ok(SquashOutcome::Updated(branch)),
        RebaseOutcome::Failed(reason) => {
            info!(project = %project, workspace = %reference.id(), reason = %reason, "squashed rebase failed");
            Ok(SquashOutcome::Conflict)
        }
    }
}

/// Put the workspace's net change on `temp` as one commit on top of the
/// merge base.
fn prepare(
    remote: &Remote,
    project: &ProjectId,
    temp: &str,
    workspace_head: &CommitId,
    merge_base: &CommitId,
) -> Result<(), WorkspaceError> {
    remote.create_branch(project, temp, merge_base.as_str())?;
    let diff = remote.compare(project, merge_base.as_str(), workspace_head.as_str())?;
    let actions = squash_actions(remote, project, workspace_head, &diff)?;
    if actions.is_empty() {
        debug!(project = %project, branch = temp, "no net change to squash");
        return Ok(());
    }
    let message = format!("Squash {} change(s) from {workspace_head}", diff.len());
    let commit = remote.create_commit(project, temp, &message, &actions)?;
    debug!(project = %project, branch = temp, revision = %commit.id, actions = actions.len(), "squashed");
    Ok(())
}

/// Translate a diff into actions against the merge base. Renames become a
/// delete plus a create so the new path gets the workspace's content.
fn squash_actions(
    remote: &Remote,
    project: &ProjectId,
    workspace_head: &CommitId,
    diff: &[DiffEntry],
) -> Result<Vec<CommitAction>, WorkspaceError> {
    let content = |path: &str| -> Result<Vec<u8>, WorkspaceError> {
        remote
            .read_file(project, workspace_head.as_str(), path)?
            .ok_or_else(|| {
                Op::new("squash workspace", project, path)
                    .protocol(format!("file listed by compare is missing at {workspace_head}"))
            })
    };

    let mut actions = Vec::with_capacity(diff.len());
    for entry in diff {
        match entry.kind {
            ChangeKind::Deleted => actions.push(CommitAction::Delete {
                path: entry.old_path.clone(),
            }),
            ChangeKind::Renamed => {
                actions.push(CommitAction::Delete {
                    path: entry.old_path.clone(),
                });
                actions.push(CommitAction::Create {
                    path: entry.new_path.clone(),
                    content: content(&entry.new_path)?,
                });
            }
            ChangeKind::Added => actions.push(CommitAction::Create {
                path: entry.new_path.clone(),
                content: content(&entry.new_path)?,
            }),
            ChangeKind::Modified => actions.push(CommitAction::Update {
                path: entry.new_path.clone(),
                content: content(&entry.new_path)?,
            }),
        }
    }
    Ok(actions)
}
