//! Build the conflict-resolution branch.
//!
//! The branch starts fresh at the baseline head and receives the workspace's
//! net change as one commit. Each action is chosen by looking at what the
//! baseline holds now, not at what the diff assumed, since the baseline may
//! have moved since the workspace was created:
//!
//! | Diff says | Baseline has path       | Action                    |
//! |-----------|-------------------------|---------------------------|
//! | deleted   | yes / no                | delete / nothing          |
//! | renamed   | old: yes / no           | delete old / nothing      |
//! |           | new: yes / no           | update new / create new   |
//! | added     | yes / no                | update / create           |
//! | modified  | yes / no                | update / create           |
//!
//! Replaying a diff never conflicts, so this step always yields a report.

use tracing::{debug, error, info};
use wsup_vcs::{ChangeKind, CommitAction, CommitId, DiffEntry, ProjectId};

use crate::codec::AccessType;
use crate::error::{Op, WorkspaceError};
use crate::model::{UpdateStatus, WorkspaceRef, WorkspaceUpdateReport};
use crate::remote::Remote;

/// Recreate the conflict-resolution branch for `reference` and replay the
/// change from `merge_base` to `workspace_head` onto it.
///
/// `observed_baseline` is the baseline head seen when the update began and
/// goes into the report unchanged.
pub(crate) fn build_conflict_branch(
    remote: &Remote,
    reference: &WorkspaceRef,
    workspace_head: &CommitId,
    merge_base: &CommitId,
    observed_baseline: &CommitId,
) -> Result<WorkspaceUpdateReport, WorkspaceError> {
    let project = reference.project();
    let name = reference
        .with_access(AccessType::ConflictResolution)
        .branch_name();

    // A failed lookup is logged and treated as "no previous branch"; a
    // previous branch that is found but cannot be removed is fatal.
    let previous = match remote.find_branch(project, &name) {
        Ok(found) => found,
        Err(e) => {
            error!(
                project = %project,
                branch = %name,
                error = %e,
                "could not look up previous conflict-resolution branch"
            );
            None
        }
    };
    if previous.is_some() {
        match remote.delete_branch(project, &name) {
            Ok(()) => {
                debug!(project = %project, branch = %name, "removed previous conflict-resolution branch");
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
    }
    let baseline = remote.default_branch(project)?;
    let branch = remote.create_branch(project, &name, &baseline)?;
    let state = branch.head_id().clone();

    let diff = remote.compare(project, merge_base.as_str(), workspace_head.as_str())?;
    let actions = replay_actions(remote, project, &diff, workspace_head, &state)?;

    let resulting = if actions.is_empty() {
        debug!(project = %project, branch = %name, "nothing to replay");
        state
    } else {
        let message = format!(
            "Replay {} onto {baseline} for conflict resolution",
            reference.branch_name()
        );
        remote.create_commit(project, &name, &message, &actions)?.id
    };

    info!(
        project = %project,
        workspace = %reference.id(),
        branch = %name,
        revision = %resulting,
        actions = actions.len(),
        "conflict-resolution branch ready"
    );
    Ok(WorkspaceUpdateReport::new(
        UpdateStatus::Conflict,
        observed_baseline.clone(),
        resulting,
    ))
}

fn replay_actions(
    remote: &Remote,
    project: &ProjectId,
    diff: &[DiffEntry],
    workspace_head: &CommitId,
    baseline: &CommitId,
) -> Result<Vec<CommitAction>, WorkspaceError> {
    let on_baseline = |path: &str| -> Result<bool, WorkspaceError> {
        Ok(remote
            .read_file(project, baseline.as_str(), path)?
            .is_some())
    };
    let content = |path: &str| -> Result<Vec<u8>, WorkspaceError> {
        remote
            .read_file(project, workspace_head.as_str(), path)?
            .ok_or_else(|| {
                Op::new("replay workspace", project, path)
                    .protocol(format!("file listed by compare is missing at {workspace_head}"))
            })
    };
    let write = |path: &str| -> Result<CommitAction, WorkspaceError> {
        let content = content(path)?;
        let path = path.to_owned();
        Ok(if on_baseline(&path)? {
            CommitAction::Update { path, content }
        } else {
            CommitAction::Create { path, content }
        })
    };

    let mut actions = Vec::with_capacity(diff.len());
    for entry in diff {
        match entry.kind {
            ChangeKind::Deleted => {
                if on_baseline(&entry.old_path)? {
                    actions.push(CommitAction::Delete {
                        path: entry.old_path.clone(),
                    });
                }
            }
            ChangeKind::Renamed => {
                if on_baseline(&entry.old_path)? {
                    actions.push(CommitAction::Delete {
                        path: entry.old_path.clone(),
                    });
                }
                actions.push(write(&entry.new_path)?);
            }
            ChangeKind::Added | ChangeKind::Modified => actions.push(write(&entry.new_path)?),
        }
    }
    Ok(actions)
}
