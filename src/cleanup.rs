//! Scheduling best-effort deletion of scratch branches.

use tracing::{info, warn};
use wsup_vcs::ProjectId;

use crate::remote::Remote;
use crate::scheduler::Scheduler;

/// Whether a deletion must wait for pipelines on the branch to finish.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Pipelines {
    Wait,
    Ignore,
}

/// Queue deletion of `branch`. Runs after the configured delay, retried by
/// the scheduler; a branch that is already gone counts as done.
pub(crate) fn schedule_branch_deletion(
    remote: &Remote,
    scheduler: &dyn Scheduler,
    project: &ProjectId,
    branch: &str,
    pipelines: Pipelines,
) {
    let label = format!("delete branch {branch} in {project}");
    let delay = remote.settings().cleanup_delay();
    let remote = remote.clone();
    let project = project.clone();
    let branch = branch.to_owned();
    info!(project = %project, branch = %branch, ?delay, "scheduling branch cleanup");

    scheduler.schedule(
        &label,
        delay,
        Box::new(move || {
            if pipelines == Pipelines::Wait && !remote.wait_for_pipelines(&project, &branch)? {
                anyhow::bail!("pipelines still running on {branch}");
            }
            if remote.delete_branch_if_exists(&project, &branch)? {
                info!(project = %project, branch = %branch, "scratch branch deleted");
            } else {
                warn!(project = %project, branch = %branch, "scratch branch already gone");
            }
            Ok(())
        }),
    );
}
