//! Workspace lifecycle: list, get, create, delete.
//!
//! A workspace is one `ws-*` branch. Its `backup-*` and `resolve-*` siblings
//! are scratch state owned by the update protocol. Creating a workspace
//! clears leftover siblings for the same id first; deleting one removes them
//! afterwards. Failures on siblings are logged and never fail the call.

use std::sync::Arc;

use tracing::{info, info_span, warn};
use wsup_vcs::ProjectId;

use crate::cleanup::{self, Pipelines};
use crate::codec::{self, AccessType, WorkspaceId, WorkspaceKind};
use crate::context::Context;
use crate::error::WorkspaceError;
use crate::model::{Workspace, WorkspaceRef};
use crate::remote::Remote;
use crate::scheduler::Scheduler;

/// Scratch branches cleared before creation and after deletion.
const SCRATCH: [AccessType; 2] = [AccessType::Backup, AccessType::ConflictResolution];

pub struct WorkspaceManager {
    remote: Remote,
    scheduler: Arc<dyn Scheduler>,
}

impl WorkspaceManager {
    #[must_use]
    pub fn new(ctx: &Context) -> Self {
        Self {
            remote: ctx.remote(),
            scheduler: Arc::clone(&ctx.scheduler),
        }
    }

    // -----------------------------------------------------------------------
    // Listing
    // -----------------------------------------------------------------------

    /// All branches of `access` type for the given kinds.
    ///
    /// The host's search may return more than the prefix asked for; only
    /// names that decode under the exact prefix are kept.
    pub fn list(
        &self,
        project: &ProjectId,
        kinds: &[WorkspaceKind],
        access: AccessType,
    ) -> Result<Vec<Workspace>, WorkspaceError> {
        let mut out = Vec::new();
        for &kind in kinds {
            let prefix = codec::prefix(kind, access);
            for branch in self.remote.list_branches(project, &prefix)? {
                let Some(id) = codec::decode(&branch.name, kind, access) else {
                    continue;
                };
                let reference = WorkspaceRef::new(project.clone(), id, kind, access);
                out.push(Workspace::from_branch(reference, branch));
            }
        }
        Ok(out)
    }

    pub fn list_workspaces(
        &self,
        project: &ProjectId,
        kinds: &[WorkspaceKind],
    ) -> Result<Vec<Workspace>, WorkspaceError> {
        self.list(project, kinds, AccessType::Workspace)
    }

    /// User workspaces currently in conflict resolution.
    pub fn list_conflict_resolution_workspaces(
        &self,
        project: &ProjectId,
    ) -> Result<Vec<Workspace>, WorkspaceError> {
        self.list(project, &[WorkspaceKind::User], AccessType::ConflictResolution)
    }

    /// User workspace backups left behind by interrupted updates.
    pub fn list_backup_workspaces(
        &self,
        project: &ProjectId,
    ) -> Result<Vec<Workspace>, WorkspaceError> {
        self.list(project, &[WorkspaceKind::User], AccessType::Backup)
    }

    // -----------------------------------------------------------------------
    // Fetching
    // -----------------------------------------------------------------------

    /// Fetch the branch `reference` names. A missing branch is an error of
    /// kind [`NotFound`](crate::ErrorKind::NotFound).
    pub fn get(&self, reference: &WorkspaceRef) -> Result<Workspace, WorkspaceError> {
        let branch = self
            .remote
            .get_branch(reference.project(), &reference.branch_name())?;
        Ok(Workspace::from_branch(reference.clone(), branch))
    }

    pub fn get_workspace(
        &self,
        project: &ProjectId,
        id: &WorkspaceId,
        kind: WorkspaceKind,
    ) -> Result<Workspace, WorkspaceError> {
        self.get(&WorkspaceRef::workspace(project.clone(), id.clone(), kind))
    }

    pub fn get_conflict_resolution_workspace(
        &self,
        project: &ProjectId,
        id: &WorkspaceId,
        kind: WorkspaceKind,
    ) -> Result<Workspace, WorkspaceError> {
        self.get(&WorkspaceRef::new(
            project.clone(),
            id.clone(),
            kind,
            AccessType::ConflictResolution,
        ))
    }

    pub fn get_backup_workspace(
        &self,
        project: &ProjectId,
        id: &WorkspaceId,
        kind: WorkspaceKind,
    ) -> Result<Workspace, WorkspaceError> {
        self.get(&WorkspaceRef::new(
            project.clone(),
            id.clone(),
            kind,
            AccessType::Backup,
        ))
    }

    // -----------------------------------------------------------------------
    // Create / delete
    // -----------------------------------------------------------------------

    /// Create a workspace from the baseline's current head.
    ///
    /// Leftover backup and conflict-resolution branches with the same id are
    /// deleted first, best-effort.
    pub fn create(
        &self,
        project: &ProjectId,
        id: &str,
        kind: WorkspaceKind,
    ) -> Result<Workspace, WorkspaceError> {
        let id = WorkspaceId::new(id)?;
        let span = info_span!("create_workspace", project = %project, workspace = %id, kind = kind.label());
        let _guard = span.enter();

        let baseline = self.remote.baseline(project)?;
        self.ensure_set_up(project, &baseline.name, baseline.head_id().as_str())?;

        let reference = WorkspaceRef::workspace(project.clone(), id, kind);
        for access in SCRATCH {
            let scratch = reference.with_access(access).branch_name();
            match self.remote.delete_branch_if_exists(project, &scratch) {
                Ok(true) => info!(branch = %scratch, "removed leftover {}", access.label()),
                Ok(false) => {}
                Err(e) => warn!(branch = %scratch, error = %e, "could not remove leftover {}", access.label()),
            }
        }

        let name = reference.branch_name();
        let branch = self
            .remote
            .create_branch(project, &name, baseline.head_id().as_str())?;
        info!(branch = %name, revision = %branch.head_id(), "workspace created");
        Ok(Workspace::from_branch(reference, branch))
    }

    /// Delete a workspace and then its scratch branches.
    ///
    /// Only a failure to delete the workspace branch itself fails the call.
    /// A scratch branch that cannot be deleted right away is handed to the
    /// background scheduler.
    pub fn delete(
        &self,
        project: &ProjectId,
        id: &WorkspaceId,
        kind: WorkspaceKind,
    ) -> Result<(), WorkspaceError> {
        let span = info_span!("delete_workspace", project = %project, workspace = %id, kind = kind.label());
        let _guard = span.enter();

        let reference = WorkspaceRef::workspace(project.clone(), id.clone(), kind);
        self.remote.delete_branch(project, &reference.branch_name())?;
        info!(branch = %reference.branch_name(), "workspace deleted");

        for access in SCRATCH {
            let scratch = reference.with_access(access).branch_name();
            match self.remote.delete_branch_if_exists(project, &scratch) {
                Ok(true) => info!(branch = %scratch, "removed {}", access.label()),
                Ok(false) => {}
                Err(e) => {
                    warn!(branch = %scratch, error = %e, "could not remove {}; retrying in background", access.label());
                    cleanup::schedule_branch_deletion(
                        &self.remote,
                        self.scheduler.as_ref(),
                        project,
                        &scratch,
                        Pipelines::Ignore,
                    );
                }
            }
        }
        Ok(())
    }

    /// A project is set up once its configuration file exists on the
    /// baseline.
    fn ensure_set_up(
        &self,
        project: &ProjectId,
        baseline: &str,
        revision: &str,
    ) -> Result<(), WorkspaceError> {
        let path = &self.remote.settings().commit.project_config_path;
        if self.remote.read_file(project, revision, path)?.is_some() {
            return Ok(());
        }
        Err(WorkspaceError::ProjectNotSetUp {
            project: project.clone(),
            branch: baseline.to_owned(),
            path: path.clone(),
        })
    }
}
