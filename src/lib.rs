//! wsup: workspace update and conflict resolution over a repository host.
//!
//! A workspace is a branch of work tracked against a project's default
//! branch (the baseline). This crate keeps workspaces consistent with a
//! moving baseline using only the coarse primitives a host exposes through
//! [`wsup_vcs::VcsProvider`]: named branches, file-action commits, revision
//! comparison and merge requests with an asynchronous rebase.
//!
//! # Components
//!
//! | Module          | Role                                                   |
//! |-----------------|--------------------------------------------------------|
//! | [`codec`]       | branch names for (kind, access type, id)               |
//! | [`lifecycle`]   | list, get, create, delete workspaces                   |
//! | [`staleness`]   | has the baseline moved past a branch?                  |
//! | [`update`]      | NO_OP / UPDATED / CONFLICT state machine               |
//! | [`scheduler`]   | background cleanup of scratch branches                 |
//! | [`retry`]       | bounded retry and polling                              |
//! | [`config`]      | `wsup.toml` settings                                   |
//! | [`telemetry`]   | default `tracing` subscriber                           |
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use wsup::{Context, Settings, UpdateStatus, WorkspaceKind, WorkspaceManager, WorkspaceUpdater};
//! use wsup_vcs::{MemoryHost, ProjectId};
//!
//! let host = Arc::new(MemoryHost::new());
//! let project = ProjectId::new("acme/site");
//! host.add_project(&project, "main", &[("project.json", b"{}")]);
//!
//! let ctx = Context::start(host, Settings::default()).unwrap();
//! let ws = WorkspaceManager::new(&ctx).create(&project, "alice-1", WorkspaceKind::User).unwrap();
//! let report = WorkspaceUpdater::new(&ctx).update(ws.reference()).unwrap();
//! assert_eq!(report.status, UpdateStatus::NoOp);
//! ```

pub mod codec;
pub mod config;
pub mod context;
pub mod error;
pub mod lifecycle;
pub mod model;
pub mod remote;
pub mod retry;
pub mod revisions;
pub mod scheduler;
pub mod staleness;
pub mod telemetry;
pub mod update;

mod cleanup;
mod conflict;
mod rebase;
mod squash;

pub use codec::{AccessType, InvalidWorkspaceId, WorkspaceId, WorkspaceKind};
pub use config::{ConfigError, Settings};
pub use context::Context;
pub use error::{ErrorKind, WorkspaceError, classify};
pub use lifecycle::WorkspaceManager;
pub use model::{UpdateStatus, Workspace, WorkspaceRef, WorkspaceUpdateReport};
pub use retry::{PollPolicy, RecordingSleeper, RetryPolicy, Sleeper, ThreadSleeper};
pub use revisions::{BranchRevisions, RevisionProvider};
pub use scheduler::{InlineScheduler, Scheduler, Task, ThreadScheduler};
pub use staleness::StalenessDetector;
pub use update::WorkspaceUpdater;
