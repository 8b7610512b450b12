//! Shared test infrastructure for wsup integration tests.
//!
//! Provides [`TestProject`]: a [`MemoryHost`] seeded with one project whose
//! `main` branch is at `C1` and already set up (`project.json` present),
//! wired to an [`InlineScheduler`] and a [`RecordingSleeper`] so background
//! cleanup runs before the call under test returns and no test sleeps.
//!
//! Commit ids on the host are global and sequential, so tests that build
//! history step by step can name the exact ids they expect.
//!
//! # Example
//!
//! ```rust,no_run
//! let t = TestProject::new();
//! t.push_main("second", &[("m.txt", Some(b"m"))]); // C2
//! let ws = t.create("alice");                       // ws-user/alice at C2
//! ```

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use wsup::config::Settings;
use wsup::{
    Context, InlineScheduler, RecordingSleeper, Sleeper, StalenessDetector, Workspace, WorkspaceId,
    WorkspaceKind, WorkspaceManager, WorkspaceRef, WorkspaceUpdater,
};
use wsup_vcs::{CommitId, MemoryHost, ProjectId, VcsProvider};

pub const PROJECT: &str = "acme/site";

/// Settings with every wait shrunk and bounded, so exhaustion paths are
/// cheap to reach.
pub fn fast_settings() -> Settings {
    let mut s = Settings::default();
    s.retry.initial_backoff_ms = 10;
    s.retry.max_backoff_ms = 40;
    s.rebase.poll_attempts = 5;
    s.rebase.poll_interval_ms = 100;
    s.branch.create_verify_attempts = 3;
    s.branch.delete_verify_attempts = 3;
    s.branch.verify_interval_ms = 1;
    s.cleanup.delay_ms = 0;
    s.cleanup.max_attempts = 3;
    s.cleanup.retry_interval_ms = 0;
    s.cleanup.pipeline_wait_attempts = 3;
    s.cleanup.pipeline_wait_interval_ms = 0;
    s
}

// ---------------------------------------------------------------------------
// TestProject
// ---------------------------------------------------------------------------

pub struct TestProject {
    pub host: Arc<MemoryHost>,
    pub sleeper: Arc<RecordingSleeper>,
    pub scheduler: Arc<InlineScheduler>,
    pub ctx: Context,
    pub project: ProjectId,
}

impl TestProject {
    /// `main` at C1 with `project.json`.
    pub fn new() -> Self {
        Self::with_files(&[])
    }

    /// `main` at C1 with `project.json` plus `files`.
    pub fn with_files(files: &[(&str, &[u8])]) -> Self {
        let mut all: Vec<(&str, &[u8])> = vec![("project.json", b"{}".as_slice())];
        all.extend_from_slice(files);
        Self::build(&all, fast_settings())
    }

    /// A project without `project.json`.
    pub fn not_set_up() -> Self {
        Self::build(&[("README.md", b"hi")], fast_settings())
    }

    pub fn with_settings(settings: Settings) -> Self {
        Self::build(&[("project.json", b"{}")], settings)
    }

    fn build(files: &[(&str, &[u8])], settings: Settings) -> Self {
        let host = Arc::new(MemoryHost::new());
        let project = ProjectId::new(PROJECT);
        let root = host.add_project(&project, "main", files);
        assert_eq!(root, CommitId::new("C1"));

        let sleeper = Arc::new(RecordingSleeper::new());
        let scheduler = Arc::new(InlineScheduler::new(
            settings.cleanup_retry(),
            Arc::clone(&sleeper) as Arc<dyn Sleeper>,
        ));
        let ctx = Context::new(host.clone(), scheduler.clone(), sleeper.clone(), settings);
        Self {
            host,
            sleeper,
            scheduler,
            ctx,
            project,
        }
    }

    // -- components --

    pub fn manager(&self) -> WorkspaceManager {
        WorkspaceManager::new(&self.ctx)
    }

    pub fn updater(&self) -> WorkspaceUpdater {
        WorkspaceUpdater::new(&self.ctx)
    }

    pub fn detector(&self) -> StalenessDetector {
        StalenessDetector::new(&self.ctx)
    }

    // -- workspaces --

    pub fn id(name: &str) -> WorkspaceId {
        WorkspaceId::new(name).unwrap()
    }

    pub fn reference(&self, name: &str) -> WorkspaceRef {
        WorkspaceRef::workspace(self.project.clone(), Self::id(name), WorkspaceKind::User)
    }

    /// Create user workspace `name` from the current baseline head.
    pub fn create(&self, name: &str) -> Workspace {
        self.manager()
            .create(&self.project, name, WorkspaceKind::User)
            .unwrap()
    }

    // -- host manipulation --

    /// Commit straight to `main`, as another collaborator would.
    pub fn push_main(&self, message: &str, changes: &[(&str, Option<&[u8]>)]) -> CommitId {
        self.host.push(&self.project, "main", message, changes).unwrap()
    }

    /// Commit straight to user workspace `name`.
    pub fn push_ws(&self, name: &str, message: &str, changes: &[(&str, Option<&[u8]>)]) -> CommitId {
        let branch = format!("ws-user/{name}");
        self.host.push(&self.project, &branch, message, changes).unwrap()
    }

    /// Create an arbitrary branch directly on the host.
    pub fn raw_branch(&self, name: &str, from: &str) {
        self.host
            .create_branch(&self.project, name, from)
            .unwrap()
            .unwrap();
    }

    pub fn head(&self, branch: &str) -> Option<CommitId> {
        self.host.head(&self.project, branch)
    }

    pub fn branches(&self) -> Vec<String> {
        self.host.branch_names(&self.project)
    }

    /// Files at a branch or commit, as UTF-8 for easy comparison.
    pub fn files(&self, revision: &str) -> BTreeMap<String, String> {
        self.host
            .files_at(&self.project, revision)
            .unwrap()
            .into_iter()
            .map(|(p, c)| (p, String::from_utf8(c).unwrap()))
            .collect()
    }

    pub fn pauses_of(&self, d: Duration) -> usize {
        self.sleeper.pauses().iter().filter(|p| **p == d).count()
    }
}

pub fn c(id: &str) -> CommitId {
    CommitId::new(id)
}
