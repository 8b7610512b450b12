//! Background cleanup on a real worker thread.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{PROJECT, fast_settings};
use wsup::{
    Context, RecordingSleeper, Sleeper, ThreadScheduler, UpdateStatus, WorkspaceId,
    WorkspaceKind, WorkspaceManager, WorkspaceRef, WorkspaceUpdater,
};
use wsup_vcs::{Fault, FaultRule, MemoryHost, Op, ProjectId, VcsError, VcsProvider};

fn setup() -> (Arc<MemoryHost>, Arc<ThreadScheduler>, Context, ProjectId) {
    let host = Arc::new(MemoryHost::new());
    let project = ProjectId::new(PROJECT);
    host.add_project(&project, "main", &[("project.json", b"{}")]);

    let settings = fast_settings();
    let sleeper: Arc<dyn Sleeper> = Arc::new(RecordingSleeper::new());
    let scheduler = Arc::new(
        ThreadScheduler::start(settings.cleanup_retry(), Arc::clone(&sleeper)).unwrap(),
    );
    let ctx = Context::new(host.clone(), scheduler.clone(), sleeper, settings);
    (host, scheduler, ctx, project)
}

#[test]
fn failed_scratch_deletion_finishes_on_worker() {
    let (host, scheduler, ctx, project) = setup();
    let manager = WorkspaceManager::new(&ctx);
    let id = WorkspaceId::new("alice").unwrap();
    manager.create(&project, "alice", WorkspaceKind::User).unwrap();
    host.create_branch(&project, "backup-user/alice", "main")
        .unwrap()
        .unwrap();
    host.inject(
        FaultRule::new(Op::DeleteBranch, Fault::Error(VcsError::transient("503")))
            .on("backup-user/alice")
            .times(2),
    );

    manager.delete(&project, &id, WorkspaceKind::User).unwrap();
    scheduler.shutdown();

    assert_eq!(host.branch_names(&project), vec!["main"]);
}

#[test]
fn worker_gives_up_after_bounded_attempts() {
    let (host, scheduler, ctx, project) = setup();
    let manager = WorkspaceManager::new(&ctx);
    let id = WorkspaceId::new("alice").unwrap();
    manager.create(&project, "alice", WorkspaceKind::User).unwrap();
    host.create_branch(&project, "resolve-user/alice", "main")
        .unwrap()
        .unwrap();
    host.inject(
        FaultRule::new(Op::DeleteBranch, Fault::Error(VcsError::forbidden("locked")))
            .on("resolve-user/alice"),
    );

    manager.delete(&project, &id, WorkspaceKind::User).unwrap();
    scheduler.shutdown();

    // One inline attempt plus three background ones.
    let attempts = host
        .mutations()
        .iter()
        .filter(|c| c.op == Op::DeleteBranch && c.target == "resolve-user/alice")
        .count();
    assert_eq!(attempts, 4);
    assert_eq!(
        host.branch_names(&project),
        vec!["main", "resolve-user/alice"]
    );
}

#[test]
fn production_context_returns_before_cleanup_delay() {
    let host = Arc::new(MemoryHost::new());
    let project = ProjectId::new(PROJECT);
    host.add_project(&project, "main", &[("project.json", b"{}")]);
    let mut settings = fast_settings();
    settings.cleanup.delay_ms = 1500;
    let ctx = Context::start(host.clone(), settings).unwrap();

    let id = WorkspaceId::new("alice").unwrap();
    WorkspaceManager::new(&ctx)
        .create(&project, "alice", WorkspaceKind::User)
        .unwrap();
    host.push(&project, "ws-user/alice", "w", &[("w.txt", Some(b"w"))])
        .unwrap();
    host.push(&project, "main", "m", &[("m.txt", Some(b"m"))])
        .unwrap();

    let updater = WorkspaceUpdater::new(&ctx);
    let started = Instant::now();
    let report = updater
        .update(&WorkspaceRef::workspace(project.clone(), id, WorkspaceKind::User))
        .unwrap();
    let elapsed = started.elapsed();
    assert_eq!(report.status, UpdateStatus::Updated);
    assert!(elapsed < Duration::from_millis(1500), "{elapsed:?}");
    // Scratch branches are still queued for deletion.
    assert!(
        host.branch_names(&project).len() > 2,
        "{:?}",
        host.branch_names(&project)
    );

    // The last handle waits for the worker to drain.
    drop(updater);
    drop(ctx);
    assert_eq!(host.branch_names(&project), vec!["main", "ws-user/alice"]);
}
