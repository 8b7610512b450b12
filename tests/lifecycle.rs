//! Integration tests for workspace create / list / get / delete.

mod common;

use common::{TestProject, c};
use wsup::{AccessType, ErrorKind, WorkspaceKind};
use wsup_vcs::{Fault, FaultRule, Op, VcsError};

#[test]
fn create_starts_workspace_at_baseline_head() {
    let t = TestProject::new();
    let c2 = t.push_main("second", &[("m.txt", Some(b"m"))]);

    let ws = t.create("alice-1");
    assert_eq!(ws.branch(), "ws-user/alice-1");
    assert_eq!(ws.head(), &c2);
    assert_eq!(ws.reference().access(), AccessType::Workspace);
    assert_eq!(t.head("ws-user/alice-1"), Some(c2));
}

#[test]
fn create_rejects_invalid_id_without_touching_host() {
    let t = TestProject::new();
    for bad in ["", ".abc", "abc.", "a..b", "a/b", "-abc"] {
        let err = t
            .manager()
            .create(&t.project, bad, WorkspaceKind::User)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest, "{bad:?}");
    }
    assert!(t.host.calls().is_empty());
}

#[test]
fn create_requires_project_setup() {
    let t = TestProject::not_set_up();
    let err = t
        .manager()
        .create(&t.project, "alice", WorkspaceKind::User)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(err.to_string().contains("project.json"), "{err}");
    assert!(t.host.mutations().is_empty());
}

#[test]
fn create_clears_leftover_scratch_branches() {
    let t = TestProject::new();
    t.raw_branch("backup-user/alice", "main");
    t.raw_branch("resolve-user/alice", "main");

    t.create("alice");
    assert_eq!(t.branches(), vec!["main", "ws-user/alice"]);
}

#[test]
fn create_proceeds_when_leftover_deletion_fails() {
    let t = TestProject::new();
    t.raw_branch("backup-user/alice", "main");
    t.raw_branch("resolve-user/alice", "main");
    t.host.inject(
        FaultRule::new(Op::DeleteBranch, Fault::Error(VcsError::forbidden("protected")))
            .on("backup-user/alice"),
    );
    t.host
        .inject(FaultRule::new(Op::DeleteBranch, Fault::Refuse).on("resolve-user/alice"));

    let ws = t.create("alice");
    assert_eq!(ws.head(), &c("C1"));
    let branches = t.branches();
    assert!(branches.contains(&"ws-user/alice".to_owned()));
    assert!(branches.contains(&"backup-user/alice".to_owned()));
    assert!(branches.contains(&"resolve-user/alice".to_owned()));
}

#[test]
fn create_fails_when_host_returns_no_branch() {
    let t = TestProject::new();
    t.host
        .inject(FaultRule::new(Op::CreateBranch, Fault::Refuse).on("ws-user/alice"));
    let err = t
        .manager()
        .create(&t.project, "alice", WorkspaceKind::User)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProtocolViolation);
}

#[test]
fn create_surfaces_existing_workspace_as_bad_request() {
    let t = TestProject::new();
    t.create("alice");
    let err = t
        .manager()
        .create(&t.project, "alice", WorkspaceKind::User)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
    let msg = err.to_string();
    assert!(msg.contains("create branch"), "{msg}");
    assert!(msg.contains("ws-user/alice"), "{msg}");
}

// ---------------------------------------------------------------------------
// list / get
// ---------------------------------------------------------------------------

#[test]
fn list_keeps_only_exact_prefix_matches() {
    let t = TestProject::new();
    t.create("alice");
    t.create("bob");
    t.manager()
        .create(&t.project, "team.x", WorkspaceKind::Group)
        .unwrap();
    // The host's search is a substring match; these must not leak in.
    t.raw_branch("old-ws-user/zed", "main");
    t.raw_branch("backup-user/alice", "main");
    t.raw_branch("ws-user/bad..id", "main");

    let users = t
        .manager()
        .list_workspaces(&t.project, &[WorkspaceKind::User])
        .unwrap();
    let ids: Vec<&str> = users.iter().map(|w| w.reference().id().as_str()).collect();
    assert_eq!(ids, vec!["alice", "bob"]);

    let all = t
        .manager()
        .list_workspaces(&t.project, &WorkspaceKind::ALL)
        .unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all[2].reference().kind(), WorkspaceKind::Group);
    assert_eq!(all[2].branch(), "ws-group/team.x");
}

#[test]
fn list_scratch_branches_by_access_type() {
    let t = TestProject::new();
    t.create("alice");
    t.raw_branch("backup-user/alice", "main");
    t.raw_branch("resolve-user/carol", "main");

    let m = t.manager();
    let backups = m.list_backup_workspaces(&t.project).unwrap();
    assert_eq!(backups.len(), 1);
    assert_eq!(backups[0].reference().access(), AccessType::Backup);
    assert_eq!(backups[0].reference().id().as_str(), "alice");

    let resolving = m.list_conflict_resolution_workspaces(&t.project).unwrap();
    assert_eq!(resolving.len(), 1);
    assert_eq!(resolving[0].reference().id().as_str(), "carol");
}

#[test]
fn get_reports_missing_branch_as_not_found() {
    let t = TestProject::new();
    let m = t.manager();
    let id = TestProject::id("ghost");
    let err = m
        .get_workspace(&t.project, &id, WorkspaceKind::User)
        .unwrap_err();
    assert!(err.is_not_found());

    t.create("ghost");
    let ws = m.get_workspace(&t.project, &id, WorkspaceKind::User).unwrap();
    assert_eq!(ws.head(), &c("C1"));
    assert!(
        m.get_backup_workspace(&t.project, &id, WorkspaceKind::User)
            .unwrap_err()
            .is_not_found()
    );
    assert!(
        m.get_conflict_resolution_workspace(&t.project, &id, WorkspaceKind::User)
            .unwrap_err()
            .is_not_found()
    );
}

// ---------------------------------------------------------------------------
// delete
// ---------------------------------------------------------------------------

#[test]
fn delete_removes_workspace_and_scratch_branches() {
    let t = TestProject::new();
    t.create("alice");
    t.raw_branch("backup-user/alice", "main");
    t.raw_branch("resolve-user/alice", "main");

    t.manager()
        .delete(&t.project, &TestProject::id("alice"), WorkspaceKind::User)
        .unwrap();
    assert_eq!(t.branches(), vec!["main"]);
    assert!(t.scheduler.scheduled().is_empty());
}

#[test]
fn delete_fails_only_for_the_workspace_branch() {
    let t = TestProject::new();
    t.create("alice");
    t.host
        .inject(FaultRule::new(Op::DeleteBranch, Fault::Refuse).on("ws-user/alice"));
    let err = t
        .manager()
        .delete(&t.project, &TestProject::id("alice"), WorkspaceKind::User)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Failed);
    assert!(t.branches().contains(&"ws-user/alice".to_owned()));

    t.host.clear_faults();
    t.host.inject(
        FaultRule::new(Op::DeleteBranch, Fault::Error(VcsError::forbidden("no")))
            .on("ws-user/alice"),
    );
    let err = t
        .manager()
        .delete(&t.project, &TestProject::id("alice"), WorkspaceKind::User)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
}

#[test]
fn delete_of_missing_workspace_is_not_found() {
    let t = TestProject::new();
    let err = t
        .manager()
        .delete(&t.project, &TestProject::id("nobody"), WorkspaceKind::User)
        .unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn delete_hands_failed_scratch_cleanup_to_background() {
    let t = TestProject::new();
    t.create("alice");
    t.raw_branch("backup-user/alice", "main");
    t.raw_branch("resolve-user/alice", "main");
    t.host.inject(
        FaultRule::new(Op::DeleteBranch, Fault::Error(VcsError::transient("503")))
            .on("backup-user/alice")
            .times(1),
    );
    t.host.inject(
        FaultRule::new(Op::DeleteBranch, Fault::Error(VcsError::forbidden("locked")))
            .on("resolve-user/alice"),
    );

    t.manager()
        .delete(&t.project, &TestProject::id("alice"), WorkspaceKind::User)
        .unwrap();

    let scheduled = t.scheduler.scheduled();
    assert_eq!(scheduled.len(), 2, "{scheduled:?}");
    assert!(scheduled.iter().any(|l| l.contains("backup-user/alice")));
    assert!(scheduled.iter().any(|l| l.contains("resolve-user/alice")));

    // The transient failure cleared on retry; the permanent one is left behind.
    assert_eq!(t.branches(), vec!["main", "resolve-user/alice"]);
}
