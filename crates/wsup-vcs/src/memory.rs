//! In-process repository host.
//!
//! [`MemoryHost`] implements [`VcsProvider`] and [`FileProvider`] over a
//! `Mutex`-guarded model of projects, commits, branches, merge requests and
//! pipelines. It is the reference backend for the wsup core and the fixture
//! behind every protocol test.
//!
//! Behaviour that matters to the update protocol is modelled the way a real
//! host behaves:
//!
//! - commit ids are issued sequentially (`C1`, `C2`, ...) across the host;
//! - a merge request rebase is asynchronous and completes after a configurable
//!   number of [`rebase_status`](VcsProvider::rebase_status) polls;
//! - the rebase replays each commit's file delta and fails with a merge error
//!   when a touched path changed underneath it;
//! - `CREATE` on an existing path and `UPDATE`/`DELETE` on a missing path are
//!   rejected;
//! - the default branch is protected from deletion.
//!
//! Faults are injected per instance with [`FaultRule`], so tests running in
//! parallel never interfere.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace};

use crate::error::VcsError;
use crate::provider::{FileProvider, VcsProvider};
use crate::types::{
    Branch, Commit, CommitAction, CommitId, DiffEntry, MergeRequest, ProjectId,
    RebaseStatus, RefType,
};

type Tree = BTreeMap<String, Vec<u8>>;

// ---------------------------------------------------------------------------
// Call log and fault injection
// ---------------------------------------------------------------------------

/// Provider operations, used to filter the call log and target faults.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Op {
    DefaultBranch,
    GetBranch,
    ListBranches,
    CreateBranch,
    DeleteBranch,
    CommitRefs,
    MergeBase,
    ListCommits,
    Compare,
    CreateCommit,
    CreateMergeRequest,
    RebaseMergeRequest,
    RebaseStatus,
    CloseMergeRequest,
    RunningPipelines,
    ReadFile,
}

impl Op {
    /// Returns `true` for operations that change host state.
    #[must_use]
    pub const fn is_mutation(self) -> bool {
        matches!(
            self,
            Self::CreateBranch
                | Self::DeleteBranch
                | Self::CreateCommit
                | Self::CreateMergeRequest
                | Self::RebaseMergeRequest
                | Self::CloseMergeRequest
        )
    }
}

/// One recorded provider call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Call {
    /// Which operation ran.
    pub op: Op,
    /// The branch, revision or merge request the call addressed.
    pub target: String,
}

/// What an injected fault does.
#[derive(Clone, Debug)]
pub enum Fault {
    /// Fail the call with this error.
    Error(VcsError),
    /// Acknowledge without effect: `create_branch` returns `Ok(None)`,
    /// `delete_branch` returns `Ok(false)`. Other operations fail with a
    /// backend error.
    Refuse,
}

/// A fault armed against one operation, optionally for one target and a
/// limited number of hits.
#[derive(Clone, Debug)]
pub struct FaultRule {
    op: Op,
    target: Option<String>,
    remaining: Option<u32>,
    fault: Fault,
}

impl FaultRule {
    /// Fire `fault` on every call to `op`.
    #[must_use]
    pub const fn new(op: Op, fault: Fault) -> Self {
        Self {
            op,
            target: None,
            remaining: None,
            fault,
        }
    }

    /// Only fire when the call addresses `target`.
    #[must_use]
    pub fn on(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Fire at most `n` times, then disarm.
    #[must_use]
    pub const fn times(mut self, n: u32) -> Self {
        self.remaining = Some(n);
        self
    }

    fn matches(&self, op: Op, target: &str) -> bool {
        self.op == op
            && self.remaining != Some(0)
            && self.target.as_deref().is_none_or(|t| t == target)
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
struct StoredCommit {
    commit: Commit,
    tree: Tree,
}

#[derive(Clone, Debug)]
enum RebaseState {
    Idle,
    Pending { polls_left: u32 },
    Done { merge_error: Option<String> },
}

#[derive(Clone, Debug)]
struct StoredMergeRequest {
    request: MergeRequest,
    open: bool,
    rebase: RebaseState,
}

#[derive(Debug, Default)]
struct ProjectState {
    default_branch: String,
    commits: HashMap<CommitId, StoredCommit>,
    branches: BTreeMap<String, CommitId>,
    merge_requests: BTreeMap<u64, StoredMergeRequest>,
    next_iid: u64,
    pipelines: HashMap<String, usize>,
}

#[derive(Debug, Default)]
struct State {
    next_commit: u64,
    projects: HashMap<ProjectId, ProjectState>,
    faults: Vec<FaultRule>,
    calls: Vec<Call>,
    rebase_latency: u32,
    stall_rebases: bool,
}

impl State {
    /// Record the call and fire the first matching fault, if any.
    fn enter(&mut self, op: Op, target: &str) -> Result<Option<Fault>, VcsError> {
        self.calls.push(Call {
            op,
            target: target.to_owned(),
        });
        trace!(?op, target, "memory host call");
        let Some(rule) = self.faults.iter_mut().find(|r| r.matches(op, target)) else {
            return Ok(None);
        };
        if let Some(n) = rule.remaining.as_mut() {
            *n -= 1;
        }
        debug!(?op, target, fault = ?rule.fault, "injected fault fired");
        match &rule.fault {
            Fault::Error(e) => Err(e.clone()),
            Fault::Refuse if matches!(op, Op::CreateBranch | Op::DeleteBranch) => {
                Ok(Some(Fault::Refuse))
            }
            Fault::Refuse => Err(VcsError::Backend {
                message: format!("{op:?} refused for {target}"),
            }),
        }
    }

    fn next_commit_id(&mut self) -> CommitId {
        self.next_commit += 1;
        CommitId::new(format!("C{}", self.next_commit))
    }

    fn project(&self, project: &ProjectId) -> Result<&ProjectState, VcsError> {
        self.projects
            .get(project)
            .ok_or_else(|| VcsError::not_found(format!("project {project}")))
    }

    fn project_mut(&mut self, project: &ProjectId) -> Result<&mut ProjectState, VcsError> {
        self.projects
            .get_mut(project)
            .ok_or_else(|| VcsError::not_found(format!("project {project}")))
    }
}

impl ProjectState {
    /// Resolve a branch name or commit id.
    fn resolve(&self, revision: &str) -> Result<CommitId, VcsError> {
        if let Some(id) = self.branches.get(revision) {
            return Ok(id.clone());
        }
        let id = CommitId::new(revision);
        if self.commits.contains_key(&id) {
            Ok(id)
        } else {
            Err(VcsError::not_found(format!("revision {revision}")))
        }
    }

    fn stored(&self, id: &CommitId) -> Result<&StoredCommit, VcsError> {
        self.commits
            .get(id)
            .ok_or_else(|| VcsError::not_found(format!("commit {id}")))
    }

    fn branch(&self, name: &str) -> Result<Branch, VcsError> {
        let id = self
            .branches
            .get(name)
            .ok_or_else(|| VcsError::not_found(format!("branch {name}")))?;
        Ok(Branch {
            name: name.to_owned(),
            head: self.stored(id)?.commit.clone(),
        })
    }

    /// Every commit reachable from `id`, including `id`.
    fn ancestors(&self, id: &CommitId) -> HashSet<CommitId> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([id.clone()]);
        while let Some(next) = queue.pop_front() {
            if !seen.insert(next.clone()) {
                continue;
            }
            if let Some(stored) = self.commits.get(&next) {
                queue.extend(stored.commit.parent_ids.iter().cloned());
            }
        }
        seen
    }

    /// Nearest commit reachable from both `a` and `b`, searching from `b`
    /// breadth-first.
    fn merge_base_id(&self, a: &CommitId, b: &CommitId) -> Option<CommitId> {
        let from_a = self.ancestors(a);
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([b.clone()]);
        while let Some(next) = queue.pop_front() {
            if from_a.contains(&next) {
                return Some(next);
            }
            if !seen.insert(next.clone()) {
                continue;
            }
            if let Some(stored) = self.commits.get(&next) {
                queue.extend(stored.commit.parent_ids.iter().cloned());
            }
        }
        None
    }

    fn insert_commit(&mut self, commit: Commit, tree: Tree) {
        self.commits
            .insert(commit.id.clone(), StoredCommit { commit, tree });
    }
}

/// Apply commit actions to `tree` with host validation rules.
fn apply_actions(tree: &mut Tree, actions: &[CommitAction]) -> Result<(), VcsError> {
    for action in actions {
        match action {
            CommitAction::Create { path, content } => {
                if tree.contains_key(path) {
                    return Err(VcsError::rejected(format!(
                        "a file with this name already exists: {path}"
                    )));
                }
                tree.insert(path.clone(), content.clone());
            }
            CommitAction::Update { path, content } => {
                let Some(slot) = tree.get_mut(path) else {
                    return Err(VcsError::rejected(format!(
                        "a file with this name doesn't exist: {path}"
                    )));
                };
                slot.clone_from(content);
            }
            CommitAction::Delete { path } => {
                if tree.remove(path).is_none() {
                    return Err(VcsError::rejected(format!(
                        "a file with this name doesn't exist: {path}"
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Paths whose content differs between two trees.
fn changed_paths<'a>(before: &'a Tree, after: &'a Tree) -> Vec<&'a str> {
    let mut paths: Vec<&str> = before
        .keys()
        .chain(after.keys())
        .map(String::as_str)
        .filter(|p| before.get(*p) != after.get(*p))
        .collect();
    paths.sort_unstable();
    paths.dedup();
    paths
}

/// File-level diff with exact-content rename detection.
fn diff_trees(base: &Tree, head: &Tree) -> Vec<DiffEntry> {
    let mut deleted: Vec<&String> = base.keys().filter(|p| !head.contains_key(*p)).collect();
    let mut added: Vec<&String> = head.keys().filter(|p| !base.contains_key(*p)).collect();
    let mut entries: Vec<DiffEntry> = base
        .iter()
        .filter(|(p, content)| head.get(*p).is_some_and(|c| c != *content))
        .map(|(p, _)| DiffEntry::modified(p.clone()))
        .collect();

    let mut renamed_from = Vec::new();
    for old in &deleted {
        if let Some(pos) = added.iter().position(|new| head.get(*new) == base.get(*old)) {
            let new = added.remove(pos);
            entries.push(DiffEntry::renamed((*old).clone(), new.clone()));
            renamed_from.push((*old).clone());
        }
    }
    deleted.retain(|p| !renamed_from.contains(*p));

    entries.extend(deleted.into_iter().map(|p| DiffEntry::deleted(p.clone())));
    entries.extend(added.into_iter().map(|p| DiffEntry::added(p.clone())));
    entries.sort_by(|a, b| a.new_path.cmp(&b.new_path));
    entries
}

// ---------------------------------------------------------------------------
// MemoryHost
// ---------------------------------------------------------------------------

/// An in-process repository host. See the module docs.
#[derive(Debug, Default)]
pub struct MemoryHost {
    state: Mutex<State>,
}

impl MemoryHost {
    /// An empty host with instant rebases.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -----------------------------------------------------------------------
    // Seeding and direct manipulation
    // -----------------------------------------------------------------------

    /// Create a project whose default branch holds one root commit with
    /// `files`. Returns the root commit id.
    pub fn add_project(
        &self,
        project: &ProjectId,
        default_branch: &str,
        files: &[(&str, &[u8])],
    ) -> CommitId {
        let mut state = self.state();
        let id = state.next_commit_id();
        let tree: Tree = files
            .iter()
            .map(|(p, c)| ((*p).to_owned(), c.to_vec()))
            .collect();
        let mut project_state = ProjectState {
            default_branch: default_branch.to_owned(),
            next_iid: 1,
            ..ProjectState::default()
        };
        project_state.insert_commit(
            Commit {
                id: id.clone(),
                parent_ids: Vec::new(),
                message: "initial commit".to_owned(),
                author: "host".to_owned(),
            },
            tree,
        );
        project_state
            .branches
            .insert(default_branch.to_owned(), id.clone());
        state.projects.insert(project.clone(), project_state);
        id
    }

    /// Commit upserts (`Some`) and removals (`None`) straight onto `branch`,
    /// bypassing action validation and the call log. Simulates collaborators
    /// pushing work.
    ///
    /// # Errors
    /// Returns [`VcsError::NotFound`] if the project or branch is unknown.
    pub fn push(
        &self,
        project: &ProjectId,
        branch: &str,
        message: &str,
        changes: &[(&str, Option<&[u8]>)],
    ) -> Result<CommitId, VcsError> {
        let mut state = self.state();
        let id = state.next_commit_id();
        let p = state.project_mut(project)?;
        let parent = p
            .branches
            .get(branch)
            .cloned()
            .ok_or_else(|| VcsError::not_found(format!("branch {branch}")))?;
        let mut tree = p.stored(&parent)?.tree.clone();
        for (path, content) in changes {
            match content {
                Some(c) => {
                    tree.insert((*path).to_owned(), c.to_vec());
                }
                None => {
                    tree.remove(*path);
                }
            }
        }
        p.insert_commit(
            Commit {
                id: id.clone(),
                parent_ids: vec![parent],
                message: message.to_owned(),
                author: "collaborator".to_owned(),
            },
            tree,
        );
        p.branches.insert(branch.to_owned(), id.clone());
        Ok(id)
    }

    /// Current head of `branch`, if it exists.
    #[must_use]
    pub fn head(&self, project: &ProjectId, branch: &str) -> Option<CommitId> {
        self.state()
            .projects
            .get(project)
            .and_then(|p| p.branches.get(branch).cloned())
    }

    /// All branch names in the project, sorted.
    #[must_use]
    pub fn branch_names(&self, project: &ProjectId) -> Vec<String> {
        self.state()
            .projects
            .get(project)
            .map(|p| p.branches.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Full file map at a revision.
    #[must_use]
    pub fn files_at(
        &self,
        project: &ProjectId,
        revision: &str,
    ) -> Option<BTreeMap<String, Vec<u8>>> {
        let state = self.state();
        let p = state.projects.get(project)?;
        let id = p.resolve(revision).ok()?;
        p.commits.get(&id).map(|s| s.tree.clone())
    }

    /// Merge requests that have not been closed.
    #[must_use]
    pub fn open_merge_requests(&self, project: &ProjectId) -> Vec<MergeRequest> {
        self.state()
            .projects
            .get(project)
            .map(|p| {
                p.merge_requests
                    .values()
                    .filter(|mr| mr.open)
                    .map(|mr| mr.request.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Mark `count` pipelines as running on `branch`. Each
    /// [`running_pipelines`](VcsProvider::running_pipelines) poll lets one
    /// of them finish.
    pub fn set_running_pipelines(&self, project: &ProjectId, branch: &str, count: usize) {
        if let Some(p) = self.state().projects.get_mut(project) {
            p.pipelines.insert(branch.to_owned(), count);
        }
    }

    /// Number of status polls a rebase stays in progress before completing.
    pub fn set_rebase_latency(&self, polls: u32) {
        self.state().rebase_latency = polls;
    }

    /// When set, rebases never leave the in-progress state.
    pub fn stall_rebases(&self, stall: bool) {
        self.state().stall_rebases = stall;
    }

    /// Arm a fault.
    pub fn inject(&self, rule: FaultRule) {
        self.state().faults.push(rule);
    }

    /// Disarm every fault.
    pub fn clear_faults(&self) {
        self.state().faults.clear();
    }

    /// Every provider call made so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    /// Calls that changed host state.
    #[must_use]
    pub fn mutations(&self) -> Vec<Call> {
        self.state()
            .calls
            .iter()
            .filter(|c| c.op.is_mutation())
            .cloned()
            .collect()
    }

    /// Forget the call log.
    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    // -----------------------------------------------------------------------
    // Rebase engine
    // -----------------------------------------------------------------------

    /// Replay the source branch's commits onto the target head. On conflict
    /// the source branch is left untouched and the conflicting path reported.
    fn perform_rebase(
        state: &mut State,
        project: &ProjectId,
        source: &str,
        target: &str,
    ) -> Option<String> {
        let plan = match state.project(project).and_then(|p| plan_rebase(p, source, target)) {
            Ok(plan) => plan,
            Err(e) => return Some(e.to_string()),
        };
        let new_head = match plan {
            RebasePlan::UpToDate => return None,
            RebasePlan::Conflict(path) => return Some(format!("rebase conflict in {path}")),
            RebasePlan::FastForward(head) => head,
            RebasePlan::Replay { onto, commits } => {
                let mut parent = onto;
                let mut rewritten = Vec::with_capacity(commits.len());
                for (original, tree) in commits {
                    let id = state.next_commit_id();
                    rewritten.push((
                        Commit {
                            id: id.clone(),
                            parent_ids: vec![parent],
                            message: original.message,
                            author: original.author,
                        },
                        tree,
                    ));
                    parent = id;
                }
                let Ok(p) = state.project_mut(project) else {
                    return Some(format!("unknown project {project}"));
                };
                for (commit, tree) in rewritten {
                    p.insert_commit(commit, tree);
                }
                parent
            }
        };
        if let Ok(p) = state.project_mut(project) {
            p.branches.insert(source.to_owned(), new_head);
        }
        None
    }
}

enum RebasePlan {
    UpToDate,
    FastForward(CommitId),
    Conflict(String),
    Replay {
        onto: CommitId,
        commits: Vec<(Commit, Tree)>,
    },
}

fn plan_rebase(p: &ProjectState, source: &str, target: &str) -> Result<RebasePlan, VcsError> {
    let source_head = p.resolve(source)?;
    let target_head = p.resolve(target)?;
    let onto = p.ancestors(&target_head);

    // First-parent chain of source-only commits, newest first.
    let mut chain = Vec::new();
    let mut cursor = Some(source_head);
    while let Some(id) = cursor {
        if onto.contains(&id) {
            break;
        }
        let stored = p.stored(&id)?;
        cursor = stored.commit.parent_ids.first().cloned();
        chain.push(stored);
    }
    chain.reverse();

    let Some(oldest) = chain.first() else {
        return Ok(RebasePlan::FastForward(target_head));
    };
    if oldest.commit.parent_ids.first() == Some(&target_head) {
        return Ok(RebasePlan::UpToDate);
    }

    let empty = Tree::new();
    let mut tree = p.stored(&target_head)?.tree.clone();
    let mut commits = Vec::with_capacity(chain.len());
    for stored in chain {
        let before = stored
            .commit
            .parent_ids
            .first()
            .and_then(|id| p.commits.get(id))
            .map_or(&empty, |s| &s.tree);
        for path in changed_paths(before, &stored.tree) {
            let wants = stored.tree.get(path);
            let now = tree.get(path);
            if now == wants {
                continue;
            }
            if now != before.get(path) {
                return Ok(RebasePlan::Conflict(path.to_owned()));
            }
            match wants {
                Some(content) => {
                    tree.insert(path.to_owned(), content.clone());
                }
                None => {
                    tree.remove(path);
                }
            }
        }
        commits.push((stored.commit.clone(), tree.clone()));
    }
    Ok(RebasePlan::Replay {
        onto: target_head,
        commits,
    })
}

// ---------------------------------------------------------------------------
// VcsProvider
// ---------------------------------------------------------------------------

impl VcsProvider for MemoryHost {
    fn default_branch(&self, project: &ProjectId) -> Result<String, VcsError> {
        let mut state = self.state();
        state.enter(Op::DefaultBranch, project.as_str())?;
        Ok(state.project(project)?.default_branch.clone())
    }

    fn get_branch(&self, project: &ProjectId, name: &str) -> Result<Branch, VcsError> {
        let mut state = self.state();
        state.enter(Op::GetBranch, name)?;
        state.project(project)?.branch(name)
    }

    fn list_branches(&self, project: &ProjectId, search: &str) -> Result<Vec<Branch>, VcsError> {
        let mut state = self.state();
        state.enter(Op::ListBranches, search)?;
        let p = state.project(project)?;
        // Substring search, like the host's `search` parameter.
        p.branches
            .keys()
            .filter(|name| name.contains(search))
            .map(|name| p.branch(name))
            .collect()
    }

    fn create_branch(
        &self,
        project: &ProjectId,
        name: &str,
        from_revision: &str,
    ) -> Result<Option<Branch>, VcsError> {
        let mut state = self.state();
        if let Some(Fault::Refuse) = state.enter(Op::CreateBranch, name)? {
            return Ok(None);
        }
        let p = state.project_mut(project)?;
        if p.branches.contains_key(name) {
            return Err(VcsError::rejected(format!("branch already exists: {name}")));
        }
        let id = p.resolve(from_revision)?;
        p.branches.insert(name.to_owned(), id);
        p.branch(name).map(Some)
    }

    fn delete_branch(&self, project: &ProjectId, name: &str) -> Result<bool, VcsError> {
        let mut state = self.state();
        if let Some(Fault::Refuse) = state.enter(Op::DeleteBranch, name)? {
            return Ok(false);
        }
        let p = state.project_mut(project)?;
        if p.default_branch == name {
            return Err(VcsError::forbidden(format!("branch {name} is protected")));
        }
        if p.branches.remove(name).is_none() {
            return Err(VcsError::not_found(format!("branch {name}")));
        }
        p.pipelines.remove(name);
        Ok(true)
    }

    fn commit_refs(
        &self,
        project: &ProjectId,
        commit: &CommitId,
        ref_type: RefType,
    ) -> Result<Vec<String>, VcsError> {
        let mut state = self.state();
        state.enter(Op::CommitRefs, commit.as_str())?;
        let p = state.project(project)?;
        p.stored(commit)?;
        if ref_type == RefType::Tag {
            return Ok(Vec::new());
        }
        Ok(p.branches
            .iter()
            .filter(|(_, head)| p.ancestors(head).contains(commit))
            .map(|(name, _)| name.clone())
            .collect())
    }

    fn merge_base(&self, project: &ProjectId, a: &str, b: &str) -> Result<Commit, VcsError> {
        let mut state = self.state();
        state.enter(Op::MergeBase, &format!("{a}...{b}"))?;
        let p = state.project(project)?;
        let (a_id, b_id) = (p.resolve(a)?, p.resolve(b)?);
        let base = p
            .merge_base_id(&a_id, &b_id)
            .ok_or_else(|| VcsError::not_found(format!("merge base of {a} and {b}")))?;
        Ok(p.stored(&base)?.commit.clone())
    }

    fn list_commits(
        &self,
        project: &ProjectId,
        revision: &str,
        limit: usize,
    ) -> Result<Vec<Commit>, VcsError> {
        let mut state = self.state();
        state.enter(Op::ListCommits, revision)?;
        let p = state.project(project)?;
        let mut out = Vec::new();
        let mut cursor = Some(p.resolve(revision)?);
        while let Some(id) = cursor {
            if out.len() >= limit {
                break;
            }
            let stored = p.stored(&id)?;
            cursor = stored.commit.parent_ids.first().cloned();
            out.push(stored.commit.clone());
        }
        Ok(out)
    }

    fn compare(
        &self,
        project: &ProjectId,
        base: &str,
        head: &str,
    ) -> Result<Vec<DiffEntry>, VcsError> {
        let mut state = self.state();
        state.enter(Op::Compare, &format!("{base}..{head}"))?;
        let p = state.project(project)?;
        let base_tree = &p.stored(&p.resolve(base)?)?.tree;
        let head_tree = &p.stored(&p.resolve(head)?)?.tree;
        Ok(diff_trees(base_tree, head_tree))
    }

    fn create_commit(
        &self,
        project: &ProjectId,
        branch: &str,
        message: &str,
        author: &str,
        actions: &[CommitAction],
    ) -> Result<Commit, VcsError> {
        let mut state = self.state();
        state.enter(Op::CreateCommit, branch)?;
        if actions.is_empty() {
            return Err(VcsError::rejected("a commit needs at least one action"));
        }
        let (parent, tree) = {
            let p = state.project(project)?;
            let parent = p
                .branches
                .get(branch)
                .cloned()
                .ok_or_else(|| VcsError::not_found(format!("branch {branch}")))?;
            let mut tree = p.stored(&parent)?.tree.clone();
            apply_actions(&mut tree, actions)?;
            (parent, tree)
        };
        let id = state.next_commit_id();
        let p = state.project_mut(project)?;
        let commit = Commit {
            id: id.clone(),
            parent_ids: vec![parent],
            message: message.to_owned(),
            author: author.to_owned(),
        };
        p.insert_commit(commit.clone(), tree);
        p.branches.insert(branch.to_owned(), id);
        Ok(commit)
    }

    fn create_merge_request(
        &self,
        project: &ProjectId,
        source: &str,
        target: &str,
        _title: &str,
        _description: &str,
    ) -> Result<MergeRequest, VcsError> {
        let mut state = self.state();
        state.enter(Op::CreateMergeRequest, source)?;
        let p = state.project_mut(project)?;
        for branch in [source, target] {
            if !p.branches.contains_key(branch) {
                return Err(VcsError::not_found(format!("branch {branch}")));
            }
        }
        let iid = p.next_iid;
        p.next_iid += 1;
        let request = MergeRequest {
            iid,
            source_branch: source.to_owned(),
            target_branch: target.to_owned(),
            web_url: format!("memory://{project}/merge_requests/{iid}"),
        };
        p.merge_requests.insert(
            iid,
            StoredMergeRequest {
                request: request.clone(),
                open: true,
                rebase: RebaseState::Idle,
            },
        );
        Ok(request)
    }

    fn rebase_merge_request(&self, project: &ProjectId, iid: u64) -> Result<(), VcsError> {
        let mut state = self.state();
        state.enter(Op::RebaseMergeRequest, &iid.to_string())?;
        let latency = state.rebase_latency;
        let p = state.project_mut(project)?;
        let mr = p
            .merge_requests
            .get_mut(&iid)
            .filter(|mr| mr.open)
            .ok_or_else(|| VcsError::not_found(format!("open merge request !{iid}")))?;
        mr.rebase = RebaseState::Pending {
            polls_left: latency,
        };
        Ok(())
    }

    fn rebase_status(&self, project: &ProjectId, iid: u64) -> Result<RebaseStatus, VcsError> {
        let mut state = self.state();
        state.enter(Op::RebaseStatus, &iid.to_string())?;
        let stall = state.stall_rebases;
        let p = state.project_mut(project)?;
        let mr = p
            .merge_requests
            .get_mut(&iid)
            .ok_or_else(|| VcsError::not_found(format!("merge request !{iid}")))?;
        let (source, target) = match &mut mr.rebase {
            RebaseState::Idle => return Ok(RebaseStatus::default()),
            RebaseState::Done { merge_error } => {
                return Ok(RebaseStatus {
                    in_progress: false,
                    merge_error: merge_error.clone(),
                });
            }
            RebaseState::Pending { polls_left } => {
                if stall || *polls_left > 0 {
                    *polls_left = polls_left.saturating_sub(1);
                    return Ok(RebaseStatus {
                        in_progress: true,
                        merge_error: None,
                    });
                }
                (
                    mr.request.source_branch.clone(),
                    mr.request.target_branch.clone(),
                )
            }
        };

        let merge_error = Self::perform_rebase(&mut state, project, &source, &target);
        if let Some(mr) = state.project_mut(project)?.merge_requests.get_mut(&iid) {
            mr.rebase = RebaseState::Done {
                merge_error: merge_error.clone(),
            };
        }
        Ok(RebaseStatus {
            in_progress: false,
            merge_error,
        })
    }

    fn close_merge_request(&self, project: &ProjectId, iid: u64) -> Result<(), VcsError> {
        let mut state = self.state();
        state.enter(Op::CloseMergeRequest, &iid.to_string())?;
        let p = state.project_mut(project)?;
        let mr = p
            .merge_requests
            .get_mut(&iid)
            .ok_or_else(|| VcsError::not_found(format!("merge request !{iid}")))?;
        mr.open = false;
        Ok(())
    }

    fn running_pipelines(&self, project: &ProjectId, branch: &str) -> Result<usize, VcsError> {
        let mut state = self.state();
        state.enter(Op::RunningPipelines, branch)?;
        let p = state.project_mut(project)?;
        let running = p.pipelines.get(branch).copied().unwrap_or(0);
        if running > 0 {
            p.pipelines.insert(branch.to_owned(), running - 1);
        }
        Ok(running)
    }
}

impl FileProvider for MemoryHost {
    fn read_file(
        &self,
        project: &ProjectId,
        revision: &str,
        path: &str,
    ) -> Result<Option<Vec<u8>>, VcsError> {
        let mut state = self.state();
        state.enter(Op::ReadFile, path)?;
        let p = state.project(project)?;
        let id = p.resolve(revision)?;
        Ok(p.stored(&id)?.tree.get(path).cloned())
    }
}
