//! Value types shared between the provider traits and the wsup core.
//!
//! Nothing in here knows how a host stores data. Identifiers are opaque
//! strings compared by equality only.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Identifier of a project on the repository host.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(String);

impl ProjectId {
    /// Wrap a host project identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Return the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An opaque commit identifier issued by the host.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitId(String);

impl CommitId {
    /// Wrap a host commit identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Return the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// A commit as seen through the provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Commit {
    /// The commit identifier.
    pub id: CommitId,
    /// Parent commit identifiers, first parent first.
    pub parent_ids: Vec<CommitId>,
    /// The commit message.
    pub message: String,
    /// Who created the commit.
    pub author: String,
}

/// A named branch and the commit it currently points at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Branch {
    /// Full branch name.
    pub name: String,
    /// The branch head.
    pub head: Commit,
}

impl Branch {
    /// Identifier of the branch head commit.
    #[must_use]
    pub const fn head_id(&self) -> &CommitId {
        &self.head.id
    }
}

/// Which kind of ref to ask [`commit_refs`](crate::VcsProvider::commit_refs)
/// about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RefType {
    /// Branches whose history contains the commit.
    Branch,
    /// Tags pointing at the commit or a descendant of it.
    Tag,
}

// ---------------------------------------------------------------------------
// Diffs and commit actions
// ---------------------------------------------------------------------------

/// The kind of change a [`DiffEntry`] describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// File was added.
    Added,
    /// File was deleted.
    Deleted,
    /// File moved from `old_path` to `new_path` (content may also differ).
    Renamed,
    /// File content changed in place.
    Modified,
}

/// A single file-level change between two revisions.
///
/// For additions `old_path` equals `new_path`; the same holds for deletions
/// and modifications. Only renames carry two different paths.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiffEntry {
    /// Path in the base revision.
    pub old_path: String,
    /// Path in the head revision.
    pub new_path: String,
    /// What happened to the file.
    pub kind: ChangeKind,
}

impl DiffEntry {
    /// A file present only in the head revision.
    pub fn added(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            old_path: path.clone(),
            new_path: path,
            kind: ChangeKind::Added,
        }
    }

    /// A file present only in the base revision.
    pub fn deleted(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            old_path: path.clone(),
            new_path: path,
            kind: ChangeKind::Deleted,
        }
    }

    /// A file whose content changed in place.
    pub fn modified(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            old_path: path.clone(),
            new_path: path,
            kind: ChangeKind::Modified,
        }
    }

    /// A file moved between two paths.
    pub fn renamed(old_path: impl Into<String>, new_path: impl Into<String>) -> Self {
        Self {
            old_path: old_path.into(),
            new_path: new_path.into(),
            kind: ChangeKind::Renamed,
        }
    }
}

/// One instruction inside a [`create_commit`](crate::VcsProvider::create_commit)
/// call.
#[derive(Clone, PartialEq, Eq)]
pub enum CommitAction {
    /// Create a file that must not already exist.
    Create {
        /// Slash-separated path.
        path: String,
        /// Full file content.
        content: Vec<u8>,
    },
    /// Replace the content of a file that must exist.
    Update {
        /// Slash-separated path.
        path: String,
        /// Full file content.
        content: Vec<u8>,
    },
    /// Remove a file that must exist.
    Delete {
        /// Slash-separated path.
        path: String,
    },
}

impl CommitAction {
    /// The path this action touches.
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Create { path, .. } | Self::Update { path, .. } | Self::Delete { path } => path,
        }
    }
}

impl fmt::Debug for CommitAction {
    // Content is elided; actions can carry whole files.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create { path, content } => {
                write!(f, "Create({path}, {} bytes)", content.len())
            }
            Self::Update { path, content } => {
                write!(f, "Update({path}, {} bytes)", content.len())
            }
            Self::Delete { path } => write!(f, "Delete({path})"),
        }
    }
}

// ---------------------------------------------------------------------------
// Merge requests
// ---------------------------------------------------------------------------

/// A merge request opened on the host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergeRequest {
    /// Project-scoped merge request number.
    pub iid: u64,
    /// Source branch name.
    pub source_branch: String,
    /// Target branch name.
    pub target_branch: String,
    /// Link for humans; may be empty.
    pub web_url: String,
}

/// Snapshot of an asynchronous rebase on a merge request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RebaseStatus {
    /// `true` while the host is still working on the rebase.
    pub in_progress: bool,
    /// Set when the rebase finished with conflicts.
    pub merge_error: Option<String>,
}
