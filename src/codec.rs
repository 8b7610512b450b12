//! Branch naming for workspaces.
//!
//! Every workspace branch on the host is named
//!
//! ```text
//! <access tag>-<kind tag>/<workspace id>
//! ```
//!
//! | Access type           | User             | Group             |
//! |-----------------------|------------------|-------------------|
//! | workspace             | `ws-user/`       | `ws-group/`       |
//! | conflict resolution   | `resolve-user/`  | `resolve-group/`  |
//! | backup                | `backup-user/`   | `backup-group/`   |
//!
//! Every prefix ends with the delimiter and the tags never contain it, so no
//! prefix is a prefix of another: listing `ws-user/` can never pick up a
//! backup or conflict-resolution branch. These strings are persisted on the
//! host; changing them orphans existing workspaces.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Separates the `<access>-<kind>` prefix from the workspace id.
pub const BRANCH_DELIMITER: char = '/';

/// Prefix of throwaway branches used to try a rebase.
pub const TEMPORARY_BRANCH_PREFIX: &str = "tmp-";

// ---------------------------------------------------------------------------
// WorkspaceKind / AccessType
// ---------------------------------------------------------------------------

/// Who owns a workspace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceKind {
    /// A workspace owned by one user.
    User,
    /// A workspace shared by a group.
    Group,
}

impl WorkspaceKind {
    /// Every kind, in listing order.
    pub const ALL: [Self; 2] = [Self::User, Self::Group];

    const fn tag(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Group => "group",
        }
    }

    /// Human label used in logs and errors.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Group => "group",
        }
    }
}

/// Which of a workspace's branches is addressed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessType {
    /// The workspace itself, the only branch collaborators commit to.
    Workspace,
    /// Scratch branch carrying the workspace diff replayed on the baseline.
    ConflictResolution,
    /// Snapshot taken right before the workspace branch is re-pointed.
    Backup,
}

impl AccessType {
    /// Every access type.
    pub const ALL: [Self; 3] = [Self::Workspace, Self::ConflictResolution, Self::Backup];

    const fn tag(self) -> &'static str {
        match self {
            Self::Workspace => "ws",
            Self::ConflictResolution => "resolve",
            Self::Backup => "backup",
        }
    }

    /// Human label used in logs and errors.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Workspace => "workspace",
            Self::ConflictResolution => "workspace with conflict resolution",
            Self::Backup => "backup workspace",
        }
    }

    /// Plural form of [`label`](Self::label).
    #[must_use]
    pub const fn label_plural(self) -> &'static str {
        match self {
            Self::Workspace => "workspaces",
            Self::ConflictResolution => "workspaces with conflict resolution",
            Self::Backup => "backup workspaces",
        }
    }
}

// ---------------------------------------------------------------------------
// WorkspaceId
// ---------------------------------------------------------------------------

/// A validated workspace identifier.
///
/// Non-empty, drawn from `a-z A-Z 0-9 _ . -`. The first and last characters
/// must be alphanumeric or `_`, and two `.` may not be adjacent.
/// Examples: `abc-1.2_3`, `A_1`, `feature.login`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WorkspaceId(String);

/// Why a string is not a valid [`WorkspaceId`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid workspace id {value:?}: {reason}")]
pub struct InvalidWorkspaceId {
    /// The rejected value.
    pub value: String,
    /// The first violation found.
    pub reason: String,
}

impl WorkspaceId {
    /// Validate and wrap a workspace id.
    pub fn new(s: &str) -> Result<Self, InvalidWorkspaceId> {
        Self::validate(s)?;
        Ok(Self(s.to_owned()))
    }

    /// Return the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if `s` satisfies the id grammar.
    #[must_use]
    pub fn is_valid(s: &str) -> bool {
        Self::validate(s).is_ok()
    }

    /// One left-to-right pass; stops at the first violation.
    fn validate(s: &str) -> Result<(), InvalidWorkspaceId> {
        let reject = |reason: String| InvalidWorkspaceId {
            value: s.to_owned(),
            reason,
        };
        let bytes = s.as_bytes();
        if bytes.is_empty() {
            return Err(reject("workspace id must not be empty".to_owned()));
        }
        let last = bytes.len() - 1;
        for (i, &b) in bytes.iter().enumerate() {
            let at_edge = i == 0 || i == last;
            match b {
                b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_' => {}
                b'-' | b'.' if at_edge => {
                    let side = if i == 0 { "start" } else { "end" };
                    return Err(reject(format!(
                        "workspace id must not {side} with '{}'",
                        b as char
                    )));
                }
                b'-' => {}
                b'.' if bytes[i - 1] == b'.' => {
                    return Err(reject("workspace id must not contain \"..\"".to_owned()));
                }
                b'.' => {}
                _ => {
                    let c = s[i..].chars().next().unwrap_or('\u{fffd}');
                    return Err(reject(format!(
                        "invalid character {c:?} at position {i}; allowed: a-z, A-Z, 0-9, '_', '.', '-'"
                    )));
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for WorkspaceId {
    type Err = InvalidWorkspaceId;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for WorkspaceId {
    type Error = InvalidWorkspaceId;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::validate(&s)?;
        Ok(Self(s))
    }
}

impl From<WorkspaceId> for String {
    fn from(id: WorkspaceId) -> Self {
        id.0
    }
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

/// The listing prefix shared by all branches of one kind and access type.
///
/// # Example
/// ```
/// use wsup::codec::{prefix, AccessType, WorkspaceKind};
/// assert_eq!(prefix(WorkspaceKind::User, AccessType::Backup), "backup-user/");
/// ```
#[must_use]
pub fn prefix(kind: WorkspaceKind, access: AccessType) -> String {
    format!("{}-{}{BRANCH_DELIMITER}", access.tag(), kind.tag())
}

/// The branch name for one workspace branch.
///
/// # Example
/// ```
/// use wsup::codec::{encode, AccessType, WorkspaceId, WorkspaceKind};
/// let id = WorkspaceId::new("alice-1").unwrap();
/// assert_eq!(encode(WorkspaceKind::User, AccessType::Workspace, &id), "ws-user/alice-1");
/// ```
#[must_use]
pub fn encode(kind: WorkspaceKind, access: AccessType, id: &WorkspaceId) -> String {
    format!("{}{id}", prefix(kind, access))
}

/// Recover the workspace id from a branch name, or `None` if the name does
/// not belong to `(kind, access)`.
#[must_use]
pub fn decode(name: &str, kind: WorkspaceKind, access: AccessType) -> Option<WorkspaceId> {
    let rest = name.strip_prefix(&prefix(kind, access))?;
    WorkspaceId::new(rest).ok()
}

/// A fresh throwaway branch name. Never decodes as a workspace branch.
#[must_use]
pub fn temporary_branch_name() -> String {
    format!("{TEMPORARY_BRANCH_PREFIX}{:016x}", rand::random::<u64>())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn accepts_valid_ids() {
        for id in ["abc-1.2_3", "A_1", "a", "_", "x.y.z", "a-b-c", "__init__", "9"] {
            assert!(WorkspaceId::is_valid(id), "{id} should be valid");
        }
    }

    #[test]
    fn rejects_invalid_ids() {
        for id in ["", ".abc", "abc.", "a..b", "a/b", "-abc", "abc-", "a b", "é", "a\u{e9}b", "."] {
            assert!(!WorkspaceId::is_valid(id), "{id:?} should be invalid");
        }
    }

    #[test]
    fn reports_first_violation() {
        let err = WorkspaceId::new("a..b/c").unwrap_err();
        assert!(err.reason.contains(".."), "{}", err.reason);

        let err = WorkspaceId::new("ab/..").unwrap_err();
        assert!(err.reason.contains("'/'"), "{}", err.reason);

        let err = WorkspaceId::new("-x").unwrap_err();
        assert!(err.reason.contains("start"), "{}", err.reason);

        let err = WorkspaceId::new("x.").unwrap_err();
        assert!(err.reason.contains("end"), "{}", err.reason);
    }

    #[test]
    fn prefixes_are_distinct_and_not_nested() {
        let all: Vec<String> = WorkspaceKind::ALL
            .iter()
            .flat_map(|k| AccessType::ALL.iter().map(move |a| prefix(*k, *a)))
            .collect();
        for (i, a) in all.iter().enumerate() {
            for (j, b) in all.iter().enumerate() {
                if i != j {
                    assert!(!b.starts_with(a.as_str()), "{a} is a prefix of {b}");
                }
            }
            assert!(!a.starts_with(TEMPORARY_BRANCH_PREFIX));
        }
    }

    #[test]
    fn decode_rejects_foreign_names() {
        let id = WorkspaceId::new("w1").unwrap();
        let backup = encode(WorkspaceKind::User, AccessType::Backup, &id);
        assert_eq!(decode(&backup, WorkspaceKind::User, AccessType::Workspace), None);
        assert_eq!(decode(&backup, WorkspaceKind::Group, AccessType::Backup), None);
        assert_eq!(
            decode(&backup, WorkspaceKind::User, AccessType::Backup),
            Some(id)
        );
        assert_eq!(decode("ws-user/", WorkspaceKind::User, AccessType::Workspace), None);
        assert_eq!(
            decode(&temporary_branch_name(), WorkspaceKind::User, AccessType::Workspace),
            None
        );
    }

    #[test]
    fn serde_rejects_invalid_id() {
        let ok: WorkspaceId = serde_json::from_str("\"good.id\"").unwrap();
        assert_eq!(ok.as_str(), "good.id");
        assert!(serde_json::from_str::<WorkspaceId>("\"bad..id\"").is_err());
    }

    fn kind() -> impl Strategy<Value = WorkspaceKind> {
        prop_oneof![Just(WorkspaceKind::User), Just(WorkspaceKind::Group)]
    }

    fn access() -> impl Strategy<Value = AccessType> {
        prop_oneof![
            Just(AccessType::Workspace),
            Just(AccessType::ConflictResolution),
            Just(AccessType::Backup),
        ]
    }

    proptest! {
        #[test]
        fn round_trips_every_valid_id(
            id in "[a-zA-Z0-9_]([a-zA-Z0-9_.-]{0,30}[a-zA-Z0-9_])?",
            kind in kind(),
            access in access(),
        ) {
            prop_assume!(!id.contains(".."));
            let id = WorkspaceId::new(&id).unwrap();
            let name = encode(kind, access, &id);
            prop_assert_eq!(decode(&name, kind, access), Some(id));
        }

        #[test]
        fn names_never_decode_under_another_pair(
            id in "[a-z0-9]{1,12}",
            kind in kind(),
            access in access(),
            other_kind in kind(),
            other_access in access(),
        ) {
            prop_assume!((kind, access) != (other_kind, other_access));
            let id = WorkspaceId::new(&id).unwrap();
            let name = encode(kind, access, &id);
            prop_assert_eq!(decode(&name, other_kind, other_access), None);
        }

        #[test]
        fn validator_never_accepts_forbidden_shapes(s in "\\PC{0,16}") {
            if WorkspaceId::is_valid(&s) {
                prop_assert!(!s.is_empty());
                prop_assert!(!s.contains(".."));
                prop_assert!(!s.starts_with(['.', '-']));
                prop_assert!(!s.ends_with(['.', '-']));
                prop_assert!(s.bytes().all(|b| b.is_ascii_alphanumeric() || b"_.-".contains(&b)));
            }
        }
    }
}
