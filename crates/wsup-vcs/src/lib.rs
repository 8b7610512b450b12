//! Version-control provider abstraction for wsup.
//!
//! This crate defines the [`VcsProvider`] and [`FileProvider`] traits, the
//! single interface through which the wsup core reaches a repository host.
//! The core never speaks a host API directly; it programs against the traits.
//!
//! # Crate layout
//!
//! - [`provider`]: the trait definitions and the combined [`Host`] bound.
//! - [`types`]: value types used in trait signatures ([`CommitId`],
//!   [`Branch`], [`DiffEntry`], [`CommitAction`], etc.).
//! - [`error`]: the [`VcsError`] enum returned by all trait methods.
//! - [`memory`]: [`MemoryHost`], an in-process host with fault injection.

pub mod error;
pub mod memory;
pub mod provider;
pub mod types;

pub use error::VcsError;
pub use memory::{Call, Fault, FaultRule, MemoryHost, Op};
pub use provider::{FileProvider, Host, VcsProvider};
pub use types::{
    Branch, ChangeKind, Commit, CommitAction, CommitId, DiffEntry, MergeRequest, ProjectId,
    RebaseStatus, RefType,
};
