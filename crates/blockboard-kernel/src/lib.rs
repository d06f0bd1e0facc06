//! # blockboard-kernel
//!
//! Keeps a block document on a git branch and mirrors it into a chat message.
//!
//! The branch is the source of truth. Writers never lock: each update reads
//! the branch head, applies a pure [`Mutation`], commits locally, and
//! publishes with a fast-forward push. A rejected push means someone else
//! won, so the [`Orchestrator`] starts over from a fresh snapshot. The chat
//! message is overwritten with every document that is about to publish.
//!
//! - [`store`]: the [`VersionedStore`] contract and its git implementation
//! - [`projection`] / [`slack`]: the chat side
//! - [`lifecycle`]: allocating and deleting document branches
//! - [`workspace`]: the per-run working copy

pub mod config;
pub mod git_ops;
pub mod lifecycle;
pub mod mutation;
pub mod orchestrator;
pub mod projection;
pub mod slack;
pub mod store;
pub mod workspace;

pub use config::{BlockboardConfig, ConfigError, RemoteLocation};
pub use git_ops::{GitAuth, GitError, GitRepo, PushStatus};
pub use lifecycle::LifecycleError;
pub use mutation::{Mutated, Mutation, MutationError};
pub use orchestrator::{
    ConflictKind, Orchestrator, RetryPolicy, UpdateError, UpdateOutcome, UpdateReport,
};
pub use projection::{ChatClient, ChatError, MessageProjection};
pub use slack::SlackClient;
pub use store::{
    BranchPresence, BranchStore, GitStore, PublishOutcome, Snapshot, StoreError, StoreResult,
    StoreSettings, VersionedStore,
};
pub use workspace::WorkingCopy;
