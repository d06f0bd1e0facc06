//! Branch lifecycle: allocate a document branch, and delete one.

use tracing::info;

use blockboard_types::{BranchName, Document};

use crate::store::{BranchStore, PublishOutcome, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("branch '{branch}' already exists {location}")]
    BranchExists {
        branch: BranchName,
        location: &'static str,
    },

    #[error("remote rejected new branch '{branch}': {reason}")]
    PublishRejected { branch: BranchName, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Create a fresh branch holding `seed` and return its generated name.
///
/// `store` must have the base branch checked out; the new branch starts
/// from its head.
pub async fn create(
    store: &dyn BranchStore,
    seed: &Document,
    message: &str,
) -> Result<BranchName, LifecycleError> {
    let branch = BranchName::generate();
    create_named(store, &branch, seed, message).await?;
    Ok(branch)
}

/// Like [`create`], with a caller-chosen name.
pub async fn create_named(
    store: &dyn BranchStore,
    branch: &BranchName,
    seed: &Document,
    message: &str,
) -> Result<(), LifecycleError> {
    let presence = store.presence(branch).await?;
    let location = match (presence.local, presence.remote) {
        (true, _) => Some("locally"),
        (false, true) => Some("on the remote"),
        (false, false) => None,
    };
    if let Some(location) = location {
        return Err(LifecycleError::BranchExists {
            branch: branch.clone(),
            location,
        });
    }

    store.start_branch(branch).await?;
    let commit = store.commit_local(seed, message).await?;
    match store.publish(branch).await? {
        PublishOutcome::Published => {
            info!(branch = %branch, commit = %commit.short(), blocks = seed.len(), "created document branch");
            Ok(())
        }
        PublishOutcome::Rejected { reason } => Err(LifecycleError::PublishRejected {
            branch: branch.clone(),
            reason,
        }),
    }
}

/// Delete `branch` from the remote.
pub async fn remove(store: &dyn BranchStore, branch: &BranchName) -> Result<(), LifecycleError> {
    store.delete_remote_branch(branch).await?;
    info!(branch = %branch, "removed document branch");
    Ok(())
}
