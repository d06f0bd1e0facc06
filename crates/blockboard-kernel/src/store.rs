//! Versioned document store.
//!
//! The update loop only needs four things from version control: a fresh
//! snapshot of a branch, a local commit, the remote's current head, and an
//! atomic fast-forward publish. [`VersionedStore`] is that contract;
//! [`BranchStore`] adds what create and remove need on top.
//!
//! [`GitStore`] is the git-backed implementation. It owns one working copy
//! and runs every libgit2 call on the blocking pool.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use git2::{ErrorCode, Oid};
use tracing::{debug, info};

use blockboard_types::{BranchName, CommitId, Document, DocumentError};

use crate::git_ops::{GitAuth, GitError, GitRepo, PushStatus};

/// Remote name used for the working copy.
pub const REMOTE: &str = "origin";

/// Mirror every remote branch into `refs/remotes/origin/*`.
const FETCH_REFSPEC: &str = "+refs/heads/*:refs/remotes/origin/*";

/// Errors from the versioned store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("git: {0}")]
    Git(#[from] GitError),

    #[error("branch '{0}' does not exist on the remote")]
    BranchNotFound(String),

    #[error("document {path}: {source}")]
    Document {
        path: PathBuf,
        #[source]
        source: DocumentError,
    },

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("remote refused to update '{refspec}': {reason}")]
    PushRefused { refspec: String, reason: String },

    #[error("blocking task failed: {0}")]
    Task(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A document as read from a fetched branch head.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub document: Document,
    /// Commit the document was read from.
    pub base: CommitId,
}

/// Result of trying to publish the local branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Published,
    /// Not a fast-forward of the remote head; someone else got there first.
    Rejected { reason: String },
}

/// Where a branch name is already taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BranchPresence {
    pub local: bool,
    pub remote: bool,
}

/// What the update loop needs from version control.
#[async_trait]
pub trait VersionedStore: Send + Sync {
    /// Fetch, hard-reset the local branch to the remote head, and read the
    /// document. Any earlier local commit is discarded.
    async fn snapshot(&self, branch: &BranchName) -> StoreResult<Snapshot>;

    /// Write `document` and commit it on the current branch.
    async fn commit_local(&self, document: &Document, message: &str) -> StoreResult<CommitId>;

    /// The remote's head for `branch`, without modifying local state.
    async fn remote_head(&self, branch: &BranchName) -> StoreResult<CommitId>;

    /// Fast-forward the remote branch to the local one.
    async fn publish(&self, branch: &BranchName) -> StoreResult<PublishOutcome>;
}

/// Branch administration used by create and remove.
#[async_trait]
pub trait BranchStore: VersionedStore {
    async fn presence(&self, branch: &BranchName) -> StoreResult<BranchPresence>;

    /// Create `branch` at the current head and switch to it.
    async fn start_branch(&self, branch: &BranchName) -> StoreResult<()>;

    /// Delete `branch` on the remote.
    async fn delete_remote_branch(&self, branch: &BranchName) -> StoreResult<()>;
}

// ============================================================================
// GitStore
// ============================================================================

/// How to reach the remote and who to commit as.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub url: String,
    pub auth: GitAuth,
    pub user_name: String,
    pub user_email: String,
    /// Document path relative to the working-copy root.
    pub document_path: String,
}

/// [`VersionedStore`] backed by a libgit2 working copy.
pub struct GitStore {
    repo: Arc<GitRepo>,
    auth: GitAuth,
    document_path: String,
}

impl GitStore {
    /// Clone the remote into `path` with `branch` checked out.
    pub async fn checkout(settings: StoreSettings, path: &Path, branch: &str) -> StoreResult<Self> {
        let path = path.to_path_buf();
        let branch = branch.to_string();
        let url = settings.url.clone();
        let auth = settings.auth.clone();

        let repo = blocking(move || {
            debug!(url = %url, branch = %branch, "cloning");
            let repo = GitRepo::clone(&url, path, &branch, &auth).map_err(|e| {
                if e.code() == Some(ErrorCode::NotFound) {
                    StoreError::BranchNotFound(branch.clone())
                } else {
                    StoreError::Git(e)
                }
            })?;
            Ok(repo)
        })
        .await?;

        Self::finish(repo, settings)
    }

    /// An empty repository with only the remote configured.
    ///
    /// Enough for ref-only operations like deleting a remote branch.
    pub async fn detached(settings: StoreSettings, path: &Path) -> StoreResult<Self> {
        let path = path.to_path_buf();
        let url = settings.url.clone();
        let repo = blocking(move || Ok(GitRepo::init_with_remote(path, REMOTE, &url)?)).await?;
        Self::finish(repo, settings)
    }

    fn finish(repo: GitRepo, settings: StoreSettings) -> StoreResult<Self> {
        repo.set_identity(&settings.user_name, &settings.user_email)?;
        Ok(Self {
            repo: Arc::new(repo),
            auth: settings.auth,
            document_path: settings.document_path,
        })
    }

    pub fn root(&self) -> &Path {
        self.repo.root()
    }

    /// Absolute path of the document in the working copy.
    pub fn document_file(&self) -> PathBuf {
        self.repo.root().join(&self.document_path)
    }

    /// Run `f` against the repository on the blocking pool.
    async fn with_repo<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&GitRepo, &GitAuth) -> StoreResult<T> + Send + 'static,
    {
        let repo = Arc::clone(&self.repo);
        let auth = self.auth.clone();
        blocking(move || f(&repo, &auth)).await
    }
}

#[async_trait]
impl VersionedStore for GitStore {
    async fn snapshot(&self, branch: &BranchName) -> StoreResult<Snapshot> {
        let branch = branch.clone();
        let file = self.document_file();

        self.with_repo(move |repo, auth| {
            repo.fetch(REMOTE, &[FETCH_REFSPEC], auth)?;
            let head = repo
                .resolve_ref(&branch.remote_tracking_ref(REMOTE))?
                .ok_or_else(|| StoreError::BranchNotFound(branch.to_string()))?;
            repo.reset_hard(&branch.local_ref(), head)?;

            let text = std::fs::read_to_string(&file).map_err(|source| StoreError::Io {
                path: file.clone(),
                source,
            })?;
            let document = Document::from_json(&text)
                .map_err(|source| StoreError::Document { path: file, source })?;

            let base = commit_id(head);
            debug!(branch = %branch, base = %base.short(), blocks = document.len(), "snapshot");
            Ok(Snapshot { document, base })
        })
        .await
    }

    async fn commit_local(&self, document: &Document, message: &str) -> StoreResult<CommitId> {
        let file = self.document_file();
        let json = document.to_json_pretty().map_err(|source| StoreError::Document {
            path: file.clone(),
            source,
        })?;
        let pathspec = self.document_path.clone();
        let message = message.to_string();

        self.with_repo(move |repo, _auth| {
            if let Some(parent) = file.parent() {
                std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
            std::fs::write(&file, json).map_err(|source| StoreError::Io {
                path: file.clone(),
                source,
            })?;
            repo.add(&[pathspec.as_str()])?;
            let oid = repo.commit(&message)?;
            Ok(commit_id(oid))
        })
        .await
    }

    async fn remote_head(&self, branch: &BranchName) -> StoreResult<CommitId> {
        let branch = branch.clone();
        self.with_repo(move |repo, auth| {
            repo.ls_remote(REMOTE, &branch.local_ref(), auth)?
                .map(commit_id)
                .ok_or_else(|| StoreError::BranchNotFound(branch.to_string()))
        })
        .await
    }

    async fn publish(&self, branch: &BranchName) -> StoreResult<PublishOutcome> {
        let refspec = format!("{0}:{0}", branch.local_ref());
        self.with_repo(move |repo, auth| {
            let outcome = match repo.push(REMOTE, &refspec, auth)? {
                PushStatus::Pushed => PublishOutcome::Published,
                PushStatus::Rejected(reason) => PublishOutcome::Rejected { reason },
            };
            debug!(refspec = %refspec, ?outcome, "push");
            Ok(outcome)
        })
        .await
    }
}

#[async_trait]
impl BranchStore for GitStore {
    async fn presence(&self, branch: &BranchName) -> StoreResult<BranchPresence> {
        let branch = branch.clone();
        self.with_repo(move |repo, auth| {
            Ok(BranchPresence {
                local: repo.local_branch_exists(branch.as_str())?,
                remote: repo.ls_remote(REMOTE, &branch.local_ref(), auth)?.is_some(),
            })
        })
        .await
    }

    async fn start_branch(&self, branch: &BranchName) -> StoreResult<()> {
        let branch = branch.clone();
        self.with_repo(move |repo, _auth| Ok(repo.checkout_new_branch(branch.as_str())?))
            .await
    }

    async fn delete_remote_branch(&self, branch: &BranchName) -> StoreResult<()> {
        let refspec = format!(":{}", branch.local_ref());
        self.with_repo(move |repo, auth| match repo.push(REMOTE, &refspec, auth)? {
            PushStatus::Pushed => {
                info!(refspec = %refspec, "deleted remote branch");
                Ok(())
            }
            PushStatus::Rejected(reason) => Err(StoreError::PushRefused { refspec, reason }),
        })
        .await
    }
}

fn commit_id(oid: Oid) -> CommitId {
    CommitId::from_bytes(oid.as_bytes())
}

async fn blocking<T, F>(f: F) -> StoreResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> StoreResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Task(format!("spawn_blocking: {}", e)))?
}
