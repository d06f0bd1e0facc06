//! Git operations via libgit2.
//!
//! The focused subset of git the versioned store needs: clone, fetch,
//! hard reset, stage + commit, `ls-remote`, and push with rejection
//! reporting. Everything here is blocking; async callers go through
//! `tokio::task::spawn_blocking`.

use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{
    BranchType, Commit, Cred, Direction, ErrorCode, FetchOptions, FetchPrune, IndexAddOption, Oid,
    PushOptions, RemoteCallbacks, Repository, ResetType,
};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Username paired with token auth on HTTPS remotes (GitHub convention).
const TOKEN_USERNAME: &str = "x-access-token";

/// Thin wrapper around a git2 `Repository`.
pub struct GitRepo {
    repo: Mutex<Repository>,
    root: PathBuf,
}

/// Errors from git operations.
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("git2: {0}")]
    Git2(#[from] git2::Error),
    #[error("{0}")]
    Other(String),
}

impl GitError {
    /// The libgit2 error code, if this came from libgit2.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            GitError::Git2(e) => Some(e.code()),
            GitError::Other(_) => None,
        }
    }
}

/// Credentials for remote operations.
#[derive(Clone, Default)]
pub struct GitAuth {
    token: Option<String>,
}

impl GitAuth {
    /// No credentials (local paths, public remotes).
    pub fn anonymous() -> Self {
        Self { token: None }
    }

    /// HTTPS token auth.
    pub fn token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    /// Remote callbacks carrying these credentials.
    ///
    /// libgit2 re-invokes the credential callback for as long as the server
    /// keeps refusing, so the token is offered exactly once.
    pub fn callbacks(&self) -> RemoteCallbacks<'_> {
        let mut callbacks = RemoteCallbacks::new();
        if let Some(token) = &self.token {
            let mut offered = false;
            callbacks.credentials(move |_url, _username, _allowed| {
                if offered {
                    return Err(git2::Error::from_str("remote rejected token credentials"));
                }
                offered = true;
                Cred::userpass_plaintext(TOKEN_USERNAME, token)
            });
        }
        callbacks
    }
}

impl std::fmt::Debug for GitAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let token = self.token.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("GitAuth").field("token", &token).finish()
    }
}

/// Outcome of a push the transport completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushStatus {
    Pushed,
    /// The remote (or libgit2's fast-forward check) refused the update.
    Rejected(String),
}

impl GitRepo {
    /// Clone `url` into `path`, checking out `branch`.
    pub fn clone(
        url: &str,
        path: impl Into<PathBuf>,
        branch: &str,
        auth: &GitAuth,
    ) -> Result<Self, GitError> {
        let root: PathBuf = path.into();
        let mut fetch = FetchOptions::new();
        fetch.remote_callbacks(auth.callbacks());

        let repo = RepoBuilder::new()
            .branch(branch)
            .fetch_options(fetch)
            .clone(url, &root)?;
        Ok(Self::wrap(repo, root))
    }

    /// Initialize an empty repository with a single remote.
    pub fn init_with_remote(
        path: impl Into<PathBuf>,
        remote: &str,
        url: &str,
    ) -> Result<Self, GitError> {
        let root: PathBuf = path.into();
        let repo = Repository::init(&root)?;
        repo.remote(remote, url)?;
        Ok(Self::wrap(repo, root))
    }

    fn wrap(repo: Repository, root: PathBuf) -> Self {
        Self {
            repo: Mutex::new(repo),
            root,
        }
    }

    /// Repository root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Set the committer identity in the repository-local config.
    pub fn set_identity(&self, name: &str, email: &str) -> Result<(), GitError> {
        let repo = self.lock()?;
        let mut config = repo.config()?;
        config.set_str("user.name", name)?;
        config.set_str("user.email", email)?;
        Ok(())
    }

    // ========================================================================
    // Remote
    // ========================================================================

    /// Fetch `refspecs` from `remote`, pruning deleted branches.
    pub fn fetch(&self, remote: &str, refspecs: &[&str], auth: &GitAuth) -> Result<(), GitError> {
        let repo = self.lock()?;
        let mut remote = repo.find_remote(remote)?;

        let mut opts = FetchOptions::new();
        opts.remote_callbacks(auth.callbacks());
        opts.prune(FetchPrune::On);

        remote.fetch(refspecs, Some(&mut opts), None)?;
        Ok(())
    }

    /// Ask the remote where `refname` points, without touching local refs.
    pub fn ls_remote(
        &self,
        remote: &str,
        refname: &str,
        auth: &GitAuth,
    ) -> Result<Option<Oid>, GitError> {
        let repo = self.lock()?;
        let mut remote = repo.find_remote(remote)?;
        let connection = remote.connect_auth(Direction::Fetch, Some(auth.callbacks()), None)?;

        let oid = connection
            .list()?
            .iter()
            .find(|head| head.name() == refname)
            .map(|head| head.oid());
        Ok(oid)
    }

    /// Push a single refspec.
    ///
    /// Rejections are reported as [`PushStatus::Rejected`]; only transport
    /// and local failures are errors.
    pub fn push(&self, remote: &str, refspec: &str, auth: &GitAuth) -> Result<PushStatus, GitError> {
        let repo = self.lock()?;
        let mut remote = repo.find_remote(remote)?;

        let mut rejection: Option<String> = None;
        let result = {
            let mut callbacks = auth.callbacks();
            callbacks.push_update_reference(|refname, status| {
                if let Some(message) = status {
                    rejection = Some(format!("{}: {}", refname, message));
                }
                Ok(())
            });
            let mut opts = PushOptions::new();
            opts.remote_callbacks(callbacks);
            remote.push(&[refspec], Some(&mut opts))
        };

        match result {
            Ok(()) => Ok(rejection.map_or(PushStatus::Pushed, PushStatus::Rejected)),
            Err(e) if e.code() == ErrorCode::NotFastForward => {
                Ok(PushStatus::Rejected(e.message().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    // ========================================================================
    // Refs
    // ========================================================================

    /// Resolve a full ref name to its commit, `None` if the ref is absent.
    pub fn resolve_ref(&self, refname: &str) -> Result<Option<Oid>, GitError> {
        let repo = self.lock()?;
        match repo.find_reference(refname) {
            Ok(reference) => Ok(Some(reference.peel_to_commit()?.id())),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether a local branch named `name` exists.
    pub fn local_branch_exists(&self, name: &str) -> Result<bool, GitError> {
        let repo = self.lock()?;
        match repo.find_branch(name, BranchType::Local) {
            Ok(_) => Ok(true),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Point `branch_ref` at `oid`, make it HEAD, and hard-reset the
    /// working tree and index to it.
    pub fn reset_hard(&self, branch_ref: &str, oid: Oid) -> Result<(), GitError> {
        let repo = self.lock()?;
        let commit = repo.find_commit(oid)?;
        repo.reference(branch_ref, oid, true, "blockboard: reset to remote head")?;
        repo.set_head(branch_ref)?;
        repo.reset(commit.as_object(), ResetType::Hard, None)?;
        Ok(())
    }

    /// Create a local branch at HEAD and switch to it.
    pub fn checkout_new_branch(&self, name: &str) -> Result<(), GitError> {
        let repo = self.lock()?;
        let head = repo.head()?.peel_to_commit()?;
        let branch = repo.branch(name, &head, false)?;
        let refname = branch
            .get()
            .name()
            .ok_or_else(|| GitError::Other(format!("branch '{}' has a non-utf8 ref", name)))?
            .to_string();
        repo.set_head(&refname)?;
        repo.checkout_head(Some(CheckoutBuilder::new().force()))?;
        Ok(())
    }

    /// Commit HEAD points at, `None` on an unborn branch.
    pub fn head_commit(&self) -> Result<Option<Oid>, GitError> {
        let repo = self.lock()?;
        match repo.head() {
            Ok(head) => Ok(Some(head.peel_to_commit()?.id())),
            Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    // ========================================================================
    // Index
    // ========================================================================

    /// Add files to the index (staging area) by pathspec.
    pub fn add(&self, pathspec: &[&str]) -> Result<(), GitError> {
        let repo = self.lock()?;
        let mut index = repo.index()?;

        index.add_all(pathspec.iter().copied(), IndexAddOption::DEFAULT, None)?;

        index.write()?;
        Ok(())
    }

    // ========================================================================
    // Commit
    // ========================================================================

    /// Create a commit on HEAD with the currently staged changes.
    pub fn commit(&self, message: &str) -> Result<Oid, GitError> {
        if message.is_empty() {
            return Err(GitError::Other("commit message cannot be empty".into()));
        }

        let repo = self.lock()?;
        let mut index = repo.index()?;
        let tree_oid = index.write_tree()?;
        let tree = repo.find_tree(tree_oid)?;
        let sig = repo.signature()?;

        let parent = match repo.head() {
            Ok(head) => Some(head.peel_to_commit()?),
            Err(_) => None,
        };

        let parents: Vec<&Commit> = parent.iter().collect();
        let oid = repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)?;

        Ok(oid)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Repository>, GitError> {
        self.repo
            .lock()
            .map_err(|_| GitError::Other("failed to acquire repository lock".into()))
    }
}

// ============================================================================
// Tests
// ============================================================================
