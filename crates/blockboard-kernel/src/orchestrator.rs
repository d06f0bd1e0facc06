//! Optimistic-concurrency update loop.
//!
//! One update is a small state machine:
//!
//! ```text
//!            ┌──────────────────────────── RETRY ◄─────────────────┐
//!            ▼                                ▲                     │
//!  ──► FETCH ──► MUTATE ──(commit)──► DETECT_EARLY_CONFLICT        │
//!                  │                          │                     │
//!            unchanged                    head == base              │
//!                  ▼                          ▼                     │
//!               SUCCESS ◄──── PUBLISH ◄── PROJECT                   │
//!                               │                                   │
//!                               └────── rejected ───────────────────┘
//! ```
//!
//! Every attempt starts from a fresh snapshot, so a retry never carries
//! state from the attempt it replaces. The early conflict check stops most
//! doomed attempts before they reach the chat message, but it cannot close
//! the window between PROJECT and PUBLISH. If another writer lands in that
//! window, the message briefly shows this attempt's document until the
//! retry (or the other writer's own projection) overwrites it.
//!
//! Mutation, store, and projection errors are fatal. Only the two conflict
//! kinds are retried, and both spend an attempt.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use blockboard_types::{BranchName, CommitId, Document};

use crate::mutation::{Mutation, MutationError};
use crate::projection::{ChatError, MessageProjection};
use crate::store::{PublishOutcome, Snapshot, StoreError, VersionedStore};

/// Why an attempt was abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ConflictKind {
    /// The remote head moved between fetch and the pre-projection check.
    EarlyAdvance,
    /// The remote refused the fast-forward publish.
    PublishRejected,
}

#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error(transparent)]
    Mutation(#[from] MutationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("projection failed: {0}")]
    Projection(#[from] ChatError),

    #[error("gave up after {attempts} attempts; last conflict: {last}")]
    RetriesExhausted { attempts: u32, last: ConflictKind },

    #[error("cancelled before attempt {attempt}")]
    Cancelled { attempt: u32 },
}

/// Attempt budget for one update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
}

impl RetryPolicy {
    /// `max_retries` counts total attempts; zero still gets one.
    pub fn from_max_retries(max_retries: u32) -> Self {
        Self {
            max_attempts: max_retries.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_max_retries(5)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// A new commit is on the remote branch and the message shows it.
    Published { commit: CommitId },
    /// The mutation was a no-op against `base`; nothing was written.
    Unchanged { base: CommitId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateReport {
    /// Attempts used, including the successful one.
    pub attempts: u32,
    pub outcome: UpdateOutcome,
}

/// Loop state. Terminal states are returns, not variants.
#[derive(Debug, strum::IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
enum Phase {
    Fetch,
    Mutate(Snapshot),
    DetectEarlyConflict {
        base: CommitId,
        commit: CommitId,
        document: Document,
    },
    Project {
        commit: CommitId,
        document: Document,
    },
    Publish {
        commit: CommitId,
    },
    Retry(ConflictKind),
}

/// Drives one update through the state machine.
pub struct Orchestrator {
    store: Arc<dyn VersionedStore>,
    projection: MessageProjection,
    policy: RetryPolicy,
    commit_message: String,
    cancel: Option<CancellationToken>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn VersionedStore>,
        projection: MessageProjection,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            projection,
            policy,
            commit_message: "Update block document".to_string(),
            cancel: None,
        }
    }

    pub fn with_commit_message(mut self, message: impl Into<String>) -> Self {
        self.commit_message = message.into();
        self
    }

    /// Stop before the next FETCH once `token` is cancelled.
    ///
    /// An attempt already past FETCH runs to its next decision point.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Apply `mutation` to `branch` and mirror the result into the message.
    #[instrument(skip_all, fields(branch = %branch, selector = %mutation.selector()))]
    pub async fn run(
        &self,
        branch: &BranchName,
        mutation: &Mutation,
    ) -> Result<UpdateReport, UpdateError> {
        let mut attempt = 0u32;
        let mut phase = Phase::Fetch;

        loop {
            trace!(phase = <&'static str>::from(&phase), attempt, "enter");
            phase = match phase {
                Phase::Fetch => {
                    if let Some(token) = &self.cancel
                        && token.is_cancelled()
                    {
                        warn!(attempt = attempt + 1, "update cancelled");
                        return Err(UpdateError::Cancelled {
                            attempt: attempt + 1,
                        });
                    }
                    attempt += 1;
                    let snapshot = self.store.snapshot(branch).await?;
                    debug!(attempt, base = %snapshot.base.short(), "fetched");
                    Phase::Mutate(snapshot)
                }

                Phase::Mutate(Snapshot { document, base }) => {
                    let mutated = mutation.apply(&document)?;
                    if !mutated.changed {
                        info!(attempt, base = %base.short(), "document already up to date");
                        return Ok(UpdateReport {
                            attempts: attempt,
                            outcome: UpdateOutcome::Unchanged { base },
                        });
                    }
                    let commit = self
                        .store
                        .commit_local(&mutated.document, &self.commit_message)
                        .await?;
                    Phase::DetectEarlyConflict {
                        base,
                        commit,
                        document: mutated.document,
                    }
                }

                Phase::DetectEarlyConflict {
                    base,
                    commit,
                    document,
                } => {
                    let head = self.store.remote_head(branch).await?;
                    if head == base {
                        Phase::Project { commit, document }
                    } else {
                        warn!(
                            attempt,
                            base = %base.short(),
                            head = %head.short(),
                            "remote advanced before projection"
                        );
                        Phase::Retry(ConflictKind::EarlyAdvance)
                    }
                }

                Phase::Project { commit, document } => {
                    self.projection.project(&document).await?;
                    Phase::Publish { commit }
                }

                Phase::Publish { commit } => match self.store.publish(branch).await? {
                    PublishOutcome::Published => {
                        info!(attempt, commit = %commit.short(), "published");
                        return Ok(UpdateReport {
                            attempts: attempt,
                            outcome: UpdateOutcome::Published { commit },
                        });
                    }
                    PublishOutcome::Rejected { reason } => {
                        warn!(attempt, reason = %reason, "publish rejected");
                        Phase::Retry(ConflictKind::PublishRejected)
                    }
                },

                Phase::Retry(kind) => {
                    if attempt >= self.policy.max_attempts {
                        error!(attempts = attempt, last = %kind, "retries exhausted");
                        return Err(UpdateError::RetriesExhausted {
                            attempts: attempt,
                            last: kind,
                        });
                    }
                    Phase::Fetch
                }
            };
        }
    }
}
