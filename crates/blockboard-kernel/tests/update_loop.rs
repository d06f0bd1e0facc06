//! Update-loop behavior against a scripted remote.
//!
//! `ScriptedRemote` plays the git side: it can advance its head between
//! fetch and the early check (another writer committed) or refuse publishes
//! (another writer pushed first). `RecordingChat` keeps every projection.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use blockboard_kernel::{
    ChatClient, ChatError, ConflictKind, MessageProjection, Mutation, MutationError, Orchestrator,
    PublishOutcome, RetryPolicy, Snapshot, StoreResult, UpdateError, UpdateOutcome,
    VersionedStore,
};
use blockboard_types::{Block, BlockSelector, BranchName, CommitId, Document, FieldIndex, MessageRef};

// ============================================================================
// Fakes
// ============================================================================

#[derive(Default)]
struct RemoteState {
    document: Document,
    head: u8,
    next_commit: u8,
    local: Option<Document>,
    advances_left: u32,
    rejections_left: u32,
    fetches: u32,
    commits: u32,
    head_checks: u32,
    publish_attempts: u32,
    publishes: u32,
}

struct ScriptedRemote {
    state: Mutex<RemoteState>,
}

impl ScriptedRemote {
    fn new(document: Document) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(RemoteState {
                document,
                head: 1,
                next_commit: 100,
                ..Default::default()
            }),
        })
    }

    fn advancing(self: Arc<Self>, times: u32) -> Arc<Self> {
        self.state.lock().advances_left = times;
        self
    }

    fn rejecting(self: Arc<Self>, times: u32) -> Arc<Self> {
        self.state.lock().rejections_left = times;
        self
    }

    fn document(&self) -> Document {
        self.state.lock().document.clone()
    }
}

fn commit(n: u8) -> CommitId {
    CommitId::from_bytes(&[n; 20])
}

#[async_trait]
impl VersionedStore for ScriptedRemote {
    async fn snapshot(&self, _branch: &BranchName) -> StoreResult<Snapshot> {
        let mut s = self.state.lock();
        s.fetches += 1;
        s.local = None;
        Ok(Snapshot {
            document: s.document.clone(),
            base: commit(s.head),
        })
    }

    async fn commit_local(&self, document: &Document, _message: &str) -> StoreResult<CommitId> {
        let mut s = self.state.lock();
        s.commits += 1;
        s.next_commit += 1;
        s.local = Some(document.clone());
        Ok(commit(s.next_commit))
    }

    async fn remote_head(&self, _branch: &BranchName) -> StoreResult<CommitId> {
        let mut s = self.state.lock();
        s.head_checks += 1;
        if s.advances_left > 0 {
            s.advances_left -= 1;
            s.head += 1;
        }
        Ok(commit(s.head))
    }

    async fn publish(&self, _branch: &BranchName) -> StoreResult<PublishOutcome> {
        let mut s = self.state.lock();
        s.publish_attempts += 1;
        if s.rejections_left > 0 {
            s.rejections_left -= 1;
            s.head += 1;
            return Ok(PublishOutcome::Rejected {
                reason: "cannot push non-fastforwardable reference".to_string(),
            });
        }
        if let Some(local) = s.local.take() {
            s.document = local;
            s.head = s.next_commit;
            s.publishes += 1;
        }
        Ok(PublishOutcome::Published)
    }
}

#[derive(Default)]
struct RecordingChat {
    projected: Mutex<Vec<Document>>,
    fail: bool,
}

#[async_trait]
impl ChatClient for RecordingChat {
    async fn read_message(&self, message: &MessageRef) -> Result<Document, ChatError> {
        Err(ChatError::MessageNotFound(message.clone()))
    }

    async fn replace_message_blocks(
        &self,
        _message: &MessageRef,
        document: &Document,
    ) -> Result<(), ChatError> {
        if self.fail {
            return Err(ChatError::Api {
                method: "chat.update",
                error: "channel_not_found".to_string(),
            });
        }
        self.projected.lock().push(document.clone());
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn queue_document() -> Document {
    Document::new(vec![
        Block::with_pairs("q", [("Job", "pending")]),
        Block::with_pairs("other", [("Job", "pending")]),
    ])
}

fn branch() -> BranchName {
    BranchName::parse("queue").unwrap()
}

fn mark_done() -> Mutation {
    Mutation::new(BlockSelector::exact("q").unwrap(), FieldIndex::Pair(0), "done")
}

fn orchestrator(
    remote: &Arc<ScriptedRemote>,
    chat: &Arc<RecordingChat>,
    max_retries: u32,
) -> Orchestrator {
    let projection = MessageProjection::new(
        chat.clone(),
        MessageRef::new("C0123", "1700000000.000100"),
    );
    Orchestrator::new(
        remote.clone(),
        projection,
        RetryPolicy::from_max_retries(max_retries),
    )
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_update_publishes_and_projects() {
    let remote = ScriptedRemote::new(queue_document());
    let chat = Arc::new(RecordingChat::default());

    let report = orchestrator(&remote, &chat, 5)
        .run(&branch(), &mark_done())
        .await
        .unwrap();

    assert_eq!(report.attempts, 1);
    assert!(matches!(report.outcome, UpdateOutcome::Published { .. }));

    let published = remote.document();
    assert_eq!(published.find("q").unwrap().value(0), Some("done"));
    assert_eq!(published.find("other").unwrap().value(0), Some("pending"));

    let projected = chat.projected.lock();
    assert_eq!(projected.len(), 1);
    assert_eq!(projected[0], published);

    let s = remote.state.lock();
    assert_eq!((s.fetches, s.commits, s.publishes), (1, 1, 1));
}

#[tokio::test]
async fn test_early_advances_retry_until_success() {
    // Head moves during the first two attempts; the third goes through.
    let remote = ScriptedRemote::new(queue_document()).advancing(2);
    let chat = Arc::new(RecordingChat::default());

    let report = orchestrator(&remote, &chat, 5)
        .run(&branch(), &mark_done())
        .await
        .unwrap();

    assert_eq!(report.attempts, 3);
    let s = remote.state.lock();
    assert_eq!(s.fetches, 3);
    assert_eq!(s.commits, 3);
    assert_eq!(s.publish_attempts, 1);
    assert_eq!(s.publishes, 1);
    // Doomed attempts never reach the chat message.
    assert_eq!(chat.projected.lock().len(), 1);
}

#[tokio::test]
async fn test_exhaustion_never_projects_or_publishes() {
    let remote = ScriptedRemote::new(queue_document()).advancing(u32::MAX);
    let chat = Arc::new(RecordingChat::default());

    let err = orchestrator(&remote, &chat, 4)
        .run(&branch(), &mark_done())
        .await
        .unwrap_err();

    match err {
        UpdateError::RetriesExhausted { attempts, last } => {
            assert_eq!(attempts, 4);
            assert_eq!(last, ConflictKind::EarlyAdvance);
        }
        other => panic!("unexpected error: {other}"),
    }
    let s = remote.state.lock();
    assert_eq!(s.fetches, 4);
    assert_eq!(s.publish_attempts, 0);
    assert!(chat.projected.lock().is_empty());
    assert_eq!(remote_value(&s.document), Some("pending".to_string()));
}

#[tokio::test]
async fn test_zero_max_retries_attempts_once() {
    let remote = ScriptedRemote::new(queue_document()).advancing(1);
    let chat = Arc::new(RecordingChat::default());

    let err = orchestrator(&remote, &chat, 0)
        .run(&branch(), &mark_done())
        .await
        .unwrap_err();

    assert!(matches!(err, UpdateError::RetriesExhausted { attempts: 1, .. }));
    assert_eq!(remote.state.lock().fetches, 1);
}

#[tokio::test]
async fn test_rejected_publish_retries_from_fresh_snapshot() {
    let remote = ScriptedRemote::new(queue_document()).rejecting(1);
    let chat = Arc::new(RecordingChat::default());

    let report = orchestrator(&remote, &chat, 5)
        .run(&branch(), &mark_done())
        .await
        .unwrap();

    assert_eq!(report.attempts, 2);
    let s = remote.state.lock();
    assert_eq!(s.fetches, 2);
    assert_eq!(s.publish_attempts, 2);
    assert_eq!(s.publishes, 1);
    // The rejected attempt had already projected; the retry projects again.
    assert_eq!(chat.projected.lock().len(), 2);
}

#[tokio::test]
async fn test_rejections_count_against_budget() {
    let remote = ScriptedRemote::new(queue_document()).rejecting(u32::MAX);
    let chat = Arc::new(RecordingChat::default());

    let err = orchestrator(&remote, &chat, 3)
        .run(&branch(), &mark_done())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        UpdateError::RetriesExhausted {
            attempts: 3,
            last: ConflictKind::PublishRejected
        }
    ));
    assert_eq!(remote.state.lock().publishes, 0);
}

#[tokio::test]
async fn test_noop_update_touches_nothing() {
    let doc = Document::new(vec![Block::with_pairs("q", [("Job", "done")])]);
    let remote = ScriptedRemote::new(doc);
    let chat = Arc::new(RecordingChat::default());

    let report = orchestrator(&remote, &chat, 5)
        .run(&branch(), &mark_done())
        .await
        .unwrap();

    assert_eq!(report.attempts, 1);
    assert_eq!(report.outcome, UpdateOutcome::Unchanged { base: commit(1) });
    let s = remote.state.lock();
    assert_eq!((s.commits, s.head_checks, s.publish_attempts), (0, 0, 0));
    assert!(chat.projected.lock().is_empty());
}

#[tokio::test]
async fn test_mutation_error_is_not_retried() {
    let remote = ScriptedRemote::new(queue_document());
    let chat = Arc::new(RecordingChat::default());
    let missing = Mutation::new(BlockSelector::exact("nope").unwrap(), FieldIndex::All, "x");

    let err = orchestrator(&remote, &chat, 5)
        .run(&branch(), &missing)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        UpdateError::Mutation(MutationError::NoMatchingBlock { .. })
    ));
    assert_eq!(remote.state.lock().fetches, 1);
}

#[tokio::test]
async fn test_projection_failure_is_fatal() {
    let remote = ScriptedRemote::new(queue_document());
    let chat = Arc::new(RecordingChat {
        fail: true,
        ..Default::default()
    });

    let err = orchestrator(&remote, &chat, 5)
        .run(&branch(), &mark_done())
        .await
        .unwrap_err();

    assert!(matches!(err, UpdateError::Projection(ChatError::Api { .. })));
    let s = remote.state.lock();
    assert_eq!(s.fetches, 1);
    assert_eq!(s.publish_attempts, 0);
}

#[tokio::test]
async fn test_cancelled_before_first_fetch() {
    let remote = ScriptedRemote::new(queue_document());
    let chat = Arc::new(RecordingChat::default());
    let token = CancellationToken::new();
    token.cancel();

    let err = orchestrator(&remote, &chat, 5)
        .with_cancellation(token)
        .run(&branch(), &mark_done())
        .await
        .unwrap_err();

    assert!(matches!(err, UpdateError::Cancelled { attempt: 1 }));
    assert_eq!(remote.state.lock().fetches, 0);
}

#[tokio::test]
async fn test_pattern_update_with_guard() {
    let doc = Document::new(vec![
        Block::with_pairs("deploy-eu", [("Region", "waiting"), ("Stage", "done")]),
        Block::with_pairs("deploy-us", [("Region", "waiting"), ("Stage", "waiting")]),
        Block::with_pairs("summary", [("Total", "waiting")]),
    ]);
    let remote = ScriptedRemote::new(doc);
    let chat = Arc::new(RecordingChat::default());
    let mutation = Mutation::new(
        BlockSelector::pattern("^deploy-").unwrap(),
        FieldIndex::All,
        "running",
    )
    .with_guard_pattern("^waiting$")
    .unwrap();

    orchestrator(&remote, &chat, 5)
        .run(&branch(), &mutation)
        .await
        .unwrap();

    let doc = remote.document();
    assert_eq!(doc.find("deploy-eu").unwrap().value(0), Some("running"));
    assert_eq!(doc.find("deploy-eu").unwrap().value(1), Some("done"));
    assert_eq!(doc.find("deploy-us").unwrap().value(1), Some("running"));
    assert_eq!(doc.find("summary").unwrap().value(0), Some("waiting"));
}

fn remote_value(doc: &Document) -> Option<String> {
    doc.find("q").and_then(|b| b.value(0)).map(str::to_string)
}
