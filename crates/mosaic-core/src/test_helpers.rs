//! Shared test doubles for engine, persistence and controller tests.
//!
//! - `ScriptedBackend` answers from a queue and records every history it was sent.
//! - `CountingRepository` wraps the in-memory store and counts writes.
//! - `FailingRepository` behaves like storage that has become unavailable.
//! - `FlakyRepository` fails a single chosen read and is otherwise in-memory.
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::models::{Conversation, Message};
use crate::repositories::{
    BoxFuture, ConversationRepository, InMemoryConversationRepository, RepositoryError,
    RepositoryResult,
};
use crate::services::{BackendError, GeneratedContent, GenerationBackend, GenerationOptions};

/// Generation backend replaying queued results.
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<GeneratedContent, BackendError>>>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn with_replies(texts: &[&str]) -> Arc<Self> {
        let backend = Self::new();
        for text in texts {
            backend.push_reply(text);
        }
        backend
    }

    pub fn push_reply(&self, text: &str) {
        self.replies.lock().push_back(Ok(GeneratedContent::text(text)));
    }

    pub fn push_error(&self, error: BackendError) {
        self.replies.lock().push_back(Err(error));
    }

    /// Every history sent so far, oldest first
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().clone()
    }
}

impl GenerationBackend for ScriptedBackend {
    fn generate(
        &self,
        history: Vec<Message>,
        _options: GenerationOptions,
    ) -> BoxFuture<'static, Result<GeneratedContent, BackendError>> {
        self.requests.lock().push(history);
        let reply = self
            .replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(BackendError::Network("no scripted reply left".into())));
        Box::pin(async move { reply })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// In-memory repository that counts upserts, deletes and clears.
#[derive(Clone, Default)]
pub struct CountingRepository {
    inner: InMemoryConversationRepository,
    writes: Arc<AtomicUsize>,
}

impl CountingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl ConversationRepository for CountingRepository {
    fn initialize(&self) -> BoxFuture<'static, RepositoryResult<()>> {
        self.inner.initialize()
    }

    fn load_all(&self) -> BoxFuture<'static, RepositoryResult<Vec<Conversation>>> {
        self.inner.load_all()
    }

    fn load_one(&self, id: &str) -> BoxFuture<'static, RepositoryResult<Option<Conversation>>> {
        self.inner.load_one(id)
    }

    fn upsert(&self, conversation: Conversation) -> BoxFuture<'static, RepositoryResult<()>> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.upsert(conversation)
    }

    fn delete(&self, id: &str) -> BoxFuture<'static, RepositoryResult<()>> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(id)
    }

    fn clear(&self) -> BoxFuture<'static, RepositoryResult<()>> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.clear()
    }

    fn storage_path(&self) -> String {
        "counting".to_string()
    }
}

/// Storage that has run out of room: reads succeed from a fixed snapshot
/// (or fail too, with `fail_reads`), writes are rejected as unavailable.
#[derive(Clone, Default)]
pub struct FailingRepository {
    snapshot: Vec<Conversation>,
    fail_reads: bool,
    fail_init: bool,
}

impl FailingRepository {
    pub fn new(snapshot: Vec<Conversation>) -> Self {
        Self {
            snapshot,
            ..Default::default()
        }
    }

    pub fn failing_reads(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    pub fn failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    fn unavailable() -> RepositoryError {
        RepositoryError::Unavailable {
            message: "quota exceeded".into(),
        }
    }
}

impl ConversationRepository for FailingRepository {
    fn initialize(&self) -> BoxFuture<'static, RepositoryResult<()>> {
        let fail = self.fail_init;
        Box::pin(async move { if fail { Err(Self::unavailable()) } else { Ok(()) } })
    }

    fn load_all(&self) -> BoxFuture<'static, RepositoryResult<Vec<Conversation>>> {
        let result = if self.fail_reads {
            Err(RepositoryError::InvalidData {
                message: "store unreadable".into(),
            })
        } else {
            Ok(self.snapshot.clone())
        };
        Box::pin(async move { result })
    }

    fn load_one(&self, id: &str) -> BoxFuture<'static, RepositoryResult<Option<Conversation>>> {
        let found = self.snapshot.iter().find(|c| c.id == id).cloned();
        Box::pin(async move { Ok(found) })
    }

    fn upsert(&self, _conversation: Conversation) -> BoxFuture<'static, RepositoryResult<()>> {
        Box::pin(async { Err(Self::unavailable()) })
    }

    fn delete(&self, _id: &str) -> BoxFuture<'static, RepositoryResult<()>> {
        Box::pin(async { Err(Self::unavailable()) })
    }

    fn clear(&self) -> BoxFuture<'static, RepositoryResult<()>> {
        Box::pin(async { Err(Self::unavailable()) })
    }

    fn storage_path(&self) -> String {
        "failing".to_string()
    }
}

/// In-memory repository whose nth `load_one` from the moment it is armed fails.
#[derive(Clone, Default)]
pub struct FlakyRepository {
    inner: InMemoryConversationRepository,
    reads_until_failure: Arc<Mutex<Option<usize>>>,
}

impl FlakyRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `nth` (1-based) `load_one` after this call; later reads succeed.
    pub fn fail_read(&self, nth: usize) {
        *self.reads_until_failure.lock() = Some(nth);
    }

    fn should_fail(&self) -> bool {
        let mut remaining = self.reads_until_failure.lock();
        match *remaining {
            Some(1) => {
                *remaining = None;
                true
            }
            Some(n) => {
                *remaining = Some(n.saturating_sub(1));
                false
            }
            None => false,
        }
    }
}

impl ConversationRepository for FlakyRepository {
    fn initialize(&self) -> BoxFuture<'static, RepositoryResult<()>> {
        self.inner.initialize()
    }

    fn load_all(&self) -> BoxFuture<'static, RepositoryResult<Vec<Conversation>>> {
        self.inner.load_all()
    }

    fn load_one(&self, id: &str) -> BoxFuture<'static, RepositoryResult<Option<Conversation>>> {
        if self.should_fail() {
            return Box::pin(async {
                Err(RepositoryError::InvalidData {
                    message: "read interrupted".into(),
                })
            });
        }
        self.inner.load_one(id)
    }

    fn upsert(&self, conversation: Conversation) -> BoxFuture<'static, RepositoryResult<()>> {
        self.inner.upsert(conversation)
    }

    fn delete(&self, id: &str) -> BoxFuture<'static, RepositoryResult<()>> {
        self.inner.delete(id)
    }

    fn clear(&self) -> BoxFuture<'static, RepositoryResult<()>> {
        self.inner.clear()
    }

    fn storage_path(&self) -> String {
        "flaky".to_string()
    }
}
