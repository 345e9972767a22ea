use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use mosaic_core::models::{
    ChatSession, Conversation, ImageMeta, Message, NotificationStore, Part, Role,
};
use mosaic_core::repositories::{
    BoxFuture, ConversationJsonRepository, ConversationPersistence, ConversationRepository,
    ConversationSqliteRepository, InMemoryConversationRepository, RepositoryResult, SaveOutcome,
};
use mosaic_core::services::{
    BackendError, EditTruncationEngine, GeneratedContent, GenerationBackend, GenerationOptions,
    format_bytes,
};
use mosaic_core::{ConversationLifecycleController, ListTab};

struct QueuedBackend {
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl QueuedBackend {
    fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().clone()
    }
}

impl GenerationBackend for QueuedBackend {
    fn generate(
        &self,
        history: Vec<Message>,
        _options: GenerationOptions,
    ) -> BoxFuture<'static, Result<GeneratedContent, BackendError>> {
        self.requests.lock().push(history);
        let reply = self.replies.lock().pop_front();
        Box::pin(async move {
            reply
                .map(GeneratedContent::text)
                .ok_or_else(|| BackendError::Network("no reply queued".into()))
        })
    }

    fn name(&self) -> &str {
        "queued"
    }
}

/// Counts writes reaching the wrapped store
#[derive(Clone, Default)]
struct WriteCounter {
    inner: InMemoryConversationRepository,
    writes: Arc<AtomicUsize>,
}

impl ConversationRepository for WriteCounter {
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
        "counter".to_string()
    }
}

fn texts(session: &ChatSession) -> Vec<String> {
    session.get_chat_history().iter().map(|m| m.text()).collect()
}

async fn controller(
    repository: Arc<dyn ConversationRepository>,
    backend: Arc<QueuedBackend>,
) -> ConversationLifecycleController {
    ConversationLifecycleController::new(
        repository,
        EditTruncationEngine::new(backend),
        Arc::new(NotificationStore::new(20)),
    )
    .await
}

fn four_turns() -> Vec<Message> {
    vec![
        Message::user_text("A"),
        Message::model_text("M0"),
        Message::user_text("U1"),
        Message::model_text("M1"),
    ]
}

#[tokio::test]
async fn deleting_a_user_turn_truncates_the_rest() {
    let repository = Arc::new(WriteCounter::default());
    let mut controller = controller(repository, QueuedBackend::new(&[])).await;
    let mut session = ChatSession::new();
    session.set_chat_history(four_turns());
    controller.save(&mut session, false).await.unwrap();

    controller.delete_message(&mut session, 2).await.unwrap();

    assert_eq!(texts(&session), vec!["A", "M0"]);
    let id = session.conversation_id().unwrap();
    assert_eq!(controller.get(id).unwrap().messages.len(), 2);
}

#[tokio::test]
async fn editing_a_user_turn_regenerates_from_it() {
    let backend = QueuedBackend::new(&["M0'"]);
    let mut controller = controller(Arc::new(WriteCounter::default()), backend.clone()).await;
    let mut session = ChatSession::new();
    session.set_chat_history(four_turns());
    controller.save(&mut session, false).await.unwrap();

    controller
        .edit_user_message(&mut session, 0, vec![Part::text("B")])
        .await
        .unwrap();

    let requests = backend.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].len(), 1);
    assert_eq!(requests[0][0].role, Role::User);
    assert_eq!(requests[0][0].text(), "B");
    assert_eq!(texts(&session), vec!["B", "M0'"]);
}

#[tokio::test]
async fn first_save_titles_from_user_text() {
    let repository = Arc::new(WriteCounter::default());
    let mut controller = controller(repository, QueuedBackend::new(&[])).await;
    let mut session = ChatSession::new();
    session.set_chat_history(vec![Message::user_text("Hello world this is a test message")]);

    controller.save(&mut session, false).await.unwrap();

    let rows = controller.list(ListTab::All);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].title, "Hello world this is a");
}

#[tokio::test]
async fn repeated_save_writes_once() {
    let repository = WriteCounter::default();
    let persistence = ConversationPersistence::new(Arc::new(repository.clone()));
    let mut session = ChatSession::new();
    session.set_chat_history(four_turns());

    persistence.save_current_conversation(&mut session, false).await.unwrap();
    let second = persistence.save_current_conversation(&mut session, false).await.unwrap();

    assert_eq!(second, SaveOutcome::Unchanged);
    assert_eq!(repository.writes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn emptied_conversation_leaves_the_store() {
    let repository = WriteCounter::default();
    let mut controller = controller(Arc::new(repository.clone()), QueuedBackend::new(&[])).await;
    let mut session = ChatSession::new();
    session.set_chat_history(vec![Message::model_text("orphan"), Message::user_text("hi")]);
    controller.save(&mut session, false).await.unwrap();

    controller.delete_message(&mut session, 1).await.unwrap();
    controller.delete_message(&mut session, 0).await.unwrap();

    assert!(session.is_draft());
    assert!(repository.load_all().await.unwrap().is_empty());
    assert!(controller.list(ListTab::All).is_empty());
}

#[tokio::test]
async fn image_message_round_trips_through_json_store() {
    let tmp = tempfile::tempdir().unwrap();
    let repository = Arc::new(ConversationJsonRepository::new(tmp.path().join("conversations")));
    let mut controller = controller(repository.clone(), QueuedBackend::new(&["A red dot."])).await;
    let mut session = ChatSession::new();

    session
        .add_image_to_chat("data:image/png;base64,iVBORw0KGgo=", ImageMeta::default())
        .unwrap();
    controller.send_message(&mut session, "").await.unwrap();

    let id = session.conversation_id().unwrap().to_string();
    let stored = repository.load_one(&id).await.unwrap().unwrap();
    assert_eq!(stored.messages, session.get_chat_history());
    assert!(stored.messages[0].has_images());
    assert_eq!(stored.title, "A red dot");
    assert!(session.staged_images().is_empty());
}

#[tokio::test]
async fn sqlite_store_survives_reopen() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("conversations.db");

    let id = {
        let repository = Arc::new(ConversationSqliteRepository::open(&path).await.unwrap());
        let mut controller = controller(repository, QueuedBackend::new(&["Hi there."])).await;
        let mut session = ChatSession::new();
        controller.send_message(&mut session, "hello").await.unwrap();
        let id = session.conversation_id().unwrap().to_string();
        controller.toggle_pin(&id).await.unwrap();
        id
    };

    let repository = Arc::new(ConversationSqliteRepository::open(&path).await.unwrap());
    let controller = controller(repository, QueuedBackend::new(&[])).await;
    let rows = controller.list(ListTab::Pinned);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, id);
    assert_eq!(rows[0].message_count, 2);
}

#[test]
fn byte_formatting() {
    assert_eq!(format_bytes(0, 2), "0 Bytes");
    assert_eq!(format_bytes(1536, 2), "1.5 KB");
    assert_eq!(format_bytes(1_048_576, 2), "1 MB");
}
