use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::conversation_repository::{BoxFuture, ConversationRepository};
use super::error::RepositoryResult;
use crate::models::Conversation;

/// In-memory repository for conversations.
/// Used for tests and as the fallback when durable storage is unavailable.
#[derive(Clone, Default)]
pub struct InMemoryConversationRepository {
    conversations: Arc<Mutex<HashMap<String, Conversation>>>,
}

impl InMemoryConversationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a known set of conversations
    pub fn seeded(conversations: impl IntoIterator<Item = Conversation>) -> Self {
        let map = conversations
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect();
        Self {
            conversations: Arc::new(Mutex::new(map)),
        }
    }

    pub fn len(&self) -> usize {
        self.conversations.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.lock().is_empty()
    }
}

impl ConversationRepository for InMemoryConversationRepository {
    fn initialize(&self) -> BoxFuture<'static, RepositoryResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn load_all(&self) -> BoxFuture<'static, RepositoryResult<Vec<Conversation>>> {
        let conversations = self.conversations.clone();

        Box::pin(async move {
            let store = conversations.lock();
            Ok(store.values().cloned().collect())
        })
    }

    fn load_one(&self, id: &str) -> BoxFuture<'static, RepositoryResult<Option<Conversation>>> {
        let conversations = self.conversations.clone();
        let id = id.to_string();

        Box::pin(async move { Ok(conversations.lock().get(&id).cloned()) })
    }

    fn upsert(&self, conversation: Conversation) -> BoxFuture<'static, RepositoryResult<()>> {
        let conversations = self.conversations.clone();

        Box::pin(async move {
            conversations
                .lock()
                .insert(conversation.id.clone(), conversation);
            Ok(())
        })
    }

    fn delete(&self, id: &str) -> BoxFuture<'static, RepositoryResult<()>> {
        let conversations = self.conversations.clone();
        let id = id.to_string();

        Box::pin(async move {
            conversations.lock().remove(&id);
            Ok(())
        })
    }

    fn clear(&self) -> BoxFuture<'static, RepositoryResult<()>> {
        let conversations = self.conversations.clone();

        Box::pin(async move {
            conversations.lock().clear();
            Ok(())
        })
    }

    fn storage_path(&self) -> String {
        "memory".to_string()
    }
}
