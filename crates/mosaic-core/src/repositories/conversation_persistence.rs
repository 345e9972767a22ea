use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use super::conversation_repository::ConversationRepository;
use super::error::RepositoryResult;
use crate::models::{ChatSession, Conversation, history_digest, now_millis};
use crate::services::synthesize_title;

/// What `save_current_conversation` did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Nothing to write
    Unchanged,
    /// A draft became a persisted conversation with this id
    Created(String),
    Updated(String),
    /// History was empty; the conversation was removed
    Deleted(String),
}

/// Saves the working session into a conversation repository.
///
/// The repository handle can be swapped at runtime (degraded mode), so
/// callers hold this rather than the repository itself.
pub struct ConversationPersistence {
    repository: Arc<dyn ConversationRepository>,
}

impl ConversationPersistence {
    pub fn new(repository: Arc<dyn ConversationRepository>) -> Self {
        Self { repository }
    }

    pub fn repository(&self) -> Arc<dyn ConversationRepository> {
        self.repository.clone()
    }

    pub fn replace_repository(&mut self, repository: Arc<dyn ConversationRepository>) {
        info!(
            from = %self.repository.storage_path(),
            to = %repository.storage_path(),
            "Switching conversation repository"
        );
        self.repository = repository;
    }

    pub fn storage_path(&self) -> String {
        self.repository.storage_path()
    }

    pub async fn initialize(&self) -> RepositoryResult<()> {
        self.repository.initialize().await
    }

    pub async fn load_all(&self) -> RepositoryResult<Vec<Conversation>> {
        self.repository.load_all().await
    }

    pub async fn load_one(&self, id: &str) -> RepositoryResult<Option<Conversation>> {
        self.repository.load_one(id).await
    }

    pub async fn upsert(&self, conversation: Conversation) -> RepositoryResult<()> {
        self.repository.upsert(conversation).await
    }

    pub async fn delete(&self, id: &str) -> RepositoryResult<()> {
        self.repository.delete(id).await
    }

    pub async fn clear(&self) -> RepositoryResult<()> {
        self.repository.clear().await
    }

    /// Persist the session's history.
    ///
    /// Empty history deletes the open conversation. An existing conversation is
    /// rewritten only when forced or when its content changed since the last
    /// save. A draft becomes a new conversation with a fresh id. Session state
    /// is only updated after the write succeeds, so a failed save can be retried.
    pub async fn save_current_conversation(
        &self,
        session: &mut ChatSession,
        force: bool,
    ) -> RepositoryResult<SaveOutcome> {
        if session.get_chat_history().is_empty() {
            let Some(id) = session.conversation_id().map(str::to_string) else {
                return Ok(SaveOutcome::Unchanged);
            };
            self.repository.delete(&id).await?;
            session.detach();
            info!(conv_id = %id, "Deleted emptied conversation");
            return Ok(SaveOutcome::Deleted(id));
        }

        if !force && session.conversation_id().is_some() && !session.store().is_dirty() {
            return Ok(SaveOutcome::Unchanged);
        }

        let digest = history_digest(session.get_chat_history());
        if !force
            && session.conversation_id().is_some()
            && session.saved_digest() == Some(digest.as_str())
        {
            debug!("History matches last save, skipping write");
            session.store_mut().mark_clean();
            return Ok(SaveOutcome::Unchanged);
        }

        let existing = match session.conversation_id() {
            Some(id) => self.repository.load_one(id).await?,
            None => None,
        };

        match existing {
            Some(mut conversation) => {
                conversation.messages = session.get_chat_history().to_vec();
                conversation.last_updated = now_millis();

                if conversation.needs_title_generation {
                    let synthesized = synthesize_title(&conversation.messages);
                    conversation.title = synthesized.title;
                    conversation.needs_title_generation = !synthesized.has_model_reply;
                }

                let id = conversation.id.clone();
                self.repository.upsert(conversation).await?;
                session.mark_saved(digest);
                debug!(conv_id = %id, "Updated conversation");
                Ok(SaveOutcome::Updated(id))
            }
            None => {
                // a session id without a record is recreated under the same id
                let id = session
                    .conversation_id()
                    .map(str::to_string)
                    .unwrap_or_else(|| Uuid::new_v4().to_string());

                let mut conversation =
                    Conversation::new(id.clone(), session.get_chat_history().to_vec());
                let synthesized = synthesize_title(&conversation.messages);
                conversation.title = synthesized.title;
                conversation.needs_title_generation = !synthesized.has_model_reply;

                self.repository.upsert(conversation).await?;
                session.attach(id.clone());
                session.mark_saved(digest);
                info!(conv_id = %id, "Created conversation");
                Ok(SaveOutcome::Created(id))
            }
        }
    }
}
