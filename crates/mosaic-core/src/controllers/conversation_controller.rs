use std::cmp::Ordering;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::error::{ChatError, ChatResult};
use crate::models::{ChatSession, Conversation, MessageId, NotificationStore, Part};
use crate::repositories::{
    BoxFuture, ConversationPersistence, ConversationRepository, InMemoryConversationRepository,
    RepositoryError, RepositoryResult, SaveOutcome,
};
use crate::services::{DeleteOutcome, EditTruncationEngine, StorageReport, clean_title};

/// Listing filter
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ListTab {
    #[default]
    All,
    Favorites,
    Pinned,
}

/// One row of the conversation listing
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
    pub last_updated: i64,
    pub favorite: bool,
    pub pinned: bool,
    pub message_count: usize,
}

impl From<&Conversation> for ConversationSummary {
    fn from(conversation: &Conversation) -> Self {
        Self {
            id: conversation.id.clone(),
            title: conversation.title.clone(),
            last_updated: conversation.last_updated,
            favorite: conversation.favorite,
            pinned: conversation.pinned,
            message_count: conversation.message_count(),
        }
    }
}

/// Orchestrates conversation lifecycle, message mutations and persistence.
///
/// Keeps the last known listing in memory. Read failures fall back to it;
/// write failures are reported through the notification store and never
/// abort the session. When durable storage becomes unavailable the
/// controller continues on an in-memory repository and says so.
pub struct ConversationLifecycleController {
    persistence: ConversationPersistence,
    engine: EditTruncationEngine,
    notifications: Arc<NotificationStore>,
    listing: Vec<Conversation>,
    degraded: bool,
}

impl ConversationLifecycleController {
    pub async fn new(
        repository: Arc<dyn ConversationRepository>,
        engine: EditTruncationEngine,
        notifications: Arc<NotificationStore>,
    ) -> Self {
        let mut controller = Self {
            persistence: ConversationPersistence::new(repository),
            engine,
            notifications,
            listing: Vec::new(),
            degraded: false,
        };

        if let Err(e) = controller.persistence.initialize().await {
            error!(
                error = ?e,
                path = %controller.persistence.storage_path(),
                "Failed to initialize conversation storage"
            );
            if let Ok(snapshot) = controller.persistence.load_all().await {
                controller.listing = snapshot;
            }
            controller.degrade(&e);
        }

        controller.refresh().await;
        info!(
            count = controller.listing.len(),
            path = %controller.persistence.storage_path(),
            "Conversations loaded"
        );
        controller
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn notifications(&self) -> Arc<NotificationStore> {
        self.notifications.clone()
    }

    pub fn storage_path(&self) -> String {
        self.persistence.storage_path()
    }

    /// Reload the listing. On a read failure the last known listing is kept.
    pub async fn refresh(&mut self) -> &[Conversation] {
        match self.persistence.load_all().await {
            Ok(conversations) => self.listing = conversations,
            Err(e) => {
                warn!(
                    error = ?e,
                    cached = self.listing.len(),
                    "Failed to load conversations, using last known listing"
                );
            }
        }
        &self.listing
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.listing
    }

    pub fn get(&self, id: &str) -> Option<&Conversation> {
        self.listing.iter().find(|c| c.id == id)
    }

    /// Filtered, sorted listing. In `All`, pinned conversations come first;
    /// otherwise most recently updated first.
    pub fn list(&self, tab: ListTab) -> Vec<ConversationSummary> {
        self.sorted(tab, |_| true)
    }

    /// Listing restricted to conversations whose title or text matches `query`
    pub fn search(&self, query: &str, tab: ListTab) -> Vec<ConversationSummary> {
        self.sorted(tab, |c| c.matches(query))
    }

    fn sorted(
        &self,
        tab: ListTab,
        keep: impl Fn(&Conversation) -> bool,
    ) -> Vec<ConversationSummary> {
        let mut rows: Vec<&Conversation> = self
            .listing
            .iter()
            .filter(|c| match tab {
                ListTab::All => true,
                ListTab::Favorites => c.favorite,
                ListTab::Pinned => c.pinned,
            })
            .filter(|c| keep(c))
            .collect();

        rows.sort_by(|a, b| {
            let pinned = match tab {
                ListTab::All => b.pinned.cmp(&a.pinned),
                _ => Ordering::Equal,
            };
            pinned
                .then_with(|| b.last_updated.cmp(&a.last_updated))
                .then_with(|| a.id.cmp(&b.id))
        });

        rows.into_iter().map(ConversationSummary::from).collect()
    }

    pub fn storage_usage(&self) -> StorageReport {
        StorageReport::build(&self.listing)
    }

    /// Set a user-chosen title. Disables automatic titling for good.
    pub async fn rename(&mut self, id: &str, title: &str) -> ChatResult<()> {
        let title =
            clean_title(title).ok_or_else(|| ChatError::validation("title cannot be empty"))?;
        let mut conversation = self.current(id).await?;
        conversation.title = title;
        conversation.needs_title_generation = false;
        debug!(conv_id = %id, title = %conversation.title, "Renaming conversation");
        self.store_metadata(conversation).await
    }

    /// Returns the new favorite state
    pub async fn toggle_favorite(&mut self, id: &str) -> ChatResult<bool> {
        let mut conversation = self.current(id).await?;
        conversation.favorite = !conversation.favorite;
        let favorite = conversation.favorite;
        self.store_metadata(conversation).await?;
        Ok(favorite)
    }

    /// Returns the new pinned state
    pub async fn toggle_pin(&mut self, id: &str) -> ChatResult<bool> {
        let mut conversation = self.current(id).await?;
        conversation.pinned = !conversation.pinned;
        let pinned = conversation.pinned;
        self.store_metadata(conversation).await?;
        Ok(pinned)
    }

    /// Delete a conversation. If it is open in `session`, the session becomes a new draft.
    pub async fn delete(&mut self, id: &str, session: &mut ChatSession) -> ChatResult<()> {
        self.cached(id)?;

        let target = id.to_string();
        let result = self.write("delete conversation", move |repo| repo.delete(&target)).await;
        self.listing.retain(|c| c.id != id);
        if session.conversation_id() == Some(id) {
            session.clear_chat(true);
        }

        info!(conv_id = %id, "Deleted conversation");
        result.map_err(ChatError::from)
    }

    /// Delete every conversation and reset the session to a draft.
    pub async fn clear_all(&mut self, session: &mut ChatSession) -> ChatResult<()> {
        let result = self.write("clear conversations", |repo| repo.clear()).await;
        let removed = self.listing.len();
        self.listing.clear();
        session.clear_chat(true);

        info!(removed, "Cleared all conversations");
        result.map_err(ChatError::from)
    }

    /// Save the current session, then load `id` into it.
    pub async fn open_conversation(
        &mut self,
        id: &str,
        session: &mut ChatSession,
    ) -> ChatResult<()> {
        self.autosave(session).await;
        let conversation = self.current(id).await?;
        session.open(&conversation);
        Ok(())
    }

    /// Save the current session, then start a new draft.
    pub async fn new_conversation(&mut self, session: &mut ChatSession) {
        self.autosave(session).await;
        session.clear_chat(true);
    }

    /// Persist the session explicitly.
    pub async fn save(
        &mut self,
        session: &mut ChatSession,
        force: bool,
    ) -> ChatResult<SaveOutcome> {
        let outcome = self.save_session(session, force).await?;
        self.sync_listing(&outcome).await;
        Ok(outcome)
    }

    /// Send `text` together with any staged images.
    pub async fn send_message(
        &mut self,
        session: &mut ChatSession,
        text: &str,
    ) -> ChatResult<MessageId> {
        let images = session.take_staged_images();
        let mut parts = Vec::with_capacity(images.len() + 1);
        if !text.trim().is_empty() {
            parts.push(Part::text(text));
        }
        parts.extend(images.iter().cloned());

        if parts.is_empty() {
            session.restage_images(images);
            return Err(ChatError::validation("a message needs text or at least one image"));
        }

        let result = self.engine.send_message(session.store_mut(), parts).await;
        self.finish(session, result).await
    }

    pub async fn edit_user_message(
        &mut self,
        session: &mut ChatSession,
        index: usize,
        parts: Vec<Part>,
    ) -> ChatResult<MessageId> {
        let result = self.engine.edit_user_message(session.store_mut(), index, parts).await;
        self.finish(session, result).await
    }

    pub async fn edit_ai_message(
        &mut self,
        session: &mut ChatSession,
        index: usize,
        parts: Vec<Part>,
    ) -> ChatResult<()> {
        let result = self.engine.edit_ai_message(session.store_mut(), index, parts);
        self.finish(session, result).await
    }

    pub async fn regenerate_model_message(
        &mut self,
        session: &mut ChatSession,
        index: usize,
    ) -> ChatResult<MessageId> {
        let result = self.engine.regenerate_model_message(session.store_mut(), index).await;
        self.finish(session, result).await
    }

    /// Delete a message. Emptying the log deletes the conversation.
    pub async fn delete_message(
        &mut self,
        session: &mut ChatSession,
        index: usize,
    ) -> ChatResult<DeleteOutcome> {
        let result = self.engine.delete_message(session.store_mut(), index);
        self.finish(session, result).await
    }

    /// Common tail of every message mutation: redraw, persist, report.
    async fn finish<T>(
        &mut self,
        session: &mut ChatSession,
        result: ChatResult<T>,
    ) -> ChatResult<T> {
        session.refresh_view();
        self.autosave(session).await;

        match &result {
            Err(e) if e.is_retryable() => {
                self.notifications.error(format!("{}. You can retry.", e), true);
            }
            _ => {}
        }
        result
    }

    /// Save without failing the caller; failures become notifications.
    async fn autosave(&mut self, session: &mut ChatSession) {
        match self.save_session(session, false).await {
            Ok(outcome) => self.sync_listing(&outcome).await,
            Err(e) => {
                error!(
                    error = ?e,
                    conv_id = ?session.conversation_id(),
                    "Failed to save conversation"
                );
                self.notifications
                    .error(format!("Could not save conversation: {}", e), false);
            }
        }
    }

    async fn save_session(
        &mut self,
        session: &mut ChatSession,
        force: bool,
    ) -> RepositoryResult<SaveOutcome> {
        match self.persistence.save_current_conversation(session, force).await {
            Err(e) if e.is_unavailable() && !self.degraded => {
                self.degrade(&e);
                self.persistence.save_current_conversation(session, force).await
            }
            other => other,
        }
    }

    async fn sync_listing(&mut self, outcome: &SaveOutcome) {
        match outcome {
            SaveOutcome::Unchanged => {}
            SaveOutcome::Deleted(id) => self.listing.retain(|c| &c.id != id),
            SaveOutcome::Created(id) | SaveOutcome::Updated(id) => {
                match self.persistence.load_one(id).await {
                    Ok(Some(conversation)) => self.cache(conversation),
                    Ok(None) => warn!(conv_id = %id, "Saved conversation missing on reload"),
                    Err(e) => {
                        warn!(conv_id = %id, error = ?e, "Failed to reload saved conversation")
                    }
                }
            }
        }
    }

    async fn store_metadata(&mut self, conversation: Conversation) -> ChatResult<()> {
        let record = conversation.clone();
        let result = self
            .write("update conversation", move |repo| repo.upsert(record.clone()))
            .await;
        self.cache(conversation);
        result.map_err(ChatError::from)
    }

    /// Run a write; on unavailable storage, degrade and retry once in memory.
    async fn write<F>(&mut self, action: &str, op: F) -> RepositoryResult<()>
    where
        F: Fn(&dyn ConversationRepository) -> BoxFuture<'static, RepositoryResult<()>>,
    {
        let repository = self.persistence.repository();
        let result = match op(repository.as_ref()).await {
            Err(e) if e.is_unavailable() && !self.degraded => {
                self.degrade(&e);
                let fallback = self.persistence.repository();
                op(fallback.as_ref()).await
            }
            other => other,
        };

        if let Err(e) = &result {
            error!(action, error = ?e, "Conversation write failed");
            self.notifications.error(format!("Failed to {}: {}", action, e), false);
        }
        result
    }

    fn degrade(&mut self, cause: &RepositoryError) {
        let fallback = InMemoryConversationRepository::seeded(self.listing.clone());
        self.persistence.replace_repository(Arc::new(fallback));
        self.degraded = true;

        warn!(error = %cause, "Durable storage unavailable, continuing in memory only");
        self.notifications.warning(format!(
            "Storage unavailable ({}). Changes are kept in memory and will be lost \
             when the app closes.",
            cause
        ));
    }

    /// Stored record for `id`. Falls back to the listing when the store cannot be read.
    async fn current(&self, id: &str) -> ChatResult<Conversation> {
        match self.persistence.load_one(id).await {
            Ok(Some(conversation)) => Ok(conversation),
            Ok(None) => Err(ChatError::not_found(format!("conversation {}", id))),
            Err(e) => {
                warn!(
                    conv_id = %id,
                    error = ?e,
                    "Failed to load conversation, using last known listing"
                );
                self.cached(id)
            }
        }
    }

    fn cached(&self, id: &str) -> ChatResult<Conversation> {
        self.get(id)
            .cloned()
            .ok_or_else(|| ChatError::not_found(format!("conversation {}", id)))
    }

    fn cache(&mut self, conversation: Conversation) {
        match self.listing.iter_mut().find(|c| c.id == conversation.id) {
            Some(slot) => *slot = conversation,
            None => self.listing.push(conversation),
        }
    }
}
