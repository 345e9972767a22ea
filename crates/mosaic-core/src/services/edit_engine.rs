use std::sync::Arc;

use tracing::{debug, info, warn};

use super::generation_backend::{BackendError, GenerationBackend, GenerationOptions};
use crate::error::{ChatError, ChatResult};
use crate::models::{Message, MessageId, MessageStore, Part, Role};
use crate::settings::HistoryWindow;

/// What a delete removed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub removed: usize,
    /// The log is now empty and its conversation must be deleted, not saved
    pub emptied: bool,
}

/// Edit, delete and regenerate semantics over a message log.
///
/// A user turn is a causal root: editing or deleting it drops every later
/// entry. Model turns are leaves: editing is cosmetic and deleting removes
/// only that entry. Truncation applied before a backend call stays in place
/// when the call fails.
pub struct EditTruncationEngine {
    backend: Arc<dyn GenerationBackend>,
    options: GenerationOptions,
    window: HistoryWindow,
}

impl EditTruncationEngine {
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self {
            backend,
            options: GenerationOptions::default(),
            window: HistoryWindow::Full,
        }
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_history_window(mut self, window: HistoryWindow) -> Self {
        self.window = window;
        self
    }

    /// Append a user turn and the model's reply to it.
    pub async fn send_message(
        &self,
        store: &mut MessageStore,
        parts: Vec<Part>,
    ) -> ChatResult<MessageId> {
        let parts = validate_parts(parts)?;
        store.append(Message::user(parts));

        let reply = self.request_reply(store.messages()).await?;
        Ok(store.append(reply))
    }

    /// Replace a user turn, drop everything after it, and request a fresh reply.
    pub async fn edit_user_message(
        &self,
        store: &mut MessageStore,
        index: usize,
        new_parts: Vec<Part>,
    ) -> ChatResult<MessageId> {
        let parts = validate_parts(new_parts)?;
        store.expect_role(index, Role::User)?;

        store.replace_parts(index, parts)?;
        let dropped = store.replace_from(index + 1, Vec::new())?;
        info!(index, dropped = dropped.len(), "Edited user message, truncated later turns");

        let reply = self.request_reply(&store.messages()[..=index]).await?;
        Ok(store.append(reply))
    }

    /// Correct a model turn in place. No truncation, no backend call.
    pub fn edit_ai_message(
        &self,
        store: &mut MessageStore,
        index: usize,
        new_parts: Vec<Part>,
    ) -> ChatResult<()> {
        let parts = validate_parts(new_parts)?;
        store.expect_role(index, Role::Model)?;
        store.replace_parts(index, parts)?;
        debug!(index, "Edited model message in place");
        Ok(())
    }

    /// Remove a model turn and append a fresh reply to the user turn before it.
    pub async fn regenerate_model_message(
        &self,
        store: &mut MessageStore,
        index: usize,
    ) -> ChatResult<MessageId> {
        store.expect_role(index, Role::Model)?;

        let user_index = store.messages()[..index]
            .iter()
            .rposition(|m| m.role == Role::User)
            .ok_or_else(|| {
                ChatError::validation(format!(
                    "model message {} has no preceding user message",
                    index
                ))
            })?;
        let prefix: Vec<Message> = store.messages()[..=user_index].to_vec();

        store.remove_at(index)?;
        info!(index, user_index, "Regenerating model message");

        let reply = self.request_reply(&prefix).await?;
        Ok(store.append(reply))
    }

    /// Delete a user turn with everything after it, or a single model turn.
    pub fn delete_message(
        &self,
        store: &mut MessageStore,
        index: usize,
    ) -> ChatResult<DeleteOutcome> {
        let role = store
            .get(index)
            .map(|m| m.role)
            .ok_or_else(|| ChatError::not_found(format!("message index {} out of bounds", index)))?;

        let removed = match role {
            Role::User => store.truncate_from(index)?.len(),
            Role::Model => {
                store.remove_at(index)?;
                1
            }
        };

        info!(index, %role, removed, "Deleted message");
        Ok(DeleteOutcome {
            removed,
            emptied: store.is_empty(),
        })
    }

    async fn request_reply(&self, history: &[Message]) -> ChatResult<Message> {
        let request = apply_window(history, self.window);
        debug!(
            backend = self.backend.name(),
            sent = request.len(),
            total = history.len(),
            "Requesting generation"
        );

        let content = self
            .backend
            .generate(request, self.options.clone())
            .await
            .inspect_err(|e| {
                warn!(backend = self.backend.name(), error = %e, "Generation failed")
            })?;

        let parts: Vec<Part> = content.parts.into_iter().filter(|p| !p.is_blank()).collect();
        if parts.is_empty() {
            warn!(backend = self.backend.name(), "Generation returned no content");
            return Err(BackendError::MalformedResponse("reply contained no content".into()).into());
        }

        Ok(Message::model(parts))
    }
}

fn validate_parts(parts: Vec<Part>) -> ChatResult<Vec<Part>> {
    let parts: Vec<Part> = parts.into_iter().filter(|p| !p.is_blank()).collect();
    if parts.is_empty() {
        return Err(ChatError::validation("a message needs text or at least one image"));
    }
    Ok(parts)
}

/// Select the slice of history sent to the backend.
pub fn apply_window(history: &[Message], window: HistoryWindow) -> Vec<Message> {
    match window {
        HistoryWindow::Full => history.to_vec(),
        HistoryWindow::LastMessages(count) => {
            let mut start = history.len().saturating_sub(count.max(1));
            while start + 1 < history.len() && history[start].role == Role::Model {
                start += 1;
            }
            history[start..].to_vec()
        }
    }
}
