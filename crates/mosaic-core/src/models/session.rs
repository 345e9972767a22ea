use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use lazy_static::lazy_static;
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::conversation::Conversation;
use super::message::{Message, Part};
use super::message_store::MessageStore;
use crate::error::{ChatError, ChatResult};

/// Largest decoded image accepted inline (the backend's inline payload limit)
pub const MAX_INLINE_IMAGE_BYTES: usize = 20 * 1024 * 1024;

lazy_static! {
    static ref DATA_URL: Regex =
        Regex::new(r"^data:([A-Za-z0-9.+-]+/[A-Za-z0-9.+-]+);base64,(.+)$").unwrap();
}

/// Display surface fed by the session. Rendering itself lives outside the engine.
pub trait MessageRenderer: Send {
    fn clear(&mut self);
    fn render_message(&mut self, index: usize, message: &Message);
}

/// Renderer for headless use
#[derive(Debug, Default)]
pub struct NullRenderer;

impl MessageRenderer for NullRenderer {
    fn clear(&mut self) {}
    fn render_message(&mut self, _index: usize, _message: &Message) {}
}

/// Metadata a collaborator supplies alongside an attached image
#[derive(Debug, Clone, Default)]
pub struct ImageMeta {
    pub name: Option<String>,
    pub size: Option<u64>,
}

/// Working copy of the one open conversation.
///
/// `conversation_id` is `None` while the conversation is an unsaved draft.
pub struct ChatSession {
    conversation_id: Option<String>,
    store: MessageStore,
    staged_images: Vec<Part>,
    saved_digest: Option<String>,
    renderer: Box<dyn MessageRenderer>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::with_renderer(Box::new(NullRenderer))
    }

    pub fn with_renderer(renderer: Box<dyn MessageRenderer>) -> Self {
        Self {
            conversation_id: None,
            store: MessageStore::new(),
            staged_images: Vec::new(),
            saved_digest: None,
            renderer,
        }
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn is_draft(&self) -> bool {
        self.conversation_id.is_none()
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut MessageStore {
        &mut self.store
    }

    /// Make a persisted conversation the working copy.
    pub fn open(&mut self, conversation: &Conversation) {
        debug!(
            conv_id = %conversation.id,
            messages = conversation.messages.len(),
            "Opening conversation"
        );
        self.store = MessageStore::from_messages(conversation.messages.clone());
        self.conversation_id = Some(conversation.id.clone());
        self.saved_digest = Some(history_digest(self.store.messages()));
        self.staged_images.clear();
        self.refresh_view();
    }

    pub(crate) fn attach(&mut self, id: String) {
        self.conversation_id = Some(id);
    }

    pub(crate) fn detach(&mut self) {
        self.conversation_id = None;
        self.saved_digest = None;
    }

    pub(crate) fn saved_digest(&self) -> Option<&str> {
        self.saved_digest.as_deref()
    }

    pub(crate) fn mark_saved(&mut self, digest: String) {
        self.saved_digest = Some(digest);
        self.store.mark_clean();
    }

    /// Clear the view and staged images; with `reset_history`, start a new draft.
    pub fn clear_chat(&mut self, reset_history: bool) {
        self.renderer.clear();
        self.staged_images.clear();
        if reset_history {
            self.store = MessageStore::new();
            self.detach();
        }
    }

    /// Render `messages` from scratch, in order, with their logical indexes.
    pub fn render_stored_messages(&mut self, messages: &[Message]) {
        self.renderer.clear();
        for (index, message) in messages.iter().enumerate() {
            self.renderer.render_message(index, message);
        }
    }

    /// Re-render the current log.
    pub fn refresh_view(&mut self) {
        let renderer = &mut self.renderer;
        renderer.clear();
        for (index, message) in self.store.messages().iter().enumerate() {
            renderer.render_message(index, message);
        }
    }

    pub fn get_chat_history(&self) -> &[Message] {
        self.store.messages()
    }

    /// Replace the whole log. The session stays attached to its conversation.
    pub fn set_chat_history(&mut self, messages: Vec<Message>) {
        self.store.clear();
        for message in messages {
            self.store.append(message);
        }
        self.refresh_view();
    }

    /// Stage a `data:` URL image for the next send.
    pub fn add_image_to_chat(&mut self, data_url: &str, meta: ImageMeta) -> ChatResult<()> {
        let part = parse_image_data_url(data_url)?;
        debug!(name = ?meta.name, size = ?meta.size, "Staged image for next message");
        self.staged_images.push(part);
        Ok(())
    }

    pub fn staged_images(&self) -> &[Part] {
        &self.staged_images
    }

    pub(crate) fn take_staged_images(&mut self) -> Vec<Part> {
        std::mem::take(&mut self.staged_images)
    }

    /// Put images back after a send was rejected.
    pub(crate) fn restage_images(&mut self, images: Vec<Part>) {
        self.staged_images = images;
    }
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse `data:image/<type>;base64,<payload>` into an inline image part.
pub fn parse_image_data_url(data_url: &str) -> ChatResult<Part> {
    let captures = DATA_URL
        .captures(data_url.trim())
        .ok_or_else(|| ChatError::validation("image is not a base64 data URL"))?;

    let mime_type = captures[1].to_ascii_lowercase();
    if !mime_type.starts_with("image/") {
        return Err(ChatError::validation(format!(
            "unsupported attachment type: {}",
            mime_type
        )));
    }

    let payload = captures[2].to_string();
    let decoded = STANDARD
        .decode(payload.as_bytes())
        .map_err(|e| ChatError::validation(format!("image payload is not valid base64: {}", e)))?;
    if decoded.is_empty() {
        return Err(ChatError::validation("image payload is empty"));
    }
    if decoded.len() > MAX_INLINE_IMAGE_BYTES {
        return Err(ChatError::validation(format!(
            "image is {} bytes, limit is {}",
            decoded.len(),
            MAX_INLINE_IMAGE_BYTES
        )));
    }

    Ok(Part::image(mime_type, payload))
}

/// Content digest of a log, used to detect no-op saves.
pub fn history_digest(messages: &[Message]) -> String {
    let mut hasher = Sha256::new();
    for message in messages {
        hasher.update(message.id.to_string().as_bytes());
        hasher.update(message.role.to_string().as_bytes());
        for part in &message.parts {
            match part {
                Part::Text(text) => {
                    hasher.update(b"t");
                    hasher.update((text.len() as u64).to_le_bytes());
                    hasher.update(text.as_bytes());
                }
                Part::InlineImage { mime_type, data } => {
                    hasher.update(b"i");
                    hasher.update(mime_type.as_bytes());
                    hasher.update((data.len() as u64).to_le_bytes());
                    hasher.update(data.as_bytes());
                }
            }
        }
        hasher.update(b"\x1e");
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    #[derive(Default, Clone)]
    struct RecordingRenderer {
        rendered: Arc<Mutex<Vec<(usize, String)>>>,
        clears: Arc<Mutex<usize>>,
    }

    impl MessageRenderer for RecordingRenderer {
        fn clear(&mut self) {
            *self.clears.lock() += 1;
            self.rendered.lock().clear();
        }

        fn render_message(&mut self, index: usize, message: &Message) {
            self.rendered.lock().push((index, message.text()));
        }
    }

    #[test]
    fn test_add_image_to_chat_stages_part() {
        let mut session = ChatSession::new();
        session
            .add_image_to_chat("data:image/PNG;base64,iVBORw0KGgo=", ImageMeta::default())
            .unwrap();

        assert_eq!(
            session.staged_images(),
            &[Part::image("image/png", "iVBORw0KGgo=")]
        );
    }

    #[test]
    fn test_add_image_rejects_bad_input() {
        let mut session = ChatSession::new();
        for url in [
            "not a url",
            "data:text/plain;base64,aGVsbG8=",
            "data:image/png;base64,***",
        ] {
            assert!(matches!(
                session.add_image_to_chat(url, ImageMeta::default()),
                Err(ChatError::Validation(_))
            ));
        }
        assert!(session.staged_images().is_empty());
    }

    #[test]
    fn test_clear_chat_without_reset_keeps_history() {
        let mut session = ChatSession::new();
        session.set_chat_history(vec![Message::user_text("hi")]);
        session.attach("c-1".to_string());
        session
            .add_image_to_chat("data:image/gif;base64,R0lGOA==", ImageMeta::default())
            .unwrap();

        session.clear_chat(false);
        assert_eq!(session.get_chat_history().len(), 1);
        assert_eq!(session.conversation_id(), Some("c-1"));
        assert!(session.staged_images().is_empty());

        session.clear_chat(true);
        assert!(session.get_chat_history().is_empty());
        assert!(session.is_draft());
    }

    #[test]
    fn test_render_stored_messages_uses_logical_indexes() {
        let renderer = RecordingRenderer::default();
        let mut session = ChatSession::with_renderer(Box::new(renderer.clone()));

        session.render_stored_messages(&[Message::user_text("a"), Message::model_text("b")]);

        assert_eq!(
            *renderer.rendered.lock(),
            vec![(0, "a".to_string()), (1, "b".to_string())]
        );
        assert_eq!(*renderer.clears.lock(), 1);
    }

    #[test]
    fn test_set_chat_history_marks_dirty() {
        let mut session = ChatSession::new();
        session.set_chat_history(vec![Message::user_text("hi")]);
        assert!(session.store().is_dirty());
    }

    #[test]
    fn test_digest_tracks_content() {
        let messages = vec![Message::user_text("hi")];
        let same = history_digest(&messages);
        assert_eq!(same, history_digest(&messages.clone()));

        let mut edited = messages.clone();
        edited[0].parts = vec![Part::text("bye")];
        assert_ne!(same, history_digest(&edited));
    }
}
