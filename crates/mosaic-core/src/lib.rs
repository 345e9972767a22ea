//! Conversation state and persistence engine for a multimodal chat client.
//!
//! A [`ChatSession`] holds the one open conversation. The
//! [`ConversationLifecycleController`] applies edits through the
//! [`EditTruncationEngine`], persists through a [`ConversationRepository`] and
//! keeps the listing used for favorites, pins, search and storage accounting.

pub mod controllers;
pub mod error;
pub mod factories;
pub mod logging;
pub mod models;
pub mod repositories;
pub mod services;
pub mod settings;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use controllers::{ConversationLifecycleController, ConversationSummary, ListTab};
pub use error::{ChatError, ChatResult};
pub use models::{
    ChatSession, Conversation, ImageMeta, Message, MessageId, MessageRenderer, MessageStore, Notice,
    NoticeLevel, NotificationStore, Part, Role,
};
pub use repositories::{ConversationRepository, RepositoryError, SaveOutcome};
pub use services::{
    BackendError, EditTruncationEngine, GenerationBackend, GenerationOptions, StorageReport,
};
pub use settings::{EngineSettings, HistoryWindow, StorageKind};
