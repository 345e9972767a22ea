pub mod conversation_controller;

pub use conversation_controller::{ConversationLifecycleController, ConversationSummary, ListTab};
